//! # Network Monitor
//!
//! Tracks whether the device is online. The platform layer feeds raw signals
//! in through [`ConnectivityMonitor::set_online`]; the monitor turns them into
//! transitions:
//!
//! - listeners registered with [`ConnectivityMonitor::on_change`] run once per
//!   transition, in subscription order, outside of any internal lock
//! - [`ConnectivityMonitor::watch_transitions`] hands out a `watch` receiver;
//!   the background sync worker is its only consumer, so an online transition
//!   starts exactly one drain no matter how many listeners exist
//!
//! Repeated signals with an unchanged value notify nobody.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::watch;

type Listener = Arc<dyn Fn(bool) + Send + Sync>;

struct Inner {
    state: watch::Sender<bool>,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_id: AtomicU64,
}

impl Inner {
    fn listeners(&self) -> std::sync::MutexGuard<'_, Vec<(u64, Listener)>> {
        match self.listeners.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Shared connectivity state; clones observe the same state
#[derive(Clone)]
pub struct ConnectivityMonitor {
    inner: Arc<Inner>,
}

impl fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectivityMonitor")
            .field("online", &self.is_online())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl ConnectivityMonitor {
    pub fn new(online: bool) -> Self {
        let (state, _) = watch::channel(online);
        Self {
            inner: Arc::new(Inner {
                state,
                listeners: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn is_online(&self) -> bool {
        *self.inner.state.borrow()
    }

    /// Feed a platform connectivity signal
    ///
    /// Returns `true` when the signal changed the state.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.inner.state.send_if_modified(|current| {
            if *current == online {
                return false;
            }
            *current = online;
            true
        });
        if !changed {
            return false;
        }

        tracing::info!(online, "connectivity changed");
        let listeners: Vec<Listener> = self
            .inner
            .listeners()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(online);
        }
        true
    }

    /// Register a transition listener
    ///
    /// The listener is not called with the current state; read
    /// [`is_online`](Self::is_online) for that.
    pub fn on_change<F>(&self, listener: F) -> Subscription
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners().push((id, Arc::new(listener)));
        Subscription {
            inner: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Receiver that observes every state change
    pub fn watch_transitions(&self) -> watch::Receiver<bool> {
        self.inner.state.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners().len()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}

/// Handle to a registered listener; dropping it unsubscribes
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    inner: Weak<Inner>,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.listeners().retain(|(id, _)| *id != self.id);
        }
    }
}
