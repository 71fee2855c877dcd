//! Remote doubles layered over [`MemoryRemote`]

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use surveysync::app::sync::{ConnectivityMonitor, MemoryRemote, RemoteError, RemoteStore};
use tokio::sync::Notify;
use uuid::Uuid;

/// Delays every row call by a fixed latency
pub struct SlowRemote {
    pub inner: Arc<MemoryRemote>,
    pub latency: Duration,
}

impl SlowRemote {
    pub fn new(inner: Arc<MemoryRemote>, latency: Duration) -> Self {
        Self { inner, latency }
    }
}

#[async_trait]
impl RemoteStore for SlowRemote {
    async fn upsert(&self, table: &str, row: Value) -> Result<(), RemoteError> {
        tokio::time::sleep(self.latency).await;
        self.inner.upsert(table, row).await
    }

    async fn delete(&self, table: &str, id: Uuid) -> Result<(), RemoteError> {
        tokio::time::sleep(self.latency).await;
        self.inner.delete(table, id).await
    }

    async fn select_by_owner(&self, table: &str, owner_id: &str) -> Result<Vec<Value>, RemoteError> {
        tokio::time::sleep(self.latency).await;
        self.inner.select_by_owner(table, owner_id).await
    }
}

/// Drops connectivity once `remaining` writes have been applied
pub struct FlakyLinkRemote {
    pub inner: Arc<MemoryRemote>,
    monitor: ConnectivityMonitor,
    remaining: AtomicUsize,
}

impl FlakyLinkRemote {
    pub fn new(inner: Arc<MemoryRemote>, monitor: ConnectivityMonitor, writes: usize) -> Self {
        Self {
            inner,
            monitor,
            remaining: AtomicUsize::new(writes),
        }
    }

    fn count_write(&self) {
        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.monitor.set_online(false);
        }
    }
}

#[async_trait]
impl RemoteStore for FlakyLinkRemote {
    async fn upsert(&self, table: &str, row: Value) -> Result<(), RemoteError> {
        self.inner.upsert(table, row).await?;
        self.count_write();
        Ok(())
    }

    async fn delete(&self, table: &str, id: Uuid) -> Result<(), RemoteError> {
        self.inner.delete(table, id).await?;
        self.count_write();
        Ok(())
    }

    async fn select_by_owner(&self, table: &str, owner_id: &str) -> Result<Vec<Value>, RemoteError> {
        self.inner.select_by_owner(table, owner_id).await
    }
}

/// Holds the first select of one table until [`GatedRemote::open`] is called
pub struct GatedRemote {
    pub inner: Arc<MemoryRemote>,
    table: &'static str,
    armed: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl GatedRemote {
    pub fn new(inner: Arc<MemoryRemote>, table: &'static str) -> Self {
        Self {
            inner,
            table,
            armed: AtomicBool::new(true),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }

    /// Resolves once the gated select is waiting
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    pub fn open(&self) {
        self.release.notify_one();
    }
}

#[async_trait]
impl RemoteStore for GatedRemote {
    async fn upsert(&self, table: &str, row: Value) -> Result<(), RemoteError> {
        self.inner.upsert(table, row).await
    }

    async fn delete(&self, table: &str, id: Uuid) -> Result<(), RemoteError> {
        self.inner.delete(table, id).await
    }

    async fn select_by_owner(&self, table: &str, owner_id: &str) -> Result<Vec<Value>, RemoteError> {
        if table == self.table && self.armed.swap(false, Ordering::AcqRel) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.select_by_owner(table, owner_id).await
    }
}
