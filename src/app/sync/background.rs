//! # Background Sync Worker
//!
//! A single task that drives the engine:
//!
//! - one push per offline -> online transition (observed through the
//!   monitor's `watch` channel, so listener count does not matter)
//! - one push per periodic tick while online, which picks up records whose
//!   backoff has elapsed
//! - a photo upload pass after every push
//!
//! ## Usage
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use std::time::Duration;
//! # use surveysync::app::sync::{spawn_sync_worker, SyncEngine};
//! # async fn example(engine: Arc<SyncEngine>) {
//! let worker = spawn_sync_worker(engine, Duration::from_secs(30));
//! // ...
//! worker.stop().await;
//! # }
//! ```

use crate::app::sync::{SyncEngine, SyncOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Handle to the running worker; dropping it aborts the task
#[derive(Debug)]
pub struct SyncWorker {
    handle: Option<JoinHandle<()>>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl SyncWorker {
    /// Ask the worker to finish its current cycle and exit
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "sync worker did not shut down cleanly");
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }
}

impl Drop for SyncWorker {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Spawn the worker on the current tokio runtime
pub fn spawn_sync_worker(engine: Arc<SyncEngine>, interval: Duration) -> SyncWorker {
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
    let mut transitions = engine.monitor().watch_transitions();

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it so startup does not
        // count as a periodic run.
        ticker.tick().await;

        tracing::debug!(?interval, "sync worker started");
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => break,
                changed = transitions.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let online = *transitions.borrow_and_update();
                    if online {
                        run_cycle(&engine).await;
                    }
                }
                _ = ticker.tick() => {
                    if engine.monitor().is_online() {
                        run_cycle(&engine).await;
                    }
                }
            }
        }
        tracing::debug!("sync worker stopped");
    });

    SyncWorker {
        handle: Some(handle),
        shutdown: Some(shutdown_tx),
    }
}

async fn run_cycle(engine: &SyncEngine) {
    match engine.sync_with_server().await {
        Ok(SyncOutcome::Completed(report)) => {
            tracing::debug!(applied = report.applied, failed = report.failed, "background push")
        }
        Ok(SyncOutcome::Skipped(reason)) => tracing::trace!(?reason, "background push skipped"),
        Err(e) => tracing::warn!(error = %e, "background push failed"),
    }

    if let Err(e) = engine.upload_pending_photos().await {
        tracing::warn!(error = %e, "background photo upload failed");
    }
}
