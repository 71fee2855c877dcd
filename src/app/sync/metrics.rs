//! # Sync Metrics
//!
//! Counters for push, pull and upload cycles.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default)]
pub struct SyncMetrics {
    pub pushes_started: u64,
    pub pushes_completed: u64,
    pub records_applied: u64,
    pub records_failed: u64,
    pub records_parked: u64,
    pub pulls_completed: u64,
    pub pulls_failed: u64,
    pub photos_uploaded: u64,
    pub photo_failures: u64,
    pub average_push_duration: Duration,
    pub last_push_duration: Option<Duration>,
    last_push_start: Option<Instant>,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_push_start(&mut self) {
        self.last_push_start = Some(Instant::now());
        self.pushes_started += 1;
    }

    pub fn record_push_end(&mut self, applied: u64, failed: u64, parked: u64) {
        self.records_applied += applied;
        self.records_failed += failed;
        self.records_parked += parked;

        if let Some(start) = self.last_push_start.take() {
            let duration = start.elapsed();
            self.last_push_duration = Some(duration);
            self.pushes_completed += 1;

            // Rolling average
            let total = self.average_push_duration * (self.pushes_completed - 1) as u32 + duration;
            self.average_push_duration = total / self.pushes_completed as u32;
        }
    }

    /// A push that stopped on a local store error
    pub fn record_push_abort(&mut self) {
        self.last_push_start = None;
    }

    pub fn record_pull(&mut self, ok: bool) {
        if ok {
            self.pulls_completed += 1;
        } else {
            self.pulls_failed += 1;
        }
    }

    pub fn record_uploads(&mut self, uploaded: u64, failed: u64) {
        self.photos_uploaded += uploaded;
        self.photo_failures += failed;
    }

    /// Share of attempted records that were applied
    pub fn success_rate(&self) -> f64 {
        let attempted = self.records_applied + self.records_failed;
        if attempted == 0 {
            0.0
        } else {
            self.records_applied as f64 / attempted as f64
        }
    }
}
