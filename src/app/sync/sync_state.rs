//! # Sync State
//!
//! Point-in-time view of the sync subsystem for status displays.

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncStatus {
    pub is_syncing: bool,
    pub online: bool,
    pub signed_in: bool,
    /// Queue records waiting for a push, parked ones included
    pub pending: u64,
    pub parked: u64,
    pub unsynced_photos: usize,
    pub last_push: Option<DateTime<Utc>>,
    pub last_pull: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl SyncStatus {
    /// Nothing left to push or upload
    pub fn is_settled(&self) -> bool {
        self.pending == 0 && self.unsynced_photos == 0
    }
}
