//! # Sync Engine
//!
//! Moves data between the durable local store and the remote authority.
//!
//! ## Architecture
//!
//! - **Push** ([`SyncEngine::sync_with_server`]): drains the pending mutation
//!   queue in priority order and applies each record remotely, removing it
//!   only after the authority confirmed it
//! - **Pull** ([`SyncEngine::load_data_from_server`]): fetches the signed-in
//!   user's rows and atomically replaces the local collections
//! - **Photos** ([`SyncEngine::upload_pending_photos`]): uploads unsynced
//!   photos from the media store to the blob store
//! - **Background worker** (`background.rs`): runs a push once per online
//!   transition and on a periodic tick
//!
//! ## Key Components
//!
//! - `network_monitor.rs`: connectivity state and transition listeners
//! - `remote.rs`: remote authority traits and the in-memory authority
//! - `rest.rs`: HTTP implementation of the remote traits
//! - `rows.rs`: local entity <-> remote row translation
//! - `sync_state.rs`, `metrics.rs`: status and counters
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use surveysync::app::local_db::LocalDatabase;
//! use surveysync::app::media::MediaStore;
//! use surveysync::app::sync::{ConnectivityMonitor, MemoryRemote, SyncEngine, SyncOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = LocalDatabase::open_in_memory().await?;
//! let media = MediaStore::open(&db, 50).await?;
//! let remote = Arc::new(MemoryRemote::new());
//! let monitor = ConnectivityMonitor::new(true);
//! let engine = SyncEngine::new(db, media, remote.clone(), remote, monitor, SyncOptions::default());
//!
//! engine.set_identity(Some("user-1".to_string()));
//! let outcome = engine.sync_with_server().await?;
//! # Ok(())
//! # }
//! ```

pub mod background;
pub mod metrics;
pub mod network_monitor;
pub mod remote;
pub mod rest;
pub mod rows;
pub mod sync_state;

pub use background::{spawn_sync_worker, SyncWorker};
pub use metrics::SyncMetrics;
pub use network_monitor::{ConnectivityMonitor, Subscription};
pub use remote::{BlobStore, MemoryRemote, RemoteCall, RemoteError, RemoteStore};
pub use rest::RestRemote;
pub use sync_state::SyncStatus;

use crate::app::local_db::{CollectionSnapshot, LocalDatabase, StoreError};
use crate::app::media::MediaStore;
use crate::app::offline::{PendingMutationRecord, RetryDecision, RetryPolicy};
use crate::shared::config::AppConfig;
use crate::shared::survey::{Floor, Measurement, MutationOp, Project, SpeedTest, SurveyEntity};
use chrono::Utc;
use serde_json::Value;
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Errors returned by the pull path and by store failures during a push.
/// Individual record failures never surface here.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("device is offline")]
    Offline,

    #[error("no signed-in identity")]
    NoIdentity,

    /// The identity changed while remote rows were in flight; they were dropped
    #[error("identity changed during pull")]
    IdentityChanged,
}

/// Why a sync call did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Offline,
    AlreadyRunning,
    NoIdentity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Skipped(SkipReason),
    Completed(SyncReport),
}

impl SyncOutcome {
    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            SyncOutcome::Completed(report) => Some(report),
            SyncOutcome::Skipped(_) => None,
        }
    }
}

/// Result of one push cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Records confirmed and removed
    pub applied: usize,
    /// Records whose remote call failed this cycle
    pub failed: usize,
    /// Records not attempted: backing off, or blocked behind a failed record
    pub deferred: usize,
    /// Records skipped because they were already parked
    pub parked: usize,
    /// Records parked by this cycle
    pub newly_parked: usize,
    /// Connectivity dropped before the queue was exhausted
    pub interrupted: bool,
}

/// Result of a pull
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullReport {
    pub projects: usize,
    pub floors: usize,
    pub measurements: usize,
    pub speed_tests: usize,
    /// Remote rows that failed validation or referenced a missing parent
    pub skipped: usize,
}

/// Result of a photo upload pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub uploaded: usize,
    pub failed: usize,
    pub skipped: Option<SkipReason>,
}

/// Engine tuning
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOptions {
    pub retry: RetryPolicy,
    /// Deadline for each remote call
    pub remote_timeout: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            remote_timeout: Duration::from_secs(15),
        }
    }
}

impl SyncOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            retry: RetryPolicy::from_settings(&config.retry),
            remote_timeout: config.remote_timeout(),
        }
    }
}

/// Releases an in-progress flag when dropped, including on early return
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct SyncEngine {
    db: LocalDatabase,
    media: MediaStore,
    remote: Arc<dyn RemoteStore>,
    blobs: Arc<dyn BlobStore>,
    monitor: ConnectivityMonitor,
    options: SyncOptions,
    identity: RwLock<Option<String>>,
    /// Bumped on every identity change
    generation: AtomicU64,
    pushing: AtomicBool,
    uploading: AtomicBool,
    metrics: Mutex<SyncMetrics>,
    last_error: Mutex<Option<String>>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("monitor", &self.monitor)
            .field("options", &self.options)
            .field("pushing", &self.pushing)
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl SyncEngine {
    pub fn new(
        db: LocalDatabase,
        media: MediaStore,
        remote: Arc<dyn RemoteStore>,
        blobs: Arc<dyn BlobStore>,
        monitor: ConnectivityMonitor,
        options: SyncOptions,
    ) -> Self {
        Self {
            db,
            media,
            remote,
            blobs,
            monitor,
            options,
            identity: RwLock::new(None),
            generation: AtomicU64::new(0),
            pushing: AtomicBool::new(false),
            uploading: AtomicBool::new(false),
            metrics: Mutex::new(SyncMetrics::new()),
            last_error: Mutex::new(None),
        }
    }

    /// Identity used as owner of pushed rows and as pull filter
    pub fn set_identity(&self, identity: Option<String>) {
        let mut guard = match self.identity.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = identity;
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub fn identity(&self) -> Option<String> {
        self.identity_at().0
    }

    /// Identity together with the generation it was set in
    fn identity_at(&self) -> (Option<String>, u64) {
        let guard = match self.identity.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        (guard.clone(), self.generation.load(Ordering::Acquire))
    }

    pub fn monitor(&self) -> &ConnectivityMonitor {
        &self.monitor
    }

    pub fn is_syncing(&self) -> bool {
        self.pushing.load(Ordering::Acquire)
    }

    /// Push every due queue record to the remote authority
    ///
    /// Returns `Skipped` when offline, signed out, or when another push is in
    /// progress. Records are attempted in priority order; a record is left
    /// untouched (not even counted as an attempt) when an earlier record of
    /// the same entity or of one of its parents failed or was deferred in
    /// this cycle, so a child is never applied ahead of its parent.
    pub async fn sync_with_server(&self) -> Result<SyncOutcome, SyncError> {
        if !self.monitor.is_online() {
            return Ok(SyncOutcome::Skipped(SkipReason::Offline));
        }
        let Some(owner) = self.identity() else {
            return Ok(SyncOutcome::Skipped(SkipReason::NoIdentity));
        };
        let Some(_guard) = InFlight::acquire(&self.pushing) else {
            tracing::debug!("push already in progress");
            return Ok(SyncOutcome::Skipped(SkipReason::AlreadyRunning));
        };

        lock(&self.metrics).record_push_start();
        match self.push_records(&owner).await {
            Ok(report) => {
                lock(&self.metrics).record_push_end(
                    report.applied as u64,
                    report.failed as u64,
                    report.newly_parked as u64,
                );
                Ok(SyncOutcome::Completed(report))
            }
            Err(e) => {
                lock(&self.metrics).record_push_abort();
                self.note_error(&e);
                Err(e)
            }
        }
    }

    async fn push_records(&self, owner: &str) -> Result<SyncReport, SyncError> {
        let queue = self.db.queue();
        let records = queue.drain().await?;
        let now = Utc::now();
        let mut report = SyncReport::default();
        let mut blocked: HashSet<Uuid> = HashSet::new();

        for (position, record) in records.iter().enumerate() {
            if !self.monitor.is_online() {
                report.interrupted = true;
                report.deferred += records.len() - position;
                break;
            }

            if record.parked {
                report.parked += 1;
                blocked.insert(record.entity_id);
                continue;
            }
            let parent_blocked = record.parents().iter().any(|p| blocked.contains(&p));
            if !record.is_due(now) || parent_blocked || blocked.contains(&record.entity_id) {
                report.deferred += 1;
                blocked.insert(record.entity_id);
                continue;
            }

            match self.apply(record, owner).await {
                Ok(()) => {
                    queue.remove(&record.id).await?;
                    report.applied += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        record = %record.id,
                        attempt = record.attempts + 1,
                        error = %e,
                        "failed to push pending mutation"
                    );
                    if !e.is_transient() {
                        queue.park(&record.id, &e.to_string()).await?;
                        tracing::error!(
                            record = %record.id,
                            error = %e,
                            "parking pending mutation, the remote rejected it"
                        );
                        report.newly_parked += 1;
                    } else if queue
                        .record_failure(&record.id, &e.to_string(), &self.options.retry)
                        .await?
                        == RetryDecision::Park
                    {
                        tracing::error!(
                            record = %record.id,
                            attempts = record.attempts + 1,
                            "parking pending mutation after repeated failures"
                        );
                        report.newly_parked += 1;
                    }
                    *lock(&self.last_error) = Some(e.to_string());
                    report.failed += 1;
                    blocked.insert(record.entity_id);
                }
            }
        }

        self.db.set_last_push_time(Utc::now()).await?;
        if report.failed == 0 {
            *lock(&self.last_error) = None;
        }
        tracing::info!(
            applied = report.applied,
            failed = report.failed,
            deferred = report.deferred,
            parked = report.parked,
            "push finished"
        );
        Ok(report)
    }

    async fn apply(&self, record: &PendingMutationRecord, owner: &str) -> Result<(), RemoteError> {
        let table = record.entity_type.table();
        match record.operation {
            MutationOp::Create | MutationOp::Update => {
                let row = rows::to_remote_row(record.entity_type, &record.payload, owner)
                    .map_err(|e| RemoteError::InvalidRow(e.to_string()))?;
                self.bounded(self.remote.upsert(table, row)).await
            }
            MutationOp::Delete => self.bounded(self.remote.delete(table, record.entity_id)).await,
        }
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, RemoteError>>,
    ) -> Result<T, RemoteError> {
        let deadline = self.options.remote_timeout;
        match tokio::time::timeout(deadline, call).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout(deadline)),
        }
    }

    /// Replace the local collections with the signed-in user's remote rows
    ///
    /// Any fetch failure leaves the local store untouched. Rows that fail
    /// validation, or whose parent is not part of the fetched data, are
    /// skipped with a warning. When the identity changes before the fetched
    /// rows are written, they are discarded with [`SyncError::IdentityChanged`].
    pub async fn load_data_from_server(&self) -> Result<PullReport, SyncError> {
        if !self.monitor.is_online() {
            return Err(SyncError::Offline);
        }
        let (owner, generation) = self.identity_at();
        let owner = owner.ok_or(SyncError::NoIdentity)?;

        let result = self.pull(&owner, generation).await;
        lock(&self.metrics).record_pull(result.is_ok());
        match &result {
            Ok(report) => tracing::info!(
                projects = report.projects,
                floors = report.floors,
                measurements = report.measurements,
                speed_tests = report.speed_tests,
                skipped = report.skipped,
                "pull finished"
            ),
            Err(e) => {
                tracing::warn!(error = %e, "pull failed, keeping local data");
                self.note_error(e);
            }
        }
        result
    }

    async fn pull(&self, owner: &str, generation: u64) -> Result<PullReport, SyncError> {
        let (projects, floors, measurements, speed_tests) = tokio::try_join!(
            self.fetch(Project::KIND.table(), owner),
            self.fetch(Floor::KIND.table(), owner),
            self.fetch(Measurement::KIND.table(), owner),
            self.fetch(SpeedTest::KIND.table(), owner),
        )?;

        let (projects, mut skipped) = rows::decode_rows::<Project>(projects);
        let (floors, n) = rows::decode_rows::<Floor>(floors);
        skipped += n;
        let (measurements, n) = rows::decode_rows::<Measurement>(measurements);
        skipped += n;
        let (speed_tests, n) = rows::decode_rows::<SpeedTest>(speed_tests);
        skipped += n;

        let project_ids: HashSet<Uuid> = projects.iter().map(|p| p.id).collect();
        let (floors, orphans) = retain_with_parents(floors, |f: &Floor| {
            project_ids.contains(&f.project_id)
        });
        skipped += orphans;

        let floor_projects: std::collections::HashMap<Uuid, Uuid> =
            floors.iter().map(|f| (f.id, f.project_id)).collect();
        let (measurements, orphans) = retain_with_parents(measurements, |m: &Measurement| {
            project_ids.contains(&m.project_id)
                && m.floor_id
                    .map_or(true, |floor| floor_projects.get(&floor) == Some(&m.project_id))
        });
        skipped += orphans;

        if self.identity_at() != (Some(owner.to_string()), generation) {
            tracing::warn!(owner, "identity changed during pull, dropping fetched rows");
            return Err(SyncError::IdentityChanged);
        }

        let snapshot = CollectionSnapshot {
            projects,
            floors,
            measurements,
            speed_tests,
        };
        self.db.replace_collections(&snapshot).await?;
        self.db.set_last_pull_time(Utc::now()).await?;

        Ok(PullReport {
            projects: snapshot.projects.len(),
            floors: snapshot.floors.len(),
            measurements: snapshot.measurements.len(),
            speed_tests: snapshot.speed_tests.len(),
            skipped,
        })
    }

    async fn fetch(&self, table: &str, owner: &str) -> Result<Vec<Value>, RemoteError> {
        self.bounded(self.remote.select_by_owner(table, owner)).await
    }

    /// Upload unsynced photos, oldest first
    ///
    /// A failed upload keeps the photo unsynced for the next pass.
    pub async fn upload_pending_photos(&self) -> Result<UploadReport, SyncError> {
        let skipped = |reason| UploadReport {
            skipped: Some(reason),
            ..UploadReport::default()
        };
        if !self.monitor.is_online() {
            return Ok(skipped(SkipReason::Offline));
        }
        let Some(owner) = self.identity() else {
            return Ok(skipped(SkipReason::NoIdentity));
        };
        let Some(_guard) = InFlight::acquire(&self.uploading) else {
            return Ok(skipped(SkipReason::AlreadyRunning));
        };

        let mut report = UploadReport::default();
        for photo in self.media.unsynced().await? {
            if !self.monitor.is_online() {
                break;
            }
            match self.bounded(self.blobs.upload_photo(&owner, &photo)).await {
                Ok(path) => {
                    self.media.mark_synced(photo.id).await?;
                    tracing::debug!(photo = %photo.id, %path, "uploaded photo");
                    report.uploaded += 1;
                }
                Err(e) => {
                    tracing::warn!(photo = %photo.id, error = %e, "photo upload failed");
                    report.failed += 1;
                }
            }
        }

        lock(&self.metrics).record_uploads(report.uploaded as u64, report.failed as u64);
        Ok(report)
    }

    pub async fn status(&self) -> Result<SyncStatus, SyncError> {
        let queue = self.db.queue();
        let pending = queue.len().await?;
        let parked = queue.parked().await?.len() as u64;
        let unsynced_photos = self.media.unsynced().await?.len();
        let last_push = self.db.last_push_time().await?;
        let last_pull = self.db.last_pull_time().await?;
        let last_error = lock(&self.last_error).clone();

        Ok(SyncStatus {
            is_syncing: self.is_syncing(),
            online: self.monitor.is_online(),
            signed_in: self.identity().is_some(),
            pending,
            parked,
            unsynced_photos,
            last_push,
            last_pull,
            last_error,
        })
    }

    pub fn metrics(&self) -> SyncMetrics {
        lock(&self.metrics).clone()
    }

    fn note_error(&self, error: &SyncError) {
        *lock(&self.last_error) = Some(error.to_string());
    }
}

fn retain_with_parents<E: SurveyEntity>(
    entities: Vec<E>,
    has_parents: impl Fn(&E) -> bool,
) -> (Vec<E>, usize) {
    let (kept, orphans): (Vec<E>, Vec<E>) = entities.into_iter().partition(|e| has_parents(e));
    for orphan in &orphans {
        tracing::warn!(kind = %E::KIND, id = %orphan.id(), "skipping remote row with missing parent");
    }
    (kept, orphans.len())
}
