//! # Application State
//!
//! The surface the UI layer talks to. It owns every subsystem, keeps a
//! synchronous [`Snapshot`] of local data for rendering, and exposes the
//! mutation and lifecycle hooks:
//!
//! - mutations write to the local store, refresh the snapshot, then kick an
//!   opportunistic background push when online; they never wait on the network
//! - [`AppState::set_online`] / [`AppState::on_connectivity_change`] forward to
//!   the connectivity monitor
//! - [`AppState::on_identity_change`] runs the session guard and, on sign-in
//!   while online, pushes, pulls and refreshes the snapshot
//!
//! There is no global instance; construct one with [`AppState::init`] and
//! share it by reference or `Arc`.

use crate::app::config::Config;
use crate::app::local_db::{LocalDatabase, StoreError};
use crate::app::media::MediaStore;
use crate::app::session::{SessionError, SessionGuard};
use crate::app::sync::{
    spawn_sync_worker, BlobStore, ConnectivityMonitor, PullReport, RemoteError, RemoteStore,
    Subscription, SyncEngine, SyncError, SyncOptions, SyncOutcome, SyncStatus, SyncWorker,
};
use crate::shared::config::ConfigError;
use crate::shared::survey::{
    EntityKind, Floor, Measurement, Photo, PhotoSummary, Project, SpeedTest, SurveyEntity,
};
use chrono::Utc;
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: Uuid },
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Everything the UI renders, read without awaiting
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub user_id: Option<String>,
    pub projects: Vec<Project>,
    pub floors: Vec<Floor>,
    pub measurements: Vec<Measurement>,
    pub speed_tests: Vec<SpeedTest>,
    /// Newest first, without image bytes
    pub photos: Vec<PhotoSummary>,
}

pub struct AppState {
    config: Config,
    db: LocalDatabase,
    media: MediaStore,
    monitor: ConnectivityMonitor,
    engine: Arc<SyncEngine>,
    session: SessionGuard,
    snapshot: RwLock<Snapshot>,
    /// Serializes identity changes
    identity: tokio::sync::Mutex<Option<String>>,
    worker: Mutex<Option<SyncWorker>>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("monitor", &self.monitor)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Open the configured database and start the subsystem
    pub async fn init(
        config: Config,
        remote: Arc<dyn RemoteStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> Result<Self> {
        let db = LocalDatabase::open(config.database_path()).await?;
        Self::with_database(config, db, remote, blobs).await
    }

    /// Start the subsystem on an already opened database
    ///
    /// Connectivity starts offline until the platform reports otherwise.
    pub async fn with_database(
        config: Config,
        db: LocalDatabase,
        remote: Arc<dyn RemoteStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> Result<Self> {
        let media = MediaStore::open(&db, config.app().media_capacity).await?;
        let monitor = ConnectivityMonitor::new(false);
        let engine = Arc::new(SyncEngine::new(
            db.clone(),
            media.clone(),
            remote,
            blobs,
            monitor.clone(),
            SyncOptions::from_config(config.app()),
        ));
        let session = SessionGuard::new(db.clone(), media.clone());

        let user = session.current_identity().await?;
        engine.set_identity(user.clone());

        let worker = config
            .app()
            .auto_sync
            .then(|| spawn_sync_worker(engine.clone(), config.app().sync_interval()));

        let state = Self {
            config,
            db,
            media,
            monitor,
            engine,
            session,
            snapshot: RwLock::new(Snapshot::default()),
            identity: tokio::sync::Mutex::new(user),
            worker: Mutex::new(worker),
        };
        state.refresh_snapshot().await?;
        tracing::info!(user = ?state.current_user(), "app state initialized");
        Ok(state)
    }

    /// Stop the background worker and close the database
    pub async fn teardown(self) {
        let worker = match self.worker.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(worker) = worker {
            worker.stop().await;
        }
        self.db.close().await;
        tracing::info!("app state torn down");
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database(&self) -> &LocalDatabase {
        &self.db
    }

    pub fn media(&self) -> &MediaStore {
        &self.media
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    pub fn snapshot(&self) -> Snapshot {
        self.read_snapshot(Snapshot::clone)
    }

    pub fn projects(&self) -> Vec<Project> {
        self.read_snapshot(|s| s.projects.clone())
    }

    pub fn floors(&self) -> Vec<Floor> {
        self.read_snapshot(|s| s.floors.clone())
    }

    pub fn measurements(&self) -> Vec<Measurement> {
        self.read_snapshot(|s| s.measurements.clone())
    }

    pub fn speed_tests(&self) -> Vec<SpeedTest> {
        self.read_snapshot(|s| s.speed_tests.clone())
    }

    pub fn photos(&self) -> Vec<PhotoSummary> {
        self.read_snapshot(|s| s.photos.clone())
    }

    pub fn current_user(&self) -> Option<String> {
        self.read_snapshot(|s| s.user_id.clone())
    }

    pub async fn sync_status(&self) -> Result<SyncStatus> {
        Ok(self.engine.status().await?)
    }

    // Projects

    pub async fn add_project(&self, project: Project) -> Result<Project> {
        self.write(&project).await?;
        Ok(project)
    }

    pub async fn update_project(&self, id: Uuid, edit: impl FnOnce(&mut Project)) -> Result<Project> {
        let mut project = self.load::<Project>(id).await?;
        edit(&mut project);
        project.id = id;
        project.updated_at = Utc::now();
        self.write(&project).await?;
        Ok(project)
    }

    pub async fn delete_project(&self, id: Uuid) -> Result<bool> {
        self.remove::<Project>(id).await
    }

    // Floors

    pub async fn add_floor(&self, floor: Floor) -> Result<Floor> {
        self.write(&floor).await?;
        Ok(floor)
    }

    pub async fn update_floor(&self, id: Uuid, edit: impl FnOnce(&mut Floor)) -> Result<Floor> {
        let mut floor = self.load::<Floor>(id).await?;
        edit(&mut floor);
        floor.id = id;
        floor.updated_at = Utc::now();
        self.write(&floor).await?;
        Ok(floor)
    }

    pub async fn delete_floor(&self, id: Uuid) -> Result<bool> {
        self.remove::<Floor>(id).await
    }

    // Measurements and speed tests are write-once

    pub async fn add_measurement(&self, measurement: Measurement) -> Result<Measurement> {
        self.write(&measurement).await?;
        Ok(measurement)
    }

    pub async fn delete_measurement(&self, id: Uuid) -> Result<bool> {
        self.remove::<Measurement>(id).await
    }

    pub async fn add_speed_test(&self, speed_test: SpeedTest) -> Result<SpeedTest> {
        self.write(&speed_test).await?;
        Ok(speed_test)
    }

    pub async fn delete_speed_test(&self, id: Uuid) -> Result<bool> {
        self.remove::<SpeedTest>(id).await
    }

    // Photos

    /// Store a photo; returns the id of the photo evicted to make room
    pub async fn add_photo(&self, photo: Photo) -> Result<Option<Uuid>> {
        let evicted = self.media.save(&photo).await?;
        self.refresh_photos().await?;
        self.kick();
        Ok(evicted)
    }

    /// Remove a photo from the device; uploaded copies are left in place
    pub async fn delete_photo(&self, id: Uuid) -> Result<bool> {
        let removed = self.media.delete(id).await?;
        self.refresh_photos().await?;
        Ok(removed)
    }

    // Lifecycle hooks

    /// Feed a platform connectivity signal
    pub fn set_online(&self, online: bool) -> bool {
        self.monitor.set_online(online)
    }

    pub fn is_online(&self) -> bool {
        self.monitor.is_online()
    }

    pub fn on_connectivity_change<F>(&self, listener: F) -> Subscription
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.monitor.on_change(listener)
    }

    pub async fn sign_in(&self, user_id: &str) -> Result<Option<PullReport>> {
        self.on_identity_change(Some(user_id)).await
    }

    pub async fn sign_out(&self) -> Result<()> {
        self.on_identity_change(None).await.map(|_| ())
    }

    /// Switch the signed-in identity
    ///
    /// Local data is purged unless the same user signs in again; a failed
    /// purge aborts the change. When a user is signed in while online, queued
    /// writes are pushed before the pull replaces the local collections.
    /// Returns the pull report when a pull succeeded.
    pub async fn on_identity_change(&self, new: Option<&str>) -> Result<Option<PullReport>> {
        let mut current = self.identity.lock().await;

        self.session.on_identity_change(current.as_deref(), new).await?;
        self.session.admit(new).await?;
        *current = new.map(str::to_string);
        self.engine.set_identity(current.clone());

        let mut pulled = None;
        if new.is_some() && self.monitor.is_online() {
            match self.engine.sync_with_server().await {
                Ok(SyncOutcome::Completed(report)) if report.failed > 0 => {
                    tracing::warn!(failed = report.failed, "some writes were not pushed before pull");
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "push before pull failed"),
            }
            match self.engine.load_data_from_server().await {
                Ok(report) => pulled = Some(report),
                Err(e) => tracing::warn!(error = %e, "initial pull failed"),
            }
        }

        self.refresh_snapshot().await?;
        Ok(pulled)
    }

    /// Pull the current user's data and refresh the snapshot
    ///
    /// Holds the identity lock so a sign-in or sign-out waits for the pull
    /// to land and then purges it.
    pub async fn refresh_from_server(&self) -> Result<PullReport> {
        let _identity = self.identity.lock().await;
        let report = self.engine.load_data_from_server().await?;
        self.refresh_snapshot().await?;
        Ok(report)
    }

    /// Reload the whole snapshot from the local stores
    pub async fn refresh_snapshot(&self) -> Result<()> {
        let user_id = self.db.session_user().await?;
        let projects = self.db.get_all::<Project>().await?;
        let floors = self.db.get_all::<Floor>().await?;
        let measurements = self.db.get_all::<Measurement>().await?;
        let speed_tests = self.db.get_all::<SpeedTest>().await?;
        let photos = self.media.summaries().await?;

        self.write_snapshot(|s| {
            *s = Snapshot {
                user_id,
                projects,
                floors,
                measurements,
                speed_tests,
                photos,
            }
        });
        Ok(())
    }

    async fn refresh_photos(&self) -> Result<()> {
        let photos = self.media.summaries().await?;
        self.write_snapshot(|s| s.photos = photos);
        Ok(())
    }

    async fn load<E: SurveyEntity>(&self, id: Uuid) -> Result<E> {
        self.db
            .get::<E>(id)
            .await?
            .ok_or(AppError::NotFound { kind: E::KIND, id })
    }

    async fn write<E: SurveyEntity>(&self, entity: &E) -> Result<()> {
        self.db.put(entity).await?;
        self.refresh_snapshot().await?;
        self.kick();
        Ok(())
    }

    async fn remove<E: SurveyEntity>(&self, id: Uuid) -> Result<bool> {
        let removed = self.db.delete::<E>(id).await?;
        if removed {
            self.refresh_snapshot().await?;
            self.kick();
        }
        Ok(removed)
    }

    /// Start a background push and photo upload without waiting for it
    fn kick(&self) {
        if !self.config.app().auto_sync || !self.monitor.is_online() {
            return;
        }
        let engine = Arc::clone(&self.engine);
        tokio::spawn(async move {
            if let Err(e) = engine.sync_with_server().await {
                tracing::warn!(error = %e, "opportunistic push failed");
            }
            if let Err(e) = engine.upload_pending_photos().await {
                tracing::warn!(error = %e, "opportunistic photo upload failed");
            }
        });
    }

    fn read_snapshot<T>(&self, f: impl FnOnce(&Snapshot) -> T) -> T {
        match self.snapshot.read() {
            Ok(guard) => f(&guard),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }

    fn write_snapshot(&self, f: impl FnOnce(&mut Snapshot)) {
        match self.snapshot.write() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}
