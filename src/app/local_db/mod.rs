//! # Local Database Module
//!
//! Durable on-device storage for survey data. The local database is the only
//! data source the UI reads from; network sync happens behind it.
//!
//! ## Architecture
//!
//! - **Entity tables**: one table per entity type keyed by id, with indexed
//!   foreign key columns (`project_id`, `floor_id`)
//! - **Pending mutations**: every successful local write appends a queue
//!   record in the same transaction (see [`crate::app::offline::queue`])
//! - **Photos**: a capped table owned by [`crate::app::media::MediaStore`]
//! - **Sync metadata**: key/value bookkeeping (last push/pull, session user)
//!
//! ## Key Components
//!
//! - `LocalDatabase`: connection pool, schema and lifecycle
//! - `schema.rs`: schema version and tenant table list
//! - `entities.rs`: typed `put`/`get`/`get_all`/`get_all_by_parent`/`delete`
//! - `sync.rs`: pull-side replacement, tenant purge and sync metadata
//!
//! ## Usage
//!
//! ```rust,no_run
//! use surveysync::app::local_db::LocalDatabase;
//! use surveysync::shared::survey::Project;
//!
//! # async fn example() -> Result<(), surveysync::app::local_db::StoreError> {
//! let db = LocalDatabase::open("/tmp/survey.db").await?;
//! let project = Project::new("Warehouse 7");
//! db.put(&project).await?;
//! let projects = db.get_all::<Project>().await?;
//! # Ok(())
//! # }
//! ```

pub mod schema;
pub mod entities;
pub mod sync;

pub use sync::CollectionSnapshot;

use crate::shared::error::SharedError;
use crate::shared::survey::{EntityKind, ParentRef};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Result type for local database operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Local storage failures. These are always surfaced to the caller of the
/// mutation that hit them.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Validation(#[from] SharedError),

    #[error("{kind} {id} references missing {parent_kind} {parent_id}")]
    MissingParent {
        kind: EntityKind,
        id: Uuid,
        parent_kind: EntityKind,
        parent_id: Uuid,
    },

    #[error("{kind} {id} references floor {floor_id} of a different project")]
    ParentMismatch {
        kind: EntityKind,
        id: Uuid,
        floor_id: Uuid,
    },

    #[error("{kind} {id} cannot be modified after creation")]
    Immutable { kind: EntityKind, id: Uuid },

    #[error("{kind} cannot be listed by {parent:?}")]
    UnsupportedParent { kind: EntityKind, parent: ParentRef },

    #[error("corrupt row in {table}: {message}")]
    Corrupt { table: &'static str, message: String },
}

/// Local database connection manager
///
/// Cheap to clone; clones share the same pool. The pool holds a single
/// connection, so every public call runs serialized in its own transaction.
#[derive(Debug, Clone)]
pub struct LocalDatabase {
    pub(crate) pool: SqlitePool,
}

impl LocalDatabase {
    /// Open or create the database file at `path`
    ///
    /// Creates parent directories when missing and applies the schema.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        tracing::info!(path = %path.display(), "opening local database");
        Self::connect(options).await
    }

    /// Open a private in-memory database (tests, demos)
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        Self::connect(options).await
    }

    async fn connect(options: SqliteConnectOptions) -> Result<Self> {
        // One long-lived connection: keeps in-memory databases alive and
        // serializes writers the way the single-threaded app expects.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        sqlx::query("PRAGMA temp_store=MEMORY").execute(&pool).await?;

        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    /// Platform-specific default location of the database file
    pub fn default_path() -> PathBuf {
        let mut path = dirs::data_dir().unwrap_or_else(std::env::temp_dir);
        path.push("surveysync");
        path.push("local.db");
        path
    }

    /// Create all tables and run pending migrations
    async fn init_schema(&self) -> Result<()> {
        sqlx::raw_sql(schema::SCHEMA_SQL).execute(&self.pool).await?;
        self.run_migrations().await?;
        Ok(())
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        let current_version: (i32,) =
            sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
                .fetch_one(&self.pool)
                .await?;
        if !schema::needs_migration(current_version.0) {
            return Ok(());
        }

        for version in schema::get_pending_migrations(current_version.0) {
            sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?, ?)")
                .bind(version)
                .bind(chrono::Utc::now().to_rfc3339())
                .execute(&self.pool)
                .await?;
            tracing::debug!(version, "applied schema migration");
        }

        Ok(())
    }

    /// Get connection pool reference
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the pool; further calls fail with `PoolClosed`
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Row counts for diagnostics
    pub async fn get_stats(&self) -> Result<DatabaseStats> {
        let count = |table: &'static str| {
            let pool = self.pool.clone();
            async move {
                let row: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", table))
                    .fetch_one(&pool)
                    .await?;
                Ok::<u64, StoreError>(row.0 as u64)
            }
        };

        let parked: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM pending_mutations WHERE parked = 1")
                .fetch_one(&self.pool)
                .await?;

        Ok(DatabaseStats {
            project_count: count("projects").await?,
            floor_count: count("floors").await?,
            measurement_count: count("measurements").await?,
            speed_test_count: count("speed_tests").await?,
            photo_count: count("photos").await?,
            pending_mutations: count("pending_mutations").await?,
            parked_mutations: parked.0 as u64,
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatabaseStats {
    pub project_count: u64,
    pub floor_count: u64,
    pub measurement_count: u64,
    pub speed_test_count: u64,
    pub photo_count: u64,
    /// Queue records still waiting for a confirmed remote apply
    pub pending_mutations: u64,
    /// Queue records that exhausted their retries
    pub parked_mutations: u64,
}
