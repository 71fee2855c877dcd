//! # Sync Metadata Operations
//!
//! Storage-side support for the sync engine and the session guard:
//!
//! - **Pull replacement**: swap the entity collections for the remote copy
//! - **Tenant purge**: remove every row that belongs to the signed-in user
//! - **Sync metadata**: last push/pull timestamps and the admitted identity

use crate::app::local_db::entities::write_row;
use crate::app::local_db::{schema, LocalDatabase, Result};
use crate::shared::survey::{Floor, Measurement, Project, SpeedTest, SurveyEntity};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection};

const LAST_PUSH_KEY: &str = "last_push_at";
const LAST_PULL_KEY: &str = "last_pull_at";
const SESSION_USER_KEY: &str = "session_user_id";

/// Full copy of the synchronized collections, as fetched by a pull
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionSnapshot {
    pub projects: Vec<Project>,
    pub floors: Vec<Floor>,
    pub measurements: Vec<Measurement>,
    pub speed_tests: Vec<SpeedTest>,
}

impl CollectionSnapshot {
    pub fn total(&self) -> usize {
        self.projects.len() + self.floors.len() + self.measurements.len() + self.speed_tests.len()
    }
}

impl LocalDatabase {
    /// Replace all four collections with `snapshot` in one transaction
    ///
    /// Used only by the pull path: nothing is enqueued, and the pending
    /// mutation queue is left as is so unpushed intent survives the pull.
    pub async fn replace_collections(&self, snapshot: &CollectionSnapshot) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for table in ["measurements", "floors", "projects", "speed_tests"] {
            sqlx::query(&format!("DELETE FROM {}", table))
                .execute(&mut *tx)
                .await?;
        }

        insert_all(&mut tx, &snapshot.projects).await?;
        insert_all(&mut tx, &snapshot.floors).await?;
        insert_all(&mut tx, &snapshot.measurements).await?;
        insert_all(&mut tx, &snapshot.speed_tests).await?;

        tx.commit().await?;
        tracing::debug!(rows = snapshot.total(), "replaced local collections");
        Ok(())
    }

    /// Delete every tenant row (entities, queue, sync metadata) atomically
    pub async fn purge_all(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for table in schema::TENANT_TABLES {
            sqlx::query(&format!("DELETE FROM {}", table))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Set sync metadata
    pub async fn set_sync_metadata(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO sync_metadata (key, value, updated_at)
             VALUES (?, ?, ?)",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get sync metadata
    pub async fn get_sync_metadata(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM sync_metadata WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(row.try_get("value")?)),
            None => Ok(None),
        }
    }

    pub async fn last_push_time(&self) -> Result<Option<DateTime<Utc>>> {
        self.timestamp_metadata(LAST_PUSH_KEY).await
    }

    pub async fn set_last_push_time(&self, at: DateTime<Utc>) -> Result<()> {
        self.set_sync_metadata(LAST_PUSH_KEY, &at.to_rfc3339()).await
    }

    pub async fn last_pull_time(&self) -> Result<Option<DateTime<Utc>>> {
        self.timestamp_metadata(LAST_PULL_KEY).await
    }

    pub async fn set_last_pull_time(&self, at: DateTime<Utc>) -> Result<()> {
        self.set_sync_metadata(LAST_PULL_KEY, &at.to_rfc3339()).await
    }

    /// Identity whose data the store currently holds
    pub async fn session_user(&self) -> Result<Option<String>> {
        self.get_sync_metadata(SESSION_USER_KEY).await
    }

    pub async fn set_session_user(&self, user_id: &str) -> Result<()> {
        self.set_sync_metadata(SESSION_USER_KEY, user_id).await
    }

    async fn timestamp_metadata(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        let value = self.get_sync_metadata(key).await?;
        // An unparsable value is treated as "never", it only feeds status display.
        Ok(value
            .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
            .map(|v| v.with_timezone(&Utc)))
    }
}

async fn insert_all<E: SurveyEntity>(conn: &mut SqliteConnection, entities: &[E]) -> Result<()> {
    for entity in entities {
        let data = serde_json::to_string(entity)?;
        write_row(conn, E::KIND, entity.id(), entity.parents(), &data).await?;
    }
    Ok(())
}
