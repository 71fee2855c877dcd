//! # Pending Mutation Queue
//!
//! Durable, ordered record of local writes that the remote authority has not
//! yet confirmed. Records live in the `pending_mutations` table next to the
//! entity tables so a write and its record commit together.
//!
//! ## Ordering
//!
//! [`sort_for_sync`] orders records by [`EntityKind::sync_priority`] and, within
//! one priority, by enqueue order. Parents are therefore always pushed before
//! the rows referencing them, no matter when each was written.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use surveysync::app::local_db::LocalDatabase;
//!
//! # async fn example(db: LocalDatabase) -> Result<(), surveysync::app::local_db::StoreError> {
//! let queue = db.queue();
//! for record in queue.drain().await? {
//!     // push record.payload ...
//!     queue.remove(&record.id).await?;
//! }
//! # Ok(())
//! # }
//! ```

use crate::app::local_db::{LocalDatabase, Result, StoreError};
use crate::app::offline::retry::{RetryDecision, RetryPolicy};
use crate::shared::survey::{EntityKind, EntityParents, MutationOp};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

/// One local write awaiting confirmation by the remote authority
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingMutationRecord {
    /// `{type}_{operation}_{entityId}_{timestampMs}`
    pub id: String,
    /// Enqueue order
    pub seq: i64,
    pub entity_type: EntityKind,
    pub entity_id: Uuid,
    pub operation: MutationOp,
    /// Entity snapshot at write time (`{"id": ..}` for deletes)
    pub payload: serde_json::Value,
    pub enqueued_at: DateTime<Utc>,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub parked: bool,
}

impl PendingMutationRecord {
    /// Foreign keys carried by the payload
    pub fn parents(&self) -> EntityParents {
        let field = |name: &str| {
            self.payload
                .get(name)
                .and_then(|v| v.as_str())
                .and_then(|v| Uuid::parse_str(v).ok())
        };
        EntityParents {
            project_id: field("project_id"),
            floor_id: field("floor_id"),
        }
    }

    /// Whether the backoff window has elapsed
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_attempt_at.map_or(true, |at| at <= now)
    }
}

/// Build a record id from its parts
pub fn record_id(kind: EntityKind, operation: MutationOp, entity_id: Uuid, at: DateTime<Utc>) -> String {
    format!("{}_{}_{}_{}", kind.as_str(), operation.as_str(), entity_id, at.timestamp_millis())
}

/// Sort records into push order: ascending priority, then enqueue order
pub fn sort_for_sync(records: &mut [PendingMutationRecord]) {
    records.sort_by_key(|r| (r.entity_type.sync_priority(), r.seq));
}

/// Handle to the queue table
#[derive(Debug, Clone)]
pub struct PendingMutationQueue {
    pool: SqlitePool,
}

impl LocalDatabase {
    pub fn queue(&self) -> PendingMutationQueue {
        PendingMutationQueue {
            pool: self.pool.clone(),
        }
    }
}

impl PendingMutationQueue {
    /// Append a record outside of an entity write
    pub async fn enqueue(
        &self,
        kind: EntityKind,
        operation: MutationOp,
        entity_id: Uuid,
        payload: serde_json::Value,
    ) -> Result<String> {
        let mut tx = self.pool.begin().await?;
        let id = enqueue_in(&mut tx, kind, operation, entity_id, payload).await?;
        tx.commit().await?;
        Ok(id)
    }

    /// Every record, parked ones included, in push order
    pub async fn drain(&self) -> Result<Vec<PendingMutationRecord>> {
        let rows = sqlx::query(
            "SELECT seq, id, entity_type, entity_id, operation, payload, enqueued_at,
                    attempts, last_error, next_attempt_at, parked
             FROM pending_mutations
             ORDER BY seq ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut records = rows.iter().map(decode_record).collect::<Result<Vec<_>>>()?;
        sort_for_sync(&mut records);
        Ok(records)
    }

    /// Remove a record after the remote apply was confirmed
    pub async fn remove(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM pending_mutations WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Count a failed attempt and schedule the next one (or park the record)
    pub async fn record_failure(
        &self,
        id: &str,
        error: &str,
        policy: &RetryPolicy,
    ) -> Result<RetryDecision> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT attempts FROM pending_mutations WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Err(StoreError::Corrupt {
                table: "pending_mutations",
                message: format!("no record with id {}", id),
            });
        };
        let attempts = row.try_get::<i64, _>("attempts")? as u32 + 1;

        let decision = policy.decide(attempts, Utc::now());
        let (next_attempt_at, parked) = match decision {
            RetryDecision::RetryAt(at) => (Some(at.to_rfc3339()), false),
            RetryDecision::Park => (None, true),
        };

        sqlx::query(
            "UPDATE pending_mutations
             SET attempts = ?, last_error = ?, next_attempt_at = ?, parked = ?
             WHERE id = ?",
        )
        .bind(attempts as i64)
        .bind(error)
        .bind(next_attempt_at)
        .bind(parked)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(decision)
    }

    /// Park a record straight away, for failures a retry cannot fix
    pub async fn park(&self, id: &str, error: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE pending_mutations
             SET attempts = attempts + 1, last_error = ?, next_attempt_at = NULL, parked = 1
             WHERE id = ?",
        )
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Records that exhausted their retries
    pub async fn parked(&self) -> Result<Vec<PendingMutationRecord>> {
        Ok(self.drain().await?.into_iter().filter(|r| r.parked).collect())
    }

    /// Give every parked record a fresh set of attempts
    pub async fn requeue_parked(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE pending_mutations
             SET parked = 0, attempts = 0, next_attempt_at = NULL
             WHERE parked = 1",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn len(&self) -> Result<u64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pending_mutations")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0 as u64)
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

/// Append a record on an open connection, typically inside the transaction
/// of the entity write it describes
///
/// A second write of the same entity within the same millisecond reuses the
/// record id. The older record is dropped and the new one appended with a
/// fresh `seq`, so it still sorts after anything enqueued in between.
pub(crate) async fn enqueue_in(
    conn: &mut SqliteConnection,
    kind: EntityKind,
    operation: MutationOp,
    entity_id: Uuid,
    payload: serde_json::Value,
) -> Result<String> {
    enqueue_at(conn, kind, operation, entity_id, payload, Utc::now()).await
}

async fn enqueue_at(
    conn: &mut SqliteConnection,
    kind: EntityKind,
    operation: MutationOp,
    entity_id: Uuid,
    payload: serde_json::Value,
    at: DateTime<Utc>,
) -> Result<String> {
    let id = record_id(kind, operation, entity_id, at);

    let replaced = sqlx::query("DELETE FROM pending_mutations WHERE id = ?")
        .bind(&id)
        .execute(&mut *conn)
        .await?;
    if replaced.rows_affected() > 0 {
        tracing::trace!(record = %id, "superseded pending mutation");
    }

    sqlx::query(
        "INSERT INTO pending_mutations (id, entity_type, entity_id, operation, payload, enqueued_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(kind.as_str())
    .bind(entity_id.to_string())
    .bind(operation.as_str())
    .bind(serde_json::to_string(&payload)?)
    .bind(at.to_rfc3339())
    .execute(&mut *conn)
    .await?;

    tracing::trace!(record = %id, "enqueued pending mutation");
    Ok(id)
}

/// Drop every record of one entity (used when a cascade removes it locally)
pub(crate) async fn remove_for_entity_in(conn: &mut SqliteConnection, entity_id: &str) -> Result<u64> {
    let result = sqlx::query("DELETE FROM pending_mutations WHERE entity_id = ?")
        .bind(entity_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

fn decode_record(row: &SqliteRow) -> Result<PendingMutationRecord> {
    let corrupt = |message: String| StoreError::Corrupt {
        table: "pending_mutations",
        message,
    };
    let parse_time = |value: &str| {
        DateTime::parse_from_rfc3339(value)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| corrupt(format!("bad timestamp {}: {}", value, e)))
    };

    let entity_type: String = row.try_get("entity_type")?;
    let operation: String = row.try_get("operation")?;
    let entity_id: String = row.try_get("entity_id")?;
    let payload: String = row.try_get("payload")?;
    let enqueued_at: String = row.try_get("enqueued_at")?;
    let next_attempt_at: Option<String> = row.try_get("next_attempt_at")?;

    Ok(PendingMutationRecord {
        id: row.try_get("id")?,
        seq: row.try_get("seq")?,
        entity_type: EntityKind::parse(&entity_type)
            .ok_or_else(|| corrupt(format!("unknown entity type {}", entity_type)))?,
        entity_id: Uuid::parse_str(&entity_id).map_err(|e| corrupt(e.to_string()))?,
        operation: MutationOp::parse(&operation)
            .ok_or_else(|| corrupt(format!("unknown operation {}", operation)))?,
        payload: serde_json::from_str(&payload)?,
        enqueued_at: parse_time(&enqueued_at)?,
        attempts: row.try_get::<i64, _>("attempts")? as u32,
        last_error: row.try_get("last_error")?,
        next_attempt_at: next_attempt_at.as_deref().map(parse_time).transpose()?,
        parked: row.try_get("parked")?,
    })
}
