//! # Local Entity Operations
//!
//! Typed CRUD over the entity tables. Every mutating call runs in one
//! transaction that also appends the matching pending mutation record, so the
//! queue can never diverge from the store's write history.

use crate::app::local_db::{LocalDatabase, Result, StoreError};
use crate::app::offline::queue;
use crate::shared::survey::{EntityKind, EntityParents, MutationOp, ParentRef, SurveyEntity};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

impl LocalDatabase {
    /// Insert or replace an entity
    ///
    /// Enqueues `create` when the id is new and `update` otherwise. Parents
    /// must already exist locally, which guarantees they are either synced or
    /// queued ahead of this record.
    pub async fn put<E: SurveyEntity>(&self, entity: &E) -> Result<MutationOp> {
        entity.validate()?;
        let id = entity.id();
        let mut tx = self.pool.begin().await?;

        let exists = row_exists(&mut tx, E::KIND, id).await?;
        if exists && !E::is_mutable() {
            return Err(StoreError::Immutable { kind: E::KIND, id });
        }
        ensure_parents(&mut tx, E::KIND, id, entity.parents()).await?;

        let data = serde_json::to_string(entity)?;
        write_row(&mut tx, E::KIND, id, entity.parents(), &data).await?;

        let operation = if exists { MutationOp::Update } else { MutationOp::Create };
        queue::enqueue_in(&mut tx, E::KIND, operation, id, serde_json::to_value(entity)?).await?;

        tx.commit().await?;
        tracing::debug!(kind = %E::KIND, entity = %id, %operation, "stored entity");
        Ok(operation)
    }

    /// Get a single entity by id
    pub async fn get<E: SurveyEntity>(&self, id: Uuid) -> Result<Option<E>> {
        let sql = format!("SELECT data FROM {} WHERE id = ?", E::KIND.table());
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| decode_row::<E>(&row)).transpose()
    }

    /// Get every entity of one type, in insertion order
    pub async fn get_all<E: SurveyEntity>(&self) -> Result<Vec<E>> {
        let sql = format!("SELECT data FROM {} ORDER BY rowid ASC", E::KIND.table());
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(decode_row::<E>).collect()
    }

    /// Get every entity of one type that references `parent`
    pub async fn get_all_by_parent<E: SurveyEntity>(&self, parent: ParentRef) -> Result<Vec<E>> {
        let (column, parent_id) = match (E::KIND, parent) {
            (EntityKind::Floor, ParentRef::Project(id)) => ("project_id", id),
            (EntityKind::Measurement, ParentRef::Project(id)) => ("project_id", id),
            (EntityKind::Measurement, ParentRef::Floor(id)) => ("floor_id", id),
            (kind, parent) => return Err(StoreError::UnsupportedParent { kind, parent }),
        };

        let sql = format!(
            "SELECT data FROM {} WHERE {} = ? ORDER BY rowid ASC",
            E::KIND.table(),
            column
        );
        let rows = sqlx::query(&sql)
            .bind(parent_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(decode_row::<E>).collect()
    }

    /// Delete an entity and its descendants
    ///
    /// Deleting a project removes its floors and measurements; deleting a
    /// floor removes its measurements. A single `delete` record is queued for
    /// the target; queued writes of the removed descendants are dropped since
    /// they would reference a parent that no longer exists remotely.
    /// Returns `false` when the entity was not stored locally.
    pub async fn delete<E: SurveyEntity>(&self, id: Uuid) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        if !row_exists(&mut tx, E::KIND, id).await? {
            return Ok(false);
        }

        let descendants = match E::KIND {
            EntityKind::Project => {
                let mut ids = child_ids(&mut tx, "floors", "project_id", id).await?;
                ids.extend(child_ids(&mut tx, "measurements", "project_id", id).await?);
                sqlx::query("DELETE FROM floors WHERE project_id = ?")
                    .bind(id.to_string())
                    .execute(&mut *tx)
                    .await?;
                sqlx::query("DELETE FROM measurements WHERE project_id = ?")
                    .bind(id.to_string())
                    .execute(&mut *tx)
                    .await?;
                ids
            }
            EntityKind::Floor => {
                let ids = child_ids(&mut tx, "measurements", "floor_id", id).await?;
                sqlx::query("DELETE FROM measurements WHERE floor_id = ?")
                    .bind(id.to_string())
                    .execute(&mut *tx)
                    .await?;
                ids
            }
            EntityKind::Measurement | EntityKind::SpeedTest => Vec::new(),
        };

        let sql = format!("DELETE FROM {} WHERE id = ?", E::KIND.table());
        sqlx::query(&sql).bind(id.to_string()).execute(&mut *tx).await?;

        for child in &descendants {
            queue::remove_for_entity_in(&mut tx, child).await?;
        }

        queue::enqueue_in(
            &mut tx,
            E::KIND,
            MutationOp::Delete,
            id,
            serde_json::json!({ "id": id }),
        )
        .await?;

        tx.commit().await?;
        tracing::debug!(
            kind = %E::KIND,
            entity = %id,
            cascaded = descendants.len(),
            "deleted entity"
        );
        Ok(true)
    }
}

pub(crate) fn decode_row<E: SurveyEntity>(row: &SqliteRow) -> Result<E> {
    let data: String = row.try_get("data")?;
    serde_json::from_str(&data).map_err(|e| StoreError::Corrupt {
        table: E::KIND.table(),
        message: e.to_string(),
    })
}

async fn row_exists(conn: &mut SqliteConnection, kind: EntityKind, id: Uuid) -> Result<bool> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ?", kind.table());
    let row = sqlx::query(&sql)
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.is_some())
}

async fn child_ids(
    conn: &mut SqliteConnection,
    table: &'static str,
    column: &'static str,
    parent: Uuid,
) -> Result<Vec<String>> {
    let sql = format!("SELECT id FROM {} WHERE {} = ?", table, column);
    let rows = sqlx::query(&sql)
        .bind(parent.to_string())
        .fetch_all(&mut *conn)
        .await?;
    rows.iter()
        .map(|row| row.try_get::<String, _>("id").map_err(StoreError::from))
        .collect()
}

async fn ensure_parents(
    conn: &mut SqliteConnection,
    kind: EntityKind,
    id: Uuid,
    parents: EntityParents,
) -> Result<()> {
    if let Some(project_id) = parents.project_id {
        if !row_exists(conn, EntityKind::Project, project_id).await? {
            return Err(StoreError::MissingParent {
                kind,
                id,
                parent_kind: EntityKind::Project,
                parent_id: project_id,
            });
        }
    }

    if let Some(floor_id) = parents.floor_id {
        let row = sqlx::query("SELECT project_id FROM floors WHERE id = ?")
            .bind(floor_id.to_string())
            .fetch_optional(&mut *conn)
            .await?;
        let Some(row) = row else {
            return Err(StoreError::MissingParent {
                kind,
                id,
                parent_kind: EntityKind::Floor,
                parent_id: floor_id,
            });
        };
        let floor_project: String = row.try_get("project_id")?;
        if parents.project_id.map(|p| p.to_string()) != Some(floor_project) {
            return Err(StoreError::ParentMismatch { kind, id, floor_id });
        }
    }

    Ok(())
}

/// Upsert one row; the column list depends on which foreign keys the kind has
pub(crate) async fn write_row(
    conn: &mut SqliteConnection,
    kind: EntityKind,
    id: Uuid,
    parents: EntityParents,
    data: &str,
) -> Result<()> {
    let stored_at = chrono::Utc::now().to_rfc3339();
    let project_id = parents.project_id.map(|p| p.to_string());
    let floor_id = parents.floor_id.map(|f| f.to_string());

    match kind {
        EntityKind::Project | EntityKind::SpeedTest => {
            let sql = format!(
                "INSERT INTO {} (id, data, stored_at) VALUES (?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET data = excluded.data, stored_at = excluded.stored_at",
                kind.table()
            );
            sqlx::query(&sql)
                .bind(id.to_string())
                .bind(data)
                .bind(&stored_at)
                .execute(&mut *conn)
                .await?;
        }
        EntityKind::Floor => {
            sqlx::query(
                "INSERT INTO floors (id, project_id, data, stored_at) VALUES (?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET project_id = excluded.project_id,
                    data = excluded.data, stored_at = excluded.stored_at",
            )
            .bind(id.to_string())
            .bind(&project_id)
            .bind(data)
            .bind(&stored_at)
            .execute(&mut *conn)
            .await?;
        }
        EntityKind::Measurement => {
            sqlx::query(
                "INSERT INTO measurements (id, project_id, floor_id, data, stored_at)
                 VALUES (?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET project_id = excluded.project_id,
                    floor_id = excluded.floor_id, data = excluded.data,
                    stored_at = excluded.stored_at",
            )
            .bind(id.to_string())
            .bind(&project_id)
            .bind(&floor_id)
            .bind(data)
            .bind(&stored_at)
            .execute(&mut *conn)
            .await?;
        }
    }

    Ok(())
}
