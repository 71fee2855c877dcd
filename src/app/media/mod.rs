//! # Bounded Media Store
//!
//! Install photos kept on the device, capped at a fixed count. When the cap is
//! reached, saving a new photo evicts the single oldest one (by `created_at`)
//! in the same transaction as the insert, so the store never exceeds its
//! capacity even transiently.
//!
//! Photos are uploaded to the blob store by the sync engine; the `is_synced`
//! flag is surfaced so the UI can tell which photos would be lost to eviction.

pub mod fifo;

pub use fifo::FifoIndex;

use crate::app::local_db::{LocalDatabase, Result, StoreError};
use crate::shared::config::DEFAULT_MEDIA_CAPACITY;
use crate::shared::survey::{Photo, PhotoSummary};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

const PHOTO_COLUMNS: &str = "id, project_id, project_name, label, azimuth, latitude, longitude, \
                             image, thumbnail, notes, created_at, is_synced";
const SUMMARY_COLUMNS: &str = "id, project_id, label, azimuth, thumbnail, created_at, is_synced";

/// Capped photo store backed by the `photos` table
#[derive(Debug, Clone)]
pub struct MediaStore {
    pool: SqlitePool,
    capacity: usize,
    index: Arc<Mutex<FifoIndex>>,
}

impl MediaStore {
    /// Attach to the photo table of `db` and load the eviction index
    pub async fn open(db: &LocalDatabase, capacity: usize) -> Result<Self> {
        let capacity = if capacity == 0 { DEFAULT_MEDIA_CAPACITY } else { capacity };
        let rows = sqlx::query("SELECT id, created_at FROM photos ORDER BY created_at ASC, rowid ASC")
            .fetch_all(db.pool())
            .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: String = row.try_get("id")?;
            entries.push((row.try_get::<i64, _>("created_at")?, parse_id(&id)?));
        }

        let mut index = FifoIndex::from_entries(entries);
        let trimmed = trim_to_capacity(db.pool(), &mut index, capacity).await?;

        let store = Self {
            pool: db.pool().clone(),
            capacity,
            index: Arc::new(Mutex::new(index)),
        };
        tracing::debug!(photos = rows.len() - trimmed, capacity, "opened media store");
        Ok(store)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Store a photo, evicting the oldest one when the store is full
    ///
    /// Saving an id that is already stored replaces it without eviction.
    /// Returns the id of the evicted photo, if any.
    pub async fn save(&self, photo: &Photo) -> Result<Option<Uuid>> {
        photo.validate()?;
        let created_at = photo.created_at.timestamp_millis();

        let mut index = self.index.lock().await;
        let replacing = index.contains(photo.id);
        let mut tx = self.pool.begin().await?;

        let evict = match index.oldest() {
            Some(oldest) if !replacing && index.len() >= self.capacity => Some(oldest),
            _ => None,
        };

        if let Some(oldest) = evict {
            let row = sqlx::query("SELECT is_synced FROM photos WHERE id = ?")
                .bind(oldest.to_string())
                .fetch_optional(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM photos WHERE id = ?")
                .bind(oldest.to_string())
                .execute(&mut *tx)
                .await?;

            let synced = match row {
                Some(row) => row.try_get::<bool, _>("is_synced")?,
                None => true,
            };
            if synced {
                tracing::info!(photo = %oldest, "evicted oldest photo");
            } else {
                tracing::warn!(photo = %oldest, "evicted oldest photo before it was uploaded");
            }
        }

        sqlx::query(&format!(
            "INSERT OR REPLACE INTO photos ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            PHOTO_COLUMNS
        ))
        .bind(photo.id.to_string())
        .bind(photo.project_id.to_string())
        .bind(&photo.project_name)
        .bind(&photo.label)
        .bind(photo.azimuth)
        .bind(photo.latitude)
        .bind(photo.longitude)
        .bind(&photo.image)
        .bind(&photo.thumbnail)
        .bind(&photo.notes)
        .bind(created_at)
        .bind(photo.is_synced)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        if let Some(oldest) = evict {
            index.remove(oldest);
        }
        if replacing {
            index.remove(photo.id);
        }
        index.insert(created_at, photo.id);
        Ok(evict)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Photo>> {
        let row = sqlx::query(&format!("SELECT {} FROM photos WHERE id = ?", PHOTO_COLUMNS))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(decode_photo).transpose()
    }

    /// Photos of one project, newest first
    pub async fn list_by_project(&self, project_id: Uuid) -> Result<Vec<Photo>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM photos WHERE project_id = ? ORDER BY created_at DESC, rowid DESC",
            PHOTO_COLUMNS
        ))
        .bind(project_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(decode_photo).collect()
    }

    /// Metadata of every stored photo, newest first, without image bytes
    pub async fn summaries(&self) -> Result<Vec<PhotoSummary>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM photos ORDER BY created_at DESC, rowid DESC",
            SUMMARY_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(decode_summary).collect()
    }

    /// Photos not yet uploaded, oldest first
    pub async fn unsynced(&self) -> Result<Vec<Photo>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM photos WHERE is_synced = 0 ORDER BY created_at ASC, rowid ASC",
            PHOTO_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(decode_photo).collect()
    }

    pub async fn mark_synced(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("UPDATE photos SET is_synced = 1 WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let mut index = self.index.lock().await;
        let result = sqlx::query("DELETE FROM photos WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        index.remove(id);
        Ok(result.rows_affected() > 0)
    }

    /// Remove every photo (tenant purge)
    pub async fn clear(&self) -> Result<()> {
        let mut index = self.index.lock().await;
        sqlx::query("DELETE FROM photos").execute(&self.pool).await?;
        index.clear();
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.index.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.index.lock().await.is_empty()
    }
}

/// Drop the oldest photos until `index` fits in `capacity`; returns how many went.
/// A lowered capacity takes effect here, before the first save.
async fn trim_to_capacity(pool: &SqlitePool, index: &mut FifoIndex, capacity: usize) -> Result<usize> {
    if index.len() <= capacity {
        return Ok(0);
    }

    let excess: Vec<Uuid> = index.iter().take(index.len() - capacity).collect();
    let mut tx = pool.begin().await?;
    for id in &excess {
        sqlx::query("DELETE FROM photos WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    for _ in &excess {
        index.pop_oldest();
    }
    tracing::warn!(evicted = excess.len(), capacity, "trimmed media store to capacity");
    Ok(excess.len())
}

fn parse_id(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| StoreError::Corrupt {
        table: "photos",
        message: format!("bad id {}: {}", value, e),
    })
}

fn parse_millis(value: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(value).ok_or_else(|| StoreError::Corrupt {
        table: "photos",
        message: format!("bad created_at {}", value),
    })
}

fn decode_photo(row: &SqliteRow) -> Result<Photo> {
    let id: String = row.try_get("id")?;
    let project_id: String = row.try_get("project_id")?;
    Ok(Photo {
        id: parse_id(&id)?,
        project_id: parse_id(&project_id)?,
        project_name: row.try_get("project_name")?,
        label: row.try_get("label")?,
        azimuth: row.try_get("azimuth")?,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
        image: row.try_get("image")?,
        thumbnail: row.try_get("thumbnail")?,
        notes: row.try_get("notes")?,
        created_at: parse_millis(row.try_get("created_at")?)?,
        is_synced: row.try_get("is_synced")?,
    })
}

fn decode_summary(row: &SqliteRow) -> Result<PhotoSummary> {
    let id: String = row.try_get("id")?;
    let project_id: String = row.try_get("project_id")?;
    Ok(PhotoSummary {
        id: parse_id(&id)?,
        project_id: parse_id(&project_id)?,
        label: row.try_get("label")?,
        azimuth: row.try_get("azimuth")?,
        thumbnail: row.try_get("thumbnail")?,
        created_at: parse_millis(row.try_get("created_at")?)?,
        is_synced: row.try_get("is_synced")?,
    })
}
