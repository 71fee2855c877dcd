//! # Remote Authority
//!
//! The sync engine talks to the server through two narrow traits:
//!
//! - [`RemoteStore`]: row upsert/delete keyed by id, and owner-scoped selects
//! - [`BlobStore`]: photo uploads
//!
//! [`RestRemote`](super::rest::RestRemote) implements both over HTTP.
//! [`MemoryRemote`] keeps everything in process; it enforces the same
//! foreign keys and cascades as the real authority, which makes it usable as
//! a demo backend and as a test double.

use crate::app::sync::rows;
use crate::shared::survey::Photo;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Remote call failures. They are recorded on the queue record and never
/// reach the UI caller. Transient ones are retried with backoff, the rest
/// park the record at once.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RemoteError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("remote returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("remote call timed out after {0:?}")]
    Timeout(Duration),

    #[error("could not decode remote response: {0}")]
    Decode(String),

    #[error("could not build remote row: {0}")]
    InvalidRow(String),
}

impl RemoteError {
    /// Whether retrying the same call later can succeed
    ///
    /// Auth failures and conflicts count as transient: a refreshed token or a
    /// parent landing later can fix them.
    pub fn is_transient(&self) -> bool {
        match self {
            RemoteError::Transport(_) | RemoteError::Timeout(_) => true,
            RemoteError::Status { status, .. } => {
                *status >= 500 || matches!(*status, 401 | 403 | 408 | 409 | 429)
            }
            RemoteError::Decode(_) | RemoteError::InvalidRow(_) => false,
        }
    }
}

/// Row-level access to the remote tables
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Insert or merge `row` keyed by its `id` column
    async fn upsert(&self, table: &str, row: Value) -> Result<(), RemoteError>;

    /// Delete by id; deleting a missing row succeeds
    async fn delete(&self, table: &str, id: Uuid) -> Result<(), RemoteError>;

    /// Every row of `table` owned by `owner_id`
    async fn select_by_owner(&self, table: &str, owner_id: &str) -> Result<Vec<Value>, RemoteError>;
}

/// Photo uploads
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload (or overwrite) the photo; returns its storage path
    async fn upload_photo(&self, owner_id: &str, photo: &Photo) -> Result<String, RemoteError>;
}

/// A call observed by [`MemoryRemote`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Upsert { table: String, id: String },
    Delete { table: String, id: String },
    Select { table: String, owner: String },
    Upload { path: String },
}

#[derive(Debug, Default)]
struct MemoryState {
    /// Rows per table, in first-insert order
    tables: HashMap<String, Vec<Value>>,
    blobs: HashMap<String, Vec<u8>>,
    calls: Vec<RemoteCall>,
    failing_ids: Vec<String>,
    fail_selects: bool,
}

/// In-process remote authority
#[derive(Debug, Default)]
pub struct MemoryRemote {
    state: Mutex<MemoryState>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every upsert, delete or upload touching `id` fail with a 503
    pub fn fail_for(&self, id: Uuid) {
        self.with_state(|s| s.failing_ids.push(id.to_string()));
    }

    /// Undo every `fail_for`
    pub fn heal(&self) {
        self.with_state(|s| {
            s.failing_ids.clear();
            s.fail_selects = false;
        });
    }

    /// Make selects fail with a 503 (pull failure)
    pub fn fail_selects(&self) {
        self.with_state(|s| s.fail_selects = true);
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.with_state(|s| s.calls.clone())
    }

    pub fn clear_calls(&self) {
        self.with_state(|s| s.calls.clear());
    }

    /// Current rows of a table
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.with_state(|s| s.tables.get(table).cloned().unwrap_or_default())
    }

    pub fn row(&self, table: &str, id: Uuid) -> Option<Value> {
        let id = id.to_string();
        self.rows(table).into_iter().find(|r| row_id(r) == Some(id.as_str()))
    }

    /// Seed a row directly, bypassing checks (test setup)
    pub fn insert_row(&self, table: &str, row: Value) {
        self.with_state(|s| s.tables.entry(table.to_string()).or_default().push(row));
    }

    pub fn blob(&self, path: &str) -> Option<Vec<u8>> {
        self.with_state(|s| s.blobs.get(path).cloned())
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> T {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut state)
    }
}

fn row_id(row: &Value) -> Option<&str> {
    row.get("id").and_then(Value::as_str)
}

fn unavailable() -> RemoteError {
    RemoteError::Status {
        status: 503,
        body: "service unavailable".to_string(),
    }
}

impl MemoryState {
    fn has_row(&self, table: &str, id: &str) -> bool {
        self.tables
            .get(table)
            .is_some_and(|rows| rows.iter().any(|r| row_id(r) == Some(id)))
    }

    fn check_reference(&self, row: &Value, column: &str, table: &str) -> Result<(), RemoteError> {
        match row.get(column).and_then(Value::as_str) {
            Some(parent) if !self.has_row(table, parent) => Err(RemoteError::Status {
                status: 409,
                body: format!("{} {} does not exist in {}", column, parent, table),
            }),
            _ => Ok(()),
        }
    }

    fn remove_where(&mut self, table: &str, column: &str, value: &str) {
        if let Some(rows) = self.tables.get_mut(table) {
            rows.retain(|r| r.get(column).and_then(Value::as_str) != Some(value));
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn upsert(&self, table: &str, row: Value) -> Result<(), RemoteError> {
        self.with_state(|s| {
            let id = row_id(&row)
                .ok_or_else(|| RemoteError::InvalidRow("row has no id".to_string()))?
                .to_string();
            s.calls.push(RemoteCall::Upsert {
                table: table.to_string(),
                id: id.clone(),
            });
            if s.failing_ids.contains(&id) {
                return Err(unavailable());
            }

            s.check_reference(&row, "project_id", "projects")?;
            s.check_reference(&row, "floor_id", "floors")?;

            let rows = s.tables.entry(table.to_string()).or_default();
            match rows.iter_mut().find(|r| row_id(r) == Some(id.as_str())) {
                Some(existing) => *existing = row,
                None => rows.push(row),
            }
            Ok(())
        })
    }

    async fn delete(&self, table: &str, id: Uuid) -> Result<(), RemoteError> {
        self.with_state(|s| {
            let id = id.to_string();
            s.calls.push(RemoteCall::Delete {
                table: table.to_string(),
                id: id.clone(),
            });
            if s.failing_ids.contains(&id) {
                return Err(unavailable());
            }

            s.remove_where(table, "id", &id);
            match table {
                "projects" => {
                    s.remove_where("floors", "project_id", &id);
                    s.remove_where("measurements", "project_id", &id);
                }
                "floors" => s.remove_where("measurements", "floor_id", &id),
                _ => {}
            }
            Ok(())
        })
    }

    async fn select_by_owner(&self, table: &str, owner_id: &str) -> Result<Vec<Value>, RemoteError> {
        self.with_state(|s| {
            s.calls.push(RemoteCall::Select {
                table: table.to_string(),
                owner: owner_id.to_string(),
            });
            if s.fail_selects {
                return Err(unavailable());
            }
            Ok(s.tables
                .get(table)
                .map(|rows| {
                    rows.iter()
                        .filter(|r| r.get("user_id").and_then(Value::as_str) == Some(owner_id))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        })
    }
}

#[async_trait]
impl BlobStore for MemoryRemote {
    async fn upload_photo(&self, owner_id: &str, photo: &Photo) -> Result<String, RemoteError> {
        self.with_state(|s| {
            let path = rows::photo_path(owner_id, photo);
            s.calls.push(RemoteCall::Upload { path: path.clone() });
            if s.failing_ids.contains(&photo.id.to_string()) {
                return Err(unavailable());
            }
            s.blobs.insert(path.clone(), photo.image.clone());
            Ok(path)
        })
    }
}
