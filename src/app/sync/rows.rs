//! Translation between local entities and remote rows.
//!
//! Remote rows are the entity's JSON form plus the owning `user_id`. The
//! authority fills some columns with defaults when they are absent, so the
//! same defaults are applied here before a push.

use crate::shared::error::SharedError;
use crate::shared::survey::{EntityKind, Photo, SurveyEntity};
use serde_json::{Map, Value};

/// Grid size the remote authority assumes for floors without one
pub const DEFAULT_GRID_SIZE: u32 = 5;

/// Cell id the remote authority assumes for measurements without one
pub const DEFAULT_CELL_ID: &str = "Unknown";

const OWNER_COLUMN: &str = "user_id";

/// Build the remote row for a queued payload
pub fn to_remote_row(kind: EntityKind, payload: &Value, owner_id: &str) -> Result<Value, SharedError> {
    let Value::Object(fields) = payload else {
        return Err(SharedError::serialization(format!(
            "{} payload is not an object",
            kind
        )));
    };
    if !fields.get("id").is_some_and(Value::is_string) {
        return Err(SharedError::validation("id", format!("{} payload has no id", kind)));
    }

    let mut row: Map<String, Value> = fields.clone();
    row.insert(OWNER_COLUMN.to_string(), Value::String(owner_id.to_string()));

    match kind {
        EntityKind::Floor => fill_default(&mut row, "grid_size", Value::from(DEFAULT_GRID_SIZE)),
        EntityKind::Measurement => fill_default(&mut row, "cell_id", Value::from(DEFAULT_CELL_ID)),
        EntityKind::Project | EntityKind::SpeedTest => {}
    }

    Ok(Value::Object(row))
}

/// Decode and validate one remote row
pub fn from_remote_row<E: SurveyEntity>(row: Value) -> Result<E, SharedError> {
    let mut row = row;
    if let Value::Object(fields) = &mut row {
        fields.remove(OWNER_COLUMN);
    }
    let entity: E = serde_json::from_value(row)?;
    entity.validate()?;
    Ok(entity)
}

/// Decode a batch of rows, skipping (and logging) the ones that fail
pub fn decode_rows<E: SurveyEntity>(rows: Vec<Value>) -> (Vec<E>, usize) {
    let mut skipped = 0;
    let entities = rows
        .into_iter()
        .filter_map(|row| {
            let id = row.get("id").cloned();
            match from_remote_row::<E>(row) {
                Ok(entity) => Some(entity),
                Err(e) => {
                    tracing::warn!(kind = %E::KIND, id = ?id, error = %e, "skipping invalid remote row");
                    skipped += 1;
                    None
                }
            }
        })
        .collect();
    (entities, skipped)
}

/// Storage path of a photo: `{owner}/{project}/{photo}.jpg`
pub fn photo_path(owner_id: &str, photo: &Photo) -> String {
    format!("{}/{}/{}.jpg", owner_id, photo.project_id, photo.id)
}

fn fill_default(row: &mut Map<String, Value>, column: &str, value: Value) {
    match row.get(column) {
        Some(existing) if !existing.is_null() => {}
        _ => {
            row.insert(column.to_string(), value);
        }
    }
}
