//! Floor Data Structure

use super::{require_name, EntityKind, EntityParents, SurveyEntity};
use crate::shared::error::SharedError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One level of a project
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Floor {
    pub id: Uuid,
    /// Owning project; must be pushed before this floor
    pub project_id: Uuid,
    pub name: String,
    pub level: String,
    pub floor_plan_image: Option<String>,
    pub notes: Option<String>,
    /// Grid cell count per axis when the measurement grid is used
    pub grid_size: Option<u32>,
    #[serde(default)]
    pub grid_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Floor {
    pub fn new(project_id: Uuid, name: impl Into<String>, level: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            project_id,
            name: name.into(),
            level: level.into(),
            floor_plan_image: None,
            notes: None,
            grid_size: None,
            grid_enabled: false,
            created_at: now,
            updated_at: now,
        }
    }
}

impl SurveyEntity for Floor {
    const KIND: EntityKind = EntityKind::Floor;

    fn id(&self) -> Uuid {
        self.id
    }

    fn parents(&self) -> EntityParents {
        EntityParents {
            project_id: Some(self.project_id),
            floor_id: None,
        }
    }

    fn validate(&self) -> Result<(), SharedError> {
        require_name("name", &self.name)?;
        if self.grid_size == Some(0) {
            return Err(SharedError::validation("grid_size", "must be at least 1"));
        }
        Ok(())
    }
}
