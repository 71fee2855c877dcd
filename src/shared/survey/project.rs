//! Project Data Structure
//!
//! A surveyed site. Floors and measurements reference it by `project_id`.

use super::{require_name, EntityKind, SurveyEntity};
use crate::shared::error::SharedError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of field work a project records
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectType {
    Survey,
    Install,
    Upgrade,
}

/// A surveyed site
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    /// Caller-generated id, shared with the remote row
    pub id: Uuid,
    pub name: String,
    pub location: Option<String>,
    pub building_level: Option<String>,
    pub project_type: Option<ProjectType>,
    pub notes: Option<String>,
    /// Data URL or storage path of the site floor plan
    pub floor_plan_image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Create a new project stamped with the current time
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            location: None,
            building_level: None,
            project_type: None,
            notes: None,
            floor_plan_image: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl SurveyEntity for Project {
    const KIND: EntityKind = EntityKind::Project;

    fn id(&self) -> Uuid {
        self.id
    }

    fn validate(&self) -> Result<(), SharedError> {
        require_name("name", &self.name)
    }
}
