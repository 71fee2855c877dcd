//! Survey Module
//!
//! Domain entities recorded during a field survey:
//!
//! - `Project` - a surveyed site, parent of floors and measurements
//! - `Floor` - one level of a project with an optional floor plan
//! - `Measurement` - a cellular signal sample placed on a floor plan
//! - `SpeedTest` - a network quality sample owned by the user
//! - `Photo` - an install photo with geolocation and azimuth
//!
//! Every entity except `Photo` is synchronized through the pending mutation
//! queue and implements [`SurveyEntity`]. Photos travel through the bounded
//! media store and the blob store instead.
//!
//! # Usage
//!
//! ```rust
//! use surveysync::shared::survey::{EntityKind, Project};
//!
//! let project = Project::new("Warehouse 7");
//! assert_eq!(EntityKind::Project.sync_priority(), 0);
//! ```

pub mod project;
pub mod floor;
pub mod measurement;
pub mod photo;

pub use project::{Project, ProjectType};
pub use floor::Floor;
pub use measurement::{Measurement, TechType};
pub use speed_test::SpeedTest;
pub use photo::{Photo, PhotoSummary};

use crate::shared::error::SharedError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Entity types that flow through the pending mutation queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Project,
    Floor,
    Measurement,
    SpeedTest,
}

impl EntityKind {
    /// All synchronized kinds, in push order
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Project,
        EntityKind::Floor,
        EntityKind::Measurement,
        EntityKind::SpeedTest,
    ];

    /// Push order of this kind. Lower values are applied remotely first so a
    /// parent row always exists before the rows that reference it.
    pub const fn sync_priority(self) -> u8 {
        match self {
            EntityKind::Project => 0,
            EntityKind::Floor => 1,
            EntityKind::Measurement => 2,
            EntityKind::SpeedTest => 3,
        }
    }

    /// Table name, shared by the local schema and the remote authority
    pub const fn table(self) -> &'static str {
        match self {
            EntityKind::Project => "projects",
            EntityKind::Floor => "floors",
            EntityKind::Measurement => "measurements",
            EntityKind::SpeedTest => "speed_tests",
        }
    }

    /// Tag used inside pending mutation ids
    pub const fn as_str(self) -> &'static str {
        match self {
            EntityKind::Project => "project",
            EntityKind::Floor => "floor",
            EntityKind::Measurement => "measurement",
            EntityKind::SpeedTest => "speed_test",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "project" => Some(EntityKind::Project),
            "floor" => Some(EntityKind::Floor),
            "measurement" => Some(EntityKind::Measurement),
            "speed_test" => Some(EntityKind::SpeedTest),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of local write recorded in the pending mutation queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationOp {
    Create,
    Update,
    Delete,
}

impl MutationOp {
    pub const fn as_str(self) -> &'static str {
        match self {
            MutationOp::Create => "create",
            MutationOp::Update => "update",
            MutationOp::Delete => "delete",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "create" => Some(MutationOp::Create),
            "update" => Some(MutationOp::Update),
            "delete" => Some(MutationOp::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for MutationOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Foreign keys an entity carries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntityParents {
    pub project_id: Option<Uuid>,
    pub floor_id: Option<Uuid>,
}

impl EntityParents {
    pub fn iter(&self) -> impl Iterator<Item = Uuid> {
        self.project_id.into_iter().chain(self.floor_id)
    }
}

/// Parent lookup key for `get_all_by_parent`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentRef {
    Project(Uuid),
    Floor(Uuid),
}

/// An entity persisted in the local store and pushed to the remote authority
pub trait SurveyEntity:
    Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync + Unpin + 'static
{
    const KIND: EntityKind;

    fn id(&self) -> Uuid;

    fn parents(&self) -> EntityParents {
        EntityParents::default()
    }

    /// Whether an existing row may be overwritten by `put`
    fn is_mutable() -> bool {
        true
    }

    fn validate(&self) -> Result<(), SharedError> {
        Ok(())
    }
}

pub(crate) fn require_name(field: &str, value: &str) -> Result<(), SharedError> {
    if value.trim().is_empty() {
        return Err(SharedError::validation(field, "must not be empty"));
    }
    Ok(())
}
