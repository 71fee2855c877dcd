//! Photo Data Structure
//!
//! Install photos are large, so the UI snapshot only carries a
//! [`PhotoSummary`]; the image bytes stay in the media store.

use crate::shared::error::SharedError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An install photo with its capture metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Photo {
    pub id: Uuid,
    pub project_id: Uuid,
    pub project_name: String,
    pub label: Option<String>,
    /// Compass heading in degrees, [0, 360)
    pub azimuth: f64,
    pub latitude: f64,
    pub longitude: f64,
    /// Encoded image (JPEG)
    #[serde(skip)]
    pub image: Vec<u8>,
    /// Small preview as a data URL
    pub thumbnail: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Set once the blob store confirmed the upload
    pub is_synced: bool,
}

impl Photo {
    pub fn new(project_id: Uuid, project_name: impl Into<String>, image: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            project_name: project_name.into(),
            label: None,
            azimuth: 0.0,
            latitude: 0.0,
            longitude: 0.0,
            image,
            thumbnail: String::new(),
            notes: None,
            created_at: Utc::now(),
            is_synced: false,
        }
    }

    pub fn validate(&self) -> Result<(), SharedError> {
        if !self.azimuth.is_finite() || !(0.0..360.0).contains(&self.azimuth) {
            return Err(SharedError::validation(
                "azimuth",
                format!("{} is outside [0, 360)", self.azimuth),
            ));
        }
        if self.image.is_empty() {
            return Err(SharedError::validation("image", "must not be empty"));
        }
        Ok(())
    }

    pub fn summary(&self) -> PhotoSummary {
        PhotoSummary {
            id: self.id,
            project_id: self.project_id,
            label: self.label.clone(),
            azimuth: self.azimuth,
            thumbnail: self.thumbnail.clone(),
            created_at: self.created_at,
            is_synced: self.is_synced,
        }
    }
}

/// Photo metadata without the image payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhotoSummary {
    pub id: Uuid,
    pub project_id: Uuid,
    pub label: Option<String>,
    pub azimuth: f64,
    pub thumbnail: String,
    pub created_at: DateTime<Utc>,
    pub is_synced: bool,
}
