//! Measurement Data Structure
//!
//! A single signal sample pinned to a normalized position on a floor plan.
//! Measurements are never edited once recorded; they are only deleted.

use super::{EntityKind, EntityParents, SurveyEntity};
use crate::shared::error::SharedError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Radio access technology reported by the modem
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TechType {
    #[serde(rename = "LTE")]
    Lte,
    #[serde(rename = "5G")]
    Nr5g,
    #[serde(rename = "4G")]
    Lte4g,
    #[serde(rename = "EDGE")]
    Edge,
    #[serde(rename = "HSPA")]
    Hspa,
}

/// A signal sample
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Measurement {
    pub id: Uuid,
    pub project_id: Uuid,
    pub floor_id: Option<Uuid>,
    /// Horizontal position on the floor plan, in [0, 1]
    pub x: f64,
    /// Vertical position on the floor plan, in [0, 1]
    pub y: f64,
    pub location_number: u32,
    pub rsrp: f64,
    pub rsrq: f64,
    pub sinr: f64,
    pub rssi: f64,
    pub cell_id: Option<String>,
    pub tech_type: TechType,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub band: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Measurement {
    /// Create a sample at `(x, y)` with empty signal metrics
    pub fn new(project_id: Uuid, floor_id: Option<Uuid>, x: f64, y: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            floor_id,
            x,
            y,
            location_number: 0,
            rsrp: 0.0,
            rsrq: 0.0,
            sinr: 0.0,
            rssi: 0.0,
            cell_id: None,
            tech_type: TechType::Lte,
            latitude: None,
            longitude: None,
            band: None,
            timestamp: Utc::now(),
        }
    }

    /// Set the four signal metrics
    pub fn with_signal(mut self, rsrp: f64, rsrq: f64, sinr: f64, rssi: f64) -> Self {
        self.rsrp = rsrp;
        self.rsrq = rsrq;
        self.sinr = sinr;
        self.rssi = rssi;
        self
    }
}

fn check_unit(field: &str, value: f64) -> Result<(), SharedError> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(SharedError::validation(
            field,
            format!("{} is outside [0, 1]", value),
        ));
    }
    Ok(())
}

impl SurveyEntity for Measurement {
    const KIND: EntityKind = EntityKind::Measurement;

    fn id(&self) -> Uuid {
        self.id
    }

    fn parents(&self) -> EntityParents {
        EntityParents {
            project_id: Some(self.project_id),
            floor_id: self.floor_id,
        }
    }

    fn is_mutable() -> bool {
        false
    }

    fn validate(&self) -> Result<(), SharedError> {
        check_unit("x", self.x)?;
        check_unit("y", self.y)?;
        for (field, value) in [
            ("rsrp", self.rsrp),
            ("rsrq", self.rsrq),
            ("sinr", self.sinr),
            ("rssi", self.rssi),
        ] {
            if !value.is_finite() {
                return Err(SharedError::validation(field, "must be a finite number"));
            }
        }
        Ok(())
    }
}
