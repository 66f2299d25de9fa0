//! Recorded exercise sessions.
//!
//! A `NewSession` is what the capture loop hands to persistence when a recording finishes;
//! storing it assigns the id and yields an immutable `Session`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pose::AngleSeries;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub patient_id: String,
    pub doctor_id: String,
    pub recorded_at: DateTime<Utc>,
    pub exercise_preset_id: Option<String>,
    pub angles: AngleSeries,
}

impl Session {
    pub fn frame_count(&self) -> usize {
        self.angles.frame_count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewSession {
    pub patient_id: String,
    pub doctor_id: String,
    pub recorded_at: DateTime<Utc>,
    pub exercise_preset_id: Option<String>,
    pub angles: AngleSeries,
}

impl NewSession {
    pub fn into_session(self, id: String) -> Session {
        Session {
            id,
            patient_id: self.patient_id,
            doctor_id: self.doctor_id,
            recorded_at: self.recorded_at,
            exercise_preset_id: self.exercise_preset_id,
            angles: self.angles,
        }
    }
}
