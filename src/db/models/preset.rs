use serde::{Deserialize, Serialize};

use crate::pose::AngleSeries;

/// Reference exercise: fixed recording duration plus an ideal-form angle series.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExercisePreset {
    pub id: String,
    pub name: String,
    pub description: String,
    pub duration_secs: u32,
    #[serde(rename = "benchmarkData")]
    pub benchmark: AngleSeries,
}

/// Input data for creating or updating a preset
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresetInput {
    pub name: String,
    pub description: String,
    pub duration_secs: u32,
    #[serde(rename = "benchmarkData")]
    pub benchmark: AngleSeries,
}

impl PresetInput {
    pub fn into_preset(self, id: String) -> ExercisePreset {
        ExercisePreset {
            id,
            name: self.name,
            description: self.description,
            duration_secs: self.duration_secs,
            benchmark: self.benchmark,
        }
    }
}
