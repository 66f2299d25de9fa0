use anyhow::{bail, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::{PoisonError, RwLock},
};

use crate::{analysis::MapeDenominator, pose::MIN_KEYPOINT_SCORE};

pub const DATA_DIR_ENV: &str = "REHABTRACK_DATA_DIR";
pub const DEBUG_ENV: &str = "REHABTRACK_DEBUG";
const DEFAULT_DATA_DIR: &str = "rehabtrack-data";

pub const DATABASE_FILE: &str = "rehabtrack.sqlite3";
pub const SETTINGS_FILE: &str = "settings.json";

/// Data directory from `REHABTRACK_DATA_DIR`, falling back to `./rehabtrack-data`.
pub fn data_dir_from_env() -> PathBuf {
    env::var_os(DATA_DIR_ENV)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

pub fn debug_enabled() -> bool {
    env::var(DEBUG_ENV)
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureSettings {
    pub frame_interval_ms: u64,
    pub countdown_tick_ms: u64,
    pub completion_delay_ms: u64,
    pub min_keypoint_score: f64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            frame_interval_ms: 16,
            countdown_tick_ms: 1000,
            completion_delay_ms: 1500,
            min_keypoint_score: MIN_KEYPOINT_SCORE,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisSettings {
    pub mape_denominator: MapeDenominator,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct UserSettings {
    capture: CaptureSettings,
    analysis: AnalysisSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Ignoring unreadable settings at {}: {err}", path.display());
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn capture(&self) -> CaptureSettings {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .capture
            .clone()
    }

    pub fn update_capture(&self, settings: CaptureSettings) -> Result<()> {
        if settings.frame_interval_ms == 0 || settings.countdown_tick_ms == 0 {
            bail!("frame and countdown intervals must be greater than zero");
        }
        if !(0.0..=1.0).contains(&settings.min_keypoint_score) {
            bail!("minimum keypoint score must be within [0, 1]");
        }

        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        guard.capture = settings;
        self.persist(&guard)
    }

    pub fn analysis(&self) -> AnalysisSettings {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .analysis
            .clone()
    }

    pub fn update_analysis(&self, settings: AnalysisSettings) -> Result<()> {
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        guard.analysis = settings;
        self.persist(&guard)
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
