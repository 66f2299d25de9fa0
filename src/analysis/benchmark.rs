//! Chooses the second series of a comparison: another recorded session or the benchmark of the
//! preset the primary session was recorded against.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::db::{ExercisePreset, Session};

/// Id carried by the synthetic session built from a preset benchmark.
pub const BENCHMARK_SESSION_ID: &str = "benchmark";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "sessionId")]
pub enum ComparisonTarget {
    Session(String),
    Benchmark,
}

/// Why no second series could be resolved. Not an error: the caller decides how to fall back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "reason", content = "id")]
pub enum Unavailable {
    /// The primary session was not recorded against a preset.
    NoPresetReference,
    PresetNotFound(String),
    SessionNotFound(String),
    PrimaryNotFound(String),
}

impl fmt::Display for Unavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unavailable::NoPresetReference => {
                write!(f, "session has no exercise preset; compare against another session instead")
            }
            Unavailable::PresetNotFound(id) => write!(f, "exercise preset '{id}' not found"),
            Unavailable::SessionNotFound(id) => write!(f, "session '{id}' not found"),
            Unavailable::PrimaryNotFound(id) => write!(f, "primary session '{id}' not found"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Resolved(Session),
    Unavailable(Unavailable),
}

/// Whether the benchmark option should be offered for this session at all.
pub fn can_compare_with_benchmark(primary: &Session) -> bool {
    primary.exercise_preset_id.is_some()
}

/// Wraps a preset's benchmark in a session shaped like the primary one.
pub fn benchmark_session(primary: &Session, preset: &ExercisePreset) -> Session {
    Session {
        id: BENCHMARK_SESSION_ID.to_string(),
        patient_id: primary.patient_id.clone(),
        doctor_id: primary.doctor_id.clone(),
        recorded_at: primary.recorded_at,
        exercise_preset_id: Some(preset.id.clone()),
        angles: preset.benchmark.clone(),
    }
}

pub fn resolve_comparison(
    primary: &Session,
    target: &ComparisonTarget,
    sessions: &[Session],
    presets: &[ExercisePreset],
) -> Resolution {
    match target {
        ComparisonTarget::Benchmark => {
            let Some(preset_id) = primary.exercise_preset_id.as_deref() else {
                return Resolution::Unavailable(Unavailable::NoPresetReference);
            };
            match presets.iter().find(|preset| preset.id == preset_id) {
                Some(preset) => Resolution::Resolved(benchmark_session(primary, preset)),
                None => Resolution::Unavailable(Unavailable::PresetNotFound(preset_id.to_string())),
            }
        }
        ComparisonTarget::Session(id) => match sessions.iter().find(|session| &session.id == id) {
            Some(session) => Resolution::Resolved(session.clone()),
            None => Resolution::Unavailable(Unavailable::SessionNotFound(id.clone())),
        },
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::pose::AngleSeries;

    fn session(id: &str, preset: Option<&str>) -> Session {
        let mut angles = AngleSeries::new();
        angles.left_elbow = vec![Some(120.0), Some(125.0)];
        Session {
            id: id.into(),
            patient_id: "pat1".into(),
            doctor_id: "doc1".into(),
            recorded_at: Utc.with_ymd_and_hms(2026, 10, 14, 8, 0, 0).unwrap(),
            exercise_preset_id: preset.map(str::to_string),
            angles,
        }
    }

    fn preset(id: &str) -> ExercisePreset {
        let mut benchmark = AngleSeries::new();
        benchmark.left_elbow = vec![Some(160.0), Some(165.0), Some(170.0)];
        ExercisePreset {
            id: id.into(),
            name: "Half Squats".into(),
            description: "Squat halfway down and return.".into(),
            duration_secs: 120,
            benchmark,
        }
    }

    #[test]
    fn test_benchmark_resolves_to_synthetic_session() {
        let primary = session("sess1", Some("preset2"));
        let presets = vec![preset("preset1"), preset("preset2")];
        let Resolution::Resolved(resolved) =
            resolve_comparison(&primary, &ComparisonTarget::Benchmark, &[], &presets)
        else {
            panic!("expected a benchmark session");
        };
        assert_eq!(resolved.id, BENCHMARK_SESSION_ID);
        assert_eq!(resolved.angles, presets[1].benchmark);
        assert_eq!(resolved.patient_id, "pat1");
    }

    #[test]
    fn test_benchmark_without_preset_reference() {
        let primary = session("sess1", None);
        assert!(!can_compare_with_benchmark(&primary));
        assert_eq!(
            resolve_comparison(&primary, &ComparisonTarget::Benchmark, &[], &[preset("preset1")]),
            Resolution::Unavailable(Unavailable::NoPresetReference)
        );
    }

    #[test]
    fn test_benchmark_with_missing_preset() {
        let primary = session("sess1", Some("preset9"));
        assert!(can_compare_with_benchmark(&primary));
        assert_eq!(
            resolve_comparison(&primary, &ComparisonTarget::Benchmark, &[], &[preset("preset1")]),
            Resolution::Unavailable(Unavailable::PresetNotFound("preset9".into()))
        );
    }

    #[test]
    fn test_session_lookup() {
        let primary = session("sess1", None);
        let sessions = vec![primary.clone(), session("sess2", None)];

        let found = resolve_comparison(
            &primary,
            &ComparisonTarget::Session("sess2".into()),
            &sessions,
            &[],
        );
        assert!(matches!(found, Resolution::Resolved(ref s) if s.id == "sess2"));

        let missing = resolve_comparison(
            &primary,
            &ComparisonTarget::Session("sess7".into()),
            &sessions,
            &[],
        );
        assert_eq!(
            missing,
            Resolution::Unavailable(Unavailable::SessionNotFound("sess7".into()))
        );
    }

    #[test]
    fn test_unavailable_messages() {
        assert_eq!(
            Unavailable::PresetNotFound("preset9".into()).to_string(),
            "exercise preset 'preset9' not found"
        );
    }
}
