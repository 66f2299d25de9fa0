//! Demo data: the clinic's two doctors, three patients, the two stock exercise presets and a
//! few recorded sessions. Angle series are raised-cosine repetitions with uniform noise.

use std::f64::consts::PI;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use log::info;
use rand::Rng;

use crate::{
    db::{Database, Doctor, ExercisePreset, Patient, Session},
    pose::AngleSeries,
};

/// One repetition every two seconds at 30 fps.
pub const FRAMES_PER_REPETITION: usize = 60;
pub const BENCHMARK_FPS: usize = 30;

/// Angle at `frame` of a movement oscillating between `min` and `max`, starting at `min`.
pub fn repetition_angle(min: f64, max: f64, frame: usize, frames_per_rep: usize) -> f64 {
    if frames_per_rep == 0 {
        return min;
    }
    let phase = 2.0 * PI * frame as f64 / frames_per_rep as f64;
    min + (max - min) * 0.5 * (1.0 - phase.cos())
}

/// Uniform noise in `[-spread / 2, spread / 2)`.
pub fn jitter<R: Rng + ?Sized>(rng: &mut R, spread: f64) -> f64 {
    (rng.gen::<f64>() - 0.5) * spread
}

pub fn generate_angles<R: Rng + ?Sized>(
    rng: &mut R,
    frames: usize,
    min: f64,
    max: f64,
    spread: f64,
) -> Vec<Option<f64>> {
    (0..frames)
        .map(|frame| {
            Some(repetition_angle(min, max, frame, FRAMES_PER_REPETITION) + jitter(rng, spread))
        })
        .collect()
}

/// (min, max, spread) per joint, in `AngleSeries` field order.
type JointRanges = [(f64, f64, f64); 4];

fn generate_series<R: Rng + ?Sized>(rng: &mut R, frames: usize, ranges: JointRanges) -> AngleSeries {
    let [left_elbow, right_elbow, left_knee, right_knee] = ranges;
    let mut joint = |(min, max, spread): (f64, f64, f64)| {
        generate_angles(&mut *rng, frames, min, max, spread)
    };
    AngleSeries {
        left_elbow: joint(left_elbow),
        right_elbow: joint(right_elbow),
        left_knee: joint(left_knee),
        right_knee: joint(right_knee),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub doctors: usize,
    pub patients: usize,
    pub presets: usize,
    pub sessions: usize,
    /// Data was already present and `reset` was not requested.
    pub skipped: bool,
}

pub fn demo_doctors() -> Vec<Doctor> {
    vec![
        Doctor {
            id: "doc1".into(),
            name: "Dr. Evelyn Reed".into(),
            email: "e.reed@clinic.com".into(),
        },
        Doctor {
            id: "doc2".into(),
            name: "Dr. Samuel Chen".into(),
            email: "s.chen@clinic.com".into(),
        },
    ]
}

pub fn demo_patients() -> Vec<Patient> {
    let patient = |id: &str, name: &str, email: &str, doctor_id: &str| Patient {
        id: id.into(),
        name: name.into(),
        email: email.into(),
        doctor_id: doctor_id.into(),
    };
    vec![
        patient("pat1", "John Doe", "j.doe@email.com", "doc1"),
        patient("pat2", "Jane Smith", "j.smith@email.com", "doc1"),
        patient("pat3", "Peter Jones", "p.jones@email.com", "doc2"),
    ]
}

pub fn demo_presets<R: Rng + ?Sized>(rng: &mut R) -> Vec<ExercisePreset> {
    let duration_secs = 120;
    let frames = duration_secs as usize * BENCHMARK_FPS;
    vec![
        ExercisePreset {
            id: "preset1".into(),
            name: "Arm Lifts".into(),
            description: "Raise and lower your arms, focusing on controlled movement at the elbow."
                .into(),
            duration_secs,
            benchmark: generate_series(
                rng,
                frames,
                [(90.0, 170.0, 2.0), (90.0, 170.0, 2.0), (175.0, 180.0, 1.0), (175.0, 180.0, 1.0)],
            ),
        },
        ExercisePreset {
            id: "preset2".into(),
            name: "Half Squats".into(),
            description: "Perform half squats, ensuring your knees do not go past your toes.".into(),
            duration_secs,
            benchmark: generate_series(
                rng,
                frames,
                [(160.0, 170.0, 2.0), (160.0, 170.0, 2.0), (90.0, 175.0, 3.0), (90.0, 175.0, 3.0)],
            ),
        },
    ]
}

pub fn demo_sessions<R: Rng + ?Sized>(rng: &mut R, now: DateTime<Utc>) -> Vec<Session> {
    let session = |id: &str, patient_id: &str, days_ago: i64, preset: &str, angles| Session {
        id: id.into(),
        patient_id: patient_id.into(),
        doctor_id: "doc1".into(),
        recorded_at: now - Duration::days(days_ago),
        exercise_preset_id: Some(preset.into()),
        angles,
    };
    vec![
        session(
            "sess1",
            "pat1",
            2,
            "preset2",
            generate_series(
                rng,
                100,
                [(165.0, 175.0, 5.0), (162.0, 173.0, 5.0), (100.0, 175.0, 8.0), (105.0, 178.0, 8.0)],
            ),
        ),
        session(
            "sess2",
            "pat1",
            1,
            "preset2",
            generate_series(
                rng,
                120,
                [(160.0, 170.0, 4.0), (160.0, 170.0, 4.0), (95.0, 178.0, 5.0), (98.0, 179.0, 5.0)],
            ),
        ),
        session(
            "sess3",
            "pat2",
            3,
            "preset1",
            generate_series(
                rng,
                90,
                [(80.0, 160.0, 10.0), (85.0, 165.0, 10.0), (170.0, 180.0, 2.0), (170.0, 180.0, 2.0)],
            ),
        ),
    ]
}

/// Loads the demo data set. Existing data is left alone unless `reset` wipes it first.
pub async fn seed_demo_data<R: Rng + ?Sized>(
    db: &Database,
    rng: &mut R,
    reset: bool,
    now: DateTime<Utc>,
) -> Result<SeedReport> {
    if reset {
        db.reset_all().await.context("failed to clear existing data")?;
        info!("Cleared existing data");
    } else if !db.list_doctors().await?.is_empty() {
        info!("Data already present; skipping seed");
        return Ok(SeedReport {
            skipped: true,
            ..SeedReport::default()
        });
    }

    let doctors = demo_doctors();
    for doctor in &doctors {
        db.insert_doctor(doctor).await?;
    }
    let patients = demo_patients();
    for patient in &patients {
        db.insert_patient(patient).await?;
    }
    let presets = demo_presets(rng);
    for preset in &presets {
        db.insert_preset(preset).await?;
    }
    let sessions = demo_sessions(rng, now);
    let session_count = sessions.len();
    for session in sessions {
        db.insert_session_with_id(session).await?;
    }

    let report = SeedReport {
        doctors: doctors.len(),
        patients: patients.len(),
        presets: presets.len(),
        sessions: session_count,
        skipped: false,
    };
    info!(
        "Seeded {} doctors, {} patients, {} presets, {} sessions",
        report.doctors, report.patients, report.presets, report.sessions
    );
    Ok(report)
}
