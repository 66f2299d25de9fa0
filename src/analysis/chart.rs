//! Projection of two sessions onto a shared 1-based frame axis for an external chart renderer.

use serde::Serialize;

use super::benchmark::BENCHMARK_SESSION_ID;
use crate::{db::Session, pose::Joint};

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChartPoint {
    pub frame: usize,
    pub primary: Option<f64>,
    pub secondary: Option<f64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChartProjection {
    pub joint: Joint,
    pub primary_label: String,
    pub secondary_label: String,
    pub points: Vec<ChartPoint>,
}

/// "Benchmark" for the synthetic benchmark session, otherwise the recording date.
pub fn session_label(session: &Session) -> String {
    if session.id == BENCHMARK_SESSION_ID {
        "Benchmark".to_string()
    } else {
        format!("Session ({})", session.recorded_at.format("%Y-%m-%d"))
    }
}

/// Unlike the statistics, the chart keeps both series whole: the axis runs to the longer one
/// and the shorter one is padded with gaps.
pub fn project_chart(primary: &Session, secondary: &Session, joint: Joint) -> ChartProjection {
    let first = primary.angles.get(joint);
    let second = secondary.angles.get(joint);
    let frames = first.len().max(second.len());

    let points = (0..frames)
        .map(|index| ChartPoint {
            frame: index + 1,
            primary: first.get(index).copied().flatten(),
            secondary: second.get(index).copied().flatten(),
        })
        .collect();

    ChartProjection {
        joint,
        primary_label: session_label(primary),
        secondary_label: session_label(secondary),
        points,
    }
}
