//! Comparison service: loads both series through a [`SessionStore`] and runs the statistics.

use std::fmt::Write as _;

use anyhow::{Context, Result};
use serde::Serialize;

use super::{
    benchmark::{resolve_comparison, ComparisonTarget, Resolution, Unavailable},
    chart::session_label,
    config::StatsConfig,
    stats::{compute_joint_stats, JointStats},
};
use crate::db::{Session, SessionStore};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonReport {
    pub primary: Session,
    pub secondary: Session,
    pub stats: JointStats,
}

impl ComparisonReport {
    /// Plain-text table, two decimals per value.
    pub fn render_table(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{} vs {}",
            session_label(&self.primary),
            session_label(&self.secondary)
        );
        let _ = writeln!(
            out,
            "{:<12} {:>10} {:>10} {:>10} {:>8}",
            "Joint", "MAD", "MSE", "MAPE", "Samples"
        );
        for (joint, stats) in self.stats.iter() {
            let _ = writeln!(
                out,
                "{:<12} {:>10.2} {:>10.2} {:>9.2}% {:>8}",
                joint.display_name(),
                stats.mad,
                stats.mse,
                stats.mape,
                stats.samples
            );
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ComparisonOutcome {
    Report(ComparisonReport),
    Unavailable(Unavailable),
}

/// The dashboard's initial pick: newest session against the one before it, or against itself
/// when only one exists. Expects `sessions` newest first.
pub fn default_selection(sessions: &[Session]) -> Option<(String, String)> {
    let primary = sessions.first()?;
    let secondary = sessions.get(1).unwrap_or(primary);
    Some((primary.id.clone(), secondary.id.clone()))
}

/// Loads the primary session and resolves the second series it should be compared with.
pub async fn resolve_pair<S: SessionStore>(
    store: &S,
    patient_id: &str,
    primary_id: &str,
    target: &ComparisonTarget,
) -> Result<Result<(Session, Session), Unavailable>> {
    let sessions = store
        .list_sessions_for_patient(patient_id)
        .await
        .with_context(|| format!("failed to load sessions for patient {patient_id}"))?;

    let Some(primary) = sessions.iter().find(|session| session.id == primary_id) else {
        return Ok(Err(Unavailable::PrimaryNotFound(primary_id.to_string())));
    };

    let presets = match target {
        ComparisonTarget::Benchmark => store
            .list_presets()
            .await
            .context("failed to load exercise presets")?,
        ComparisonTarget::Session(_) => Vec::new(),
    };

    Ok(match resolve_comparison(primary, target, &sessions, &presets) {
        Resolution::Resolved(secondary) => Ok((primary.clone(), secondary)),
        Resolution::Unavailable(reason) => Err(reason),
    })
}

pub async fn compare<S: SessionStore>(
    store: &S,
    patient_id: &str,
    primary_id: &str,
    target: &ComparisonTarget,
    config: &StatsConfig,
) -> Result<ComparisonOutcome> {
    let (primary, secondary) = match resolve_pair(store, patient_id, primary_id, target).await? {
        Ok(pair) => pair,
        Err(reason) => return Ok(ComparisonOutcome::Unavailable(reason)),
    };

    let stats = compute_joint_stats(&primary.angles, &secondary.angles, config);
    Ok(ComparisonOutcome::Report(ComparisonReport {
        primary,
        secondary,
        stats,
    }))
}
