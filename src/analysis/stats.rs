//! Deviation statistics between two angle series.
//!
//! Both inputs are truncated to their common prefix. A pair where either side is undetermined
//! is dropped entirely: it adds nothing to any sum and is not counted in any divisor. With no
//! valid pairs every statistic is zero. Values are never rounded here.

use serde::Serialize;

use super::config::{MapeDenominator, StatsConfig};
use crate::pose::{AngleSeries, Joint};

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    /// Mean absolute deviation, degrees.
    pub mad: f64,
    /// Mean squared error, degrees².
    pub mse: f64,
    /// Mean absolute percentage error relative to the first series, percent.
    pub mape: f64,
    /// Number of pairs that contributed.
    pub samples: usize,
}

pub fn compute_stats(reference: &[Option<f64>], other: &[Option<f64>], config: &StatsConfig) -> Stats {
    let mut valid = 0usize;
    let mut nonzero = 0usize;
    let mut abs_sum = 0.0;
    let mut sq_sum = 0.0;
    let mut pct_sum = 0.0;

    for (a, b) in reference.iter().zip(other.iter()) {
        let (Some(a), Some(b)) = (a, b) else {
            continue;
        };
        let diff = a - b;
        valid += 1;
        abs_sum += diff.abs();
        sq_sum += diff * diff;
        if *a != 0.0 {
            nonzero += 1;
            pct_sum += (diff / a).abs();
        }
    }

    if valid == 0 {
        return Stats::default();
    }

    let mape_divisor = match config.mape_denominator {
        MapeDenominator::AllPairs => valid,
        MapeDenominator::NonZeroReference => nonzero,
    };
    let mape = if mape_divisor == 0 {
        0.0
    } else {
        pct_sum / mape_divisor as f64 * 100.0
    };

    Stats {
        mad: abs_sum / valid as f64,
        mse: sq_sum / valid as f64,
        mape,
        samples: valid,
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JointStats {
    pub left_elbow: Stats,
    pub right_elbow: Stats,
    pub left_knee: Stats,
    pub right_knee: Stats,
}

impl JointStats {
    pub fn get(&self, joint: Joint) -> &Stats {
        match joint {
            Joint::LeftElbow => &self.left_elbow,
            Joint::RightElbow => &self.right_elbow,
            Joint::LeftKnee => &self.left_knee,
            Joint::RightKnee => &self.right_knee,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Joint, &Stats)> + '_ {
        Joint::ALL.into_iter().map(move |joint| (joint, self.get(joint)))
    }
}

/// Runs [`compute_stats`] for each joint independently.
pub fn compute_joint_stats(reference: &AngleSeries, other: &AngleSeries, config: &StatsConfig) -> JointStats {
    let stats = |joint| compute_stats(reference.get(joint), other.get(joint), config);
    JointStats {
        left_elbow: stats(Joint::LeftElbow),
        right_elbow: stats(Joint::RightElbow),
        left_knee: stats(Joint::LeftKnee),
        right_knee: stats(Joint::RightKnee),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() < eps
    }

    fn series(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().copied().map(Some).collect()
    }

    #[test]
    fn test_identity_is_zero() {
        let seq = series(&[90.0, 120.5, 170.0, 0.0]);
        let stats = compute_stats(&seq, &seq, &StatsConfig::default());
        assert_eq!(stats.mad, 0.0);
        assert_eq!(stats.mse, 0.0);
        assert_eq!(stats.mape, 0.0);
        assert_eq!(stats.samples, 4);
    }

    #[test]
    fn test_mad_and_mse_are_symmetric() {
        let a = series(&[100.0, 140.0, 95.5, 171.0]);
        let b = series(&[103.0, 133.0, 99.0, 160.0]);
        let config = StatsConfig::default();
        let ab = compute_stats(&a, &b, &config);
        let ba = compute_stats(&b, &a, &config);
        assert!(approx_eq(ab.mad, ba.mad, 1e-12));
        assert!(approx_eq(ab.mse, ba.mse, 1e-12));
    }

    #[test]
    fn test_ragged_series_use_common_prefix() {
        let short = series(&[10.0, 20.0, 30.0, 40.0, 50.0]);
        let long = series(&[11.0, 21.0, 31.0, 41.0, 51.0, 500.0, 600.0, 700.0]);
        let stats = compute_stats(&short, &long, &StatsConfig::default());
        assert_eq!(stats.samples, 5);
        assert!(approx_eq(stats.mad, 1.0, 1e-12));
        assert!(approx_eq(stats.mse, 1.0, 1e-12));
    }

    #[test]
    fn test_empty_input_is_zero() {
        let seq = series(&[1.0, 2.0]);
        let config = StatsConfig::default();
        assert_eq!(compute_stats(&[], &seq, &config), Stats::default());
        assert_eq!(compute_stats(&seq, &[], &config), Stats::default());
        assert_eq!(compute_stats(&[], &[], &config), Stats::default());
    }

    #[test]
    fn test_worked_example() {
        let stats = compute_stats(
            &series(&[100.0, 110.0, 120.0]),
            &series(&[105.0, 108.0, 115.0]),
            &StatsConfig::default(),
        );
        assert!(approx_eq(stats.mad, 4.0, 1e-9));
        assert!(approx_eq(stats.mse, 18.0, 1e-9));
        let expected = (5.0 / 100.0 + 2.0 / 110.0 + 5.0 / 120.0) / 3.0 * 100.0;
        assert!(approx_eq(stats.mape, expected, 1e-9));
        assert!(approx_eq(stats.mape, 3.66, 0.01));
    }

    #[test]
    fn test_undetermined_pairs_are_dropped() {
        let a = vec![Some(100.0), None, Some(120.0), Some(90.0)];
        let b = vec![Some(104.0), Some(50.0), Some(120.0), None];
        let stats = compute_stats(&a, &b, &StatsConfig::default());
        assert_eq!(stats.samples, 2);
        assert!(approx_eq(stats.mad, 2.0, 1e-12));
        assert!(approx_eq(stats.mse, 8.0, 1e-12));
        assert!(approx_eq(stats.mape, 2.0, 1e-12));
    }

    #[test]
    fn test_all_undetermined_is_zero_not_nan() {
        let a = vec![None, None];
        let b = vec![Some(1.0), Some(2.0)];
        let stats = compute_stats(&a, &b, &StatsConfig::default());
        assert_eq!(stats, Stats::default());
    }

    #[test]
    fn test_zero_reference_skipped_in_mape_sum() {
        let a = series(&[0.0, 100.0]);
        let b = series(&[10.0, 90.0]);

        let all_pairs = compute_stats(&a, &b, &StatsConfig::default());
        assert!(approx_eq(all_pairs.mad, 10.0, 1e-12));
        // 10% over the one nonzero pair, divided across both pairs
        assert!(approx_eq(all_pairs.mape, 5.0, 1e-12));

        let nonzero = compute_stats(
            &a,
            &b,
            &StatsConfig {
                mape_denominator: MapeDenominator::NonZeroReference,
            },
        );
        assert!(approx_eq(nonzero.mape, 10.0, 1e-12));
    }

    #[test]
    fn test_only_zero_references_give_zero_mape() {
        let a = series(&[0.0, 0.0]);
        let b = series(&[5.0, 5.0]);
        let config = StatsConfig {
            mape_denominator: MapeDenominator::NonZeroReference,
        };
        let stats = compute_stats(&a, &b, &config);
        assert_eq!(stats.mape, 0.0);
        assert!(approx_eq(stats.mad, 5.0, 1e-12));
    }

    #[test]
    fn test_joint_stats_are_independent() {
        let mut a = AngleSeries::new();
        a.left_elbow = series(&[100.0, 110.0, 120.0]);
        a.right_knee = series(&[170.0]);
        let mut b = AngleSeries::new();
        b.left_elbow = series(&[105.0, 108.0, 115.0]);
        b.right_knee = series(&[160.0, 150.0]);

        let stats = compute_joint_stats(&a, &b, &StatsConfig::default());
        assert!(approx_eq(stats.left_elbow.mad, 4.0, 1e-9));
        assert_eq!(stats.right_elbow, Stats::default());
        assert_eq!(stats.left_knee, Stats::default());
        assert_eq!(stats.right_knee.samples, 1);
        assert!(approx_eq(stats.get(Joint::RightKnee).mse, 100.0, 1e-9));
        assert_eq!(stats.iter().count(), 4);
    }
}
