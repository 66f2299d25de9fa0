use serde::{Deserialize, Serialize};

use super::angles::{Joint, JointAngles};

/// Per-joint angle time series, one entry per recorded frame.
///
/// Undetermined frames are kept as `None` gaps so the four sequences stay aligned on the frame
/// index. Benchmarks authored offline may contain plain numbers only; those deserialize as
/// `Some`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AngleSeries {
    pub left_elbow: Vec<Option<f64>>,
    pub right_elbow: Vec<Option<f64>>,
    pub left_knee: Vec<Option<f64>>,
    pub right_knee: Vec<Option<f64>>,
}

impl AngleSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one frame to all four sequences together.
    pub fn push(&mut self, angles: &JointAngles) {
        self.left_elbow.push(angles.left_elbow);
        self.right_elbow.push(angles.right_elbow);
        self.left_knee.push(angles.left_knee);
        self.right_knee.push(angles.right_knee);
    }

    pub fn get(&self, joint: Joint) -> &[Option<f64>] {
        match joint {
            Joint::LeftElbow => &self.left_elbow,
            Joint::RightElbow => &self.right_elbow,
            Joint::LeftKnee => &self.left_knee,
            Joint::RightKnee => &self.right_knee,
        }
    }

    pub fn get_mut(&mut self, joint: Joint) -> &mut Vec<Option<f64>> {
        match joint {
            Joint::LeftElbow => &mut self.left_elbow,
            Joint::RightElbow => &mut self.right_elbow,
            Joint::LeftKnee => &mut self.left_knee,
            Joint::RightKnee => &mut self.right_knee,
        }
    }

    /// Length of the longest sequence. Series recorded by the capture loop are always
    /// rectangular; offline benchmarks may not be.
    pub fn frame_count(&self) -> usize {
        Joint::ALL
            .into_iter()
            .map(|joint| self.get(joint).len())
            .max()
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.frame_count() == 0
    }

    pub fn clear(&mut self) {
        for joint in Joint::ALL {
            self.get_mut(joint).clear();
        }
    }

    /// (min, max) over the determined samples of one joint.
    pub fn range(&self, joint: Joint) -> Option<(f64, f64)> {
        self.get(joint).iter().flatten().fold(None, |acc, &value| match acc {
            None => Some((value, value)),
            Some((lo, hi)) => Some((lo.min(value), hi.max(value))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_keeps_gaps_in_lockstep() {
        let mut series = AngleSeries::new();
        series.push(&JointAngles {
            left_elbow: Some(90.0),
            right_elbow: None,
            left_knee: Some(170.0),
            right_knee: None,
        });
        series.push(&JointAngles::default());

        for joint in Joint::ALL {
            assert_eq!(series.get(joint).len(), 2);
        }
        assert_eq!(series.left_elbow, vec![Some(90.0), None]);
        assert_eq!(series.right_elbow, vec![None, None]);
        assert_eq!(series.frame_count(), 2);
    }

    #[test]
    fn test_clear() {
        let mut series = AngleSeries::new();
        series.push(&JointAngles::default());
        series.clear();
        assert!(series.is_empty());
    }

    #[test]
    fn test_plain_numbers_deserialize_as_determined() {
        let json = r#"{"leftElbow":[1.5,null],"rightElbow":[],"leftKnee":[3],"rightKnee":[]}"#;
        let series: AngleSeries = serde_json::from_str(json).unwrap();
        assert_eq!(series.left_elbow, vec![Some(1.5), None]);
        assert_eq!(series.left_knee, vec![Some(3.0)]);
        assert_eq!(series.frame_count(), 2);
    }

    #[test]
    fn test_range_skips_gaps() {
        let mut series = AngleSeries::new();
        series.left_knee = vec![None, Some(120.0), Some(95.0), None, Some(175.0)];
        assert_eq!(series.range(Joint::LeftKnee), Some((95.0, 175.0)));
        assert_eq!(series.range(Joint::RightKnee), None);
    }
}
