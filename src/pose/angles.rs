//! Per-frame joint angle extraction.
//!
//! Each tracked joint is defined by three landmarks (proximal, vertex, distal). The angle at the
//! vertex comes from the law of cosines over the three pairwise distances. Missing or
//! low-confidence landmarks, and coincident points, leave the joint undetermined (`None`).

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use super::keypoint::{BodyPart, Keypoint, Pose};

/// Landmarks scoring below this are not trusted for angle computation.
pub const MIN_KEYPOINT_SCORE: f64 = 0.5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Joint {
    LeftElbow,
    RightElbow,
    LeftKnee,
    RightKnee,
}

impl Joint {
    pub const ALL: [Joint; 4] = [
        Joint::LeftElbow,
        Joint::RightElbow,
        Joint::LeftKnee,
        Joint::RightKnee,
    ];

    /// (proximal, vertex, distal)
    pub fn landmarks(self) -> (BodyPart, BodyPart, BodyPart) {
        match self {
            Joint::LeftElbow => (BodyPart::LeftShoulder, BodyPart::LeftElbow, BodyPart::LeftWrist),
            Joint::RightElbow => (
                BodyPart::RightShoulder,
                BodyPart::RightElbow,
                BodyPart::RightWrist,
            ),
            Joint::LeftKnee => (BodyPart::LeftHip, BodyPart::LeftKnee, BodyPart::LeftAnkle),
            Joint::RightKnee => (BodyPart::RightHip, BodyPart::RightKnee, BodyPart::RightAnkle),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Joint::LeftElbow => "leftElbow",
            Joint::RightElbow => "rightElbow",
            Joint::LeftKnee => "leftKnee",
            Joint::RightKnee => "rightKnee",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Joint::LeftElbow => "Left Elbow",
            Joint::RightElbow => "Right Elbow",
            Joint::LeftKnee => "Left Knee",
            Joint::RightKnee => "Right Knee",
        }
    }
}

impl fmt::Display for Joint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Joint {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Joint::ALL
            .into_iter()
            .find(|joint| joint.as_str().eq_ignore_ascii_case(value))
            .ok_or_else(|| {
                format!("unknown joint '{value}' (expected leftElbow, rightElbow, leftKnee or rightKnee)")
            })
    }
}

/// Angles (degrees) for one frame. `None` means undetermined, which is distinct from 0°.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JointAngles {
    pub left_elbow: Option<f64>,
    pub right_elbow: Option<f64>,
    pub left_knee: Option<f64>,
    pub right_knee: Option<f64>,
}

impl JointAngles {
    pub fn get(&self, joint: Joint) -> Option<f64> {
        match joint {
            Joint::LeftElbow => self.left_elbow,
            Joint::RightElbow => self.right_elbow,
            Joint::LeftKnee => self.left_knee,
            Joint::RightKnee => self.right_knee,
        }
    }

    pub fn determined_count(&self) -> usize {
        Joint::ALL
            .into_iter()
            .filter(|joint| self.get(*joint).is_some())
            .count()
    }
}

pub fn extract_angles(pose: &Pose) -> JointAngles {
    extract_angles_with_threshold(pose, MIN_KEYPOINT_SCORE)
}

pub fn extract_angles_with_threshold(pose: &Pose, min_score: f64) -> JointAngles {
    let angle = |joint| joint_angle(pose, joint, min_score);
    JointAngles {
        left_elbow: angle(Joint::LeftElbow),
        right_elbow: angle(Joint::RightElbow),
        left_knee: angle(Joint::LeftKnee),
        right_knee: angle(Joint::RightKnee),
    }
}

pub fn joint_angle(pose: &Pose, joint: Joint, min_score: f64) -> Option<f64> {
    let (proximal, vertex, distal) = joint.landmarks();
    vertex_angle(
        pose.find(proximal)?,
        pose.find(vertex)?,
        pose.find(distal)?,
        min_score,
    )
}

/// Angle at `p2` formed by `p1`-`p2`-`p3`.
fn vertex_angle(p1: &Keypoint, p2: &Keypoint, p3: &Keypoint, min_score: f64) -> Option<f64> {
    // written as a negated >= so NaN scores fail the gate too
    if [p1, p2, p3].iter().any(|kp| !(kp.score >= min_score)) {
        return None;
    }

    let a = p2.position.distance(&p3.position);
    let b = p1.position.distance(&p3.position);
    let c = p1.position.distance(&p2.position);

    if a == 0.0 || c == 0.0 {
        return None;
    }

    // clamp: rounding can push collinear configurations just outside acos' domain
    let cosine = ((a * a + c * c - b * b) / (2.0 * a * c)).clamp(-1.0, 1.0);
    let degrees = cosine.acos().to_degrees();
    degrees.is_finite().then_some(degrees)
}
