use serde::{Deserialize, Serialize};

/// The 17 landmarks emitted by PoseNet / MoveNet style single-person models.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum BodyPart {
    Nose,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Position) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// A single landmark observation for one frame, in frame pixel space.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Keypoint {
    pub part: BodyPart,
    pub position: Position,
    /// Detector confidence (0.0..=1.0)
    pub score: f64,
}

impl Keypoint {
    pub fn new(part: BodyPart, x: f64, y: f64, score: f64) -> Self {
        Self {
            part,
            position: Position::new(x, y),
            score,
        }
    }
}

/// All keypoints detected in one frame. Lives for a single capture iteration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Pose {
    pub keypoints: Vec<Keypoint>,
    pub score: f64,
}

impl Pose {
    pub fn new(keypoints: Vec<Keypoint>, score: f64) -> Self {
        Self { keypoints, score }
    }

    /// First keypoint reported for `part`, if the model emitted one.
    pub fn find(&self, part: BodyPart) -> Option<&Keypoint> {
        self.keypoints.iter().find(|kp| kp.part == part)
    }
}
