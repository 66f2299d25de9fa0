//! Deterministic stand-ins for a camera and a pose model. The estimator draws a skeleton whose
//! four joints follow raised-cosine repetitions with seeded noise, so a whole capture can run
//! without hardware.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use anyhow::{bail, Result};
use chrono::Utc;
use rand::{rngs::StdRng, SeedableRng};

use super::source::{CaptureDevice, Frame, PoseEstimator};
use crate::{
    pose::{AngleSeries, BodyPart, Joint, Keypoint, Pose, Position},
    seed::{jitter, repetition_angle, FRAMES_PER_REPETITION},
};

const DETECTED_SCORE: f64 = 0.92;
const LOW_SCORE: f64 = 0.3;

pub struct SyntheticCamera {
    width: u32,
    height: u32,
    sequence: u64,
    opened: bool,
    available: bool,
    blank: Arc<[u8]>,
}

impl SyntheticCamera {
    pub fn new(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize * 3;
        Self {
            width,
            height,
            sequence: 0,
            opened: false,
            available: true,
            blank: Arc::from(vec![0u8; len]),
        }
    }

    /// A camera that refuses to open.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new(0, 0)
        }
    }

    pub fn is_open(&self) -> bool {
        self.opened
    }
}

impl CaptureDevice for SyntheticCamera {
    async fn open(&mut self) -> Result<()> {
        if !self.available {
            bail!("camera not available");
        }
        self.opened = true;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if !self.opened {
            bail!("camera is not open");
        }
        let frame = Frame {
            sequence: self.sequence,
            captured_at: Utc::now(),
            width: self.width,
            height: self.height,
            pixels: Arc::clone(&self.blank),
        };
        self.sequence += 1;
        Ok(Some(frame))
    }

    fn release(&mut self) {
        self.opened = false;
    }
}

/// Angle range swept by each joint, in degrees.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionProfile {
    pub left_elbow: (f64, f64),
    pub right_elbow: (f64, f64),
    pub left_knee: (f64, f64),
    pub right_knee: (f64, f64),
    pub frames_per_rep: usize,
    /// Peak-to-peak width of the uniform noise added to every angle.
    pub noise: f64,
}

impl MotionProfile {
    pub fn arm_lifts() -> Self {
        Self {
            left_elbow: (90.0, 170.0),
            right_elbow: (90.0, 170.0),
            left_knee: (175.0, 180.0),
            right_knee: (175.0, 180.0),
            frames_per_rep: FRAMES_PER_REPETITION,
            noise: 2.0,
        }
    }

    pub fn half_squats() -> Self {
        Self {
            left_elbow: (160.0, 170.0),
            right_elbow: (160.0, 170.0),
            left_knee: (90.0, 175.0),
            right_knee: (90.0, 175.0),
            frames_per_rep: FRAMES_PER_REPETITION,
            noise: 3.0,
        }
    }

    /// Sweeps the range each joint covers in a benchmark; joints with no data stay straight.
    pub fn from_benchmark(benchmark: &AngleSeries, noise: f64) -> Self {
        let range = |joint| benchmark.range(joint).unwrap_or((175.0, 180.0));
        Self {
            left_elbow: range(Joint::LeftElbow),
            right_elbow: range(Joint::RightElbow),
            left_knee: range(Joint::LeftKnee),
            right_knee: range(Joint::RightKnee),
            frames_per_rep: FRAMES_PER_REPETITION,
            noise,
        }
    }

    pub fn range(&self, joint: Joint) -> (f64, f64) {
        match joint {
            Joint::LeftElbow => self.left_elbow,
            Joint::RightElbow => self.right_elbow,
            Joint::LeftKnee => self.left_knee,
            Joint::RightKnee => self.right_knee,
        }
    }

    /// Noise-free angle of `joint` at `frame`.
    pub fn angle_at(&self, joint: Joint, frame: usize) -> f64 {
        let (min, max) = self.range(joint);
        repetition_angle(min, max, frame, self.frames_per_rep)
    }
}

pub struct SyntheticPoseEstimator {
    profile: MotionProfile,
    rng: Mutex<StdRng>,
    latency: Option<Duration>,
    fail_every: Option<u64>,
    low_confidence_every: Option<u64>,
}

impl SyntheticPoseEstimator {
    pub fn new(profile: MotionProfile, seed: u64) -> Self {
        Self {
            profile,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            latency: None,
            fail_every: None,
            low_confidence_every: None,
        }
    }

    /// Delay before each estimate resolves.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fails every `n`th frame.
    pub fn with_failures_every(mut self, n: u64) -> Self {
        self.fail_every = (n > 0).then_some(n);
        self
    }

    /// Reports every `n`th frame with scores below the detection threshold.
    pub fn with_low_confidence_every(mut self, n: u64) -> Self {
        self.low_confidence_every = (n > 0).then_some(n);
        self
    }

    fn pose_for(&self, frame: &Frame) -> Pose {
        let low_confidence = matches!(self.low_confidence_every, Some(n) if frame.sequence % n == 0);
        let score = if low_confidence { LOW_SCORE } else { DETECTED_SCORE };

        let index = usize::try_from(frame.sequence).unwrap_or(usize::MAX);
        let angles: Vec<(Joint, f64)> = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            Joint::ALL
                .into_iter()
                .map(|joint| {
                    let noise = jitter(&mut *rng, self.profile.noise);
                    let angle = (self.profile.angle_at(joint, index) + noise).clamp(0.0, 180.0);
                    (joint, angle)
                })
                .collect()
        };

        let width = f64::from(frame.width);
        let height = f64::from(frame.height);
        let limb = height * 0.12;

        let mut keypoints = vec![Keypoint::new(BodyPart::Nose, width * 0.5, height * 0.1, score)];
        for (joint, angle) in angles {
            let (proximal, vertex, distal) = joint.landmarks();
            let pivot = vertex_position(joint, width, height);
            let (upper, lower) = limb_endpoints(pivot, limb, angle);
            keypoints.push(Keypoint::new(proximal, upper.x, upper.y, score));
            keypoints.push(Keypoint::new(vertex, pivot.x, pivot.y, score));
            keypoints.push(Keypoint::new(distal, lower.x, lower.y, score));
        }

        Pose::new(keypoints, score)
    }
}

impl PoseEstimator for SyntheticPoseEstimator {
    async fn warm_up(&self) -> Result<()> {
        Ok(())
    }

    async fn estimate(&self, frame: &Frame) -> Result<Pose> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if matches!(self.fail_every, Some(n) if frame.sequence % n == 0) {
            bail!("pose model returned no result for frame {}", frame.sequence);
        }
        Ok(self.pose_for(frame))
    }
}

fn vertex_position(joint: Joint, width: f64, height: f64) -> Position {
    match joint {
        Joint::LeftElbow => Position::new(width * 0.35, height * 0.45),
        Joint::RightElbow => Position::new(width * 0.65, height * 0.45),
        Joint::LeftKnee => Position::new(width * 0.45, height * 0.75),
        Joint::RightKnee => Position::new(width * 0.55, height * 0.75),
    }
}

/// Proximal point straight above the vertex, distal point rotated `angle_deg` away from it.
fn limb_endpoints(vertex: Position, length: f64, angle_deg: f64) -> (Position, Position) {
    let theta = angle_deg.to_radians();
    let proximal = Position::new(vertex.x, vertex.y - length);
    let distal = Position::new(
        vertex.x + length * theta.sin(),
        vertex.y - length * theta.cos(),
    );
    (proximal, distal)
}
