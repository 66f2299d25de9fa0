use std::{future::Future, sync::Arc};

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::pose::Pose;

/// One video frame as handed to the pose estimator.
#[derive(Debug, Clone)]
pub struct Frame {
    pub sequence: u64,
    pub captured_at: DateTime<Utc>,
    pub width: u32,
    pub height: u32,
    pub pixels: Arc<[u8]>,
}

/// Camera or other frame source. Owned exclusively by one capture loop.
pub trait CaptureDevice: Send + 'static {
    fn open(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Latest frame, or `None` when the device has nothing new yet.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    fn release(&mut self);
}

/// Pose model. Shared with in-flight estimate tasks, hence `Sync`.
pub trait PoseEstimator: Send + Sync + 'static {
    fn warm_up(&self) -> impl Future<Output = Result<()>> + Send;

    fn estimate(&self, frame: &Frame) -> impl Future<Output = Result<Pose>> + Send;
}
