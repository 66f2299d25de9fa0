mod controller;
mod source;
mod state;
pub mod synthetic;

pub use controller::{CaptureConfig, CaptureController, CaptureOutcome, CaptureRequest};
pub use source::{CaptureDevice, Frame, PoseEstimator};
pub use state::{CaptureSnapshot, CaptureState, CaptureStatus};
