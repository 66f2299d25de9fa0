pub mod angles;
pub mod keypoint;
pub mod series;

pub use angles::{
    extract_angles, extract_angles_with_threshold, joint_angle, Joint, JointAngles,
    MIN_KEYPOINT_SCORE,
};
pub use keypoint::{BodyPart, Keypoint, Pose, Position};
pub use series::AngleSeries;
