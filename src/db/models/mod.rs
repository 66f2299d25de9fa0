pub mod person;
pub mod preset;
pub mod session;

pub use person::{Doctor, DoctorInput, Patient, PatientInput};
pub use preset::{ExercisePreset, PresetInput};
pub use session::{NewSession, Session};
