mod connection;
pub mod helpers;
mod migrations;
pub mod models;
mod repositories;
pub mod store;

pub use connection::Database;
pub use models::{
    Doctor, DoctorInput, ExercisePreset, NewSession, Patient, PatientInput, PresetInput, Session,
};
pub use store::SessionStore;
