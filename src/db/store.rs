//! Persistence contract consumed by the capture loop and the comparison service.

use std::future::Future;

use anyhow::Result;

use super::{
    connection::Database,
    models::{ExercisePreset, NewSession, Session},
};

/// The four operations the pipeline needs from storage. Kept as a trait so the capture loop and
/// the comparison service can be driven against any backend (tests use in-process fakes).
pub trait SessionStore: Send + Sync + 'static {
    /// Sessions for one patient, newest first.
    fn list_sessions_for_patient(
        &self,
        patient_id: &str,
    ) -> impl Future<Output = Result<Vec<Session>>> + Send;

    fn get_session(&self, session_id: &str) -> impl Future<Output = Result<Option<Session>>> + Send;

    /// Persists a finished recording; the returned session carries the assigned id.
    fn save_session(&self, session: NewSession) -> impl Future<Output = Result<Session>> + Send;

    fn list_presets(&self) -> impl Future<Output = Result<Vec<ExercisePreset>>> + Send;
}

impl SessionStore for Database {
    async fn list_sessions_for_patient(&self, patient_id: &str) -> Result<Vec<Session>> {
        Database::list_sessions_for_patient(self, patient_id).await
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        Database::get_session(self, session_id).await
    }

    async fn save_session(&self, session: NewSession) -> Result<Session> {
        self.insert_session(session).await
    }

    async fn list_presets(&self) -> Result<Vec<ExercisePreset>> {
        Database::list_presets(self).await
    }
}
