use anyhow::{Context, Result};
use chrono::{SubsecRound, Utc};
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::{
    connection::Database,
    helpers::{decode_series, encode_series, format_datetime, parse_datetime, to_i64},
    models::{NewSession, Session},
};

const SESSION_COLUMNS: &str =
    "id, patient_id, doctor_id, exercise_preset_id, recorded_at, angles_json";

fn row_to_session(row: &Row) -> Result<Session> {
    let recorded_at: String = row.get("recorded_at")?;
    let angles_json: String = row.get("angles_json")?;

    Ok(Session {
        id: row.get("id")?,
        patient_id: row.get("patient_id")?,
        doctor_id: row.get("doctor_id")?,
        exercise_preset_id: row.get("exercise_preset_id")?,
        recorded_at: parse_datetime(&recorded_at, "recorded_at")?,
        angles: decode_series(&angles_json, "angles_json")?,
    })
}

impl Database {
    /// Stores a finished recording and returns it with its assigned id.
    pub async fn insert_session(&self, mut session: NewSession) -> Result<Session> {
        // stored with microsecond precision; keep the returned copy identical to a reload
        session.recorded_at = session.recorded_at.trunc_subsecs(6);
        self.execute(move |conn| {
            let id = Uuid::new_v4().to_string();
            let frame_count = session.angles.frame_count() as u64;
            conn.execute(
                "INSERT INTO sessions (id, patient_id, doctor_id, exercise_preset_id, recorded_at, frame_count, angles_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    id,
                    session.patient_id,
                    session.doctor_id,
                    session.exercise_preset_id,
                    format_datetime(&session.recorded_at),
                    to_i64(frame_count)?,
                    encode_series(&session.angles)?,
                    format_datetime(&Utc::now()),
                ],
            )
            .with_context(|| format!("failed to insert session for patient {}", session.patient_id))?;
            Ok(session.into_session(id))
        })
        .await
    }

    /// Seeds a session under a caller-chosen id (demo data).
    pub async fn insert_session_with_id(&self, mut session: Session) -> Result<Session> {
        session.recorded_at = session.recorded_at.trunc_subsecs(6);
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO sessions (id, patient_id, doctor_id, exercise_preset_id, recorded_at, frame_count, angles_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    session.id,
                    session.patient_id,
                    session.doctor_id,
                    session.exercise_preset_id,
                    format_datetime(&session.recorded_at),
                    to_i64(session.frame_count() as u64)?,
                    encode_series(&session.angles)?,
                    format_datetime(&Utc::now()),
                ],
            )
            .with_context(|| format!("failed to insert session {}", session.id))?;
            Ok(session)
        })
        .await
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1");
            let mut stmt = conn.prepare(&sql)?;
            let session = stmt
                .query_row(params![session_id], |row| Ok(row_to_session(row)))
                .optional()?
                .transpose()?;
            Ok(session)
        })
        .await
    }

    /// Sessions for one patient, newest first.
    pub async fn list_sessions_for_patient(&self, patient_id: &str) -> Result<Vec<Session>> {
        let patient_id = patient_id.to_string();
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {SESSION_COLUMNS} FROM sessions
                 WHERE patient_id = ?1
                 ORDER BY recorded_at DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params![patient_id])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }
            Ok(sessions)
        })
        .await
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<bool> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let rows_affected =
                conn.execute("DELETE FROM sessions WHERE id = ?1", params![session_id])?;
            Ok(rows_affected > 0)
        })
        .await
    }
}
