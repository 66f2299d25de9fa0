use anyhow::{bail, Context, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::{
    connection::Database,
    helpers::format_datetime,
    models::{Doctor, DoctorInput, Patient, PatientInput},
};

fn row_to_doctor(row: &Row) -> rusqlite::Result<Doctor> {
    Ok(Doctor {
        id: row.get("id")?,
        name: row.get("name")?,
        email: row.get("email")?,
    })
}

fn row_to_patient(row: &Row) -> rusqlite::Result<Patient> {
    Ok(Patient {
        id: row.get("id")?,
        name: row.get("name")?,
        email: row.get("email")?,
        doctor_id: row.get("doctor_id")?,
    })
}

impl Database {
    pub async fn insert_doctor(&self, doctor: &Doctor) -> Result<()> {
        let record = doctor.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO doctors (id, name, email, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![record.id, record.name, record.email, format_datetime(&Utc::now())],
            )
            .with_context(|| format!("failed to insert doctor {}", record.id))?;
            Ok(())
        })
        .await
    }

    pub async fn list_doctors(&self) -> Result<Vec<Doctor>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare("SELECT id, name, email FROM doctors ORDER BY name ASC")?;
            let doctors = stmt
                .query_map([], row_to_doctor)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(doctors)
        })
        .await
    }

    pub async fn get_doctor(&self, doctor_id: &str) -> Result<Option<Doctor>> {
        let doctor_id = doctor_id.to_string();
        self.execute(move |conn| {
            let doctor = conn
                .query_row(
                    "SELECT id, name, email FROM doctors WHERE id = ?1",
                    params![doctor_id],
                    row_to_doctor,
                )
                .optional()?;
            Ok(doctor)
        })
        .await
    }

    pub async fn create_doctor(&self, input: DoctorInput) -> Result<Doctor> {
        let doctor = input.into_doctor(Uuid::new_v4().to_string());
        self.insert_doctor(&doctor).await?;
        Ok(doctor)
    }

    pub async fn update_doctor(&self, doctor_id: &str, input: DoctorInput) -> Result<Doctor> {
        let doctor = input.into_doctor(doctor_id.to_string());
        let record = doctor.clone();
        self.execute(move |conn| {
            let rows_affected = conn.execute(
                "UPDATE doctors SET name = ?1, email = ?2 WHERE id = ?3",
                params![record.name, record.email, record.id],
            )?;
            if rows_affected == 0 {
                bail!("Doctor with id '{}' not found", record.id);
            }
            Ok(())
        })
        .await?;
        Ok(doctor)
    }

    /// Refuses while patients or sessions still reference the doctor.
    pub async fn delete_doctor(&self, doctor_id: &str) -> Result<()> {
        let doctor_id = doctor_id.to_string();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let (patients, sessions): (i64, i64) = tx.query_row(
                "SELECT (SELECT COUNT(*) FROM patients WHERE doctor_id = ?1),
                        (SELECT COUNT(*) FROM sessions WHERE doctor_id = ?1)",
                params![doctor_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            if patients > 0 || sessions > 0 {
                bail!(
                    "Doctor '{}' still has {} patients and {} sessions",
                    doctor_id,
                    patients,
                    sessions
                );
            }

            let rows_affected = tx.execute("DELETE FROM doctors WHERE id = ?1", params![doctor_id])?;
            if rows_affected == 0 {
                bail!("Doctor with id '{}' not found", doctor_id);
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    pub async fn insert_patient(&self, patient: &Patient) -> Result<()> {
        let record = patient.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO patients (id, name, email, doctor_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.id,
                    record.name,
                    record.email,
                    record.doctor_id,
                    format_datetime(&Utc::now()),
                ],
            )
            .with_context(|| format!("failed to insert patient {}", record.id))?;
            Ok(())
        })
        .await
    }

    pub async fn get_patient(&self, patient_id: &str) -> Result<Option<Patient>> {
        let patient_id = patient_id.to_string();
        self.execute(move |conn| {
            let patient = conn
                .query_row(
                    "SELECT id, name, email, doctor_id FROM patients WHERE id = ?1",
                    params![patient_id],
                    row_to_patient,
                )
                .optional()?;
            Ok(patient)
        })
        .await
    }

    /// All patients, or only those under `doctor_id` when given.
    pub async fn list_patients(&self, doctor_id: Option<&str>) -> Result<Vec<Patient>> {
        let doctor_id = doctor_id.map(str::to_string);
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, email, doctor_id FROM patients
                 WHERE ?1 IS NULL OR doctor_id = ?1
                 ORDER BY name ASC",
            )?;
            let patients = stmt
                .query_map(params![doctor_id], row_to_patient)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(patients)
        })
        .await
    }

    pub async fn create_patient(&self, input: PatientInput) -> Result<Patient> {
        let patient = input.into_patient(Uuid::new_v4().to_string());
        self.insert_patient(&patient).await?;
        Ok(patient)
    }

    pub async fn update_patient(&self, patient_id: &str, input: PatientInput) -> Result<Patient> {
        let patient = input.into_patient(patient_id.to_string());
        let record = patient.clone();
        self.execute(move |conn| {
            let rows_affected = conn
                .execute(
                    "UPDATE patients SET name = ?1, email = ?2, doctor_id = ?3 WHERE id = ?4",
                    params![record.name, record.email, record.doctor_id, record.id],
                )
                .with_context(|| format!("failed to update patient {}", record.id))?;
            if rows_affected == 0 {
                bail!("Patient with id '{}' not found", record.id);
            }
            Ok(())
        })
        .await?;
        Ok(patient)
    }

    /// Deletes a patient along with their sessions. Returns how many sessions went with them.
    pub async fn delete_patient(&self, patient_id: &str) -> Result<usize> {
        let patient_id = patient_id.to_string();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let sessions =
                tx.execute("DELETE FROM sessions WHERE patient_id = ?1", params![patient_id])?;
            let rows_affected =
                tx.execute("DELETE FROM patients WHERE id = ?1", params![patient_id])?;
            if rows_affected == 0 {
                bail!("Patient with id '{}' not found", patient_id);
            }
            tx.commit()?;
            Ok(sessions)
        })
        .await
    }

    /// Wipes every table; used before reseeding demo data.
    pub async fn reset_all(&self) -> Result<()> {
        self.execute(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM sessions", [])?;
            tx.execute("DELETE FROM exercise_presets", [])?;
            tx.execute("DELETE FROM patients", [])?;
            tx.execute("DELETE FROM doctors", [])?;
            tx.commit()?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doctor(id: &str, name: &str) -> Doctor {
        Doctor {
            id: id.into(),
            name: name.into(),
            email: format!("{id}@clinic.com"),
        }
    }

    fn patient(id: &str, name: &str, doctor_id: &str) -> Patient {
        Patient {
            id: id.into(),
            name: name.into(),
            email: format!("{id}@email.com"),
            doctor_id: doctor_id.into(),
        }
    }

    #[tokio::test]
    async fn test_patients_filtered_by_doctor() {
        let db = Database::in_memory().unwrap();
        db.insert_doctor(&doctor("doc1", "Dr. Evelyn Reed")).await.unwrap();
        db.insert_doctor(&doctor("doc2", "Dr. Samuel Chen")).await.unwrap();
        db.insert_patient(&patient("pat1", "John Doe", "doc1")).await.unwrap();
        db.insert_patient(&patient("pat2", "Jane Smith", "doc1")).await.unwrap();
        db.insert_patient(&patient("pat3", "Peter Jones", "doc2")).await.unwrap();

        assert_eq!(db.list_patients(None).await.unwrap().len(), 3);
        let names: Vec<_> = db
            .list_patients(Some("doc1"))
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["Jane Smith", "John Doe"]);

        assert_eq!(
            db.get_patient("pat3").await.unwrap().map(|p| p.doctor_id),
            Some("doc2".to_string())
        );
        assert_eq!(db.list_doctors().await.unwrap().len(), 2);
        assert!(db.get_doctor("doc9").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_patient_requires_existing_doctor() {
        let db = Database::in_memory().unwrap();
        assert!(db.insert_patient(&patient("pat1", "John Doe", "doc1")).await.is_err());
    }

    #[tokio::test]
    async fn test_doctor_lifecycle() {
        let db = Database::in_memory().unwrap();
        let created = db
            .create_doctor(DoctorInput {
                name: "Dr. Evelyn Reed".into(),
                email: "e.reed@clinic.com".into(),
            })
            .await
            .unwrap();
        assert_eq!(db.get_doctor(&created.id).await.unwrap(), Some(created.clone()));

        let updated = db
            .update_doctor(
                &created.id,
                DoctorInput {
                    name: "Dr. Evelyn Reed-Park".into(),
                    email: "e.reed@clinic.com".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(db.list_doctors().await.unwrap(), vec![updated]);

        db.delete_doctor(&created.id).await.unwrap();
        assert!(db.get_doctor(&created.id).await.unwrap().is_none());
        let err = db.delete_doctor(&created.id).await.unwrap_err();
        assert!(err.to_string().contains("not found"));
        let err = db
            .update_doctor(
                &created.id,
                DoctorInput {
                    name: "Nobody".into(),
                    email: "n@clinic.com".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_doctor_with_patients_is_kept() {
        let db = Database::in_memory().unwrap();
        db.insert_doctor(&doctor("doc1", "Dr. Evelyn Reed")).await.unwrap();
        db.insert_patient(&patient("pat1", "John Doe", "doc1")).await.unwrap();

        let err = db.delete_doctor("doc1").await.unwrap_err();
        assert!(err.to_string().contains("still has 1 patients"));
        assert!(db.get_doctor("doc1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_patient_lifecycle() {
        let db = Database::in_memory().unwrap();
        db.insert_doctor(&doctor("doc1", "Dr. Evelyn Reed")).await.unwrap();
        db.insert_doctor(&doctor("doc2", "Dr. Samuel Chen")).await.unwrap();
        let input = |name: &str, doctor_id: &str| PatientInput {
            name: name.into(),
            email: "j.doe@email.com".into(),
            doctor_id: doctor_id.into(),
        };

        let created = db.create_patient(input("John Doe", "doc1")).await.unwrap();
        assert_eq!(db.get_patient(&created.id).await.unwrap(), Some(created.clone()));

        let moved = db
            .update_patient(&created.id, input("John Doe", "doc2"))
            .await
            .unwrap();
        assert_eq!(db.list_patients(Some("doc2")).await.unwrap(), vec![moved]);
        assert!(db
            .update_patient(&created.id, input("John Doe", "doc9"))
            .await
            .is_err());
        assert!(db.update_patient("ghost", input("X", "doc1")).await.is_err());

        assert_eq!(db.delete_patient(&created.id).await.unwrap(), 0);
        assert!(db.get_patient(&created.id).await.unwrap().is_none());
        let err = db.delete_patient(&created.id).await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_reset_all() {
        let db = Database::in_memory().unwrap();
        db.insert_doctor(&doctor("doc1", "Dr. Evelyn Reed")).await.unwrap();
        db.insert_patient(&patient("pat1", "John Doe", "doc1")).await.unwrap();
        db.reset_all().await.unwrap();
        assert!(db.list_doctors().await.unwrap().is_empty());
        assert!(db.list_patients(None).await.unwrap().is_empty());
    }
}
