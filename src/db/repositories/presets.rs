use anyhow::{bail, Context, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::{
    connection::Database,
    helpers::{decode_series, encode_series, format_datetime, to_u32},
    models::{ExercisePreset, PresetInput},
};

fn row_to_preset(row: &Row) -> Result<ExercisePreset> {
    let duration_secs: i64 = row.get("duration_secs")?;
    let benchmark_json: String = row.get("benchmark_json")?;

    Ok(ExercisePreset {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        duration_secs: to_u32(duration_secs, "duration_secs")?,
        benchmark: decode_series(&benchmark_json, "benchmark_json")?,
    })
}

fn validate(input_duration: u32) -> Result<()> {
    if input_duration == 0 {
        bail!("preset duration must be greater than zero");
    }
    Ok(())
}

impl Database {
    pub async fn insert_preset(&self, preset: &ExercisePreset) -> Result<()> {
        validate(preset.duration_secs)?;
        let record = preset.clone();
        self.execute(move |conn| {
            let now = format_datetime(&Utc::now());
            conn.execute(
                "INSERT INTO exercise_presets (id, name, description, duration_secs, benchmark_json, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.id,
                    record.name,
                    record.description,
                    record.duration_secs,
                    encode_series(&record.benchmark)?,
                    now,
                    now,
                ],
            )
            .with_context(|| format!("failed to insert preset {}", record.id))?;
            Ok(())
        })
        .await
    }

    pub async fn create_preset(&self, input: PresetInput) -> Result<ExercisePreset> {
        let preset = input.into_preset(Uuid::new_v4().to_string());
        self.insert_preset(&preset).await?;
        Ok(preset)
    }

    pub async fn get_preset(&self, preset_id: &str) -> Result<Option<ExercisePreset>> {
        let preset_id = preset_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, description, duration_secs, benchmark_json
                 FROM exercise_presets
                 WHERE id = ?1",
            )?;
            let preset = stmt
                .query_row(params![preset_id], |row| Ok(row_to_preset(row)))
                .optional()?
                .transpose()?;
            Ok(preset)
        })
        .await
    }

    pub async fn list_presets(&self) -> Result<Vec<ExercisePreset>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, description, duration_secs, benchmark_json
                 FROM exercise_presets
                 ORDER BY name ASC",
            )?;
            let mut rows = stmt.query([])?;
            let mut presets = Vec::new();
            while let Some(row) = rows.next()? {
                presets.push(row_to_preset(row)?);
            }
            Ok(presets)
        })
        .await
    }

    pub async fn update_preset(&self, preset_id: &str, input: PresetInput) -> Result<ExercisePreset> {
        validate(input.duration_secs)?;
        let preset = input.into_preset(preset_id.to_string());
        let record = preset.clone();
        self.execute(move |conn| {
            let rows_affected = conn.execute(
                "UPDATE exercise_presets
                 SET name = ?1,
                     description = ?2,
                     duration_secs = ?3,
                     benchmark_json = ?4,
                     updated_at = ?5
                 WHERE id = ?6",
                params![
                    record.name,
                    record.description,
                    record.duration_secs,
                    encode_series(&record.benchmark)?,
                    format_datetime(&Utc::now()),
                    record.id,
                ],
            )?;

            if rows_affected == 0 {
                bail!("Exercise preset with id '{}' not found", record.id);
            }
            Ok(())
        })
        .await?;
        Ok(preset)
    }

    pub async fn delete_preset(&self, preset_id: &str) -> Result<()> {
        let preset_id = preset_id.to_string();
        self.execute(move |conn| {
            let rows_affected = conn.execute(
                "DELETE FROM exercise_presets WHERE id = ?1",
                params![preset_id],
            )?;
            if rows_affected == 0 {
                bail!("Exercise preset with id '{}' not found", preset_id);
            }
            Ok(())
        })
        .await
    }
}
