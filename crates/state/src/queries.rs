//! Runtime SQL queries for resumable state

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use sqlx::{query, Row, Sqlite, Transaction};
use strap_errors::{Error, StateError};
use strap_types::{
    PackageRecord, Registration, ResumeRecord, RunId, RunOutcome, Status, TopLevelAction, Uuid,
};

fn corrupted(message: impl Into<String>) -> Error {
    StateError::StateCorrupted {
        message: message.into(),
    }
    .into()
}

/// Decode a stored enum tag through its serde representation
fn decode<T: DeserializeOwned>(column: &str, value: String) -> Result<T, Error> {
    serde_json::from_value(serde_json::Value::String(value.clone()))
        .map_err(|_| corrupted(format!("invalid {column} value '{value}'")))
}

fn decode_time(column: &str, value: &str) -> Result<DateTime<Utc>, Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| corrupted(format!("invalid {column} timestamp '{value}': {e}")))
}

/// Insert a run and make it the only one carrying the in-progress marker
pub async fn insert_run(
    tx: &mut Transaction<'_, Sqlite>,
    registration: &Registration,
) -> Result<(), Error> {
    query("UPDATE runs SET in_progress = 0 WHERE in_progress = 1")
        .execute(&mut **tx)
        .await?;

    query(
        "INSERT INTO runs (run_id, action, started_at, in_progress)
         VALUES (?1, ?2, ?3, 1)",
    )
    .bind(registration.run_id.to_string())
    .bind(registration.action.as_str())
    .bind(registration.started_at.to_rfc3339())
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Fail with `RegistrationMissing` unless the run exists
pub async fn ensure_run(tx: &mut Transaction<'_, Sqlite>, run_id: RunId) -> Result<(), Error> {
    let row = query("SELECT 1 FROM runs WHERE run_id = ?1")
        .bind(run_id.to_string())
        .fetch_optional(&mut **tx)
        .await?;

    match row {
        Some(_) => Ok(()),
        None => Err(StateError::RegistrationMissing {
            run_id: run_id.to_string(),
        }
        .into()),
    }
}

/// Append one package record to a run
pub async fn insert_package_record(
    tx: &mut Transaction<'_, Sqlite>,
    run_id: RunId,
    record: &PackageRecord,
) -> Result<(), Error> {
    query(
        "INSERT INTO package_records
            (run_id, package_id, action, status, restart_required, rollback, recorded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )
    .bind(run_id.to_string())
    .bind(&record.package_id)
    .bind(record.action.as_str())
    .bind(record.status)
    .bind(record.restart_required)
    .bind(record.rollback)
    .bind(record.recorded_at.to_rfc3339())
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Write the final outcome of a run
pub async fn finish_run(
    tx: &mut Transaction<'_, Sqlite>,
    run_id: RunId,
    outcome: RunOutcome,
    clear_marker: bool,
) -> Result<(), Error> {
    let result = query(
        "UPDATE runs
         SET status = ?2, restart_required = ?3, finished_at = ?4,
             in_progress = CASE WHEN ?5 THEN 0 ELSE in_progress END
         WHERE run_id = ?1",
    )
    .bind(run_id.to_string())
    .bind(outcome.status.as_str())
    .bind(outcome.restart_required)
    .bind(Utc::now().to_rfc3339())
    .bind(clear_marker)
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StateError::RegistrationMissing {
            run_id: run_id.to_string(),
        }
        .into());
    }
    Ok(())
}

/// Load the most recently registered run with its package records
pub async fn latest_run(tx: &mut Transaction<'_, Sqlite>) -> Result<Option<ResumeRecord>, Error> {
    let Some(row) = query(
        "SELECT run_id, action, started_at, in_progress, status, restart_required
         FROM runs ORDER BY rowid DESC LIMIT 1",
    )
    .fetch_optional(&mut **tx)
    .await?
    else {
        return Ok(None);
    };

    let run_id: String = row.try_get("run_id")?;
    let run_id = Uuid::parse_str(&run_id)
        .map_err(|e| corrupted(format!("invalid run id '{run_id}': {e}")))?;
    let action: TopLevelAction = decode("action", row.try_get("action")?)?;
    let started_at: String = row.try_get("started_at")?;
    let in_progress: bool = row.try_get("in_progress")?;

    let status: Option<String> = row.try_get("status")?;
    let restart_required: Option<bool> = row.try_get("restart_required")?;
    let outcome = match status {
        Some(status) => Some(RunOutcome {
            status: decode::<Status>("status", status)?,
            restart_required: restart_required.unwrap_or(false),
        }),
        None => None,
    };

    let rows = query(
        "SELECT package_id, action, status, restart_required, rollback, recorded_at
         FROM package_records WHERE run_id = ?1 ORDER BY id",
    )
    .bind(run_id.to_string())
    .fetch_all(&mut **tx)
    .await?;

    let mut packages = Vec::with_capacity(rows.len());
    for row in rows {
        let recorded_at: String = row.try_get("recorded_at")?;
        packages.push(PackageRecord {
            package_id: row.try_get("package_id")?,
            action: decode("action", row.try_get("action")?)?,
            status: row.try_get("status")?,
            restart_required: row.try_get("restart_required")?,
            rollback: row.try_get("rollback")?,
            recorded_at: decode_time("recorded_at", &recorded_at)?,
        });
    }

    Ok(Some(ResumeRecord {
        registration: Registration {
            run_id,
            action,
            started_at: decode_time("started_at", &started_at)?,
        },
        in_progress,
        packages,
        outcome,
    }))
}
