#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Resumable state for strap
//!
//! This crate persists the in-progress marker an Apply writes when it
//! registers, the outcome of every package action, and the final run
//! outcome, so an interrupted installation can be reconciled on the next
//! Detect. It also provides the exclusive lock that keeps two engines from
//! sharing one state directory.

pub mod lock;
pub mod memory;
mod queries;
pub mod sqlite;

pub use lock::StateLock;
pub use memory::MemoryResumeStore;
pub use sqlite::SqliteResumeStore;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::time::Duration;
use strap_errors::{Error, StateError};
use strap_types::{PackageRecord, Registration, ResumeRecord, RunId, RunOutcome};

/// Durable record of Apply progress
///
/// One run is registered at a time; registering a new run supersedes the
/// marker of any earlier one.
#[async_trait]
pub trait ResumeStore: Send + Sync {
    /// Most recent run, if any run was ever registered
    async fn load(&self) -> Result<Option<ResumeRecord>, Error>;

    /// Write the in-progress marker for a new run
    async fn register(&self, registration: &Registration) -> Result<(), Error>;

    /// Append the outcome of one forward or rollback action
    async fn record_package(&self, run_id: RunId, record: &PackageRecord) -> Result<(), Error>;

    /// Persist the final outcome; the marker survives unless `clear_marker`
    async fn unregister(
        &self,
        run_id: RunId,
        outcome: RunOutcome,
        clear_marker: bool,
    ) -> Result<(), Error>;
}

/// Create a new `SQLite` connection pool
///
/// # Errors
///
/// Returns an error if the database connection fails or configuration is invalid.
pub async fn create_pool(db_path: &Path) -> Result<Pool<Sqlite>, Error> {
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(2)
        .connect_with(options)
        .await
        .map_err(|e| {
            Error::from(StateError::DatabaseError {
                message: e.to_string(),
            })
        })?;

    if let Ok(mut conn) = pool.acquire().await {
        let _ = sqlx::query("PRAGMA synchronous = FULL")
            .execute(&mut *conn)
            .await;
    }

    Ok(pool)
}

/// Run database migrations
///
/// # Errors
///
/// Returns an error if any migration fails to execute.
pub async fn run_migrations(pool: &Pool<Sqlite>) -> Result<(), Error> {
    sqlx::migrate!("./migrations").run(pool).await.map_err(|e| {
        StateError::MigrationFailed {
            message: e.to_string(),
        }
        .into()
    })
}
