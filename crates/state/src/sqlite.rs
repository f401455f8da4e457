//! `SQLite`-backed resume store

use crate::{queries, ResumeStore};
use async_trait::async_trait;
use sqlx::{Pool, Sqlite};
use std::path::{Path, PathBuf};
use strap_errors::Error;
use strap_types::{PackageRecord, Registration, ResumeRecord, RunId, RunOutcome};

/// Resume store kept in a WAL-mode `SQLite` database
#[derive(Clone)]
pub struct SqliteResumeStore {
    pool: Pool<Sqlite>,
    db_path: PathBuf,
}

impl SqliteResumeStore {
    /// Open (creating if needed) the database at `db_path` and bring its schema up to date
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created, the
    /// database cannot be opened, or a migration fails.
    pub async fn open(db_path: &Path) -> Result<Self, Error> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io_with_path(&e, parent))?;
        }

        let pool = crate::create_pool(db_path).await?;
        crate::run_migrations(&pool).await?;
        tracing::debug!(path = %db_path.display(), "opened resume store");

        Ok(Self {
            pool,
            db_path: db_path.to_path_buf(),
        })
    }

    /// Wrap an existing pool whose schema is already migrated
    #[must_use]
    pub fn with_pool(pool: Pool<Sqlite>, db_path: PathBuf) -> Self {
        Self { pool, db_path }
    }

    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Close the pool, flushing the WAL
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl ResumeStore for SqliteResumeStore {
    async fn load(&self) -> Result<Option<ResumeRecord>, Error> {
        let mut tx = self.pool.begin().await?;
        let record = queries::latest_run(&mut tx).await?;
        tx.commit().await?;
        Ok(record)
    }

    async fn register(&self, registration: &Registration) -> Result<(), Error> {
        let mut tx = self.pool.begin().await?;
        queries::insert_run(&mut tx, registration).await?;
        tx.commit().await?;
        tracing::debug!(run_id = %registration.run_id, "registered run");
        Ok(())
    }

    async fn record_package(&self, run_id: RunId, record: &PackageRecord) -> Result<(), Error> {
        let mut tx = self.pool.begin().await?;
        queries::ensure_run(&mut tx, run_id).await?;
        queries::insert_package_record(&mut tx, run_id, record).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn unregister(
        &self,
        run_id: RunId,
        outcome: RunOutcome,
        clear_marker: bool,
    ) -> Result<(), Error> {
        let mut tx = self.pool.begin().await?;
        queries::finish_run(&mut tx, run_id, outcome, clear_marker).await?;
        tx.commit().await?;
        tracing::debug!(%run_id, status = %outcome.status, clear_marker, "unregistered run");
        Ok(())
    }
}
