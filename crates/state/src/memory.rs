//! In-memory resume store for hosts that do not resume and for tests

use crate::ResumeStore;
use async_trait::async_trait;
use std::sync::Arc;
use strap_errors::{Error, StateError};
use strap_types::{PackageRecord, Registration, ResumeRecord, RunId, RunOutcome};
use tokio::sync::Mutex;

/// Keeps only the latest run, like the database does for `load`
#[derive(Clone, Default)]
pub struct MemoryResumeStore {
    latest: Arc<Mutex<Option<ResumeRecord>>>,
}

impl MemoryResumeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing record, e.g. an interrupted run
    #[must_use]
    pub fn with_record(record: ResumeRecord) -> Self {
        Self {
            latest: Arc::new(Mutex::new(Some(record))),
        }
    }

    /// Copy of the latest record
    pub async fn snapshot(&self) -> Option<ResumeRecord> {
        self.latest.lock().await.clone()
    }
}

fn missing(run_id: RunId) -> Error {
    StateError::RegistrationMissing {
        run_id: run_id.to_string(),
    }
    .into()
}

#[async_trait]
impl ResumeStore for MemoryResumeStore {
    async fn load(&self) -> Result<Option<ResumeRecord>, Error> {
        Ok(self.latest.lock().await.clone())
    }

    async fn register(&self, registration: &Registration) -> Result<(), Error> {
        *self.latest.lock().await = Some(ResumeRecord {
            registration: registration.clone(),
            in_progress: true,
            packages: Vec::new(),
            outcome: None,
        });
        Ok(())
    }

    async fn record_package(&self, run_id: RunId, record: &PackageRecord) -> Result<(), Error> {
        let mut latest = self.latest.lock().await;
        match latest.as_mut() {
            Some(run) if run.registration.run_id == run_id => {
                run.packages.push(record.clone());
                Ok(())
            }
            _ => Err(missing(run_id)),
        }
    }

    async fn unregister(
        &self,
        run_id: RunId,
        outcome: RunOutcome,
        clear_marker: bool,
    ) -> Result<(), Error> {
        let mut latest = self.latest.lock().await;
        match latest.as_mut() {
            Some(run) if run.registration.run_id == run_id => {
                run.outcome = Some(outcome);
                if clear_marker {
                    run.in_progress = false;
                }
                Ok(())
            }
            _ => Err(missing(run_id)),
        }
    }
}
