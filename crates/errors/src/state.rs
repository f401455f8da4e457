//! Persisted resumable-state error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StateError {
    #[error("resumable state is locked by another engine: {path}")]
    Locked { path: String },

    #[error("database error: {message}")]
    DatabaseError { message: String },

    #[error("migration failed: {message}")]
    MigrationFailed { message: String },

    #[error("state corrupted: {message}")]
    StateCorrupted { message: String },

    #[error("no registration for run {run_id}")]
    RegistrationMissing { run_id: String },
}

impl UserFacingError for StateError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::Locked { .. } => {
                Some("Wait for the other installation to finish, then retry.")
            }
            Self::StateCorrupted { .. } => {
                Some("Remove the state database to start fresh; interrupted work will not resume.")
            }
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::Locked { .. } | Self::DatabaseError { .. })
    }

    fn user_code(&self) -> Option<&'static str> {
        Some(match self {
            Self::Locked { .. } => "state.locked",
            Self::DatabaseError { .. } => "state.database",
            Self::MigrationFailed { .. } => "state.migration_failed",
            Self::StateCorrupted { .. } => "state.corrupted",
            Self::RegistrationMissing { .. } => "state.registration_missing",
        })
    }
}
