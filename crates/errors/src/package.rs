//! Per-package probe and action error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PackageError {
    #[error("package not found: {id}")]
    NotFound { id: String },

    #[error("probe failed for {id}: {message}")]
    ProbeFailed { id: String, message: String },

    #[error("{action} failed for {id} with status {status}")]
    ActionFailed {
        id: String,
        action: String,
        status: i32,
    },

    #[error("installer unavailable for {id}: {message}")]
    InstallerUnavailable { id: String, message: String },

    #[error("invalid version: {message}")]
    InvalidVersion { message: String },
}

impl UserFacingError for PackageError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::InstallerUnavailable { .. } => {
                Some("Declare the missing command in the package's properties table.")
            }
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::ActionFailed { .. } | Self::ProbeFailed { .. })
    }

    fn user_code(&self) -> Option<&'static str> {
        Some(match self {
            Self::NotFound { .. } => "package.not_found",
            Self::ProbeFailed { .. } => "package.probe_failed",
            Self::ActionFailed { .. } => "package.action_failed",
            Self::InstallerUnavailable { .. } => "package.installer_unavailable",
            Self::InvalidVersion { .. } => "package.invalid_version",
        })
    }
}
