//! Engine lifecycle and catalog error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EngineError {
    #[error("invalid phase transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("catalog corrupted: {message}")]
    CatalogCorrupted { message: String },

    #[error("catalog could not be read from {path}: {message}")]
    CatalogUnreadable { path: String, message: String },

    #[error("detected state does not match the catalog: {message}")]
    DetectionMismatch { message: String },

    #[error("missing collaborator: {component}")]
    MissingComponent { component: String },
}

impl UserFacingError for EngineError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::InvalidTransition { .. } => Some("Run detect, then plan, then apply."),
            Self::CatalogCorrupted { .. } | Self::CatalogUnreadable { .. } => {
                Some("Check the catalog file for duplicate or empty package ids.")
            }
            _ => None,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        Some(match self {
            Self::InvalidTransition { .. } => "engine.invalid_transition",
            Self::CatalogCorrupted { .. } => "engine.catalog_corrupted",
            Self::CatalogUnreadable { .. } => "engine.catalog_unreadable",
            Self::DetectionMismatch { .. } => "engine.detection_mismatch",
            Self::MissingComponent { .. } => "engine.missing_component",
        })
    }
}
