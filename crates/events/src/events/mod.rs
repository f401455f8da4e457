use serde::{Deserialize, Serialize};

use crate::EventSource;
use strap_errors::UserFacingError;

/// Structured failure information shared across domains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureContext {
    /// Stable error code, when the error has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Short user-facing message.
    pub message: String,
    /// Optional remediation hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Whether retrying the operation might succeed.
    pub retryable: bool,
}

impl FailureContext {
    /// Construct a new failure context.
    #[must_use]
    pub fn new(
        code: Option<impl Into<String>>,
        message: impl Into<String>,
        hint: Option<impl Into<String>>,
        retryable: bool,
    ) -> Self {
        Self {
            code: code.map(Into::into),
            message: message.into(),
            hint: hint.map(Into::into),
            retryable,
        }
    }

    /// Build failure context from a `UserFacingError` implementation.
    #[must_use]
    pub fn from_error<E: UserFacingError + ?Sized>(error: &E) -> Self {
        Self::new(
            error.user_code(),
            error.user_message().into_owned(),
            error.user_hint(),
            error.is_retryable(),
        )
    }
}

pub mod apply;
pub mod detect;
pub mod elevation;
pub mod general;
pub mod plan;

pub use apply::*;
pub use detect::*;
pub use elevation::*;
pub use general::*;
pub use plan::*;

/// Top-level application event enum that aggregates all domain-specific events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "domain", content = "event", rename_all = "snake_case")]
pub enum AppEvent {
    /// Warnings and errors outside a single phase event
    General(GeneralEvent),
    /// Package state detection
    Detect(DetectEvent),
    /// Per-package action selection
    Plan(PlanEvent),
    /// Execution, rollback and restart handling
    Apply(ApplyEvent),
    /// Elevated peer lifecycle
    Elevation(ElevationEvent),
}

impl AppEvent {
    /// Identify the source domain for this event (used for metadata/logging).
    #[must_use]
    pub fn event_source(&self) -> EventSource {
        match self {
            Self::General(_) => EventSource::General,
            Self::Detect(_) => EventSource::Detect,
            Self::Plan(_) => EventSource::Plan,
            Self::Apply(_) => EventSource::Apply,
            Self::Elevation(_) => EventSource::Elevation,
        }
    }

    /// Determine the appropriate tracing log level for this event
    #[must_use]
    pub fn log_level(&self) -> tracing::Level {
        use tracing::Level;

        match self {
            // Error-level events
            Self::General(GeneralEvent::Error { .. })
            | Self::Elevation(ElevationEvent::Failed { .. })
            | Self::Apply(ApplyEvent::PackageFailed { .. }) => Level::ERROR,

            // Warning-level events
            Self::General(GeneralEvent::Warning { .. })
            | Self::Detect(DetectEvent::PackageFailed { .. })
            | Self::Apply(ApplyEvent::RollbackStarted { .. })
            | Self::Plan(PlanEvent::PackagePlanned {
                failure: Some(_), ..
            }) => Level::WARN,

            // Debug-level events (progress updates, internal state)
            Self::Detect(DetectEvent::PackageStarted { .. })
            | Self::Plan(PlanEvent::PackagePlanned { .. }) => Level::DEBUG,

            Self::Apply(ApplyEvent::Progress { .. }) => Level::TRACE,

            // Default to INFO for most events
            _ => Level::INFO,
        }
    }

    /// Get the log target for this event (for structured logging)
    #[must_use]
    pub fn log_target(&self) -> &'static str {
        match self {
            Self::General(_) => "strap::events::general",
            Self::Detect(_) => "strap::events::detect",
            Self::Plan(_) => "strap::events::plan",
            Self::Apply(_) => "strap::events::apply",
            Self::Elevation(_) => "strap::events::elevation",
        }
    }
}
