//! Terminal phase status

use serde::{Deserialize, Serialize};
use std::fmt;
use strap_errors::{ElevationError, Error};

/// Status carried by every phase-terminal event
///
/// Exit codes follow the conventions Windows installers use so hosts can
/// pass them straight through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    /// Succeeded, but a restart is needed to finish
    RestartRequired,
    Failed,
    Cancelled,
    /// The privileged peer could not be obtained; nothing was executed
    ElevationFailed,
}

impl Status {
    /// Process exit code for this status
    #[must_use]
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::RestartRequired => 3010,
            Self::Failed => 1603,
            Self::Cancelled => 1602,
            Self::ElevationFailed => 740,
        }
    }

    /// Exit code for hosts that keep only the low byte of an exit status
    ///
    /// Codes stay clear of 1 (generic error) and 2 (usage error).
    #[must_use]
    pub fn posix_exit_code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::RestartRequired => 10,
            Self::Failed => 3,
            Self::Cancelled => 130,
            Self::ElevationFailed => 77,
        }
    }

    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success | Self::RestartRequired)
    }

    /// Status a phase ends with when it unwinds on `err`
    #[must_use]
    pub fn from_error(err: &Error) -> Self {
        match err {
            Error::Cancelled => Self::Cancelled,
            Error::Elevation(
                ElevationError::Declined
                | ElevationError::LaunchFailed { .. }
                | ElevationError::HandshakeFailed { .. },
            ) => Self::ElevationFailed,
            _ => Self::Failed,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::RestartRequired => "restart_required",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::ElevationFailed => "elevation_failed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
