//! Elevated peer and channel error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ElevationError {
    #[error("elevation declined by host")]
    Declined,

    #[error("failed to launch elevated peer {program}: {message}")]
    LaunchFailed { program: String, message: String },

    #[error("elevated peer handshake failed: {message}")]
    HandshakeFailed { message: String },

    #[error("elevated peer connection lost")]
    PeerLost,

    #[error("elevated peer did not respond within {timeout_secs}s")]
    PeerUnresponsive { timeout_secs: u64 },

    #[error("protocol violation: {message}")]
    Protocol { message: String },

    #[error("request rejected by elevated peer: {message}")]
    Rejected { message: String },
}

impl ElevationError {
    /// Failures of the channel itself; nothing more can be sent to the peer.
    #[must_use]
    pub fn is_channel_failure(&self) -> bool {
        matches!(
            self,
            Self::PeerLost | Self::PeerUnresponsive { .. } | Self::Protocol { .. }
        )
    }
}

impl UserFacingError for ElevationError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::Declined | Self::LaunchFailed { .. } => Some(
                "Run strap as an administrator or configure [elevation].launcher in the config file.",
            ),
            Self::PeerLost | Self::PeerUnresponsive { .. } => {
                Some("Re-run with --resume to continue the interrupted installation.")
            }
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::PeerLost | Self::PeerUnresponsive { .. })
    }

    fn user_code(&self) -> Option<&'static str> {
        Some(match self {
            Self::Declined => "elevation.declined",
            Self::LaunchFailed { .. } => "elevation.launch_failed",
            Self::HandshakeFailed { .. } => "elevation.handshake_failed",
            Self::PeerLost => "elevation.peer_lost",
            Self::PeerUnresponsive { .. } => "elevation.peer_unresponsive",
            Self::Protocol { .. } => "elevation.protocol",
            Self::Rejected { .. } => "elevation.rejected",
        })
    }
}
