use serde::{Deserialize, Serialize};

use super::FailureContext;

/// Elevated peer lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElevationEvent {
    Requested { per_machine_packages: usize },

    /// The process already holds the needed privilege
    NotRequired,

    Established { program: String },

    Failed { failure: FailureContext },

    PeerClosed,
}
