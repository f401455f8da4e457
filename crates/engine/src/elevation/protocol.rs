//! Messages exchanged with the elevated peer

use crate::installer::{ActionOutcome, ActionRequest};
use serde::{Deserialize, Serialize};
use strap_errors::Error;
use strap_types::{Command, Plan, WindowHandle};

/// Broker to peer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeerRequest {
    /// First message on every channel
    Hello {
        plan: Plan,
        command: Command,
        parent: Option<WindowHandle>,
    },
    Execute {
        id: u64,
        request: ActionRequest,
    },
    /// Ask the peer to stop the action `id` at its next progress report
    Cancel {
        id: u64,
    },
    Shutdown,
}

/// Peer to broker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeerResponse {
    Ready {
        pid: u32,
    },
    Progress {
        id: u64,
        percent: u8,
    },
    Completed {
        id: u64,
        outcome: ActionOutcome,
    },
    Failed {
        id: u64,
        error: Error,
    },
    /// The peer could not make sense of a request
    Error {
        message: String,
    },
}
