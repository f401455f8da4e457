//! Elevation broker and privileged peer
//!
//! Per-machine actions run in a separate privileged process. The broker
//! launches it, transfers the immutable plan and command, and hands back an
//! [`ElevatedInstaller`] that forwards each action over a duplex channel of
//! newline-delimited JSON messages. The peer refuses any action the plan
//! does not contain.

mod broker;
mod channel;
mod launcher;
mod peer;
mod privilege;
pub mod protocol;

pub use broker::{ElevatedInstaller, ElevationBroker};
pub use channel::{read_message, write_message, BoxedReader, BoxedWriter};
pub use launcher::{PeerConnection, PeerLauncher, ProcessLauncher, PEER_SUBCOMMAND};
pub use peer::serve_peer;
pub use privilege::is_privileged;
