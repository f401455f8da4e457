#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Detect, Plan and Apply orchestration for strap
//!
//! The [`Engine`] discovers what is installed, computes an action plan that
//! reconciles it with a requested end state, and executes that plan with
//! rollback, optionally through an elevated peer process. Every step is
//! reported to an [`Observer`], which is also how a host cancels or steers
//! the phases, and mirrored as [`strap_events::AppEvent`]s when an event
//! sender is attached.

pub mod apply;
pub mod catalog;
pub mod detect;
pub mod elevation;
mod engine;
pub mod installer;
pub mod observer;
pub mod plan;
pub mod testing;

pub use catalog::Catalog;
pub use elevation::{
    is_privileged, serve_peer, ElevatedInstaller, ElevationBroker, PeerConnection, PeerLauncher,
    ProcessLauncher,
};
pub use engine::{Engine, EngineBuilder, Lifecycle};
pub use installer::{
    ActionOutcome, ActionRequest, PackageInstaller, ProgressSink, Restarter, StateProbe,
};
pub use observer::{Decision, NoopObserver, Observer};
