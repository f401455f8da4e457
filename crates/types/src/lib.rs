#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Core type definitions for the strap installation engine
//!
//! This crate provides the state model shared by every phase: package
//! descriptors, detected/requested/action states, the host command, the
//! plan, terminal statuses and phase reports.

pub mod action;
pub mod package;
pub mod plan;
pub mod reports;
pub mod state;
pub mod status;

// Re-export commonly used types
pub use action::{ActionState, Command, DisplayMode, RequestState, RestartPolicy, TopLevelAction};
pub use package::{Package, PackageKind, PackageState, ProbeResult};
pub use plan::{Plan, PlanEntry};
pub use reports::{
    ApplyReport, DetectReport, DetectedPackage, PackageOutcome, PackageResult, PlanReport,
    RestartDisposition,
};
pub use semver::Version;
pub use state::{PackageRecord, Registration, ResumeRecord, RunId, RunOutcome};
pub use status::Status;
pub use uuid::Uuid;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle of the host window that owns any elevation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowHandle(pub u64);

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Plain,
    Tty,
    Json,
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::Tty
    }
}

/// Color output choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorChoice {
    Always,
    Auto,
    Never,
}

// Implement clap::ValueEnum for ColorChoice
impl clap::ValueEnum for ColorChoice {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Always, Self::Auto, Self::Never]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(match self {
            Self::Always => clap::builder::PossibleValue::new("always"),
            Self::Auto => clap::builder::PossibleValue::new("auto"),
            Self::Never => clap::builder::PossibleValue::new("never"),
        })
    }
}

impl Default for ColorChoice {
    fn default() -> Self {
        Self::Auto
    }
}
