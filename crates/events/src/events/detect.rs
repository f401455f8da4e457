use serde::{Deserialize, Serialize};
use strap_types::{PackageState, RunId, Status, Version};

use super::FailureContext;

/// Detect phase events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DetectEvent {
    Started {
        package_count: usize,
        resumed_run: Option<RunId>,
    },

    PackageStarted {
        package_id: String,
    },

    PackageCompleted {
        package_id: String,
        state: PackageState,
        version: Option<Version>,
        /// State came from an interrupted run rather than the probe
        reconciled: bool,
    },

    /// Probe failed; the package stays `Unknown`
    PackageFailed {
        package_id: String,
        failure: FailureContext,
    },

    Completed {
        status: Status,
        detected: usize,
        unknown: usize,
    },
}
