use serde::{Deserialize, Serialize};
use strap_types::{ActionState, PackageResult, RestartDisposition, RunId, Status};

use super::FailureContext;

/// Apply phase events, from registration to restart handling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApplyEvent {
    Started {
        actionable: usize,
        elevated: bool,
    },

    Registered {
        run_id: RunId,
    },

    PackageStarted {
        package_id: String,
        action: ActionState,
        rollback: bool,
    },

    Progress {
        package_id: String,
        package_percent: u8,
        overall_percent: u8,
    },

    PackageFailed {
        package_id: String,
        action: ActionState,
        attempt: u32,
        failure: FailureContext,
    },

    PackageCompleted {
        package_id: String,
        action: ActionState,
        result: PackageResult,
        restart_required: bool,
        rollback: bool,
    },

    RollbackStarted {
        failed_package: Option<String>,
        packages: usize,
    },

    RollbackCompleted {
        rolled_back: usize,
    },

    Unregistered {
        run_id: RunId,
        marker_cleared: bool,
    },

    Restart {
        disposition: RestartDisposition,
    },

    Completed {
        status: Status,
        executed: usize,
        rolled_back: usize,
    },
}
