use serde::{Deserialize, Serialize};
use strap_types::{ActionState, PackageState, RequestState, Status, TopLevelAction};

/// Plan phase events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlanEvent {
    Started {
        action: TopLevelAction,
        package_count: usize,
    },

    PackagePlanned {
        package_id: String,
        current: PackageState,
        request: RequestState,
        execute: ActionState,
        rollback: ActionState,
        /// Set when no action could be chosen for the package
        failure: Option<String>,
    },

    Completed {
        status: Status,
        actionable: usize,
        requires_elevation: bool,
    },
}
