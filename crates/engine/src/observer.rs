//! Observer contract between the engine and its host
//!
//! The engine calls into the observer, never the reverse. Callbacks are
//! synchronous and complete for one package before the next package starts.
//! Every `begin`, progress and error callback returns a [`Decision`] the
//! engine honors before it proceeds.

use serde::{Deserialize, Serialize};
use strap_errors::Error;
use strap_types::{
    ActionState, PackageOutcome, PackageState, PlanEntry, RequestState, RestartDisposition, Status,
};

/// Host answer to a decision-returning callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    #[default]
    Continue,
    /// Halt the current phase; persisted state stays resumable
    Cancel,
    /// Run the failed action again (only meaningful from `on_error`)
    Retry,
    /// Treat the failed action as done and move on without rollback
    Ignore,
}

impl Decision {
    #[must_use]
    pub fn is_cancel(self) -> bool {
        self == Self::Cancel
    }
}

/// Lifecycle callbacks with no-op defaults
#[allow(unused_variables)]
pub trait Observer: Send + Sync {
    fn on_detect_begin(&self, package_count: usize) -> Decision {
        Decision::Continue
    }

    fn on_detect_package_begin(&self, package_id: &str) -> Decision {
        Decision::Continue
    }

    /// `status` is `Failed` when the probe failed and the state is `Unknown`
    fn on_detect_package_complete(&self, package_id: &str, status: Status, state: PackageState) {}

    fn on_detect_complete(&self, status: Status) {}

    fn on_plan_begin(&self, package_count: usize) -> Decision {
        Decision::Continue
    }

    /// The only place a host can override the request for a single package
    fn on_plan_package_begin(&self, package_id: &str, request: &mut RequestState) -> Decision {
        Decision::Continue
    }

    fn on_plan_package_complete(&self, entry: &PlanEntry) {}

    fn on_plan_complete(&self, status: Status) {}

    fn on_apply_begin(&self) -> Decision {
        Decision::Continue
    }

    /// Cancel declines elevation; Apply then ends with `ElevationFailed`
    fn on_elevate_begin(&self) -> Decision {
        Decision::Continue
    }

    fn on_elevate_complete(&self, status: Status) {}

    fn on_register_begin(&self) -> Decision {
        Decision::Continue
    }

    fn on_register_complete(&self, status: Status) {}

    fn on_execute_begin(&self, package_count: usize) -> Decision {
        Decision::Continue
    }

    fn on_execute_package_begin(
        &self,
        package_id: &str,
        action: ActionState,
        rollback: bool,
    ) -> Decision {
        Decision::Continue
    }

    fn on_execute_progress(
        &self,
        package_id: &str,
        package_percent: u8,
        overall_percent: u8,
    ) -> Decision {
        Decision::Continue
    }

    /// `attempt` counts from 1
    fn on_error(&self, package_id: &str, error: &Error, attempt: u32) -> Decision {
        Decision::Continue
    }

    fn on_execute_package_complete(&self, outcome: &PackageOutcome) {}

    fn on_execute_complete(&self, status: Status) {}

    /// Cancel keeps the in-progress marker even after a successful run
    fn on_unregister_begin(&self) -> Decision {
        Decision::Continue
    }

    fn on_unregister_complete(&self, status: Status) {}

    /// Asked under the `Prompt` policy; returning `true` restarts now
    fn on_restart_required(&self) -> bool {
        false
    }

    fn on_apply_complete(&self, status: Status, restart: RestartDisposition) {}
}

/// Observer that accepts every default
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl Observer for NoopObserver {}
