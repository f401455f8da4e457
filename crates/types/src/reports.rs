//! Report type definitions for the three phases

use crate::{ActionState, PackageState, PlanEntry, RunId, Status, TopLevelAction, Version};
use serde::{Deserialize, Serialize};

/// Detection result for one package
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedPackage {
    pub package_id: String,
    pub state: PackageState,
    /// Installed version reported by the probe
    pub version: Option<Version>,
    /// Probe failure message; the state is `Unknown` when set
    pub failure: Option<String>,
    /// State was taken from the persisted in-progress marker
    pub reconciled: bool,
}

/// Detect report
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DetectReport {
    pub status: Status,
    pub packages: Vec<DetectedPackage>,
    /// Run whose in-progress marker was reconciled against
    pub resumed_run: Option<RunId>,
}

/// Plan report
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlanReport {
    pub status: Status,
    pub action: TopLevelAction,
    pub entries: Vec<PlanEntry>,
    pub requires_elevation: bool,
}

impl PlanReport {
    #[must_use]
    pub fn actionable_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_actionable()).count()
    }
}

/// How a single package action ended
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PackageResult {
    Succeeded,
    Failed { status: i32 },
    /// Failed, but the host chose to continue without rolling it back
    Ignored { status: i32 },
}

impl PackageResult {
    /// Installer status code, 0 on success
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::Succeeded => 0,
            Self::Failed { status } | Self::Ignored { status } => status,
        }
    }
}

/// Result of one executed or rolled-back package action
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageOutcome {
    pub package_id: String,
    pub action: ActionState,
    pub result: PackageResult,
    pub restart_required: bool,
    pub attempts: u32,
}

/// What happened about restarting once Apply finished
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartDisposition {
    NotRequired,
    /// Required, but the restart policy is `Never`
    Suppressed,
    /// Required, and the host declined to restart now
    Deferred,
    Initiated,
}

/// Apply report
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApplyReport {
    pub run_id: Option<RunId>,
    pub status: Status,
    /// Forward actions in execution order
    pub executed: Vec<PackageOutcome>,
    /// Rollback actions in execution order
    pub rolled_back: Vec<PackageOutcome>,
    pub failed_package: Option<String>,
    pub restart: RestartDisposition,
    pub elevated: bool,
}

impl ApplyReport {
    /// Report for an Apply that ended before any package ran
    #[must_use]
    pub fn aborted(status: Status) -> Self {
        Self {
            run_id: None,
            status,
            executed: Vec::new(),
            rolled_back: Vec::new(),
            failed_package: None,
            restart: RestartDisposition::NotRequired,
            elevated: false,
        }
    }
}
