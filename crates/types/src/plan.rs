//! Action plan produced by the planner and consumed by the executor

use crate::{ActionState, PackageState, RequestState, TopLevelAction, Version};
use serde::{Deserialize, Serialize};

/// One package's planned operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub package_id: String,
    /// Actions on this package need administrative privilege
    pub per_machine: bool,
    pub current: PackageState,
    pub request: RequestState,
    pub execute: ActionState,
    pub rollback: ActionState,
    /// Refresh the cached payload before running `execute`
    #[serde(default)]
    pub cache_first: bool,
    /// Installed version before this plan runs, used to reinstall on rollback
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_version: Option<Version>,
    /// Version the catalog installs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_version: Option<Version>,
    /// Per-package planning failure; the entry is kept but never executed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl PlanEntry {
    /// Whether the executor has work to do for this entry
    #[must_use]
    pub fn is_actionable(&self) -> bool {
        !self.execute.is_none() && self.failure.is_none()
    }

    /// Whether this entry needs to run in a privileged context
    #[must_use]
    pub fn requires_elevation(&self) -> bool {
        self.per_machine && self.is_actionable()
    }

    /// Whether `action` is one the plan allows for this package, either
    /// forward or as its rollback
    #[must_use]
    pub fn permits(&self, action: ActionState) -> bool {
        if !self.is_actionable() {
            return false;
        }
        action == self.execute
            || (action == self.rollback && !self.rollback.is_none())
            || (self.cache_first && action == ActionState::Recache)
    }
}

/// Ordered, immutable action list for one Apply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    action: TopLevelAction,
    entries: Vec<PlanEntry>,
}

impl Plan {
    #[must_use]
    pub fn new(action: TopLevelAction, entries: Vec<PlanEntry>) -> Self {
        Self { action, entries }
    }

    /// Top-level action this plan was computed for
    #[must_use]
    pub fn action(&self) -> TopLevelAction {
        self.action
    }

    /// All entries in catalog order, including the ones with nothing to do
    #[must_use]
    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    /// Entries the executor will run, in order
    pub fn actionable(&self) -> impl Iterator<Item = &PlanEntry> {
        self.entries.iter().filter(|entry| entry.is_actionable())
    }

    #[must_use]
    pub fn actionable_count(&self) -> usize {
        self.actionable().count()
    }

    #[must_use]
    pub fn entry(&self, package_id: &str) -> Option<&PlanEntry> {
        self.entries.iter().find(|e| e.package_id == package_id)
    }

    /// At least one action targets a per-machine package
    #[must_use]
    pub fn requires_elevation(&self) -> bool {
        self.entries.iter().any(PlanEntry::requires_elevation)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
