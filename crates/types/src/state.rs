//! Persisted resumable-state type definitions

use crate::{ActionState, Status, TopLevelAction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Identifier of one Apply run
pub type RunId = Uuid;

/// Written when Apply registers, before any package runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub run_id: RunId,
    pub action: TopLevelAction,
    pub started_at: DateTime<Utc>,
}

impl Registration {
    #[must_use]
    pub fn new(action: TopLevelAction) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            action,
            started_at: Utc::now(),
        }
    }
}

/// Outcome of one package action within a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub package_id: String,
    pub action: ActionState,
    /// Installer status code, 0 on success
    pub status: i32,
    pub restart_required: bool,
    /// This record is a rollback of an earlier forward action
    pub rollback: bool,
    pub recorded_at: DateTime<Utc>,
}

impl PackageRecord {
    #[must_use]
    pub fn new(
        package_id: impl Into<String>,
        action: ActionState,
        status: i32,
        restart_required: bool,
        rollback: bool,
    ) -> Self {
        Self {
            package_id: package_id.into(),
            action,
            status,
            restart_required,
            rollback,
            recorded_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status == 0
    }
}

/// Final outcome written when Apply unregisters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub status: Status,
    pub restart_required: bool,
}

/// Everything the store knows about the most recent run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeRecord {
    pub registration: Registration,
    /// The in-progress marker; cleared only after a fully successful Apply
    pub in_progress: bool,
    pub packages: Vec<PackageRecord>,
    pub outcome: Option<RunOutcome>,
}

impl ResumeRecord {
    /// Forward actions that completed and were not rolled back afterwards,
    /// keyed by package id
    #[must_use]
    pub fn completed_actions(&self) -> BTreeMap<&str, ActionState> {
        let mut completed = BTreeMap::new();
        for record in self.packages.iter().filter(|r| r.succeeded()) {
            if record.rollback {
                completed.remove(record.package_id.as_str());
            } else if !record.action.is_none() && record.action != ActionState::Recache {
                completed.insert(record.package_id.as_str(), record.action);
            }
        }
        completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, action: ActionState, status: i32, rollback: bool) -> PackageRecord {
        PackageRecord {
            package_id: id.to_string(),
            action,
            status,
            restart_required: false,
            rollback,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn rolled_back_actions_are_not_completed() {
        let resume = ResumeRecord {
            registration: Registration::new(TopLevelAction::Install),
            in_progress: true,
            packages: vec![
                record("a", ActionState::Install, 0, false),
                record("b", ActionState::Install, 0, false),
                record("c", ActionState::Install, 1603, false),
                record("b", ActionState::Uninstall, 0, true),
            ],
            outcome: None,
        };

        let completed = resume.completed_actions();
        assert_eq!(completed.get("a"), Some(&ActionState::Install));
        assert!(!completed.contains_key("b"));
        assert!(!completed.contains_key("c"));
    }
}
