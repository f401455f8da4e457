//! Forward execution of a plan and reverse-order rollback

use super::progress::ProgressTracker;
use super::RunEvents;
use crate::catalog::Catalog;
use crate::installer::{ActionOutcome, ActionRequest, PackageInstaller};
use crate::observer::{Decision, Observer};
use std::sync::atomic::AtomicU8;
use strap_errors::{EngineError, Error, PackageError};
use strap_events::{AppEvent, ApplyEvent, EventEmitter, FailureContext, GeneralEvent};
use strap_state::ResumeStore;
use strap_types::{
    ActionState, Command, Package, PackageOutcome, PackageRecord, PackageResult, Plan, PlanEntry,
    RunId, Status, Version,
};

/// Routes each entry to the installer allowed to run it
#[derive(Clone, Copy)]
pub struct Installers<'a> {
    local: &'a dyn PackageInstaller,
    elevated: Option<&'a dyn PackageInstaller>,
}

impl<'a> Installers<'a> {
    #[must_use]
    pub fn new(
        local: &'a dyn PackageInstaller,
        elevated: Option<&'a dyn PackageInstaller>,
    ) -> Self {
        Self { local, elevated }
    }

    /// Per-machine entries go through the elevated peer when there is one;
    /// without one the process is already privileged.
    fn for_entry(&self, entry: &PlanEntry) -> &'a dyn PackageInstaller {
        match self.elevated {
            Some(elevated) if entry.per_machine => elevated,
            _ => self.local,
        }
    }

    fn is_elevated(&self, entry: &PlanEntry) -> bool {
        self.elevated.is_some() && entry.per_machine
    }

    /// The error means the elevated channel behind `entry` is gone
    fn lost_channel(&self, entry: &PlanEntry, error: &Error) -> bool {
        self.is_elevated(entry)
            && matches!(error, Error::Elevation(err) if err.is_channel_failure())
    }
}

/// What the execute step did
#[derive(Debug, Clone)]
pub struct Execution {
    pub status: Status,
    pub executed: Vec<PackageOutcome>,
    pub rolled_back: Vec<PackageOutcome>,
    pub failed_package: Option<String>,
}

impl Execution {
    fn new() -> Self {
        Self {
            status: Status::Success,
            executed: Vec::new(),
            rolled_back: Vec::new(),
            failed_package: None,
        }
    }

    /// Any completed action, forward or rollback, asked for a restart
    #[must_use]
    pub fn restart_required(&self) -> bool {
        self.executed
            .iter()
            .chain(&self.rolled_back)
            .any(|outcome| outcome.restart_required)
    }
}

enum Flow {
    Next,
    Halt { status: Status, rollback: bool },
    /// The elevated peer is gone; only locally installed entries can be undone
    ChannelLost,
}

/// Runs the actionable entries of one plan for one registered run
pub struct Executor<'a> {
    pub plan: &'a Plan,
    pub catalog: &'a Catalog,
    pub command: Command,
    pub installers: Installers<'a>,
    pub store: &'a dyn ResumeStore,
    pub observer: &'a dyn Observer,
    pub events: &'a RunEvents,
    pub run_id: RunId,
    pub max_retries: u32,
}

impl Executor<'_> {
    /// Execute every actionable entry in plan order
    ///
    /// Package failures end in `Status::Failed` after the packages completed
    /// so far are rolled back. Cancellation halts without rollback. Losing
    /// the elevated peer fails the run and rolls back only the packages the
    /// local installer ran.
    ///
    /// # Errors
    ///
    /// Returns an error if the resume store cannot record an outcome or a
    /// plan entry has no catalog package.
    pub async fn run(&self) -> Result<Execution, Error> {
        let entries: Vec<&PlanEntry> = self.plan.actionable().collect();
        let total = entries.len();
        let mut execution = Execution::new();

        if self.observer.on_execute_begin(total).is_cancel() {
            execution.status = Status::Cancelled;
            self.observer.on_execute_complete(execution.status);
            return Ok(execution);
        }

        let overall = AtomicU8::new(0);
        let mut completed = Vec::new();
        let mut rollback = false;
        let mut channel_lost = false;

        for (index, entry) in entries.into_iter().enumerate() {
            let package = self.package(entry)?;
            if self
                .observer
                .on_execute_package_begin(&entry.package_id, entry.execute, false)
                .is_cancel()
            {
                tracing::info!(package = %entry.package_id, "execution cancelled by host");
                execution.status = Status::Cancelled;
                break;
            }

            tracing::info!(package = %entry.package_id, action = %entry.execute, "executing package");
            self.events.emit(AppEvent::Apply(ApplyEvent::PackageStarted {
                package_id: entry.package_id.clone(),
                action: entry.execute,
                rollback: false,
            }));

            let (outcome, flow) = self
                .run_package(entry, package, (index, total), &overall)
                .await?;
            self.complete(&outcome, false).await?;
            if outcome.result == PackageResult::Succeeded {
                completed.push(entry);
            }
            execution.executed.push(outcome);

            match flow {
                Flow::Next => {}
                Flow::Halt { status, rollback: undo } => {
                    if status == Status::Failed {
                        execution.failed_package = Some(entry.package_id.clone());
                    }
                    execution.status = status;
                    rollback = undo;
                    break;
                }
                Flow::ChannelLost => {
                    execution.failed_package = Some(entry.package_id.clone());
                    execution.status = Status::Failed;
                    rollback = true;
                    channel_lost = true;
                    break;
                }
            }
        }

        if rollback {
            self.rollback(&completed, &mut execution, &overall, channel_lost)
                .await?;
        }

        self.observer.on_execute_complete(execution.status);
        Ok(execution)
    }

    async fn run_package(
        &self,
        entry: &PlanEntry,
        package: &Package,
        position: (usize, usize),
        overall: &AtomicU8,
    ) -> Result<(PackageOutcome, Flow), Error> {
        let installer = self.installers.for_entry(entry);
        let tracker = ProgressTracker::new(
            self.observer,
            self.events,
            &entry.package_id,
            position,
            overall,
        );
        let mut attempt = 1;

        loop {
            let (error, status) = match self.perform(installer, entry, package, &tracker).await {
                Ok(done) if done.is_success() => {
                    let flow = if tracker.cancelled() {
                        Flow::Halt {
                            status: Status::Cancelled,
                            rollback: false,
                        }
                    } else {
                        Flow::Next
                    };
                    let outcome = outcome(
                        entry,
                        entry.execute,
                        PackageResult::Succeeded,
                        done.restart_required,
                        attempt,
                    );
                    return Ok((outcome, flow));
                }
                Ok(done) => (
                    Error::from(PackageError::ActionFailed {
                        id: entry.package_id.clone(),
                        action: entry.execute.to_string(),
                        status: done.status,
                    }),
                    done.status,
                ),
                Err(Error::Cancelled) => {
                    tracing::info!(package = %entry.package_id, "package action cancelled");
                    let result = PackageResult::Failed {
                        status: Status::Cancelled.exit_code(),
                    };
                    let flow = Flow::Halt {
                        status: Status::Cancelled,
                        rollback: false,
                    };
                    return Ok((outcome(entry, entry.execute, result, false, attempt), flow));
                }
                Err(err) if self.installers.lost_channel(entry, &err) => {
                    tracing::error!(package = %entry.package_id, error = %err, "elevated peer lost");
                    self.failed(entry, entry.execute, attempt, &err);
                    let result = PackageResult::Failed {
                        status: Status::Failed.exit_code(),
                    };
                    return Ok((
                        outcome(entry, entry.execute, result, false, attempt),
                        Flow::ChannelLost,
                    ));
                }
                Err(err) => (err, Status::Failed.exit_code()),
            };

            tracing::warn!(package = %entry.package_id, attempt, error = %error, "package action failed");
            self.failed(entry, entry.execute, attempt, &error);

            match self.observer.on_error(&entry.package_id, &error, attempt) {
                Decision::Retry if attempt <= self.max_retries => {
                    attempt += 1;
                    continue;
                }
                Decision::Retry => {
                    tracing::warn!(package = %entry.package_id, max_retries = self.max_retries, "retry limit reached");
                }
                Decision::Ignore => {
                    let result = PackageResult::Ignored { status };
                    return Ok((
                        outcome(entry, entry.execute, result, false, attempt),
                        Flow::Next,
                    ));
                }
                Decision::Continue | Decision::Cancel => {}
            }

            let result = PackageResult::Failed { status };
            let flow = Flow::Halt {
                status: Status::Failed,
                rollback: true,
            };
            return Ok((outcome(entry, entry.execute, result, false, attempt), flow));
        }
    }

    async fn perform(
        &self,
        installer: &dyn PackageInstaller,
        entry: &PlanEntry,
        package: &Package,
        tracker: &ProgressTracker<'_>,
    ) -> Result<ActionOutcome, Error> {
        let request = ActionRequest::new(package.clone(), entry.execute, self.command.display)
            .with_version(entry.target_version.clone());
        if !entry.cache_first {
            return installer.execute(&request, tracker).await;
        }

        let recache = ActionRequest::new(package.clone(), ActionState::Recache, self.command.display);
        let cached = installer.execute(&recache, &tracker.segment(0, 50)).await?;
        if !cached.is_success() {
            return Ok(cached);
        }
        if tracker.cancelled() {
            return Err(Error::Cancelled);
        }
        let installed = installer.execute(&request, &tracker.segment(50, 50)).await?;
        let restart = installed.restart_required || cached.restart_required;
        Ok(installed.with_restart(restart))
    }

    /// Undo `completed` in reverse order, best effort
    ///
    /// Once the elevated channel is lost, entries routed through it are left
    /// in place and the local ones are still undone.
    async fn rollback(
        &self,
        completed: &[&PlanEntry],
        execution: &mut Execution,
        overall: &AtomicU8,
        mut channel_lost: bool,
    ) -> Result<(), Error> {
        let targets: Vec<&PlanEntry> = completed
            .iter()
            .rev()
            .copied()
            .filter(|entry| !entry.rollback.is_none())
            .collect();
        let total = targets.len();

        tracing::info!(packages = total, failed = ?execution.failed_package, "rolling back");
        self.events.emit(AppEvent::Apply(ApplyEvent::RollbackStarted {
            failed_package: execution.failed_package.clone(),
            packages: total,
        }));

        for (index, entry) in targets.into_iter().enumerate() {
            let package = self.package(entry)?;
            if channel_lost && self.installers.is_elevated(entry) {
                tracing::warn!(package = %entry.package_id, "elevated peer lost; package left in place");
                self.events.emit(AppEvent::General(GeneralEvent::package_warning(
                    entry.package_id.clone(),
                    "elevated peer lost; left installed",
                )));
                continue;
            }
            if self
                .observer
                .on_execute_package_begin(&entry.package_id, entry.rollback, true)
                .is_cancel()
            {
                tracing::warn!("rollback cancelled by host; remaining packages are left in place");
                self.events
                    .emit_warning("rollback cancelled; remaining packages left in place");
                break;
            }
            self.events.emit(AppEvent::Apply(ApplyEvent::PackageStarted {
                package_id: entry.package_id.clone(),
                action: entry.rollback,
                rollback: true,
            }));

            let request = ActionRequest::new(package.clone(), entry.rollback, self.command.display)
                .with_rollback(true)
                .with_version(rollback_version(entry));
            let tracker = ProgressTracker::new(
                self.observer,
                self.events,
                &entry.package_id,
                (index, total),
                overall,
            );
            let installer = self.installers.for_entry(entry);

            let (result, restart) = match installer.execute(&request, &tracker).await {
                Ok(done) if done.is_success() => (PackageResult::Succeeded, done.restart_required),
                Ok(done) => (
                    PackageResult::Failed {
                        status: done.status,
                    },
                    done.restart_required,
                ),
                Err(err) => {
                    tracing::error!(package = %entry.package_id, error = %err, "rollback action failed");
                    self.failed(entry, entry.rollback, 1, &err);
                    channel_lost |= self.installers.lost_channel(entry, &err);
                    (
                        PackageResult::Failed {
                            status: Status::Failed.exit_code(),
                        },
                        false,
                    )
                }
            };

            let outcome = outcome(entry, entry.rollback, result, restart, 1);
            self.complete(&outcome, true).await?;
            execution.rolled_back.push(outcome);
        }

        self.events.emit(AppEvent::Apply(ApplyEvent::RollbackCompleted {
            rolled_back: execution.rolled_back.len(),
        }));
        Ok(())
    }

    async fn complete(&self, outcome: &PackageOutcome, rollback: bool) -> Result<(), Error> {
        let record = PackageRecord::new(
            outcome.package_id.clone(),
            outcome.action,
            outcome.result.code(),
            outcome.restart_required,
            rollback,
        );
        self.store.record_package(self.run_id, &record).await?;

        self.events.emit(AppEvent::Apply(ApplyEvent::PackageCompleted {
            package_id: outcome.package_id.clone(),
            action: outcome.action,
            result: outcome.result,
            restart_required: outcome.restart_required,
            rollback,
        }));
        self.observer.on_execute_package_complete(outcome);
        Ok(())
    }

    fn failed(&self, entry: &PlanEntry, action: ActionState, attempt: u32, error: &Error) {
        self.events.emit(AppEvent::Apply(ApplyEvent::PackageFailed {
            package_id: entry.package_id.clone(),
            action,
            attempt,
            failure: FailureContext::from_error(error),
        }));
    }

    fn package(&self, entry: &PlanEntry) -> Result<&Package, Error> {
        self.catalog.get(&entry.package_id).ok_or_else(|| {
            EngineError::DetectionMismatch {
                message: format!("plan entry {} is not in the catalog", entry.package_id),
            }
            .into()
        })
    }
}

/// Version a rollback should restore: what was installed before the plan
/// replaced or removed it
fn rollback_version(entry: &PlanEntry) -> Option<Version> {
    match entry.execute {
        ActionState::MinorUpgrade | ActionState::MajorUpgrade | ActionState::Uninstall => {
            entry.previous_version.clone()
        }
        _ => None,
    }
}

fn outcome(
    entry: &PlanEntry,
    action: ActionState,
    result: PackageResult,
    restart_required: bool,
    attempts: u32,
) -> PackageOutcome {
    PackageOutcome {
        package_id: entry.package_id.clone(),
        action,
        result,
        restart_required,
        attempts,
    }
}
