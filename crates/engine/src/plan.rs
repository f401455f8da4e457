//! Plan phase: choose an execute and rollback action per package
//!
//! The decision table is a pure function of detected state, requested state,
//! top-level action and the package's declared kind and version, so planning
//! the same inputs twice always yields the same plan.

use crate::catalog::Catalog;
use crate::observer::Observer;
use strap_errors::{EngineError, Error};
use strap_events::{AppEvent, EventEmitter, PlanEvent};
use strap_types::{
    ActionState, DetectedPackage, Package, PackageKind, PackageState, Plan, PlanEntry,
    PlanReport, RequestState, Status, TopLevelAction, Version,
};

/// Execute action chosen for one package
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Choice {
    pub execute: ActionState,
    /// Refresh the cached payload before `execute`
    pub cache_first: bool,
}

impl Choice {
    const NONE: Self = Self::plain(ActionState::None);

    const fn plain(execute: ActionState) -> Self {
        Self {
            execute,
            cache_first: false,
        }
    }

    const fn from_cache(execute: ActionState) -> Self {
        Self {
            execute,
            cache_first: true,
        }
    }
}

/// Decision table over (current, request, action, package kind)
#[must_use]
pub fn choose(
    package: &Package,
    current: PackageState,
    installed: Option<&Version>,
    request: RequestState,
    action: TopLevelAction,
) -> Choice {
    match (request, current) {
        (RequestState::None, _) | (_, PackageState::Unknown) => Choice::NONE,

        (RequestState::Present, PackageState::Absent) => Choice::plain(install_action(package)),
        (RequestState::Present | RequestState::Repair, PackageState::Cached) => {
            Choice::from_cache(ActionState::Install)
        }
        (RequestState::Present, PackageState::Present) => {
            if let Some(upgrade) = upgrade_action(package.version.as_ref(), installed) {
                Choice::plain(upgrade)
            } else if action == TopLevelAction::Modify
                && matches!(package.kind, PackageKind::Msi | PackageKind::Exe)
            {
                Choice::plain(ActionState::Maintenance)
            } else {
                Choice::NONE
            }
        }

        (RequestState::Repair, PackageState::Present) => match package.kind {
            PackageKind::Msu => Choice::NONE,
            _ => Choice::plain(ActionState::Maintenance),
        },
        (RequestState::Repair, PackageState::Absent) => Choice::plain(ActionState::Install),

        (RequestState::Absent, PackageState::Present) => Choice::plain(ActionState::Uninstall),
        (RequestState::Absent, _) => Choice::NONE,

        (RequestState::Cache, PackageState::Absent) => Choice::plain(ActionState::Recache),
        (RequestState::Cache, _) => Choice::NONE,
    }
}

fn install_action(package: &Package) -> ActionState {
    match package.kind {
        PackageKind::Msp => ActionState::Patch,
        PackageKind::Msi if package.administrative => ActionState::AdminInstall,
        _ => ActionState::Install,
    }
}

fn upgrade_action(available: Option<&Version>, installed: Option<&Version>) -> Option<ActionState> {
    let (available, installed) = (available?, installed?);
    if available <= installed {
        return None;
    }
    Some(if available.major == installed.major {
        ActionState::MinorUpgrade
    } else {
        ActionState::MajorUpgrade
    })
}

/// Build the plan entry for one package
#[must_use]
pub fn entry(
    package: &Package,
    detected: &DetectedPackage,
    request: RequestState,
    action: TopLevelAction,
) -> PlanEntry {
    let choice = choose(
        package,
        detected.state,
        detected.version.as_ref(),
        request,
        action,
    );
    let failure = (detected.state == PackageState::Unknown && request != RequestState::None)
        .then(|| match &detected.failure {
            Some(reason) => format!("state of {} is unknown: {reason}", package.id),
            None => format!("state of {} is unknown", package.id),
        });

    PlanEntry {
        package_id: package.id.clone(),
        per_machine: package.per_machine,
        current: detected.state,
        request,
        execute: choice.execute,
        rollback: choice.execute.rollback(),
        cache_first: choice.cache_first,
        previous_version: detected.version.clone(),
        target_version: (!choice.execute.is_none())
            .then(|| package.version.clone())
            .flatten(),
        failure,
    }
}

/// Result of a completed plan phase
pub struct Planned {
    pub report: PlanReport,
    /// `None` when the host cancelled
    pub plan: Option<Plan>,
}

/// Plan every package in catalog order
///
/// # Errors
///
/// Returns `EngineError::DetectionMismatch` when the detected packages do
/// not line up with the catalog.
pub fn run<E: EventEmitter>(
    catalog: &Catalog,
    detected: &[DetectedPackage],
    action: TopLevelAction,
    observer: &dyn Observer,
    emitter: &E,
) -> Result<Planned, Error> {
    if let Err(err) = check_alignment(catalog, detected) {
        tracing::error!(error = %err, "cannot plan");
        finish(action, Vec::new(), Status::Failed, observer, emitter);
        return Err(err);
    }

    emitter.emit(AppEvent::Plan(PlanEvent::Started {
        action,
        package_count: catalog.len(),
    }));
    if observer.on_plan_begin(catalog.len()).is_cancel() {
        let report = finish(action, Vec::new(), Status::Cancelled, observer, emitter);
        return Ok(Planned { report, plan: None });
    }

    let mut entries = Vec::with_capacity(catalog.len());
    for (package, state) in catalog.packages().iter().zip(detected) {
        let mut request = action.default_request(state.state);
        if observer
            .on_plan_package_begin(&package.id, &mut request)
            .is_cancel()
        {
            tracing::info!(package = %package.id, "plan cancelled by host");
            let report = finish(action, entries, Status::Cancelled, observer, emitter);
            return Ok(Planned { report, plan: None });
        }

        let planned = entry(package, state, request, action);
        tracing::debug!(
            package = %planned.package_id,
            current = %planned.current,
            request = %planned.request,
            execute = %planned.execute,
            rollback = %planned.rollback,
            "planned"
        );
        emitter.emit(AppEvent::Plan(PlanEvent::PackagePlanned {
            package_id: planned.package_id.clone(),
            current: planned.current,
            request: planned.request,
            execute: planned.execute,
            rollback: planned.rollback,
            failure: planned.failure.clone(),
        }));
        observer.on_plan_package_complete(&planned);
        entries.push(planned);
    }

    let plan = Plan::new(action, entries.clone());
    let report = finish(action, entries, Status::Success, observer, emitter);
    Ok(Planned {
        report,
        plan: Some(plan),
    })
}

fn check_alignment(catalog: &Catalog, detected: &[DetectedPackage]) -> Result<(), Error> {
    if catalog.len() != detected.len() {
        return Err(EngineError::DetectionMismatch {
            message: format!(
                "{} packages in catalog, {} detected",
                catalog.len(),
                detected.len()
            ),
        }
        .into());
    }
    for (package, state) in catalog.packages().iter().zip(detected) {
        if package.id != state.package_id {
            return Err(EngineError::DetectionMismatch {
                message: format!(
                    "expected {} but detected {}",
                    package.id, state.package_id
                ),
            }
            .into());
        }
    }
    Ok(())
}

fn finish<E: EventEmitter>(
    action: TopLevelAction,
    entries: Vec<PlanEntry>,
    status: Status,
    observer: &dyn Observer,
    emitter: &E,
) -> PlanReport {
    let requires_elevation = entries.iter().any(PlanEntry::requires_elevation);
    let report = PlanReport {
        status,
        action,
        entries,
        requires_elevation,
    };
    emitter.emit(AppEvent::Plan(PlanEvent::Completed {
        status,
        actionable: report.actionable_count(),
        requires_elevation,
    }));
    observer.on_plan_complete(status);
    report
}
