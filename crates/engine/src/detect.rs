//! Detect phase: probe every catalog package

use crate::catalog::Catalog;
use crate::installer::StateProbe;
use crate::observer::Observer;
use strap_errors::{Error, UserFacingError};
use strap_events::{AppEvent, DetectEvent, EventEmitter, FailureContext};
use strap_state::ResumeStore;
use strap_types::{
    ActionState, DetectReport, DetectedPackage, Package, PackageState, ResumeRecord, Status,
};

/// Probe every package in catalog order
///
/// With `resumed` set and an in-progress marker in the store, packages the
/// interrupted run completed take the state their action produced.
///
/// # Errors
///
/// Returns an error only when the resume store cannot be read; probe
/// failures are recorded per package.
pub async fn run<E: EventEmitter>(
    catalog: &Catalog,
    probe: &dyn StateProbe,
    store: &dyn ResumeStore,
    resumed: bool,
    observer: &dyn Observer,
    emitter: &E,
) -> Result<DetectReport, Error> {
    let mut packages: Vec<DetectedPackage> = catalog.packages().iter().map(unknown).collect();

    if observer.on_detect_begin(catalog.len()).is_cancel() {
        return Ok(finish(packages, None, Status::Cancelled, observer, emitter));
    }

    let resume = if resumed {
        match load_marker(store).await {
            Ok(resume) => resume,
            Err(err) => {
                tracing::error!(error = %err, "resume store unreadable");
                emitter.emit_error(format!("resume store unreadable: {err}"));
                finish(packages, None, Status::Failed, observer, emitter);
                return Err(err);
            }
        }
    } else {
        None
    };
    let resumed_run = resume.as_ref().map(|r| r.registration.run_id);
    let completed = resume
        .as_ref()
        .map(ResumeRecord::completed_actions)
        .unwrap_or_default();

    emitter.emit(AppEvent::Detect(DetectEvent::Started {
        package_count: catalog.len(),
        resumed_run,
    }));

    for (index, package) in catalog.packages().iter().enumerate() {
        if observer.on_detect_package_begin(&package.id).is_cancel() {
            tracing::info!(package = %package.id, "detect cancelled by host");
            return Ok(finish(
                packages,
                resumed_run,
                Status::Cancelled,
                observer,
                emitter,
            ));
        }
        emitter.emit(AppEvent::Detect(DetectEvent::PackageStarted {
            package_id: package.id.clone(),
        }));

        let result = probe.probe(package).await;
        let detected = reconcile(package, result, completed.get(package.id.as_str()).copied());

        let status = if let Some(failure) = &detected.failure {
            tracing::warn!(package = %package.id, %failure, "probe failed");
            Status::Failed
        } else {
            tracing::debug!(package = %package.id, state = %detected.state, "detected");
            emitter.emit(AppEvent::Detect(DetectEvent::PackageCompleted {
                package_id: package.id.clone(),
                state: detected.state,
                version: detected.version.clone(),
                reconciled: detected.reconciled,
            }));
            Status::Success
        };
        let state = detected.state;
        packages[index] = detected;
        observer.on_detect_package_complete(&package.id, status, state);
    }

    Ok(finish(
        packages,
        resumed_run,
        Status::Success,
        observer,
        emitter,
    ))
}

async fn load_marker(store: &dyn ResumeStore) -> Result<Option<ResumeRecord>, Error> {
    Ok(store.load().await?.filter(|r| r.in_progress))
}

fn unknown(package: &Package) -> DetectedPackage {
    DetectedPackage {
        package_id: package.id.clone(),
        state: PackageState::Unknown,
        version: None,
        failure: None,
        reconciled: false,
    }
}

/// Combine a probe result with the action an interrupted run completed
#[must_use]
pub fn reconcile(
    package: &Package,
    probed: Result<strap_types::ProbeResult, Error>,
    completed: Option<ActionState>,
) -> DetectedPackage {
    if let Some(state) = completed.and_then(ActionState::resulting_state) {
        let version = match state {
            PackageState::Present => package.version.clone(),
            _ => None,
        };
        return DetectedPackage {
            package_id: package.id.clone(),
            state,
            version,
            failure: None,
            reconciled: true,
        };
    }

    match probed {
        Ok(result) => DetectedPackage {
            package_id: package.id.clone(),
            state: result.state,
            version: result.version,
            failure: None,
            reconciled: false,
        },
        Err(err) => DetectedPackage {
            failure: Some(err.user_message().into_owned()),
            ..unknown(package)
        },
    }
}

fn finish<E: EventEmitter>(
    packages: Vec<DetectedPackage>,
    resumed_run: Option<strap_types::RunId>,
    status: Status,
    observer: &dyn Observer,
    emitter: &E,
) -> DetectReport {
    for package in packages.iter().filter(|p| p.failure.is_some()) {
        emitter.emit(AppEvent::Detect(DetectEvent::PackageFailed {
            package_id: package.package_id.clone(),
            failure: FailureContext::new(
                Some("package.probe_failed"),
                package.failure.clone().unwrap_or_default(),
                None::<String>,
                true,
            ),
        }));
    }
    let unknown = packages
        .iter()
        .filter(|p| p.state == PackageState::Unknown)
        .count();
    emitter.emit(AppEvent::Detect(DetectEvent::Completed {
        status,
        detected: packages.len() - unknown,
        unknown,
    }));
    observer.on_detect_complete(status);

    DetectReport {
        status,
        packages,
        resumed_run,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strap_errors::PackageError;
    use strap_types::{PackageKind, ProbeResult, Version};

    fn package() -> Package {
        Package::new("runtime", PackageKind::Msi).with_version(Version::new(2, 0, 0))
    }

    #[test]
    fn probe_error_leaves_package_unknown() {
        let detected = reconcile(
            &package(),
            Err(PackageError::ProbeFailed {
                id: "runtime".into(),
                message: "registry unavailable".into(),
            }
            .into()),
            None,
        );
        assert_eq!(detected.state, PackageState::Unknown);
        assert!(detected.failure.unwrap().contains("registry unavailable"));
    }

    #[test]
    fn completed_action_wins_over_probe() {
        let detected = reconcile(
            &package(),
            Ok(ProbeResult::new(PackageState::Absent)),
            Some(ActionState::MajorUpgrade),
        );
        assert_eq!(detected.state, PackageState::Present);
        assert_eq!(detected.version, Some(Version::new(2, 0, 0)));
        assert!(detected.reconciled);

        let detected = reconcile(
            &package(),
            Ok(ProbeResult::new(PackageState::Present)),
            Some(ActionState::Uninstall),
        );
        assert_eq!(detected.state, PackageState::Absent);
        assert_eq!(detected.version, None);
    }
}
