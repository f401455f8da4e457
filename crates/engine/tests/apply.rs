//! Execution, error decisions, rollback and restart handling

mod common;

use common::{catalog, package, Fixture};
use std::sync::Arc;
use strap_engine::testing::{
    RecordingObserver, RecordingRestarter, ScriptedInstaller, ScriptedProbe,
};
use strap_engine::{ActionOutcome, Catalog, Decision, Lifecycle};
use strap_errors::{ElevationError, Error};
use strap_types::{
    ActionState, Command, PackageResult, PackageState, RestartDisposition, RestartPolicy, Status,
    TopLevelAction, Version,
};

async fn run(fx: &Fixture, command: Command, catalog: Catalog) -> strap_types::ApplyReport {
    let mut engine = fx.builder(command, catalog).build().unwrap();
    engine.detect().await.unwrap();
    engine.plan(command.action).unwrap();
    engine.apply(None).await.unwrap()
}

fn install() -> Command {
    Command::new(TopLevelAction::Install)
}

#[tokio::test]
async fn test_retry_reruns_failed_package() {
    let installer = ScriptedInstaller::new().fail("b", ActionState::Install, 1603, 1);
    let observer = RecordingObserver::new().on_error_answers([Decision::Retry]);
    let fx = Fixture::new(ScriptedProbe::new(), installer, observer);

    let report = run(&fx, install(), catalog(&["a", "b"])).await;
    assert_eq!(report.status, Status::Success);
    assert_eq!(report.executed[1].attempts, 2);
    assert_eq!(report.executed[1].result, PackageResult::Succeeded);
    assert_eq!(fx.observer.calls_matching("error:"), vec!["error:b:1"]);
    assert_eq!(fx.installer.calls().len(), 3);
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let installer = ScriptedInstaller::new().fail("b", ActionState::Install, 1603, 10);
    let observer = RecordingObserver::new().on_error_answers([Decision::Retry; 10]);
    let fx = Fixture::new(ScriptedProbe::new(), installer, observer);
    let mut engine = fx
        .builder(install(), catalog(&["a", "b"]))
        .with_max_retries(1)
        .build()
        .unwrap();
    engine.detect().await.unwrap();
    engine.plan(TopLevelAction::Install).unwrap();
    let report = engine.apply(None).await.unwrap();

    assert_eq!(report.status, Status::Failed);
    assert_eq!(fx.observer.calls_matching("error:"), vec!["error:b:1", "error:b:2"]);
    assert_eq!(
        fx.installer.actions(),
        vec![
            ("a".to_string(), ActionState::Install),
            ("b".to_string(), ActionState::Install),
            ("b".to_string(), ActionState::Install),
            ("a".to_string(), ActionState::Uninstall),
        ]
    );
}

#[tokio::test]
async fn test_ignore_continues_without_rollback() {
    let installer = ScriptedInstaller::new().fail("b", ActionState::Install, 1618, 1);
    let observer = RecordingObserver::new().on_error_answers([Decision::Ignore]);
    let fx = Fixture::new(ScriptedProbe::new(), installer, observer);

    let report = run(&fx, install(), catalog(&["a", "b", "c"])).await;
    assert_eq!(report.status, Status::Success);
    assert!(report.rolled_back.is_empty());
    assert_eq!(report.executed[1].result, PackageResult::Ignored { status: 1618 });
    assert_eq!(report.executed.len(), 3);
}

#[tokio::test]
async fn test_cancel_halts_without_rollback() {
    let observer = RecordingObserver::new().cancel_at("execute_package_begin:b");
    let fx = Fixture::new(ScriptedProbe::new(), ScriptedInstaller::new(), observer);
    let mut engine = fx.builder(install(), catalog(&["a", "b", "c"])).build().unwrap();
    engine.detect().await.unwrap();
    engine.plan(TopLevelAction::Install).unwrap();
    let report = engine.apply(None).await.unwrap();

    assert_eq!(report.status, Status::Cancelled);
    assert!(report.rolled_back.is_empty());
    assert_eq!(
        fx.installer.actions(),
        vec![("a".to_string(), ActionState::Install)]
    );
    assert_eq!(engine.lifecycle(), Lifecycle::Cancelled);

    // cancelled runs stay resumable
    let record = fx.store.snapshot().await.unwrap();
    assert!(record.in_progress);
    assert_eq!(record.completed_actions().len(), 1);
}

#[tokio::test]
async fn test_cancel_from_progress_stops_the_package() {
    let observer = RecordingObserver::new().cancel_at("execute_progress:a");
    let fx = Fixture::new(ScriptedProbe::new(), ScriptedInstaller::new(), observer);

    let report = run(&fx, install(), catalog(&["a", "b"])).await;
    assert_eq!(report.status, Status::Cancelled);
    assert_eq!(report.executed.len(), 1);
    assert_eq!(
        report.executed[0].result,
        PackageResult::Failed {
            status: Status::Cancelled.exit_code()
        }
    );
    assert!(report.rolled_back.is_empty());
}

#[tokio::test]
async fn test_apply_begin_cancel_runs_nothing() {
    let observer = RecordingObserver::new().cancel_at("apply_begin");
    let fx = Fixture::new(ScriptedProbe::new(), ScriptedInstaller::new(), observer);

    let report = run(&fx, install(), catalog(&["a"])).await;
    assert_eq!(report.status, Status::Cancelled);
    assert!(report.run_id.is_none());
    assert!(fx.installer.calls().is_empty());
    assert!(fx.store.snapshot().await.is_none());
}

#[tokio::test]
async fn test_progress_is_monotonic() {
    let installer = ScriptedInstaller::new().with_progress(vec![10, 60, 30, 100, 90]);
    let fx = Fixture::new(ScriptedProbe::new(), installer, RecordingObserver::new());

    run(&fx, install(), catalog(&["a", "b", "c"])).await;
    let progress = fx.observer.progress();
    assert_eq!(progress.len(), 15);

    let mut last_overall = 0;
    for window in progress.windows(2) {
        if window[0].0 == window[1].0 {
            assert!(window[1].1 >= window[0].1);
        }
    }
    for (_, package, overall) in &progress {
        assert!(*package <= 100);
        assert!(*overall >= last_overall);
        last_overall = *overall;
    }
    assert_eq!(last_overall, 100);
}

#[tokio::test]
async fn test_restart_required_is_aggregated() {
    let installer = ScriptedInstaller::new().outcome(
        "b",
        ActionState::Install,
        ActionOutcome::success().with_restart(true),
    );
    let fx = Fixture::new(ScriptedProbe::new(), installer, RecordingObserver::new());
    let restarter = Arc::new(RecordingRestarter::default());
    let command = install().with_restart(RestartPolicy::Automatic);
    let mut engine = fx
        .builder(command, catalog(&["a", "b"]))
        .with_restarter(restarter.clone())
        .build()
        .unwrap();
    engine.detect().await.unwrap();
    engine.plan(TopLevelAction::Install).unwrap();
    let report = engine.apply(None).await.unwrap();

    assert_eq!(report.status, Status::RestartRequired);
    assert_eq!(report.status.exit_code(), 3010);
    assert_eq!(report.restart, RestartDisposition::Initiated);
    assert_eq!(restarter.count(), 1);

    // a restart still counts as success, so the marker is cleared
    let record = fx.store.snapshot().await.unwrap();
    assert!(!record.in_progress);
    assert!(record.outcome.unwrap().restart_required);
}

#[tokio::test]
async fn test_prompt_policy_defers_to_observer() {
    let installer = ScriptedInstaller::new().outcome(
        "a",
        ActionState::Install,
        ActionOutcome::success().with_restart(true),
    );
    let fx = Fixture::new(ScriptedProbe::new(), installer, RecordingObserver::new());

    let report = run(&fx, install(), catalog(&["a"])).await;
    assert_eq!(report.restart, RestartDisposition::Deferred);
    assert_eq!(fx.observer.calls_matching("restart_required").len(), 1);
}

#[tokio::test]
async fn test_rollback_skips_actions_without_inverse() {
    let probe = ScriptedProbe::new()
        .with_state("a", PackageState::Present)
        .with_state("c", PackageState::Present);
    let installer = ScriptedInstaller::new().fail("c", ActionState::Maintenance, 1603, 1);
    let fx = Fixture::new(probe, installer, RecordingObserver::new());

    let report = run(
        &fx,
        Command::new(TopLevelAction::Repair),
        catalog(&["a", "b", "c"]),
    )
    .await;
    assert_eq!(report.status, Status::Failed);
    assert_eq!(
        fx.installer.actions(),
        vec![
            ("a".to_string(), ActionState::Maintenance),
            ("b".to_string(), ActionState::Install),
            ("c".to_string(), ActionState::Maintenance),
            ("b".to_string(), ActionState::Uninstall),
        ]
    );
}

#[tokio::test]
async fn test_upgrade_rolls_back_to_previous_version() {
    let upgraded = package("a").with_version(Version::new(2, 0, 0));
    let catalog = Catalog::new(vec![upgraded, package("b")]).unwrap();
    let probe = ScriptedProbe::new().with_version("a", PackageState::Present, Version::new(1, 4, 0));
    let installer = ScriptedInstaller::new().fail("b", ActionState::Install, 1603, 1);
    let fx = Fixture::new(probe, installer, RecordingObserver::new());

    let report = run(&fx, install(), catalog).await;
    assert_eq!(report.status, Status::Failed);

    let calls = fx.installer.calls();
    assert_eq!(calls[0].action, ActionState::MajorUpgrade);
    assert_eq!(calls[0].version, Some(Version::new(2, 0, 0)));
    let undo = calls.last().unwrap();
    assert_eq!(undo.package_id, "a");
    assert_eq!(undo.action, ActionState::Install);
    assert!(undo.rollback);
    assert_eq!(undo.version, Some(Version::new(1, 4, 0)));
}

#[tokio::test]
async fn test_cached_package_is_recached_first() {
    let probe = ScriptedProbe::new().with_state("a", PackageState::Cached);
    let fx = Fixture::new(probe, ScriptedInstaller::new(), RecordingObserver::new());

    let report = run(&fx, install(), catalog(&["a"])).await;
    assert_eq!(report.status, Status::Success);
    assert_eq!(
        fx.installer.actions(),
        vec![
            ("a".to_string(), ActionState::Recache),
            ("a".to_string(), ActionState::Install),
        ]
    );
    let progress = fx.observer.progress();
    assert_eq!(progress.last().map(|p| p.1), Some(100));
    assert!(progress.iter().any(|p| p.1 == 50));
}

#[tokio::test]
async fn test_local_installer_error_rolls_back() {
    let installer =
        ScriptedInstaller::new().error("b", ActionState::Install, Error::internal("installer bug"));
    let fx = Fixture::new(ScriptedProbe::new(), installer, RecordingObserver::new());

    let report = run(&fx, install(), catalog(&["a", "b", "c"])).await;
    assert_eq!(report.status, Status::Failed);
    assert_eq!(report.failed_package.as_deref(), Some("b"));
    assert_eq!(fx.observer.calls_matching("error:"), vec!["error:b:1"]);
    assert_eq!(report.rolled_back.len(), 1);
    assert_eq!(report.rolled_back[0].package_id, "a");
    assert_eq!(
        fx.installer.actions(),
        vec![
            ("a".to_string(), ActionState::Install),
            ("b".to_string(), ActionState::Install),
            ("a".to_string(), ActionState::Uninstall),
        ]
    );
}

#[tokio::test]
async fn test_peer_errors_from_the_local_installer_are_package_failures() {
    // Only the elevated channel can be lost; a local installer reporting it
    // is an ordinary failure.
    let installer = ScriptedInstaller::new().error(
        "b",
        ActionState::Install,
        Error::from(ElevationError::PeerLost),
    );
    let fx = Fixture::new(ScriptedProbe::new(), installer, RecordingObserver::new());

    let report = run(&fx, install(), catalog(&["a", "b"])).await;
    assert_eq!(report.status, Status::Failed);
    assert_eq!(fx.observer.calls_matching("error:"), vec!["error:b:1"]);
    assert_eq!(report.rolled_back.len(), 1);
}

#[tokio::test]
async fn test_retry_keeps_package_progress_monotonic() {
    let installer = ScriptedInstaller::new()
        .with_progress(vec![30, 80])
        .fail("a", ActionState::Install, 1603, 1);
    let observer = RecordingObserver::new().on_error_answers([Decision::Retry]);
    let fx = Fixture::new(ScriptedProbe::new(), installer, observer);

    let report = run(&fx, install(), catalog(&["a"])).await;
    assert_eq!(report.status, Status::Success);
    assert_eq!(report.executed[0].attempts, 2);

    let package: Vec<u8> = fx.observer.progress().iter().map(|p| p.1).collect();
    assert_eq!(package.len(), 4);
    assert!(package.windows(2).all(|w| w[1] >= w[0]), "{package:?}");
}

#[tokio::test]
async fn test_unregister_cancel_keeps_marker() {
    let observer = RecordingObserver::new().cancel_at("unregister_begin");
    let fx = Fixture::new(ScriptedProbe::new(), ScriptedInstaller::new(), observer);

    let report = run(&fx, install(), catalog(&["a"])).await;
    assert_eq!(report.status, Status::Success);
    let record = fx.store.snapshot().await.unwrap();
    assert!(record.in_progress);
    assert_eq!(record.outcome.unwrap().status, Status::Success);
}

#[tokio::test]
async fn test_events_follow_the_run() {
    let (tx, mut rx) = strap_events::channel();
    let fx = Fixture::new(
        ScriptedProbe::new(),
        ScriptedInstaller::new(),
        RecordingObserver::new(),
    );
    let mut engine = fx
        .builder(install(), catalog(&["a"]))
        .with_event_sender(tx)
        .build()
        .unwrap();
    engine.detect().await.unwrap();
    engine.plan(TopLevelAction::Install).unwrap();
    let report = engine.apply(None).await.unwrap();
    drop(engine);

    let run_id = report.run_id.unwrap().to_string();
    let mut registered = false;
    let mut completed = false;
    while let Some(message) = rx.recv().await {
        match message.event {
            strap_events::AppEvent::Apply(strap_events::ApplyEvent::Registered { .. }) => {
                assert_eq!(message.meta.correlation_id.as_deref(), Some(run_id.as_str()));
                registered = true;
            }
            strap_events::AppEvent::Apply(strap_events::ApplyEvent::Completed {
                status, ..
            }) => {
                assert_eq!(status, Status::Success);
                completed = true;
            }
            _ => {}
        }
    }
    assert!(registered && completed);
}
