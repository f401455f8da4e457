//! End-to-end Detect, Plan, Apply scenarios

mod common;

use common::{catalog, Fixture};
use strap_engine::testing::{RecordingObserver, ScriptedInstaller, ScriptedProbe};
use strap_engine::Lifecycle;
use strap_types::{
    ActionState, Command, PackageState, RequestState, RestartDisposition, RestartPolicy, Status,
    TopLevelAction,
};

#[tokio::test]
async fn test_install_two_absent_packages() {
    let fx = Fixture::new(
        ScriptedProbe::new(),
        ScriptedInstaller::new(),
        RecordingObserver::new(),
    );
    let command = Command::new(TopLevelAction::Install).with_restart(RestartPolicy::Automatic);
    let mut engine = fx.builder(command, catalog(&["a", "b"])).build().unwrap();

    let detected = engine.detect().await.unwrap();
    assert!(detected
        .packages
        .iter()
        .all(|p| p.state == PackageState::Absent));

    let plan = engine.plan(TopLevelAction::Install).unwrap();
    let rows: Vec<_> = plan
        .entries
        .iter()
        .map(|e| (e.package_id.as_str(), e.request, e.execute, e.rollback))
        .collect();
    assert_eq!(
        rows,
        vec![
            ("a", RequestState::Present, ActionState::Install, ActionState::Uninstall),
            ("b", RequestState::Present, ActionState::Install, ActionState::Uninstall),
        ]
    );

    let report = engine.apply(None).await.unwrap();
    assert_eq!(report.status, Status::Success);
    assert!(report.rolled_back.is_empty());
    assert_eq!(report.restart, RestartDisposition::NotRequired);
    assert_eq!(
        fx.installer.actions(),
        vec![
            ("a".to_string(), ActionState::Install),
            ("b".to_string(), ActionState::Install),
        ]
    );
    assert_eq!(engine.lifecycle(), Lifecycle::Applied);

    let record = fx.store.snapshot().await.unwrap();
    assert!(!record.in_progress);
    assert_eq!(record.outcome.unwrap().status, Status::Success);
}

#[tokio::test]
async fn test_second_install_failure_rolls_back_first() {
    let installer = ScriptedInstaller::new().fail("b", ActionState::Install, 1603, 1);
    let fx = Fixture::new(ScriptedProbe::new(), installer, RecordingObserver::new());
    let command = Command::new(TopLevelAction::Install).with_restart(RestartPolicy::Automatic);
    let mut engine = fx.builder(command, catalog(&["a", "b"])).build().unwrap();

    engine.detect().await.unwrap();
    engine.plan(TopLevelAction::Install).unwrap();
    let report = engine.apply(None).await.unwrap();

    assert_eq!(report.status, Status::Failed);
    assert_eq!(report.failed_package.as_deref(), Some("b"));
    assert_eq!(
        fx.installer.actions(),
        vec![
            ("a".to_string(), ActionState::Install),
            ("b".to_string(), ActionState::Install),
            ("a".to_string(), ActionState::Uninstall),
        ]
    );
    let rollback = &fx.installer.calls()[2];
    assert!(rollback.rollback);

    assert_eq!(report.rolled_back.len(), 1);
    assert_eq!(report.rolled_back[0].package_id, "a");
    assert_eq!(
        fx.observer.calls_matching("rollback_package_begin"),
        vec!["rollback_package_begin:a"]
    );

    // the marker survives a failed run
    let record = fx.store.snapshot().await.unwrap();
    assert!(record.in_progress);
    assert!(record.completed_actions().is_empty());
}

#[tokio::test]
async fn test_uninstall_of_absent_packages_does_nothing() {
    let fx = Fixture::new(
        ScriptedProbe::new(),
        ScriptedInstaller::new(),
        RecordingObserver::new(),
    );
    let mut engine = fx.engine(TopLevelAction::Uninstall, catalog(&["a", "b", "c"]));

    engine.detect().await.unwrap();
    let plan = engine.plan(TopLevelAction::Uninstall).unwrap();
    assert!(plan.entries.iter().all(|e| e.execute == ActionState::None));
    assert_eq!(plan.actionable_count(), 0);

    let report = engine.apply(None).await.unwrap();
    assert_eq!(report.status, Status::Success);
    assert!(report.executed.is_empty());
    assert!(fx.installer.calls().is_empty());
}
