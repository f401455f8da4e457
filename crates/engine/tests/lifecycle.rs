//! Phase ordering and transition rules

mod common;

use common::{catalog, Fixture};
use strap_engine::testing::{RecordingObserver, ScriptedInstaller, ScriptedProbe};
use strap_engine::{Engine, Lifecycle};
use strap_errors::{EngineError, Error};
use strap_types::{Command, PackageState, Status, TopLevelAction};

fn fixture() -> Fixture {
    Fixture::new(
        ScriptedProbe::new(),
        ScriptedInstaller::new(),
        RecordingObserver::new(),
    )
}

fn is_invalid_transition(err: &Error) -> bool {
    matches!(err, Error::Engine(EngineError::InvalidTransition { .. }))
}

#[tokio::test]
async fn test_plan_before_detect_is_rejected() {
    let fx = fixture();
    let mut engine = fx.engine(TopLevelAction::Install, catalog(&["a"]));

    let err = engine.plan(TopLevelAction::Install).unwrap_err();
    assert!(is_invalid_transition(&err));
    assert_eq!(engine.lifecycle(), Lifecycle::Created);
}

#[tokio::test]
async fn test_apply_before_plan_is_rejected() {
    let fx = fixture();
    let mut engine = fx.engine(TopLevelAction::Install, catalog(&["a"]));
    engine.detect().await.unwrap();

    let err = engine.apply(None).await.unwrap_err();
    assert!(is_invalid_transition(&err));
    assert_eq!(engine.lifecycle(), Lifecycle::Detected);
    assert!(fx.installer.calls().is_empty());
}

#[tokio::test]
async fn test_detect_again_discards_plan() {
    let fx = fixture();
    let mut engine = fx.engine(TopLevelAction::Install, catalog(&["a"]));
    engine.detect().await.unwrap();
    engine.plan(TopLevelAction::Install).unwrap();
    assert!(engine.planned().is_some());

    engine.detect().await.unwrap();
    assert_eq!(engine.lifecycle(), Lifecycle::Detected);
    assert!(engine.planned().is_none());

    // re-planning with a different action replaces the plan
    engine.plan(TopLevelAction::Install).unwrap();
    let report = engine.plan(TopLevelAction::Uninstall).unwrap();
    assert_eq!(report.action, TopLevelAction::Uninstall);
    assert_eq!(engine.planned().unwrap().action(), TopLevelAction::Uninstall);
}

#[tokio::test]
async fn test_apply_is_terminal() {
    let fx = fixture();
    let mut engine = fx.engine(TopLevelAction::Install, catalog(&["a"]));
    engine.detect().await.unwrap();
    engine.plan(TopLevelAction::Install).unwrap();
    let report = engine.apply(None).await.unwrap();
    assert_eq!(report.status, Status::Success);
    assert_eq!(engine.lifecycle(), Lifecycle::Applied);

    assert!(is_invalid_transition(&engine.detect().await.unwrap_err()));
    assert!(is_invalid_transition(&engine.apply(None).await.unwrap_err()));
}

#[tokio::test]
async fn test_detect_never_leaves_packages_uninitialized() {
    let probe = ScriptedProbe::new()
        .with_state("a", PackageState::Present)
        .with_failure("b", "registry unreadable");
    let fx = Fixture::new(probe, ScriptedInstaller::new(), RecordingObserver::new());
    let mut engine = fx.engine(TopLevelAction::Install, catalog(&["a", "b", "c"]));

    let report = engine.detect().await.unwrap();
    assert_eq!(report.status, Status::Success);
    let states: Vec<_> = report.packages.iter().map(|p| p.state).collect();
    assert_eq!(
        states,
        vec![PackageState::Present, PackageState::Unknown, PackageState::Absent]
    );
    assert!(report.packages[1].failure.is_some());
}

#[tokio::test]
async fn test_cancelled_detect_is_terminal() {
    let observer = RecordingObserver::new().cancel_at("detect_package_begin:b");
    let fx = Fixture::new(ScriptedProbe::new(), ScriptedInstaller::new(), observer);
    let mut engine = fx.engine(TopLevelAction::Install, catalog(&["a", "b", "c"]));

    let report = engine.detect().await.unwrap();
    assert_eq!(report.status, Status::Cancelled);
    assert_eq!(engine.lifecycle(), Lifecycle::Cancelled);
    assert_eq!(fx.probe.calls(), vec!["a".to_string()]);
    // unprobed packages are still reported, as Unknown
    assert_eq!(report.packages[2].state, PackageState::Unknown);
    assert!(engine.plan(TopLevelAction::Install).is_err());
}

#[tokio::test]
async fn test_builder_requires_collaborators() {
    let result = Engine::builder(Command::new(TopLevelAction::Install), catalog(&["a"])).build();
    assert!(matches!(
        result,
        Err(Error::Engine(EngineError::MissingComponent { .. }))
    ));
}

#[tokio::test]
async fn test_observer_sees_phases_in_order() {
    let fx = fixture();
    let mut engine = fx.engine(TopLevelAction::Install, catalog(&["a"]));
    engine.detect().await.unwrap();
    engine.plan(TopLevelAction::Install).unwrap();
    engine.apply(None).await.unwrap();

    let calls = fx.observer.calls();
    let expected = [
        "detect_begin",
        "detect_package_begin:a",
        "detect_package_complete:a:absent",
        "detect_complete:success",
        "plan_begin",
        "plan_package_begin:a",
        "plan_package_complete:a:install",
        "plan_complete:success",
        "apply_begin",
        "register_begin",
        "register_complete:success",
        "execute_begin",
        "execute_package_begin:a",
        "execute_package_complete:a:install:0",
        "execute_complete:success",
        "unregister_begin",
        "unregister_complete:success",
        "apply_complete:success:NotRequired",
    ];
    assert_eq!(calls, expected);
}
