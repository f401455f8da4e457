//! Reconciling an interrupted run on the next Detect

mod common;

use common::catalog;
use std::sync::Arc;
use strap_engine::testing::{RecordingObserver, ScriptedInstaller, ScriptedProbe};
use strap_engine::Engine;
use strap_errors::{ElevationError, Error};
use strap_state::{MemoryResumeStore, ResumeStore, SqliteResumeStore};
use strap_types::{
    ActionState, Command, PackageRecord, PackageState, Registration, ResumeRecord, Status,
    TopLevelAction,
};
use tempfile::tempdir;

fn engine(
    command: Command,
    store: Arc<dyn ResumeStore>,
    probe: ScriptedProbe,
    installer: Arc<ScriptedInstaller>,
) -> Engine {
    Engine::builder(command, catalog(&["a", "b", "c"]))
        .with_probe(Arc::new(probe))
        .with_installer(installer)
        .with_observer(Arc::new(RecordingObserver::new()))
        .with_store(store)
        .with_privileged(true)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_interrupted_run_resumes_where_it_stopped() {
    let temp = tempdir().unwrap();
    let db = temp.path().join("state.sqlite");

    // first run dies at b without rolling back a
    {
        let store = Arc::new(SqliteResumeStore::open(&db).await.unwrap());
        let installer = Arc::new(ScriptedInstaller::new().error(
            "b",
            ActionState::Install,
            Error::from(ElevationError::PeerLost),
        ));
        let mut first = engine(
            Command::new(TopLevelAction::Install),
            store.clone(),
            ScriptedProbe::new(),
            installer,
        );
        first.detect().await.unwrap();
        first.plan(TopLevelAction::Install).unwrap();
        let report = first.apply(None).await.unwrap();
        assert_eq!(report.status, Status::Failed);
        store.close().await;
    }

    // the probe cannot see a yet, but the persisted record says it was installed
    let store = Arc::new(SqliteResumeStore::open(&db).await.unwrap());
    let installer = Arc::new(ScriptedInstaller::new());
    let command = Command::new(TopLevelAction::Install).with_resumed(true);
    let mut second = engine(command, store.clone(), ScriptedProbe::new(), installer.clone());

    let detected = second.detect().await.unwrap();
    assert!(detected.resumed_run.is_some());
    assert_eq!(detected.packages[0].state, PackageState::Present);
    assert!(detected.packages[0].reconciled);
    assert_eq!(detected.packages[1].state, PackageState::Absent);
    assert!(!detected.packages[1].reconciled);

    let plan = second.plan(TopLevelAction::Install).unwrap();
    assert_eq!(plan.entries[0].execute, ActionState::None);
    assert_eq!(plan.actionable_count(), 2);

    let report = second.apply(None).await.unwrap();
    assert_eq!(report.status, Status::Success);
    assert_eq!(
        installer.actions(),
        vec![
            ("b".to_string(), ActionState::Install),
            ("c".to_string(), ActionState::Install),
        ]
    );

    let latest = store.load().await.unwrap().unwrap();
    assert!(!latest.in_progress);
}

#[tokio::test]
async fn test_completed_run_is_not_reconciled() {
    let store = Arc::new(MemoryResumeStore::new());
    let installer = Arc::new(ScriptedInstaller::new());

    let mut first = engine(
        Command::new(TopLevelAction::Install),
        store.clone(),
        ScriptedProbe::new(),
        installer.clone(),
    );
    first.detect().await.unwrap();
    first.plan(TopLevelAction::Install).unwrap();
    first.apply(None).await.unwrap();

    let command = Command::new(TopLevelAction::Install).with_resumed(true);
    let mut second = engine(command, store, ScriptedProbe::new(), installer);
    let detected = second.detect().await.unwrap();
    assert!(detected.resumed_run.is_none());
    assert!(detected.packages.iter().all(|p| !p.reconciled));
}

#[tokio::test]
async fn test_fresh_run_ignores_marker() {
    let registration = Registration::new(TopLevelAction::Install);
    let record = ResumeRecord {
        registration,
        in_progress: true,
        packages: vec![PackageRecord::new("a", ActionState::Install, 0, false, false)],
        outcome: None,
    };
    let store = Arc::new(MemoryResumeStore::with_record(record));

    let mut engine = engine(
        Command::new(TopLevelAction::Install),
        store,
        ScriptedProbe::new(),
        Arc::new(ScriptedInstaller::new()),
    );
    let detected = engine.detect().await.unwrap();
    assert_eq!(detected.packages[0].state, PackageState::Absent);
    assert!(detected.resumed_run.is_none());
}

#[tokio::test]
async fn test_rolled_back_packages_are_probed_again() {
    let registration = Registration::new(TopLevelAction::Install);
    let record = ResumeRecord {
        registration,
        in_progress: true,
        packages: vec![
            PackageRecord::new("a", ActionState::Install, 0, false, false),
            PackageRecord::new("b", ActionState::Install, 1603, false, false),
            PackageRecord::new("a", ActionState::Uninstall, 0, false, true),
        ],
        outcome: None,
    };
    let store = Arc::new(MemoryResumeStore::with_record(record));
    let probe = ScriptedProbe::new().with_state("a", PackageState::Cached);

    let command = Command::new(TopLevelAction::Install).with_resumed(true);
    let mut engine = engine(command, store, probe, Arc::new(ScriptedInstaller::new()));
    let detected = engine.detect().await.unwrap();
    assert!(detected.resumed_run.is_some());
    assert_eq!(detected.packages[0].state, PackageState::Cached);
    assert!(!detected.packages[0].reconciled);
}
