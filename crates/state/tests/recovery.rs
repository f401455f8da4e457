//! tests/recovery.rs

use chrono::Utc;
use strap_errors::{Error, StateError};
use strap_state::{MemoryResumeStore, ResumeStore, SqliteResumeStore};
use strap_types::{
    ActionState, PackageRecord, Registration, RunOutcome, Status, TopLevelAction, Uuid,
};
use tempfile::TempDir;

async fn mk_store() -> (TempDir, SqliteResumeStore) {
    let td = TempDir::new().expect("tempdir");
    let store = SqliteResumeStore::open(&td.path().join("state").join("state.sqlite"))
        .await
        .expect("open store");
    (td, store)
}

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

/// Register, complete one package, then stop without unregistering
async fn interrupt(store: &dyn ResumeStore) -> Registration {
    let registration = Registration::new(TopLevelAction::Install);
    store.register(&registration).await.unwrap();
    store
        .record_package(
            registration.run_id,
            &record("runtime", ActionState::Install, 0, false),
        )
        .await
        .unwrap();
    registration
}

#[tokio::test]
async fn test_interrupted_run_survives_reopen() {
    let (td, store) = mk_store().await;
    let registration = interrupt(&store).await;
    store.close().await;

    let reopened = SqliteResumeStore::open(&td.path().join("state").join("state.sqlite"))
        .await
        .unwrap();
    let loaded = reopened.load().await.unwrap().expect("run persisted");

    assert_eq!(loaded.registration, registration);
    assert!(loaded.in_progress);
    assert!(loaded.outcome.is_none());
    assert_eq!(loaded.packages.len(), 1);
    assert_eq!(
        loaded.completed_actions().get("runtime"),
        Some(&ActionState::Install)
    );
}

#[tokio::test]
async fn test_marker_kept_unless_cleared() {
    let (_td, sqlite) = mk_store().await;
    for store in [
        Box::new(sqlite) as Box<dyn ResumeStore>,
        Box::new(MemoryResumeStore::new()),
    ] {
        let registration = interrupt(store.as_ref()).await;
        let failed = RunOutcome {
            status: Status::Failed,
            restart_required: false,
        };
        store
            .unregister(registration.run_id, failed, false)
            .await
            .unwrap();
        let loaded = store.load().await.unwrap().unwrap();
        assert!(loaded.in_progress);
        assert_eq!(loaded.outcome, Some(failed));

        let registration = Registration::new(TopLevelAction::Install);
        store.register(&registration).await.unwrap();
        let done = RunOutcome {
            status: Status::RestartRequired,
            restart_required: true,
        };
        store
            .unregister(registration.run_id, done, true)
            .await
            .unwrap();
        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.registration.run_id, registration.run_id);
        assert!(!loaded.in_progress);
        assert!(loaded.packages.is_empty());
        assert_eq!(loaded.outcome, Some(done));
    }
}

#[tokio::test]
async fn test_rollback_records_round_trip_in_order() {
    let (_td, store) = mk_store().await;
    let registration = Registration::new(TopLevelAction::Install);
    store.register(&registration).await.unwrap();
    for rec in [
        record("a", ActionState::Install, 0, false),
        record("b", ActionState::MajorUpgrade, 0, false),
        record("c", ActionState::Install, 1603, false),
        record("b", ActionState::Install, 0, true),
        record("a", ActionState::Uninstall, 0, true),
    ] {
        store
            .record_package(registration.run_id, &rec)
            .await
            .unwrap();
    }

    let loaded = store.load().await.unwrap().unwrap();
    let order: Vec<_> = loaded
        .packages
        .iter()
        .map(|r| (r.package_id.as_str(), r.action, r.rollback))
        .collect();
    assert_eq!(
        order,
        vec![
            ("a", ActionState::Install, false),
            ("b", ActionState::MajorUpgrade, false),
            ("c", ActionState::Install, false),
            ("b", ActionState::Install, true),
            ("a", ActionState::Uninstall, true),
        ]
    );
    assert!(loaded.completed_actions().is_empty());
}

#[tokio::test]
async fn test_unknown_run_is_rejected() {
    let (_td, store) = mk_store().await;
    let stray = Uuid::new_v4();

    let err = store
        .record_package(stray, &record("a", ActionState::Install, 0, false))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::State(StateError::RegistrationMissing { .. })
    ));

    let err = store
        .unregister(
            stray,
            RunOutcome {
                status: Status::Success,
                restart_required: false,
            },
            true,
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::State(StateError::RegistrationMissing { .. })
    ));
}

#[tokio::test]
async fn test_garbage_rows_are_corruption() {
    let td = TempDir::new().unwrap();
    let db_path = td.path().join("state.sqlite");
    let pool = strap_state::create_pool(&db_path).await.unwrap();
    strap_state::run_migrations(&pool).await.unwrap();
    sqlx::query(
        "INSERT INTO runs (run_id, action, started_at, in_progress)
         VALUES ('not-a-uuid', 'install', '2026-01-01T00:00:00Z', 1)",
    )
    .execute(&pool)
    .await
    .unwrap();

    let store = SqliteResumeStore::with_pool(pool, db_path);
    let err = store.load().await.unwrap_err();
    assert!(matches!(err, Error::State(StateError::StateCorrupted { .. })));
}

#[tokio::test]
async fn test_empty_store_loads_nothing() {
    let (_td, store) = mk_store().await;
    assert!(store.load().await.unwrap().is_none());
    assert!(MemoryResumeStore::new().load().await.unwrap().is_none());
}
