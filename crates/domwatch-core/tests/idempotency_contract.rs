//! Contract Test: Idempotency Across Runs
//!
//! Constraints verified:
//! - Running twice against unchanged facts adds no history and no events
//! - A change is reported once, not again on the following run
//! - File-backed state survives a restart without replaying events
//! - A change whose history write failed is reported on a later run
//!
//! If this test fails, users get duplicate alerts.

mod common;

use common::*;
use domwatch_core::{
    FileSnapshotStore, MemorySnapshotStore, NotificationDispatcher, SnapshotStore,
};
use std::sync::Arc;
use tempfile::tempdir;

#[tokio::test]
async fn second_run_over_same_facts_is_silent() {
    let store = MemorySnapshotStore::new();
    seed(&store, baseline_snapshot("example.com"), false).await;

    let fetcher = Arc::new(ScriptedFetcher::new());
    fetcher.script("example.com", DomainFacts::baseline());

    let recorder = Arc::new(RecordingSubscriber::new("recorder"));
    let dispatcher = Arc::new(NotificationDispatcher::new());
    dispatcher.register(recorder.clone());

    let engine = engine(fetcher.clone(), Arc::new(store.clone()), dispatcher);

    let first = engine.run_once().await.expect("first run succeeds");
    let second = engine.run_once().await.expect("second run succeeds");

    assert_eq!(first.first_observations, 1);
    assert_eq!(second.unchanged, 1);
    assert_eq!(store.history_len("example.com").await, 1);
    assert_eq!(recorder.count(), 0);
    assert_eq!(fetcher.lookup_count(), 2);
}

#[tokio::test]
async fn change_is_reported_exactly_once() {
    let store = MemorySnapshotStore::new();
    seed(&store, baseline_snapshot("example.com"), true).await;

    let fetcher = Arc::new(ScriptedFetcher::new());
    fetcher.script(
        "example.com",
        DomainFacts::baseline().with_spf(Some("v=spf1 -all")),
    );

    let recorder = Arc::new(RecordingSubscriber::new("recorder"));
    let dispatcher = Arc::new(NotificationDispatcher::new());
    dispatcher.register(recorder.clone());

    let engine = engine(fetcher, Arc::new(store.clone()), dispatcher);

    let first = engine.run_once().await.expect("first run succeeds");
    let second = engine.run_once().await.expect("second run succeeds");

    assert_eq!(first.changed, 1);
    assert_eq!(second.unchanged, 1);
    assert_eq!(recorder.count(), 1);
    assert_eq!(store.history_len("example.com").await, 2);
}

#[tokio::test]
async fn restart_with_file_store_does_not_replay_events() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.json");

    let fetcher = Arc::new(ScriptedFetcher::new());
    fetcher.script("example.com", DomainFacts::baseline());

    // First process: register the domain and record its first observation
    {
        let store = Arc::new(FileSnapshotStore::new(&path).await.unwrap());
        store
            .insert_domain(baseline_snapshot("example.com"))
            .await
            .unwrap();

        let report = engine(
            fetcher.clone(),
            store.clone(),
            Arc::new(NotificationDispatcher::new()),
        )
        .run_once()
        .await
        .expect("first run succeeds");

        assert_eq!(report.first_observations, 1);
    }

    // Second process: same facts, nothing to report
    let store = Arc::new(FileSnapshotStore::new(&path).await.unwrap());
    let recorder = Arc::new(RecordingSubscriber::new("recorder"));
    let dispatcher = Arc::new(NotificationDispatcher::new());
    dispatcher.register(recorder.clone());

    let report = engine(fetcher, store.clone(), dispatcher)
        .run_once()
        .await
        .expect("second run succeeds");

    assert_eq!(report.unchanged, 1);
    assert_eq!(recorder.count(), 0);
    assert_eq!(store.history_len("example.com").await, 1);

    let live = store.get_current("example.com").await.unwrap().unwrap();
    assert_eq!(live.spf, BASE_SPF);
}

#[tokio::test]
async fn change_with_failed_history_write_is_reported_later() {
    let dir = tempdir().unwrap();
    let state_dir = dir.path().join("sub");
    let path = state_dir.join("state.json");

    let store = Arc::new(FileSnapshotStore::new(&path).await.unwrap());
    store
        .insert_domain(baseline_snapshot("example.com"))
        .await
        .unwrap();

    let fetcher = Arc::new(ScriptedFetcher::new());
    fetcher.script("example.com", DomainFacts::baseline());

    let recorder = Arc::new(RecordingSubscriber::new("recorder"));
    let dispatcher = Arc::new(NotificationDispatcher::new());
    dispatcher.register(recorder.clone());

    let engine = engine(fetcher.clone(), store.clone(), dispatcher);
    let baseline = engine.run_once().await.expect("baseline run succeeds");
    assert_eq!(baseline.first_observations, 1);

    // State directory disappears while the SPF record changes
    tokio::fs::remove_dir_all(&state_dir).await.unwrap();
    fetcher.script(
        "example.com",
        DomainFacts::baseline().with_spf(Some("v=spf1 -all")),
    );

    // The final flush fails too, so the run may end in an error
    if let Ok(report) = engine.run_once().await {
        assert_eq!(report.failed_domains.len(), 1);
        assert_eq!(report.events_dispatched, 0);
    }
    assert_eq!(recorder.count(), 0);
    assert_eq!(store.history_len("example.com").await, 1);

    tokio::fs::create_dir_all(&state_dir).await.unwrap();
    let recovered = engine.run_once().await.expect("run after recovery succeeds");

    assert_eq!(recovered.changed, 1);
    assert_eq!(recorder.count(), 1);
    assert_eq!(recorder.events()[0].current_value(), "v=spf1 -all");
    assert_eq!(store.history_len("example.com").await, 2);
}
