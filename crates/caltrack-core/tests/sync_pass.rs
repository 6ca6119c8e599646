//! Integration tests for the sync pass.
//!
//! Each test wires the orchestrator to in-memory collaborators and checks
//! the report together with what ended up in the store.

mod common;

use caltrack_core::tracking::{
    PassLock, SingleFlight, SyncErrorKind, SyncOptions, SyncOrchestrator, SyncWindow, TrackingKey,
};
use caltrack_core::{Database, DedupLedger, EventFilter, KeyRegistry, NewKey};
use chrono::Duration;
use common::{all_day, event, now, FakeSource, FakeStore, ListFailure};

fn gpm_store() -> FakeStore {
    FakeStore::with_keys(vec![TrackingKey::new("k1", "GPM")])
}

#[tokio::test]
async fn first_pass_records_matches_and_second_is_idempotent() {
    let source = FakeSource::new().with_events(
        "cal-A",
        vec![
            event("e1", "GPM Vorlesung", 2, 90, "cal-A"),
            event("e2", "Mensa", 3, 45, "cal-A"),
            all_day("e3", "GPM Klausur", "cal-A"),
        ],
    );
    let store = gpm_store();
    let orchestrator = SyncOrchestrator::new(&source, &store, &store);

    let first = orchestrator.run(now()).await;
    assert!(first.is_success(), "{:?}", first.error);
    assert_eq!(first.message, "Tracking sync complete");
    assert_eq!(first.total_calendar_events_scanned, 3);
    assert_eq!(first.matched, 1);
    assert_eq!(first.new_events, 1);
    assert_eq!(first.skipped_all_day, 1);
    assert_eq!(first.keys_updated, 1);
    assert_eq!(first.matched_samples, vec!["\"GPM Vorlesung\" → GPM (90min)"]);

    let second = orchestrator.run(now()).await;
    assert!(second.is_success());
    assert_eq!(second.matched, 1);
    assert_eq!(second.new_events, 0);
    assert_eq!(second.skipped_duplicates, 1);
    assert_eq!(second.keys_updated, 0);

    let key = store.key("k1");
    assert_eq!((key.total_minutes, key.event_count), (90, 1));
    assert_eq!(store.record_count(), 1);
}

#[tokio::test]
async fn aggregate_minutes_go_with_first_increment() {
    let source = FakeSource::new().with_events(
        "cal-A",
        vec![
            event("e1", "GPM", 2, 60, "cal-A"),
            event("e2", "GPM", 3, 60, "cal-A"),
            event("e3", "GPM", 4, 60, "cal-A"),
        ],
    );
    let store = gpm_store();

    let report = SyncOrchestrator::new(&source, &store, &store).run(now()).await;

    assert_eq!(report.new_events, 3);
    assert_eq!(report.keys_updated, 1);
    assert_eq!(store.increment_minutes("k1"), vec![180, 0, 0]);
    let key = store.key("k1");
    assert_eq!((key.total_minutes, key.event_count), (180, 3));
}

#[tokio::test]
async fn trace_follows_pass_states() {
    let source = FakeSource::new().with_events(
        "cal-A",
        vec![
            event("e1", "GPM", 2, 60, "cal-A"),
            all_day("e2", "Feiertag", "cal-A"),
        ],
    );
    let store = FakeStore::with_keys(vec![TrackingKey::new("k1", "GPM").with_search_key("gpm")]);

    let report = SyncOrchestrator::new(&source, &store, &store).run(now()).await;

    let trace = &report.debug_trace;
    assert_eq!(trace.len(), 6, "{trace:#?}");
    assert_eq!(trace[0], "1 keys loaded: \"GPM\" (search: \"gpm\")");
    assert_eq!(trace[1], "0 matches already recorded.");
    assert_eq!(trace[2], "1 calendars found: Calendar cal-A");
    assert_eq!(trace[3], "2 calendar events fetched (1 timed, 1 all-day).");
    assert!(trace[4].starts_with("Matching: 1 matches, 1 new"));
    assert_eq!(trace[5], "1 keys updated.");
}

#[tokio::test]
async fn failing_calendar_is_skipped() {
    let mut source = FakeSource::new()
        .with_events("cal-A", vec![event("e1", "GPM", 2, 90, "cal-A")])
        .with_events("cal-B", vec![event("e2", "GPM", 3, 30, "cal-B")]);
    source.failing_calendars.insert("cal-B".into());
    let store = gpm_store();

    let report = SyncOrchestrator::new(&source, &store, &store).run(now()).await;

    assert!(report.is_success());
    assert_eq!(report.total_calendar_events_scanned, 1);
    assert_eq!(report.new_events, 1);
    assert!(report
        .debug_trace
        .iter()
        .any(|line| line.starts_with("warning:") && line.contains("Calendar cal-B")));
}

#[tokio::test]
async fn missing_credential_aborts_before_any_request() {
    let mut source = FakeSource::new().with_events("cal-A", vec![event("e1", "GPM", 2, 90, "cal-A")]);
    source.authenticated = false;
    let store = gpm_store();

    let report = SyncOrchestrator::new(&source, &store, &store).run(now()).await;

    let error = report.error.as_ref().unwrap();
    assert_eq!(error.kind, SyncErrorKind::AuthenticationError);
    assert_eq!(report.message, "Failed to sync tracking");
    assert_eq!(source.request_count(), 0);
    assert_eq!(store.record_count(), 0);
    assert!(report.debug_trace.last().unwrap().starts_with("Fatal:"));
}

#[tokio::test]
async fn rejected_calendar_listing_is_an_auth_error() {
    let mut source = FakeSource::new();
    source.list_failure = Some(ListFailure::Unauthorized);
    let store = gpm_store();

    let report = SyncOrchestrator::new(&source, &store, &store).run(now()).await;
    assert_eq!(report.error.unwrap().kind, SyncErrorKind::AuthenticationError);

    source.list_failure = Some(ListFailure::ServerError);
    let report = SyncOrchestrator::new(&source, &store, &store).run(now()).await;
    assert_eq!(report.error.unwrap().kind, SyncErrorKind::RemoteFetchError);
    // Trace up to the failure survives.
    assert_eq!(report.debug_trace.len(), 3);
}

#[tokio::test]
async fn no_keys_ends_pass_without_fetching() {
    let source = FakeSource::new().with_events("cal-A", vec![event("e1", "GPM", 2, 90, "cal-A")]);
    let store = FakeStore::default();

    let report = SyncOrchestrator::new(&source, &store, &store).run(now()).await;

    assert!(report.is_success());
    assert_eq!(report.message, "No tracking keys found");
    assert_eq!(report.total_calendar_events_scanned, 0);
    assert_eq!(source.request_count(), 0);
}

#[tokio::test]
async fn key_load_failure_is_fatal() {
    let source = FakeSource::new();
    let store = FakeStore {
        fail_load_keys: true,
        ..gpm_store()
    };

    let report = SyncOrchestrator::new(&source, &store, &store).run(now()).await;

    assert_eq!(report.error.unwrap().kind, SyncErrorKind::PersistenceLoadError);
    assert_eq!(source.request_count(), 0);
}

#[tokio::test]
async fn ledger_load_failure_assumes_empty_ledger() {
    let source = FakeSource::new().with_events("cal-A", vec![event("e1", "GPM", 2, 90, "cal-A")]);
    let store = FakeStore {
        fail_load_ledger: true,
        ..gpm_store()
    };

    let report = SyncOrchestrator::new(&source, &store, &store).run(now()).await;

    assert!(report.is_success());
    assert_eq!(report.new_events, 1);
    assert!(report.debug_trace[1].starts_with("warning:"));
}

#[tokio::test]
async fn failed_record_is_left_out_of_aggregates() {
    let source = FakeSource::new().with_events(
        "cal-A",
        vec![
            event("e1", "GPM Vorlesung", 2, 90, "cal-A"),
            event("e2", "GPM Übung", 3, 45, "cal-A"),
        ],
    );
    let store = FakeStore {
        fail_insert_summary: Some("GPM Übung".into()),
        ..gpm_store()
    };

    let report = SyncOrchestrator::new(&source, &store, &store).run(now()).await;

    assert!(report.is_success());
    assert_eq!(report.matched, 2);
    assert_eq!(report.new_events, 1);
    let key = store.key("k1");
    assert_eq!((key.total_minutes, key.event_count), (90, 1));

    // The failed record is picked up by the next pass.
    let store_retry = FakeStore {
        keys: std::sync::Mutex::new(vec![key]),
        records: std::sync::Mutex::new(store.records.lock().unwrap().clone()),
        ..FakeStore::default()
    };
    let retry = SyncOrchestrator::new(&source, &store_retry, &store_retry)
        .run(now())
        .await;
    assert_eq!(retry.new_events, 1);
    assert_eq!(store_retry.key("k1").total_minutes, 135);
}

#[tokio::test]
async fn aggregate_failure_is_reported_and_others_continue() {
    let source = FakeSource::new().with_events(
        "cal-A",
        vec![
            event("e1", "GPM", 2, 90, "cal-A"),
            event("e2", "Sport", 3, 60, "cal-A"),
        ],
    );
    let store = FakeStore {
        fail_increment_key: Some("k1".into()),
        ..FakeStore::with_keys(vec![TrackingKey::new("k1", "GPM"), TrackingKey::new("k2", "Sport")])
    };

    let report = SyncOrchestrator::new(&source, &store, &store).run(now()).await;

    assert!(report.is_success());
    assert_eq!(report.new_events, 2);
    assert_eq!(report.keys_updated, 1);
    assert_eq!(store.key("k2").total_minutes, 60);
    assert!(report
        .debug_trace
        .iter()
        .any(|line| line.starts_with("warning:") && line.contains("k1")));
}

#[tokio::test]
async fn event_can_count_for_several_keys() {
    let source = FakeSource::new().with_events(
        "cal-A",
        vec![event("e1", "GPM Übung Mathe", 2, 60, "cal-A")],
    );
    let store = FakeStore::with_keys(vec![
        TrackingKey::new("k1", "GPM"),
        TrackingKey::new("k2", "Mathe"),
        TrackingKey::new("k3", "Mathe").with_calendar("cal-B"),
    ]);

    let report = SyncOrchestrator::new(&source, &store, &store).run(now()).await;

    assert_eq!(report.matched, 2);
    assert_eq!(report.keys_updated, 2);
    assert_eq!(store.key("k1").total_minutes, 60);
    assert_eq!(store.key("k2").total_minutes, 60);
    assert_eq!(store.key("k3").total_minutes, 0);
}

#[tokio::test]
async fn sample_list_is_capped() {
    let events = (1..=5)
        .map(|day| event(&format!("e{day}"), "GPM", day, 30, "cal-A"))
        .collect();
    let source = FakeSource::new().with_events("cal-A", events);
    let store = gpm_store();
    let options = SyncOptions {
        sample_limit: 2,
        ..SyncOptions::default()
    };

    let report = SyncOrchestrator::new(&source, &store, &store)
        .with_options(options)
        .run(now())
        .await;

    assert_eq!(report.new_events, 5);
    assert_eq!(report.matched_samples.len(), 2);
}

#[tokio::test]
async fn window_is_passed_to_source() {
    let source = FakeSource::new().with_events("cal-A", Vec::new());
    let store = gpm_store();
    let options = SyncOptions {
        window: SyncWindow {
            lookback_days: 7,
            lookahead_days: 1,
        },
        ..SyncOptions::default()
    };

    SyncOrchestrator::new(&source, &store, &store)
        .with_options(options)
        .run(now())
        .await;

    let windows = source.windows.lock().unwrap();
    assert_eq!(windows[0], (now() - Duration::days(7), now() + Duration::days(1)));
}

#[tokio::test]
async fn concurrent_pass_for_same_user_is_refused() {
    let source = FakeSource::new().with_events("cal-A", vec![event("e1", "GPM", 2, 90, "cal-A")]);
    let store = gpm_store();
    let flights = SingleFlight::new();
    let orchestrator = SyncOrchestrator::new(&source, &store, &store);

    let held = flights.try_acquire("alice").unwrap();
    let refused = orchestrator.run_exclusive(&flights, "alice", now()).await;
    assert_eq!(refused.error.unwrap().kind, SyncErrorKind::PassInProgress);
    assert_eq!(source.request_count(), 0);

    let other = orchestrator.run_exclusive(&flights, "bob", now()).await;
    assert!(other.is_success());

    drop(held);
    let again = orchestrator.run_exclusive(&flights, "alice", now()).await;
    assert!(again.is_success());
    assert!(!flights.is_active("alice"));
}

#[tokio::test]
async fn pass_is_refused_while_lock_file_is_held() {
    let dir = tempfile::tempdir().unwrap();
    let source = FakeSource::new().with_events("cal-A", vec![event("e1", "GPM", 2, 90, "cal-A")]);
    let store = gpm_store();
    let orchestrator = SyncOrchestrator::new(&source, &store, &store);

    let mut holder = PassLock::open(dir.path(), "alice").unwrap();
    let mut lock = PassLock::open(dir.path(), "alice").unwrap();

    let held = holder.try_acquire().unwrap().unwrap();
    let refused = orchestrator.run_locked(&mut lock, now()).await;
    assert_eq!(refused.message, "Sync already in progress");
    assert_eq!(refused.error.unwrap().kind, SyncErrorKind::PassInProgress);
    assert_eq!(source.request_count(), 0);
    assert_eq!(store.record_count(), 0);

    drop(held);
    let report = orchestrator.run_locked(&mut lock, now()).await;
    assert!(report.is_success());
    assert_eq!(report.new_events, 1);

    // Released after the pass.
    assert!(holder.try_acquire().unwrap().is_some());
}

#[tokio::test]
async fn database_backed_pass_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open_at(&dir.path().join("caltrack.db")).unwrap();
    let gpm = db
        .create_key(&NewKey {
            name: "GPM".into(),
            ..NewKey::default()
        })
        .unwrap();

    let source = FakeSource::new().with_events(
        "cal-A",
        vec![
            event("e1", "GPM Vorlesung", 2, 90, "cal-A"),
            event("e2", "GPM Vorlesung", 9, 90, "cal-A"),
            event("e3", "gpm übung", 10, 45, "cal-A"),
        ],
    );

    let first = SyncOrchestrator::new(&source, &db, &db).run(now()).await;
    assert!(first.is_success(), "{:?}", first.error);
    assert_eq!(first.new_events, 3);

    let second = SyncOrchestrator::new(&source, &db, &db).run(now()).await;
    assert_eq!(second.new_events, 0);
    assert_eq!(second.skipped_duplicates, 3);

    let key = db.get_key(&gpm.id).unwrap().unwrap();
    assert_eq!((key.total_minutes, key.event_count), (225, 3));
    assert_eq!(db.load_existing().unwrap().len(), 3);
    assert_eq!(db.load_all().unwrap().len(), 1);

    let events = db.list_events(&EventFilter::default()).unwrap();
    assert_eq!(events[0].record.summary, "gpm übung");
    assert_eq!(events[0].record.event_date, "2026-02-10");
}
