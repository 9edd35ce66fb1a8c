//! Cross-crate flows: ledger session over the persistence gateways

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tempfile::tempdir;
use waybill_app::app::{LedgerSession, SessionError};
use waybill_app::repository::open_draft_store_at;
use waybill_domain::ledger::{CommitError, MonthSeeds};
use waybill_domain::model::{FieldEdit, VehicleProfile};
use waybill_domain::repository::PersistenceGateway;
use waybill_domain::service::ValidationIssue;
use waybill_infra::persistence::{FileLedgerGateway, InMemoryGateway, StoredMonth};
use waybill_types::{RecordKey, SaveState, YearMonth};

fn truck() -> VehicleProfile {
    VehicleProfile::new("01A123BC")
        .with_capacity(8.0)
        .with_consumption(27.0, 2.0)
}

fn march() -> YearMonth {
    YearMonth::new(2024, 3).unwrap()
}

async fn open(gateway: Arc<dyn PersistenceGateway>) -> LedgerSession {
    LedgerSession::open(gateway, truck(), march(), false, None)
        .await
        .unwrap()
}

/// Fill in a complete working day
fn staff(session: &LedgerSession, day: u32, km: u32) {
    session
        .edit_all(
            RecordKey::day(day),
            vec![
                FieldEdit::Distance(km),
                FieldEdit::TripCount(2),
                FieldEdit::FuelTaken(40.0),
                FieldEdit::Driver(Some("D-1".to_string())),
                FieldEdit::TripNumber(Some(format!("WB-{:03}", day))),
            ],
        )
        .unwrap();
}

#[tokio::test]
async fn test_days_commit_in_order() {
    let gateway = Arc::new(InMemoryGateway::new());
    let session = open(gateway.clone()).await;
    session.set_seeds(MonthSeeds { odometer: 10_000, fuel: 50.0 }).unwrap();
    staff(&session, 1, 120);
    staff(&session, 2, 80);

    let err = session.save_day(2).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Commit(CommitError::OutOfSequence { day: 2, waiting_on: 1 })
    ));
    assert_eq!(gateway.day_save_count(), 0);

    assert_eq!(session.save_day(1).await.unwrap(), SaveState::Saved);
    assert_eq!(session.save_state(2), Some(SaveState::Savable));
    assert_eq!(session.save_day(2).await.unwrap(), SaveState::Saved);
    assert_eq!(session.save_state(3), Some(SaveState::Savable));

    let stored = gateway.stored_month("01A123BC", march()).unwrap();
    assert_eq!(stored.saved_days, BTreeSet::from([1, 2]));
    assert_eq!(stored.records[0].odometer_end, Some(10_120));
}

#[tokio::test]
async fn test_backend_sequence_rejection_keeps_state() {
    let gateway = Arc::new(InMemoryGateway::new());
    let session = open(gateway.clone()).await;
    staff(&session, 1, 10);
    session.save_day(1).await.unwrap();
    staff(&session, 2, 10);

    // The backend lost day 1 behind the session's back
    gateway.insert_month("01A123BC", march(), StoredMonth::default());

    let err = session.save_day(2).await.unwrap_err();
    match err {
        SessionError::Commit(e) => assert!(e.is_sequence()),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(session.save_state(2), Some(SaveState::Savable));
    assert!(session.read(|l| l.day(2).unwrap().dirty));

    // Reconciling with the backend reopens day 1
    let saved = session.refresh_save_states().await.unwrap();
    assert!(saved.is_empty());
    assert_eq!(session.save_state(1), Some(SaveState::Savable));
}

#[tokio::test]
async fn test_transport_failure_leaves_state() {
    let gateway = Arc::new(InMemoryGateway::new());
    let session = open(gateway.clone()).await;
    staff(&session, 1, 50);
    let before = session.snapshot();

    gateway.fail_next(1);
    let err = session.save_day(1).await.unwrap_err();
    assert!(matches!(err, SessionError::Commit(CommitError::Gateway(ref g)) if g.is_transport()));
    assert_eq!(session.save_state(1), Some(SaveState::Savable));
    assert_eq!(session.read(|l| l.day(1).cloned()), before.day(1).cloned());
    assert!(!session.read(|l| l.is_day_in_flight(1)));

    assert_eq!(session.save_day(1).await.unwrap(), SaveState::Saved);
}

#[tokio::test(start_paused = true)]
async fn test_single_flight_and_edits_during_save() {
    let gateway = Arc::new(InMemoryGateway::new().with_latency(Duration::from_secs(1)));
    let session = open(gateway.clone()).await;
    staff(&session, 1, 30);

    let background = session.clone();
    let first = tokio::spawn(async move { background.save_day(1).await });
    tokio::task::yield_now().await;
    assert!(session.read(|l| l.is_day_in_flight(1)));

    let second = session.save_day(1).await.unwrap_err();
    assert!(matches!(second, SessionError::Commit(CommitError::InFlight(1))));

    // Other days stay editable, and an edit to day 1 keeps it open
    staff(&session, 10, 5);
    session
        .edit(RecordKey::day(1), FieldEdit::Driver(Some("D-2".to_string())))
        .unwrap();

    let state = first.await.unwrap().unwrap();
    assert_eq!(state, SaveState::Savable);
    assert!(session.read(|l| l.day(1).unwrap().dirty));
    assert_eq!(gateway.day_save_count(), 1);
}

#[tokio::test]
async fn test_month_save_reports_all_failing_records() {
    let gateway = Arc::new(InMemoryGateway::new());
    let session = open(gateway.clone()).await;
    staff(&session, 1, 20);
    session.edit(RecordKey::day(3), FieldEdit::Distance(15)).unwrap();
    session.edit(RecordKey::day(7), FieldEdit::TripCount(1)).unwrap();

    let err = session.save_month().await.unwrap_err();
    let SessionError::Commit(CommitError::BatchValidation(errors)) = err else {
        panic!("expected batch validation failure");
    };
    let keys: Vec<_> = errors.iter().map(|e| e.key).collect();
    assert_eq!(keys, vec![RecordKey::day(3), RecordKey::day(7)]);
    assert!(errors[0].issues.contains(&ValidationIssue::MissingDriver));
    assert_eq!(gateway.month_save_count(), 0);

    staff(&session, 3, 15);
    staff(&session, 7, 0);
    session.save_month().await.unwrap();
    for day in 1..=31 {
        assert_eq!(session.save_state(day), Some(SaveState::Saved), "day {day}");
    }
    assert!(!session.has_unsaved_changes());
}

#[tokio::test]
async fn test_new_month_carries_previous_closing_values() {
    let gateway = Arc::new(InMemoryGateway::new());
    let february = LedgerSession::open(gateway.clone(), truck(), march().previous(), false, None)
        .await
        .unwrap();
    february.set_seeds(MonthSeeds { odometer: 9_000, fuel: 60.0 }).unwrap();
    staff(&february, 29, 100);
    february.save_month().await.unwrap();
    let closing = february.read(|l| l.closing_values()).unwrap();

    let session = open(gateway).await;
    assert_eq!(session.read(|l| l.seeds()), closing);
    assert_eq!(session.read(|l| l.day(1).unwrap().odometer_start), Some(9_100));
}

#[tokio::test]
async fn test_draft_survives_reopen() {
    let dir = tempdir().unwrap();
    let mut store = open_draft_store_at(dir.path().to_path_buf()).unwrap();
    let gateway = Arc::new(InMemoryGateway::new());

    let session = open(gateway.clone()).await;
    staff(&session, 1, 40);
    session.save_day(1).await.unwrap();
    staff(&session, 2, 60);
    session.insert_night_shift(2).unwrap();
    session.persist_draft(&mut store).unwrap();
    assert_eq!(store.count(), 1);

    let draft = store.load("01A123BC", march()).unwrap();
    let reopened = LedgerSession::open(gateway, truck(), march(), false, draft)
        .await
        .unwrap();
    assert_eq!(reopened.save_state(1), Some(SaveState::Saved));
    assert_eq!(reopened.save_state(2), Some(SaveState::Savable));
    assert_eq!(reopened.read(|l| l.day(2).unwrap().distance_km), 60);
    assert!(reopened.read(|l| l.night_shift_after(2).is_some()));

    reopened.save_day(2).await.unwrap();
    reopened.persist_draft(&mut store).unwrap();
    // Days after 2 were shifted by the cascade and are still unsaved
    assert!(reopened.has_unsaved_changes());
    assert_eq!(store.count(), 1);
}

#[tokio::test]
async fn test_file_gateway_round_trip() {
    let dir = tempdir().unwrap();
    let gateway: Arc<dyn PersistenceGateway> = Arc::new(FileLedgerGateway::new(dir.path()));

    let session = open(gateway.clone()).await;
    session.set_seeds(MonthSeeds { odometer: 10_000, fuel: 50.0 }).unwrap();
    staff(&session, 1, 120);
    staff(&session, 2, 30);
    session.save_day(1).await.unwrap();
    session.save_day(2).await.unwrap();

    let reopened = open(gateway).await;
    assert_eq!(reopened.save_state(1), Some(SaveState::Saved));
    assert_eq!(reopened.save_state(2), Some(SaveState::Saved));
    assert_eq!(reopened.save_state(3), Some(SaveState::Savable));
    assert_eq!(
        reopened.read(|l| l.day(3).unwrap().odometer_start),
        Some(10_150)
    );
}
