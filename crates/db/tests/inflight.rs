mod support;

use chrono::Duration;
use router_core::InflightStatus;
use support::{base_time, make_outcome, setup_ledger};

#[test]
fn create_starts_a_waiting_flight() {
    let test_ledger = setup_ledger();
    let ledger = &test_ledger.ledger;
    ledger
        .transaction(|tx| tx.create_inflight("key-1", "model-a", "chat", base_time()))
        .expect("create");

    let record = ledger
        .transaction(|tx| tx.get_inflight("key-1"))
        .expect("load")
        .expect("present");
    assert_eq!(record.status, InflightStatus::Waiting);
    assert_eq!(record.model_name, "model-a");
    assert_eq!(record.workflow, "chat");
    assert!(record.output.is_none());
    assert!(record.completed_at.is_none());
    assert_eq!(record.updated_at, base_time());
}

#[test]
fn success_then_error_keeps_the_completed_output() {
    let test_ledger = setup_ledger();
    let ledger = &test_ledger.ledger;
    let completed_at = base_time() + Duration::seconds(1);
    let failed_at = base_time() + Duration::seconds(3);

    ledger
        .transaction(|tx| {
            tx.create_inflight("key-1", "model-a", "chat", base_time())?;
            tx.mark_inflight_success("key-1", &make_outcome("first answer"), completed_at)?;
            tx.create_inflight("key-1", "model-a", "chat", base_time() + Duration::seconds(2))?;
            tx.mark_inflight_error("key-1", "upstream exploded", failed_at)
        })
        .expect("transitions");

    let record = ledger
        .transaction(|tx| tx.get_inflight("key-1"))
        .expect("load")
        .expect("present");
    assert_eq!(record.status, InflightStatus::Error);
    assert_eq!(record.error.as_deref(), Some("upstream exploded"));
    assert_eq!(record.output.as_deref(), Some("first answer"));
    assert_eq!(record.completed_at, Some(completed_at));
    assert_eq!(record.updated_at, failed_at);

    let outcome = record
        .completed_since(base_time())
        .expect("sticky success for earlier waiter");
    assert_eq!(outcome.output, "first answer");
    assert_eq!(outcome.cost, 0.4);
    assert!(
        record
            .completed_since(completed_at + Duration::milliseconds(1))
            .is_none()
    );
}

#[test]
fn recreate_clears_error_and_resets_status() {
    let test_ledger = setup_ledger();
    let ledger = &test_ledger.ledger;
    ledger
        .transaction(|tx| {
            tx.create_inflight("key-1", "model-a", "chat", base_time())?;
            tx.mark_inflight_error("key-1", "boom", base_time())?;
            tx.create_inflight("key-1", "model-a", "chat", base_time() + Duration::seconds(1))
        })
        .expect("transitions");

    let record = ledger
        .transaction(|tx| tx.get_inflight("key-1"))
        .expect("load")
        .expect("present");
    assert_eq!(record.status, InflightStatus::Waiting);
    assert!(record.error.is_none());
}

#[test]
fn terminal_marks_report_missing_records() {
    let test_ledger = setup_ledger();
    let ledger = &test_ledger.ledger;
    let updated = ledger
        .transaction(|tx| tx.mark_inflight_success("missing", &make_outcome("x"), base_time()))
        .expect("mark");
    assert!(!updated);
    let updated = ledger
        .transaction(|tx| tx.mark_inflight_error("missing", "boom", base_time()))
        .expect("mark");
    assert!(!updated);
}

#[test]
fn clear_single_removes_sticky_output() {
    let test_ledger = setup_ledger();
    let ledger = &test_ledger.ledger;
    ledger
        .transaction(|tx| {
            tx.create_inflight("key-1", "model-a", "chat", base_time())?;
            tx.mark_inflight_success("key-1", &make_outcome("answer"), base_time())?;
            tx.create_inflight("key-2", "model-a", "chat", base_time())
        })
        .expect("setup");

    let removed = ledger
        .transaction(|tx| tx.clear_single_inflight("key-1"))
        .expect("clear");
    assert!(removed);
    assert!(
        ledger
            .transaction(|tx| tx.get_inflight("key-1"))
            .expect("load")
            .is_none()
    );
    assert_eq!(
        ledger
            .transaction(|tx| tx.list_inflight())
            .expect("list")
            .len(),
        1
    );

    let cleared = ledger
        .transaction(|tx| tx.clear_inflight())
        .expect("clear all");
    assert_eq!(cleared, 1);
}
