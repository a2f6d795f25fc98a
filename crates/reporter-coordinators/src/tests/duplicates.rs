//! DuplicateCrashFound handling.

use super::harness::{unique_crash, TestHarness, TrackerCall, TrackerOp, API_GATEWAY};
use crate::{DuplicateCrashFound, ReportUndelivered};
use reporter_bus::Consumer;
use reporter_database::IssueStore;

fn duplicate(config_id: &str, crash_id: &str, count: u64) -> DuplicateCrashFound {
    DuplicateCrashFound {
        config_id: config_id.to_string(),
        crash_id: crash_id.to_string(),
        duplicate_count: count,
    }
}

#[tokio::test]
async fn unique_then_duplicate_rewrites_counter() {
    let h = TestHarness::new().await;
    let config = h.insert_config("r1").await;

    h.crash_ingest().consume(unique_crash(&config.id, "k1")).await.unwrap();
    let issue_id = h.db.get_issue("k1").await.unwrap();
    let filed = h.tracker.description(&issue_id).unwrap();
    assert!(filed.contains("*Duplicates*: 0"));

    h.duplicates().consume(duplicate(&config.id, "k1", 3)).await.unwrap();

    assert_eq!(
        h.tracker.ops(),
        vec![TrackerOp::Create, TrackerOp::GetDescription, TrackerOp::Update]
    );
    let expected = filed.replace("*Duplicates*: 0", "*Duplicates*: 3");
    assert_eq!(
        h.tracker.calls()[2],
        TrackerCall::Update {
            issue_id: issue_id.clone(),
            description: expected.clone(),
        }
    );
    assert_eq!(h.tracker.description(&issue_id).unwrap(), expected);
    assert!(h.produced::<ReportUndelivered>(API_GATEWAY).await.is_empty());
}

#[tokio::test]
async fn duplicate_before_unique_reports_undelivered_without_tracker_call() {
    // Duplicates are not held back until their crash is ingested; an early
    // one is reported and left to the upstream retry.
    let h = TestHarness::new().await;
    let config = h.insert_config("r1").await;

    h.duplicates().consume(duplicate(&config.id, "k1", 2)).await.unwrap();

    assert!(h.tracker.calls().is_empty());
    let undelivered = h.produced::<ReportUndelivered>(API_GATEWAY).await;
    assert_eq!(undelivered.len(), 1);
    assert_eq!(undelivered[0].config_id, config.id);

    // Once the crash is ingested the retried duplicate goes through.
    h.crash_ingest().consume(unique_crash(&config.id, "k1")).await.unwrap();
    h.duplicates().consume(duplicate(&config.id, "k1", 2)).await.unwrap();
    let issue_id = h.db.get_issue("k1").await.unwrap();
    assert!(h.tracker.description(&issue_id).unwrap().contains("*Duplicates*: 2"));
}

#[tokio::test]
async fn missing_config_reports_undelivered() {
    let h = TestHarness::new().await;
    h.db.insert_issue("k1", "P-1").await.unwrap();

    h.duplicates().consume(duplicate("nope", "k1", 1)).await.unwrap();

    assert!(h.tracker.calls().is_empty());
    assert_eq!(h.produced::<ReportUndelivered>(API_GATEWAY).await.len(), 1);
}

#[tokio::test]
async fn tracker_failures_report_undelivered() {
    for op in [TrackerOp::GetDescription, TrackerOp::Update] {
        let h = TestHarness::new().await;
        let config = h.insert_config("r1").await;
        h.db.insert_issue("k1", "P-5").await.unwrap();
        h.tracker.set_description("P-5", "*Duplicates*: 1");
        h.tracker.fail(op);

        h.duplicates().consume(duplicate(&config.id, "k1", 4)).await.unwrap();

        assert_eq!(
            h.produced::<ReportUndelivered>(API_GATEWAY).await,
            vec![ReportUndelivered::new(&config.id, "Response status code is 500 - not OK")],
            "failing {op:?}"
        );
        assert_eq!(h.tracker.description("P-5").unwrap(), "*Duplicates*: 1");
    }
}

#[tokio::test]
async fn redelivered_duplicate_is_idempotent() {
    let h = TestHarness::new().await;
    let config = h.insert_config("r1").await;
    h.db.insert_issue("k1", "P-5").await.unwrap();
    h.tracker.set_description("P-5", "header\n*Duplicates*: 0\nfooter");

    h.duplicates().consume(duplicate(&config.id, "k1", 9)).await.unwrap();
    let once = h.tracker.description("P-5").unwrap();
    h.duplicates().consume(duplicate(&config.id, "k1", 9)).await.unwrap();

    assert_eq!(h.tracker.description("P-5").unwrap(), once);
    assert_eq!(once, "header\n*Duplicates*: 9\nfooter");
}

#[tokio::test]
async fn description_without_counter_is_sent_back_unchanged() {
    let h = TestHarness::new().await;
    let config = h.insert_config("r1").await;
    h.db.insert_issue("k1", "P-5").await.unwrap();
    h.tracker.set_description("P-5", "rewritten by hand");

    h.duplicates().consume(duplicate(&config.id, "k1", 9)).await.unwrap();

    assert_eq!(h.tracker.count(TrackerOp::Update), 1);
    assert_eq!(h.tracker.description("P-5").unwrap(), "rewritten by hand");
}
