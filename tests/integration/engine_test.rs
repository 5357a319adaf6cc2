use std::time::Duration;

use vigil::checker::{classify_content, status_accepted, CheckOutcome, RetryPolicy, Status};
use vigil::diff;
use vigil::normalize::NormalizeRules;
use vigil::store::{NewTarget, Store};

/// Simulate what a content check observes: normalize, hash, classify
/// against the stored baseline.
fn observe(store: &Store, target: &vigil::store::Target, body: &str) -> CheckOutcome {
    let rules = NormalizeRules::default();
    let hash = rules.hash(body);
    let baseline = store.latest_snapshot_hash(target.id).unwrap();
    let mut outcome = CheckOutcome::new(classify_content(&hash, baseline.as_deref()));
    outcome.content = body.to_string();
    outcome.content_hash = hash;
    outcome
}

#[test]
fn identical_content_is_up_then_unchanged() {
    let store = Store::open_in_memory().unwrap();
    let target = store
        .add_target(NewTarget {
            url: "https://example.com".into(),
            ..Default::default()
        })
        .unwrap();

    let body = "<html><body>stable</body></html>";

    let first = observe(&store, &target, body);
    assert_eq!(first.status, Status::Up);
    store.persist_outcome(&target, &first).unwrap();

    let second = observe(&store, &target, body);
    assert_eq!(second.status, Status::Unchanged);
    store.persist_outcome(&target, &second).unwrap();

    // Only one distinct content state was ever observed
    assert_eq!(store.latest_snapshots(target.id, 10).unwrap().len(), 1);
}

#[test]
fn token_churn_does_not_register_as_change() {
    let store = Store::open_in_memory().unwrap();
    let target = store
        .add_target(NewTarget {
            url: "https://example.com".into(),
            ..Default::default()
        })
        .unwrap();

    let first = observe(
        &store,
        &target,
        r#"<meta name="csrf-token" content="aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"><p>price: $10</p>"#,
    );
    store.persist_outcome(&target, &first).unwrap();

    let second = observe(
        &store,
        &target,
        r#"<meta name="csrf-token" content="bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb"><p>price: $10</p>"#,
    );
    assert_eq!(second.status, Status::Unchanged);
}

#[test]
fn changed_content_persists_a_new_snapshot() {
    let store = Store::open_in_memory().unwrap();
    let target = store
        .add_target(NewTarget {
            url: "https://example.com".into(),
            ..Default::default()
        })
        .unwrap();

    let first = observe(&store, &target, "price: $10");
    store.persist_outcome(&target, &first).unwrap();

    let second = observe(&store, &target, "price: $12");
    assert_eq!(second.status, Status::Changed);
    let wrote = store.persist_outcome(&target, &second).unwrap();
    assert!(wrote);

    let snaps = store.latest_snapshots(target.id, 10).unwrap();
    assert_eq!(snaps.len(), 2);
    assert_eq!(snaps[0].hash, second.content_hash);

    // The two stored content states diff cleanly
    let d = diff::diff(&snaps[1].content, &snaps[0].content);
    assert!(d.has_changes);
    assert_eq!(d.added, 1);
    assert_eq!(d.removed, 1);
}

#[test]
fn accept_status_spec_grammar() {
    let spec = "200-299,301";
    assert!(status_accepted(200, spec));
    assert!(status_accepted(250, spec));
    assert!(status_accepted(299, spec));
    assert!(status_accepted(301, spec));
    assert!(!status_accepted(300, spec));
    assert!(!status_accepted(404, spec));
}

#[test]
fn diff_single_replacement_shape() {
    let d = diff::diff("a\nb\nc", "a\nx\nc");
    assert_eq!(d.added, 1);
    assert_eq!(d.removed, 1);
    let rendered = diff::format_plain(&d);
    assert_eq!(rendered, "  a\n- b\n+ x\n  c\n");
}

#[test]
fn diff_of_identical_content_is_empty() {
    let d = diff::diff("same\ncontent", "same\ncontent");
    assert!(!d.has_changes);
    assert!(d.changes.is_empty());
}

#[tokio::test]
async fn retry_runs_until_success_with_injected_delay() {
    let policy = RetryPolicy {
        delay: Duration::ZERO,
    };
    let calls = std::cell::Cell::new(0u32);
    let outcome = policy
        .run(3, || {
            let n = calls.get() + 1;
            calls.set(n);
            async move {
                if n <= 2 {
                    CheckOutcome::failure(Status::Down, "refused", Duration::ZERO)
                } else {
                    CheckOutcome::new(Status::Up)
                }
            }
        })
        .await;

    assert_eq!(outcome.status, Status::Up);
    assert_eq!(calls.get(), 3);
}

#[tokio::test]
async fn retry_reports_the_final_failure() {
    let policy = RetryPolicy {
        delay: Duration::ZERO,
    };
    let outcome = policy
        .run(2, || async {
            CheckOutcome::failure(Status::Down, "still down", Duration::ZERO)
        })
        .await;
    assert_eq!(outcome.status, Status::Down);
    assert_eq!(outcome.error.as_deref(), Some("still down"));
}
