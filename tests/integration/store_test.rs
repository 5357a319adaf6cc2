use vigil::checker::{CheckOutcome, Status};
use vigil::store::{NewTarget, Store, TargetKind};

fn new_store() -> Store {
    Store::open_in_memory().unwrap()
}

fn simple_target(store: &Store, url: &str) -> vigil::store::Target {
    store
        .add_target(NewTarget {
            url: url.to_string(),
            ..Default::default()
        })
        .unwrap()
}

fn outcome_with_content(status: Status, content: &str, hash: &str) -> CheckOutcome {
    let mut outcome = CheckOutcome::new(status);
    outcome.content = content.to_string();
    outcome.content_hash = hash.to_string();
    outcome
}

#[test]
fn add_target_applies_defaults() {
    let store = new_store();
    let t = simple_target(&store, "https://example.com");

    assert_eq!(t.name, "https://example.com");
    assert_eq!(t.kind, TargetKind::Http);
    assert_eq!(t.interval, 300);
    assert_eq!(t.timeout, 30);
    assert_eq!(t.retries, 1);
    assert_eq!(t.threshold, 5.0);
    assert!(!t.paused);
}

#[test]
fn duplicate_target_is_rejected() {
    let store = new_store();
    simple_target(&store, "https://example.com");
    let err = store
        .add_target(NewTarget {
            url: "https://example.com".to_string(),
            ..Default::default()
        })
        .unwrap_err();
    assert!(err.to_string().contains("may already exist"));
}

#[test]
fn same_url_with_different_type_or_selector_is_allowed() {
    let store = new_store();
    simple_target(&store, "https://example.com");
    assert!(store
        .add_target(NewTarget {
            url: "https://example.com".to_string(),
            kind: Some(TargetKind::Ping),
            ..Default::default()
        })
        .is_ok());
    assert!(store
        .add_target(NewTarget {
            url: "https://example.com".to_string(),
            selector: ".price".to_string(),
            ..Default::default()
        })
        .is_ok());
}

#[test]
fn get_target_by_name_url_or_id() {
    let store = new_store();
    let t = store
        .add_target(NewTarget {
            name: "My Site".to_string(),
            url: "https://example.com".to_string(),
            ..Default::default()
        })
        .unwrap();

    assert_eq!(store.get_target("My Site").unwrap().id, t.id);
    assert_eq!(store.get_target("https://example.com").unwrap().id, t.id);
    assert_eq!(store.get_target(&t.id.to_string()).unwrap().id, t.id);
    assert!(store.get_target("unknown").is_err());
}

#[test]
fn update_target_mutates_in_place() {
    let store = new_store();
    let mut t = simple_target(&store, "https://example.com");
    t.expect = "ok".to_string();
    t.interval = 60;
    t.no_follow = true;
    store.update_target(&t).unwrap();

    let loaded = store.get_target(&t.id.to_string()).unwrap();
    assert_eq!(loaded.expect, "ok");
    assert_eq!(loaded.interval, 60);
    assert!(loaded.no_follow);
}

#[test]
fn pause_and_resume() {
    let store = new_store();
    let t = simple_target(&store, "https://example.com");

    store.set_paused(&t.name, true).unwrap();
    assert!(store.get_target(&t.name).unwrap().paused);
    store.set_paused(&t.name, false).unwrap();
    assert!(!store.get_target(&t.name).unwrap().paused);
    assert!(store.set_paused("unknown", true).is_err());
}

#[test]
fn history_is_most_recent_first() {
    let store = new_store();
    let t = simple_target(&store, "https://example.com");

    for status in [Status::Up, Status::Down, Status::Unchanged] {
        store
            .save_check_result(t.id, status, Some(200), 12, "", "")
            .unwrap();
    }

    let history = store.check_history(t.id, 10).unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].status, Status::Unchanged);
    assert_eq!(history[2].status, Status::Up);

    let limited = store.check_history(t.id, 2).unwrap();
    assert_eq!(limited.len(), 2);
}

#[test]
fn persist_outcome_deduplicates_snapshots() {
    let store = new_store();
    let t = simple_target(&store, "https://example.com");

    // First content: snapshot written
    let first = outcome_with_content(Status::Up, "hello", "h1");
    assert!(store.persist_outcome(&t, &first).unwrap());

    // Same hash again: result recorded, no new snapshot
    let same = outcome_with_content(Status::Unchanged, "hello", "h1");
    assert!(!store.persist_outcome(&t, &same).unwrap());

    // New hash: second snapshot
    let changed = outcome_with_content(Status::Changed, "hello world", "h2");
    assert!(store.persist_outcome(&t, &changed).unwrap());

    let snaps = store.latest_snapshots(t.id, 10).unwrap();
    assert_eq!(snaps.len(), 2);
    assert_eq!(snaps[0].hash, "h2");
    assert_eq!(snaps[1].hash, "h1");
    assert_eq!(store.latest_snapshot_hash(t.id).unwrap().as_deref(), Some("h2"));

    let history = store.check_history(t.id, 10).unwrap();
    assert_eq!(history.len(), 3);
}

#[test]
fn persist_outcome_skips_snapshot_without_content() {
    let store = new_store();
    let t = simple_target(&store, "https://example.com");

    let mut down = CheckOutcome::new(Status::Down);
    down.error = Some("connection refused".to_string());
    assert!(!store.persist_outcome(&t, &down).unwrap());
    assert!(store.latest_snapshots(t.id, 1).unwrap().is_empty());

    let history = store.check_history(t.id, 1).unwrap();
    assert_eq!(history[0].status, Status::Down);
    assert_eq!(history[0].error, "connection refused");
}

#[test]
fn uptime_stats_count_reachable_statuses() {
    let store = new_store();
    let t = simple_target(&store, "https://example.com");

    for (status, ms) in [
        (Status::Up, 10),
        (Status::Unchanged, 20),
        (Status::Changed, 30),
        (Status::Down, 40),
        (Status::Error, 50),
    ] {
        store.save_check_result(t.id, status, None, ms, "", "").unwrap();
    }

    let since = chrono::Utc::now() - chrono::Duration::hours(1);
    let stats = store.uptime_stats(t.id, since).unwrap();
    assert_eq!(stats.total, 5);
    assert_eq!(stats.up, 3);
    assert!((stats.avg_response_ms - 30.0).abs() < f64::EPSILON);
}

#[test]
fn notify_config_round_trip() {
    let store = new_store();
    store
        .save_notify_config("ops", "webhook", r#"{"url":"http://h/x"}"#)
        .unwrap();
    store
        .save_notify_config("shell", "command", r#"{"command":"true"}"#)
        .unwrap();

    let configs = store.list_notify_configs().unwrap();
    assert_eq!(configs.len(), 2);
    assert_eq!(configs[0].name, "ops");
    assert_eq!(configs[0].kind, "webhook");
    assert!(configs[0].enabled);

    store.remove_notify_config("ops").unwrap();
    assert_eq!(store.list_notify_configs().unwrap().len(), 1);
    assert!(store.remove_notify_config("ops").is_err());
}

#[test]
fn remove_target_by_any_identifier() {
    let store = new_store();
    let t = store
        .add_target(NewTarget {
            name: "gone".to_string(),
            url: "https://gone.example".to_string(),
            ..Default::default()
        })
        .unwrap();
    store.remove_target(&t.id.to_string()).unwrap();
    assert!(store.get_target("gone").is_err());
    assert!(store.remove_target("gone").is_err());
}
