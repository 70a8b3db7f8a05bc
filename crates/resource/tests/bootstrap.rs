//! Declarative bootstrap from [`ResourcesSettings`].

use std::sync::Arc;

use orchid_resource::testing::{Failure, MockFactory, RecordingSink, Script};
use orchid_resource::{
    Error, ErrorKind, ResourceKind, ResourceManager, ResourceState, ResourcesSettings,
};
use pretty_assertions::assert_eq;

/// Parsed from text so declaration order survives.
fn settings(json: &str) -> ResourcesSettings {
    serde_json::from_str(json).expect("settings parse")
}

fn manager(sink: &Arc<RecordingSink>) -> ResourceManager {
    let manager = ResourceManager::default().with_sink(sink.clone());
    manager.register_factory(ResourceKind::RelationalDb, MockFactory::new());
    manager.register_factory(ResourceKind::Cache, MockFactory::new());
    manager.register_factory(ResourceKind::Broker, MockFactory::new());
    manager
}

#[tokio::test]
async fn builds_in_declaration_order() {
    let sink = Arc::new(RecordingSink::new());
    let manager = manager(&sink);
    let settings = settings(
        r#"{
        "resources": {
            "primary-db": { "kind": "relational-db", "params": { "url": "postgres://db" } },
            "sessions": { "kind": "cache" },
            "events": { "kind": "broker" }
        },
        "required": ["primary-db", "sessions"]
    }"#,
    );

    manager.bootstrap(&settings).await.expect("bootstrap");

    let snapshot = manager.snapshot();
    let order: Vec<_> = snapshot.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(order, vec!["primary-db", "sessions", "events"]);
    assert!(snapshot.iter().all(|s| s.state == ResourceState::Ready));
    let sequences: Vec<_> = snapshot.iter().map(|s| s.sequence).collect();
    assert!(sequences.windows(2).all(|w| w[0] < w[1]), "{sequences:?}");
    assert_eq!(sink.count("resource.opened"), 3);
}

#[tokio::test]
async fn bootstrap_then_shutdown_reverses_declaration_order() {
    let sink = Arc::new(RecordingSink::new());
    let manager = manager(&sink);
    let settings = settings(
        r#"{
        "resources": {
            "primary-db": { "kind": "relational-db" },
            "sessions": { "kind": "cache" },
            "events": { "kind": "broker" }
        }
    }"#,
    );

    manager.bootstrap(&settings).await.expect("bootstrap");
    manager.shutdown_all().await.expect("shutdown");

    let closed: Vec<_> = sink
        .events()
        .into_iter()
        .filter(|e| e.name() == "resource.closed")
        .map(|e| e.resource().to_string())
        .collect();
    assert_eq!(closed, vec!["events", "sessions", "primary-db"]);
}

#[tokio::test]
async fn missing_required_names_are_listed() {
    let sink = Arc::new(RecordingSink::new());
    let manager = manager(&sink);
    let settings = settings(
        r#"{
        "resources": { "sessions": { "kind": "cache" } },
        "required": ["sessions", "primary-db", "events"]
    }"#,
    );

    let err = manager.bootstrap(&settings).await.expect_err("required names missing");

    match err {
        Error::MissingRequired { names } => assert_eq!(names, vec!["primary-db", "events"]),
        other => panic!("expected MissingRequired, got {other:?}"),
    }
    assert!(manager.handle("sessions").is_some());
}

#[tokio::test]
async fn construction_failure_stops_bootstrap() {
    let sink = Arc::new(RecordingSink::new());
    let manager = ResourceManager::default().with_sink(sink.clone());
    manager.register_factory(
        ResourceKind::RelationalDb,
        MockFactory::new().with_create(Script::fail(Failure::code("28P01"))),
    );
    manager.register_factory(ResourceKind::Cache, MockFactory::new());
    let settings = settings(
        r#"{
        "resources": {
            "primary-db": { "kind": "relational-db" },
            "sessions": { "kind": "cache" }
        }
    }"#,
    );

    let err = manager.bootstrap(&settings).await.expect_err("db refuses credentials");

    assert_eq!(err.kind(), ErrorKind::Auth);
    assert!(manager.handle("sessions").is_none());
    assert_eq!(sink.count("resource.opened"), 0);
}

#[tokio::test]
async fn invalid_names_are_rejected_before_any_build() {
    let sink = Arc::new(RecordingSink::new());
    let manager = manager(&sink);
    let settings = settings(
        r#"{
        "resources": {
            "sessions": { "kind": "cache" },
            "bad name": { "kind": "cache" }
        }
    }"#,
    );

    let err = manager.bootstrap(&settings).await.expect_err("invalid name");

    assert!(matches!(err, Error::InvalidName { .. }), "got {err:?}");
    assert!(sink.events().is_empty());
}
