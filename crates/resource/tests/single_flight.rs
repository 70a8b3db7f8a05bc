//! Concurrent `get` calls for one name share a single construction.

use std::sync::Arc;
use std::time::Duration;

use orchid_resource::testing::{Failure, MockFactory, RecordingSink, Script};
use orchid_resource::{ErrorKind, ResourceConfig, ResourceKind, ResourceManager, ResourceState};

fn cache() -> ResourceConfig {
    ResourceConfig::new(ResourceKind::Cache)
}

fn manager(factory: &Arc<MockFactory>, sink: &Arc<RecordingSink>) -> Arc<ResourceManager> {
    let manager = ResourceManager::default().with_sink(sink.clone());
    manager.register_factory(ResourceKind::Cache, Arc::clone(factory));
    Arc::new(manager)
}

#[tokio::test(start_paused = true)]
async fn two_concurrent_gets_build_once() {
    let factory = Arc::new(MockFactory::new().with_create(Script::delayed(Duration::from_millis(100))));
    let sink = Arc::new(RecordingSink::new());
    let manager = manager(&factory, &sink);

    let first = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.get("sessions", ResourceKind::Cache, &cache()).await })
    };
    let second = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.get("sessions", ResourceKind::Cache, &cache()).await })
    };

    let first = first.await.expect("join").expect("first get");
    let second = second.await.expect("join").expect("second get");

    assert!(Arc::ptr_eq(&first, &second), "both callers get the same handle");
    assert_eq!(factory.creates(), 1);
    assert_eq!(first.state(), ResourceState::Ready);
    assert_eq!(sink.count("resource.opened"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_concurrent_gets_build_once() {
    let factory = Arc::new(MockFactory::new().with_create(Script::delayed(Duration::from_millis(20))));
    let sink = Arc::new(RecordingSink::new());
    let manager = manager(&factory, &sink);

    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.get("sessions", ResourceKind::Cache, &cache()).await })
        })
        .collect();

    let mut handles = Vec::new();
    for task in tasks {
        handles.push(task.await.expect("join").expect("get"));
    }

    assert_eq!(factory.creates(), 1);
    assert!(handles.iter().all(|h| Arc::ptr_eq(h, &handles[0])));
}

#[tokio::test(start_paused = true)]
async fn failed_build_is_shared_then_retried() {
    let factory = Arc::new(MockFactory::new().with_create(
        Script::fail(Failure::code("LOADING")).after(Duration::from_millis(50)),
    ));
    let sink = Arc::new(RecordingSink::new());
    let manager = manager(&factory, &sink);

    let config = cache();
    let (a, b) = tokio::join!(
        manager.get("sessions", ResourceKind::Cache, &config),
        manager.get("sessions", ResourceKind::Cache, &config),
    );
    let a = a.expect_err("first waiter sees the failure");
    let b = b.expect_err("second waiter sees the failure");
    assert_eq!(a.to_string(), b.to_string());
    assert_eq!(a.kind(), ErrorKind::Transient);
    assert_eq!(factory.creates(), 1);

    factory.set_create(Script::ok());
    let handle = manager
        .get("sessions", ResourceKind::Cache, &cache())
        .await
        .expect("retry builds again");

    assert_eq!(handle.state(), ResourceState::Ready);
    assert_eq!(factory.creates(), 2);
}

#[tokio::test(start_paused = true)]
async fn different_names_build_independently() {
    let factory = Arc::new(MockFactory::new().with_create(Script::delayed(Duration::from_millis(100))));
    let sink = Arc::new(RecordingSink::new());
    let manager = manager(&factory, &sink);

    let config = cache();
    let (a, b) = tokio::join!(
        manager.get("sessions", ResourceKind::Cache, &config),
        manager.get("rate-limits", ResourceKind::Cache, &config),
    );

    let a = a.expect("sessions");
    let b = b.expect("rate-limits");
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(factory.creates(), 2);
    assert_eq!(manager.handles().len(), 2);
}
