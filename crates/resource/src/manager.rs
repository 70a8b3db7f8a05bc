//! Resource manager: central registry, single-flight construction and
//! ordered shutdown.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::OnceCell;

use crate::config::{
    ManagerConfig, ResourceConfig, ResourcesSettings, duration_ms, validate_resource_name,
};
use crate::error::{CloseFailure, Error, ResourceError, Result, ShutdownError};
use crate::events::{EventSink, NoopSink};
use crate::factory::ResourceFactory;
use crate::handle::ResourceHandle;
use crate::health::HealthCheck;
use crate::kind::ResourceKind;
use crate::state::ResourceState;
use crate::taxonomy::ErrorTaxonomy;

/// Shared outcome of one construction; every concurrent caller awaits it.
type Flight = Arc<OnceCell<Result<Arc<ResourceHandle>>>>;

enum Slot {
    Building { kind: ResourceKind, flight: Flight },
    Ready { handle: Arc<ResourceHandle>, sequence: u64 },
}

/// Lifecycle of the manager itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerPhase {
    /// No resource has been registered yet.
    Empty,
    /// At least one resource is registered.
    Populated,
    /// `shutdown_all` is closing handles; new requests are refused.
    ShuttingDown,
    /// Every handle has been visited by `shutdown_all`.
    Drained,
}

impl ManagerPhase {
    fn is_closing(self) -> bool {
        matches!(self, Self::ShuttingDown | Self::Drained)
    }
}

struct Registry {
    phase: ManagerPhase,
    slots: HashMap<String, Slot>,
    next_sequence: u64,
}

impl Registry {
    fn register(&mut self, name: &str, handle: &Arc<ResourceHandle>) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.slots.insert(
            name.to_string(),
            Slot::Ready {
                handle: Arc::clone(handle),
                sequence,
            },
        );
        if self.phase == ManagerPhase::Empty {
            self.phase = ManagerPhase::Populated;
        }
        sequence
    }

    /// Drop the Building slot for `name` if it still belongs to `flight`.
    fn release(&mut self, name: &str, flight: &Flight) {
        let ours = matches!(
            self.slots.get(name),
            Some(Slot::Building { flight: current, .. }) if Arc::ptr_eq(current, flight)
        );
        if ours {
            self.slots.remove(name);
        }
    }
}

/// Point-in-time view of one registered resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceSnapshot {
    /// The resource name.
    pub name: String,
    /// The resource kind.
    pub kind: ResourceKind,
    /// Lifecycle state; in-flight constructions report `Initializing`.
    pub state: ResourceState,
    /// Most recent probe, if any.
    pub last_health_check: Option<HealthCheck>,
    /// Registration order; `None` while still building.
    pub sequence: Option<u64>,
}

// ---------------------------------------------------------------------------
// ResourceManager
// ---------------------------------------------------------------------------

/// Central registry of named resource handles.
///
/// At most one handle exists per name and at most one construction per
/// name is in flight. Handles are created lazily by [`get`](Self::get) and
/// closed in reverse registration order by
/// [`shutdown_all`](Self::shutdown_all).
///
/// The registry lock is never held across an `.await`.
pub struct ResourceManager {
    config: ManagerConfig,
    factories: DashMap<ResourceKind, Arc<dyn ResourceFactory>>,
    registry: Mutex<Registry>,
    taxonomy: Arc<ErrorTaxonomy>,
    sink: Arc<dyn EventSink>,
}

impl ResourceManager {
    /// Create a new empty manager.
    #[must_use]
    pub fn new(config: ManagerConfig) -> Self {
        Self {
            config,
            factories: DashMap::new(),
            registry: Mutex::new(Registry {
                phase: ManagerPhase::Empty,
                slots: HashMap::new(),
                next_sequence: 0,
            }),
            taxonomy: Arc::new(ErrorTaxonomy::default()),
            sink: Arc::new(NoopSink),
        }
    }

    /// Validate `config` and create a manager.
    pub fn try_new(config: ManagerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config))
    }

    /// Deliver lifecycle events of every handle to `sink`.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Translate failures with a customized taxonomy.
    #[must_use]
    pub fn with_taxonomy(mut self, taxonomy: ErrorTaxonomy) -> Self {
        self.taxonomy = Arc::new(taxonomy);
        self
    }

    /// The manager's configuration.
    #[must_use]
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> ManagerPhase {
        self.registry.lock().phase
    }

    /// Register the factory for `kind`, replacing any previous one.
    pub fn register_factory<F: ResourceFactory>(&self, kind: ResourceKind, factory: F) {
        if self.factories.insert(kind, Arc::new(factory)).is_some() {
            tracing::debug!(kind = %kind, "replaced resource factory");
        } else {
            tracing::debug!(kind = %kind, "registered resource factory");
        }
    }

    /// Return the handle for `name`, constructing it on first use.
    ///
    /// `config` is validated before anything is registered. Concurrent
    /// callers for the same name share one construction and
    /// receive the same handle or the same error. A failed construction is
    /// not cached; the next call retries. A handle that was closed is never
    /// recreated.
    pub async fn get(
        &self,
        name: &str,
        kind: ResourceKind,
        config: &ResourceConfig,
    ) -> Result<Arc<ResourceHandle>> {
        validate_resource_name(name)?;
        config.validate()?;
        if config.kind != kind {
            return Err(Error::KindMismatch {
                name: name.to_string(),
                existing: config.kind,
                requested: kind,
            });
        }

        let flight = {
            let mut registry = self.registry.lock();
            if registry.phase.is_closing() {
                return Err(Error::ShuttingDown {
                    name: name.to_string(),
                });
            }
            match registry.slots.get(name) {
                Some(Slot::Ready { handle, .. }) => {
                    if handle.kind() != kind {
                        return Err(Error::KindMismatch {
                            name: name.to_string(),
                            existing: handle.kind(),
                            requested: kind,
                        });
                    }
                    if handle.state().is_terminal() {
                        return Err(Error::Closed {
                            name: name.to_string(),
                        });
                    }
                    return Ok(Arc::clone(handle));
                }
                Some(Slot::Building {
                    kind: building,
                    flight,
                }) => {
                    if *building != kind {
                        return Err(Error::KindMismatch {
                            name: name.to_string(),
                            existing: *building,
                            requested: kind,
                        });
                    }
                    Arc::clone(flight)
                }
                None => {
                    let flight = Flight::default();
                    registry.slots.insert(
                        name.to_string(),
                        Slot::Building {
                            kind,
                            flight: Arc::clone(&flight),
                        },
                    );
                    flight
                }
            }
        };

        flight
            .get_or_init(|| self.build(name, kind, config, &flight))
            .await
            .clone()
    }

    async fn build(
        &self,
        name: &str,
        kind: ResourceKind,
        config: &ResourceConfig,
        flight: &Flight,
    ) -> Result<Arc<ResourceHandle>> {
        let handle = match self.open_handle(name, kind, config).await {
            Ok(handle) => handle,
            Err(error) => {
                self.registry.lock().release(name, flight);
                return Err(error);
            }
        };

        let sequence = {
            let mut registry = self.registry.lock();
            if registry.phase.is_closing() {
                registry.release(name, flight);
                None
            } else {
                Some(registry.register(name, &handle))
            }
        };

        match sequence {
            Some(sequence) => {
                tracing::debug!(resource = %name, kind = %kind, sequence, "resource registered");
                Ok(handle)
            }
            None => {
                tracing::warn!(
                    resource = %name,
                    kind = %kind,
                    "resource finished construction after shutdown began; closing it"
                );
                if let Err(error) = handle.close_with_timeout(self.config.close_timeout()).await {
                    tracing::warn!(resource = %name, error = %error, "failed to close orphaned resource");
                }
                Err(Error::ShuttingDown {
                    name: name.to_string(),
                })
            }
        }
    }

    async fn open_handle(
        &self,
        name: &str,
        kind: ResourceKind,
        config: &ResourceConfig,
    ) -> Result<Arc<ResourceHandle>> {
        let factory = self
            .factories
            .get(&kind)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(Error::FactoryNotRegistered { kind })?;

        let health_timeout = config
            .health_timeout_ms
            .map_or_else(|| self.config.health_timeout(), Duration::from_millis);
        let handle = Arc::new(
            ResourceHandle::new(name, kind)
                .with_sink(Arc::clone(&self.sink))
                .with_taxonomy(Arc::clone(&self.taxonomy))
                .with_open_timeout(self.config.open_timeout())
                .with_health_timeout(health_timeout)
                .with_close_timeout(self.config.close_timeout()),
        );
        handle.open(factory.as_ref(), config).await?;
        Ok(handle)
    }

    /// The registered handle for `name`, if construction has completed.
    #[must_use]
    pub fn handle(&self, name: &str) -> Option<Arc<ResourceHandle>> {
        match self.registry.lock().slots.get(name) {
            Some(Slot::Ready { handle, .. }) => Some(Arc::clone(handle)),
            Some(Slot::Building { .. }) | None => None,
        }
    }

    /// Like [`handle`](Self::handle), but a missing name is an error.
    pub fn require(&self, name: &str) -> Result<Arc<ResourceHandle>> {
        self.handle(name).ok_or_else(|| Error::NotFound {
            name: name.to_string(),
        })
    }

    /// Every registered handle, in registration order.
    #[must_use]
    pub fn handles(&self) -> Vec<Arc<ResourceHandle>> {
        let registry = self.registry.lock();
        let mut ready: Vec<_> = registry
            .slots
            .values()
            .filter_map(|slot| match slot {
                Slot::Ready { handle, sequence } => Some((*sequence, Arc::clone(handle))),
                Slot::Building { .. } => None,
            })
            .collect();
        ready.sort_by_key(|(sequence, _)| *sequence);
        ready.into_iter().map(|(_, handle)| handle).collect()
    }

    /// Point-in-time view of every slot, including in-flight builds.
    ///
    /// Registered resources come first in registration order, followed by
    /// in-flight builds sorted by name. Never waits on a build.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ResourceSnapshot> {
        let registry = self.registry.lock();
        let mut entries: Vec<_> = registry
            .slots
            .iter()
            .map(|(name, slot)| match slot {
                Slot::Building { kind, .. } => ResourceSnapshot {
                    name: name.clone(),
                    kind: *kind,
                    state: ResourceState::Initializing,
                    last_health_check: None,
                    sequence: None,
                },
                Slot::Ready { handle, sequence } => ResourceSnapshot {
                    name: name.clone(),
                    kind: handle.kind(),
                    state: handle.state(),
                    last_health_check: handle.last_health_check(),
                    sequence: Some(*sequence),
                },
            })
            .collect();
        entries.sort_by(|a, b| {
            (a.sequence.is_none(), a.sequence, &a.name).cmp(&(b.sequence.is_none(), b.sequence, &b.name))
        });
        entries
    }

    /// Construct every configured resource in declaration order, then
    /// check that every required name exists.
    pub async fn bootstrap(&self, settings: &ResourcesSettings) -> Result<()> {
        settings.validate()?;
        for (name, config) in &settings.resources {
            self.get(name, config.kind, config).await?;
        }

        let missing: Vec<String> = settings
            .required
            .iter()
            .filter(|name| self.handle(name).is_none())
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(Error::MissingRequired { names: missing });
        }

        tracing::info!(
            resources = settings.resources.len(),
            required = settings.required.len(),
            "resources bootstrapped"
        );
        Ok(())
    }

    /// Close every handle in reverse registration order.
    ///
    /// Constructions still in flight are awaited first, each bounded by the
    /// close timeout; a build that completes during shutdown closes its own
    /// client, and one whose builder was cancelled is discarded. Each close
    /// gets its own timeout and a failure does not stop the sweep; all
    /// failures are reported together once every slot has been visited.
    /// New requests are refused from the moment this is called. Calling it
    /// again is a no-op.
    pub async fn shutdown_all(&self) -> Result<()> {
        let (mut handles, flights) = {
            let mut registry = self.registry.lock();
            if registry.phase.is_closing() {
                return Ok(());
            }
            registry.phase = ManagerPhase::ShuttingDown;
            let mut handles = Vec::new();
            let mut flights = Vec::new();
            for (name, slot) in &registry.slots {
                match slot {
                    Slot::Ready { handle, sequence } => handles.push((*sequence, Arc::clone(handle))),
                    Slot::Building { kind, flight } => {
                        flights.push((name.clone(), *kind, Arc::clone(flight)));
                    }
                }
            }
            (handles, flights)
        };
        handles.sort_by(|a, b| b.0.cmp(&a.0));

        tracing::info!(
            resources = handles.len(),
            in_flight = flights.len(),
            "shutting down resources"
        );

        let close_timeout = self.config.close_timeout();
        let mut failures = Vec::new();

        for (name, kind, flight) in flights {
            if let Some(failure) = self.drain_flight(&name, kind, &flight, close_timeout).await {
                failures.push(failure);
            }
        }

        for (_, handle) in handles {
            if let Err(error) = handle.close_with_timeout(close_timeout).await {
                tracing::warn!(
                    resource = %handle.name(),
                    kind = %handle.kind(),
                    error_kind = %error.kind(),
                    error = %error,
                    "resource failed to close during shutdown"
                );
                failures.push(CloseFailure {
                    name: handle.name().to_string(),
                    kind: handle.kind(),
                    error,
                });
            }
        }

        self.registry.lock().phase = ManagerPhase::Drained;

        if failures.is_empty() {
            tracing::info!("all resources closed");
            Ok(())
        } else {
            tracing::warn!(failed = failures.len(), "shutdown finished with failures");
            Err(ShutdownError { failures }.into())
        }
    }

    /// Wait for an in-flight construction to settle during shutdown.
    ///
    /// A live builder sees the closing phase and closes what it built; an
    /// abandoned flight is settled here. Either way the slot is gone when
    /// this returns.
    async fn drain_flight(
        &self,
        name: &str,
        kind: ResourceKind,
        flight: &Flight,
        limit: Duration,
    ) -> Option<CloseFailure> {
        let settle = flight.get_or_init(|| async {
            Err(Error::ShuttingDown {
                name: name.to_string(),
            })
        });
        let outcome = tokio::time::timeout(limit, settle).await;
        self.registry.lock().release(name, flight);

        match outcome {
            Ok(_) => None,
            Err(_) => {
                let error = ResourceError::transient(
                    kind.domain(),
                    format!("construction still running after {}ms of shutdown", duration_ms(limit)),
                )
                .with_resource(name);
                tracing::warn!(
                    resource = %name,
                    kind = %kind,
                    error = %error,
                    "in-flight construction did not settle during shutdown"
                );
                Some(CloseFailure {
                    name: name.to_string(),
                    kind,
                    error,
                })
            }
        }
    }
}

impl Default for ResourceManager {
    fn default() -> Self {
        Self::new(ManagerConfig::default())
    }
}

impl std::fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.registry.lock();
        f.debug_struct("ResourceManager")
            .field("phase", &registry.phase)
            .field("resources", &registry.slots.len())
            .field("factories", &self.factories.len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Process default
// ---------------------------------------------------------------------------

static DEFAULT: OnceLock<Arc<ResourceManager>> = OnceLock::new();

/// Install the process-wide default manager. Succeeds once per process.
pub fn install_default(manager: Arc<ResourceManager>) -> Result<()> {
    DEFAULT
        .set(manager)
        .map_err(|_| Error::DefaultAlreadyInstalled)
}

/// The process-wide default manager, if one was installed.
#[must_use]
pub fn default_manager() -> Option<Arc<ResourceManager>> {
    DEFAULT.get().cloned()
}

/// Shut down the default manager, if installed. Later calls are no-ops.
pub async fn shutdown_default() -> Result<()> {
    match default_manager() {
        Some(manager) => manager.shutdown_all().await,
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::{Failure, MockFactory, RecordingSink, Script};
    use pretty_assertions::assert_eq;

    fn cache() -> ResourceConfig {
        ResourceConfig::new(ResourceKind::Cache)
    }

    fn manager_with(factory: &Arc<MockFactory>) -> ResourceManager {
        let manager = ResourceManager::default();
        manager.register_factory(ResourceKind::Cache, Arc::clone(factory));
        manager
    }

    // ---- get ----

    #[tokio::test]
    async fn invalid_resource_config_is_rejected_before_building() {
        let factory = Arc::new(MockFactory::new());
        let manager = manager_with(&factory);
        let config = ResourceConfig {
            open_timeout_ms: Some(0),
            ..cache()
        };

        let result = manager.get("sessions", ResourceKind::Cache, &config).await;

        assert!(matches!(result, Err(Error::Configuration { .. })), "{result:?}");
        assert_eq!(factory.creates(), 0);
        assert!(manager.snapshot().is_empty());
    }

    #[tokio::test]
    async fn get_returns_cached_handle() {
        let factory = Arc::new(MockFactory::new());
        let manager = manager_with(&factory);

        let first = manager.get("sessions", ResourceKind::Cache, &cache()).await.expect("first");
        let second = manager.get("sessions", ResourceKind::Cache, &cache()).await.expect("second");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(factory.creates(), 1);
        assert_eq!(manager.phase(), ManagerPhase::Populated);
    }

    #[tokio::test]
    async fn invalid_name_is_rejected_before_building() {
        let factory = Arc::new(MockFactory::new());
        let manager = manager_with(&factory);

        let result = manager.get("bad name", ResourceKind::Cache, &cache()).await;

        assert!(matches!(result, Err(Error::InvalidName { .. })), "{result:?}");
        assert_eq!(factory.creates(), 0);
        assert_eq!(manager.phase(), ManagerPhase::Empty);
    }

    #[tokio::test]
    async fn missing_factory_is_reported_and_not_cached() {
        let manager = ResourceManager::default();

        let result = manager.get("queue", ResourceKind::Broker, &ResourceConfig::new(ResourceKind::Broker)).await;
        match result {
            Err(Error::FactoryNotRegistered { kind }) => assert_eq!(kind, ResourceKind::Broker),
            other => panic!("expected FactoryNotRegistered, got {other:?}"),
        }
        assert!(manager.snapshot().is_empty());
    }

    #[tokio::test]
    async fn kind_mismatch_with_registered_handle() {
        let factory = Arc::new(MockFactory::new());
        let manager = manager_with(&factory);
        manager.register_factory(ResourceKind::Broker, Arc::clone(&factory));
        manager.get("shared", ResourceKind::Cache, &cache()).await.expect("cache");

        let result = manager
            .get("shared", ResourceKind::Broker, &ResourceConfig::new(ResourceKind::Broker))
            .await;

        match result {
            Err(Error::KindMismatch { existing, requested, .. }) => {
                assert_eq!(existing, ResourceKind::Cache);
                assert_eq!(requested, ResourceKind::Broker);
            }
            other => panic!("expected KindMismatch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn config_kind_must_match_requested_kind() {
        let manager = ResourceManager::default();
        let result = manager.get("x", ResourceKind::Cache, &ResourceConfig::new(ResourceKind::Broker)).await;
        assert!(matches!(result, Err(Error::KindMismatch { .. })), "{result:?}");
    }

    #[tokio::test]
    async fn closed_handle_is_never_recreated() {
        let factory = Arc::new(MockFactory::new());
        let manager = manager_with(&factory);
        let handle = manager.get("sessions", ResourceKind::Cache, &cache()).await.expect("get");
        handle.close().await.expect("close");

        let result = manager.get("sessions", ResourceKind::Cache, &cache()).await;

        assert!(matches!(result, Err(Error::Closed { .. })), "{result:?}");
        assert_eq!(factory.creates(), 1);
    }

    #[tokio::test]
    async fn failed_build_is_retried() {
        let factory = Arc::new(
            MockFactory::new().with_create(Script::fail(Failure::io(
                std::io::ErrorKind::ConnectionRefused,
                "refused",
            ))),
        );
        let manager = manager_with(&factory);

        let err = manager.get("sessions", ResourceKind::Cache, &cache()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transient);
        assert!(manager.handle("sessions").is_none());

        factory.set_create(Script::ok());
        let handle = manager.get("sessions", ResourceKind::Cache, &cache()).await.expect("retry");

        assert_eq!(handle.state(), ResourceState::Ready);
        assert_eq!(factory.creates(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_waiters_share_failure() {
        let factory = Arc::new(MockFactory::new().with_create(
            Script::fail(Failure::code("NOAUTH")).after(Duration::from_millis(100)),
        ));
        let manager = Arc::new(manager_with(&factory));

        let config = cache();
        let (a, b) = tokio::join!(
            manager.get("sessions", ResourceKind::Cache, &config),
            manager.get("sessions", ResourceKind::Cache, &config),
        );

        assert_eq!(a.unwrap_err().kind(), ErrorKind::Auth);
        assert_eq!(b.unwrap_err().kind(), ErrorKind::Auth);
        assert_eq!(factory.creates(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_builder_hands_over_to_waiter() {
        let factory = Arc::new(MockFactory::new().with_create(Script::delayed(Duration::from_millis(100))));
        let manager = Arc::new(manager_with(&factory));

        let cancelled = tokio::time::timeout(
            Duration::from_millis(10),
            manager.get("sessions", ResourceKind::Cache, &cache()),
        )
        .await;
        assert!(cancelled.is_err());

        let handle = manager.get("sessions", ResourceKind::Cache, &cache()).await.expect("takeover");
        assert_eq!(handle.state(), ResourceState::Ready);
        assert_eq!(factory.creates(), 2);
    }

    // ---- snapshot ----

    #[tokio::test(start_paused = true)]
    async fn snapshot_reports_in_flight_builds() {
        let factory = Arc::new(MockFactory::new().with_create(Script::delayed(Duration::from_secs(1))));
        let manager = Arc::new(manager_with(&factory));

        let builder = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.get("slow", ResourceKind::Cache, &cache()).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let snapshot = manager.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].state, ResourceState::Initializing);
        assert_eq!(snapshot[0].sequence, None);

        builder.await.expect("join").expect("build");
        let snapshot = manager.snapshot();
        assert_eq!(snapshot[0].state, ResourceState::Ready);
        assert_eq!(snapshot[0].sequence, Some(0));
    }

    #[tokio::test]
    async fn require_reports_not_found() {
        let manager = ResourceManager::default();
        match manager.require("ghost") {
            Err(Error::NotFound { name }) => assert_eq!(name, "ghost"),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    // ---- shutdown ----

    #[tokio::test]
    async fn shutdown_refuses_new_requests_and_is_idempotent() {
        let sink = Arc::new(RecordingSink::new());
        let factory = Arc::new(MockFactory::new());
        let manager = manager_with(&factory).with_sink(sink.clone());
        manager.get("sessions", ResourceKind::Cache, &cache()).await.expect("get");

        manager.shutdown_all().await.expect("shutdown");
        manager.shutdown_all().await.expect("second shutdown");

        assert_eq!(manager.phase(), ManagerPhase::Drained);
        assert_eq!(sink.count("resource.closed"), 1);
        let result = manager.get("other", ResourceKind::Cache, &cache()).await;
        assert!(matches!(result, Err(Error::ShuttingDown { .. })), "{result:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn build_finishing_after_shutdown_is_closed() {
        let factory = Arc::new(MockFactory::new().with_create(Script::delayed(Duration::from_millis(100))));
        let manager = Arc::new(manager_with(&factory));

        let builder = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.get("late", ResourceKind::Cache, &cache()).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        manager.shutdown_all().await.expect("nothing registered yet");

        let result = builder.await.expect("join");
        assert!(matches!(result, Err(Error::ShuttingDown { .. })), "{result:?}");
        assert_eq!(factory.stats().closes(), 1);
        assert!(manager.snapshot().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_close_timeout_is_reported() {
        let factory = Arc::new(MockFactory::new().with_close(Script::hang()));
        let manager = ResourceManager::new(ManagerConfig {
            close_timeout_ms: 50,
            ..ManagerConfig::default()
        });
        manager.register_factory(ResourceKind::Cache, Arc::clone(&factory));
        let handle = manager.get("stuck", ResourceKind::Cache, &cache()).await.expect("get");

        match manager.shutdown_all().await {
            Err(Error::Shutdown(shutdown)) => {
                assert_eq!(shutdown.names(), vec!["stuck"]);
                assert_eq!(shutdown.failures[0].error.kind(), ErrorKind::Transient);
            }
            other => panic!("expected Shutdown, got {other:?}"),
        }
        assert_eq!(handle.state(), ResourceState::Closed);
    }

    #[test]
    fn try_new_validates_config() {
        let result = ResourceManager::try_new(ManagerConfig {
            health_timeout_ms: 0,
            ..ManagerConfig::default()
        });
        assert!(matches!(result, Err(Error::Configuration { .. })));
    }
}
