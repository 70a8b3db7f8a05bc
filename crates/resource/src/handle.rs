//! A named, lifecycle-managed wrapper around one native client.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;

use crate::config::{ManagerConfig, ResourceConfig, duration_ms};
use crate::error::{BoxError, Error, ErrorKind, ResourceError, Result};
use crate::events::{CloseOutcome, EventSink, NoopSink, ResourceEvent, emit_safely};
use crate::factory::{ResourceClient, ResourceFactory};
use crate::health::{HealthCheck, HealthStatus};
use crate::kind::ResourceKind;
use crate::state::ResourceState;
use crate::taxonomy::ErrorTaxonomy;

/// Owns one native client and its lifecycle state.
///
/// The client is only reachable through [`with_client`](Self::with_client);
/// every failure it reports leaves the handle as a [`ResourceError`].
/// Handles are shared as `Arc<ResourceHandle>` and all methods take
/// `&self`.
pub struct ResourceHandle {
    name: String,
    kind: ResourceKind,
    state: RwLock<ResourceState>,
    client: Mutex<Option<Arc<dyn ResourceClient>>>,
    last_health_check: RwLock<Option<HealthCheck>>,
    /// Serializes open and close.
    lifecycle: tokio::sync::Mutex<()>,
    open_timeout: Option<Duration>,
    health_timeout: Duration,
    close_timeout: Duration,
    taxonomy: Arc<ErrorTaxonomy>,
    sink: Arc<dyn EventSink>,
}

impl ResourceHandle {
    /// Create an Uninitialized handle with default timeouts and no sink.
    pub fn new(name: impl Into<String>, kind: ResourceKind) -> Self {
        let defaults = ManagerConfig::default();
        Self {
            name: name.into(),
            kind,
            state: RwLock::new(ResourceState::Uninitialized),
            client: Mutex::new(None),
            last_health_check: RwLock::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
            open_timeout: defaults.open_timeout(),
            health_timeout: defaults.health_timeout(),
            close_timeout: defaults.close_timeout(),
            taxonomy: Arc::new(ErrorTaxonomy::default()),
            sink: Arc::new(NoopSink),
        }
    }

    /// Deliver lifecycle events to `sink`.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Translate failures with `taxonomy`.
    #[must_use]
    pub fn with_taxonomy(mut self, taxonomy: Arc<ErrorTaxonomy>) -> Self {
        self.taxonomy = taxonomy;
        self
    }

    /// Bound construction by `timeout` unless the config overrides it.
    #[must_use]
    pub fn with_open_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.open_timeout = timeout;
        self
    }

    /// Default probe timeout, used by the health aggregator.
    #[must_use]
    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    /// Timeout applied by [`close`](Self::close).
    #[must_use]
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// The resource name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The resource kind.
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ResourceState {
        *self.state.read()
    }

    /// Result of the most recent probe, if any.
    #[must_use]
    pub fn last_health_check(&self) -> Option<HealthCheck> {
        self.last_health_check.read().clone()
    }

    /// Probe timeout used when the caller does not supply one.
    #[must_use]
    pub fn health_timeout(&self) -> Duration {
        self.health_timeout
    }

    // ---- open ----

    /// Construct the client: `Uninitialized -> Initializing -> Ready`.
    ///
    /// On failure the handle ends in `Failed` and the construction error is
    /// returned translated. The handle is never left `Initializing`, even
    /// if this future is dropped mid-construction.
    pub async fn open(&self, factory: &dyn ResourceFactory, config: &ResourceConfig) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        self.transition(ResourceState::Initializing)?;
        let guard = SettleOnDrop::new(self, ResourceState::Failed);

        let open_timeout = config
            .open_timeout_ms
            .map(Duration::from_millis)
            .or(self.open_timeout);
        let started = Instant::now();
        let created = match open_timeout {
            Some(limit) => match tokio::time::timeout(limit, factory.create(config)).await {
                Ok(created) => created,
                Err(_) => Err(Box::new(ResourceError::transient(
                    self.kind.domain(),
                    format!("construction timed out after {}ms", duration_ms(limit)),
                )) as BoxError),
            },
            None => factory.create(config).await,
        };
        let elapsed = started.elapsed();
        guard.disarm();

        match created {
            Ok(client) => {
                *self.client.lock() = Some(Arc::from(client));
                *self.state.write() = ResourceState::Ready;
                tracing::debug!(
                    resource = %self.name,
                    kind = %self.kind,
                    elapsed_ms = duration_ms(elapsed),
                    "resource opened"
                );
                self.emit(ResourceEvent::Opened {
                    name: self.name.clone(),
                    kind: self.kind,
                    duration: elapsed,
                });
                Ok(())
            }
            Err(native) => {
                let error = self.translate(native);
                *self.state.write() = ResourceState::Failed;
                tracing::warn!(
                    resource = %self.name,
                    kind = %self.kind,
                    error_kind = %error.kind(),
                    error = %error,
                    "resource construction failed"
                );
                self.emit_error(error.kind());
                Err(error.into())
            }
        }
    }

    // ---- health ----

    /// Probe the client without raising.
    ///
    /// A successful probe reports Ready, a timeout reports Degraded, and a
    /// probe error is translated and reported Failed. A live handle moves
    /// to Ready on success and to Degraded otherwise; it never becomes
    /// terminal because of a probe. Handles that are not live are reported
    /// Failed without probing.
    pub async fn health_check(&self, timeout: Duration) -> HealthCheck {
        let state = self.state();
        let client = if state.is_live() {
            self.client.lock().clone()
        } else {
            None
        };
        let Some(client) = client else {
            let check = HealthCheck::failed(Duration::ZERO, format!("resource is {state}"));
            *self.last_health_check.write() = Some(check.clone());
            return check;
        };

        let started = Instant::now();
        let outcome = tokio::time::timeout(timeout, client.ping()).await;
        let latency = started.elapsed();

        let check = match outcome {
            Ok(Ok(())) => HealthCheck::ready(latency),
            Ok(Err(native)) => {
                let error = self.translate(native);
                self.emit_error(error.kind());
                HealthCheck::failed(latency, error.to_string())
            }
            Err(_) => HealthCheck::timed_out(
                latency,
                format!("health probe timed out after {}ms", duration_ms(timeout)),
            ),
        };
        self.record_health(check.clone());
        check
    }

    /// Store `check` and move a live handle between Ready and Degraded.
    pub(crate) fn record_health(&self, check: HealthCheck) {
        let target = if check.is_ready() {
            ResourceState::Ready
        } else {
            ResourceState::Degraded
        };
        let changed = {
            let mut state = self.state.write();
            if state.is_live() && *state != target {
                Some(std::mem::replace(&mut *state, target))
            } else {
                None
            }
        };

        if !check.is_ready() {
            tracing::warn!(
                resource = %self.name,
                kind = %self.kind,
                status = %check.status,
                timed_out = check.timed_out,
                detail = check.message.as_deref().unwrap_or_default(),
                "resource probe did not succeed"
            );
        }
        *self.last_health_check.write() = Some(check);

        if let Some(from) = changed {
            self.emit(ResourceEvent::HealthChanged {
                name: self.name.clone(),
                from: live_status(from),
                to: live_status(target),
            });
        }
    }

    // ---- delegated operations ----

    /// Run `op` against the client, downcast to `C`.
    ///
    /// Fails with [`Error::NotReady`] unless the handle is Ready or
    /// Degraded, and with [`Error::ClientType`] if the client is not a `C`.
    /// Failures from `op` are translated and reported as `resource.error`.
    ///
    /// ```ignore
    /// let rows = handle
    ///     .with_client::<PgClient, _, _>(|pg| Box::pin(async move { pg.count("users").await }))
    ///     .await?;
    /// ```
    pub async fn with_client<C, T, F>(&self, op: F) -> Result<T>
    where
        C: ResourceClient,
        F: for<'c> FnOnce(&'c C) -> BoxFuture<'c, std::result::Result<T, BoxError>>,
    {
        let state = self.state();
        let client = if state.is_live() {
            self.client.lock().clone()
        } else {
            None
        };
        let Some(client) = client else {
            return Err(Error::NotReady {
                name: self.name.clone(),
                state,
            });
        };

        let Some(typed) = (&*client as &dyn Any).downcast_ref::<C>() else {
            return Err(Error::ClientType {
                name: self.name.clone(),
                expected: std::any::type_name::<C>(),
            });
        };

        match op(typed).await {
            Ok(value) => Ok(value),
            Err(native) => {
                let error = self.translate(native);
                tracing::debug!(
                    resource = %self.name,
                    kind = %self.kind,
                    error_kind = %error.kind(),
                    "resource operation failed"
                );
                self.emit_error(error.kind());
                Err(error.into())
            }
        }
    }

    // ---- close ----

    /// Close with the handle's configured timeout. See
    /// [`close_with_timeout`](Self::close_with_timeout).
    pub async fn close(&self) -> std::result::Result<ResourceState, ResourceError> {
        self.close_with_timeout(self.close_timeout).await
    }

    /// Release the client and end in `Closed`.
    ///
    /// Idempotent: a handle already `Closed` or `Failed` returns its state
    /// without emitting anything. A close that raises or exceeds `timeout`
    /// still ends in `Closed`; the failure is returned translated (a
    /// timeout as Transient).
    pub async fn close_with_timeout(
        &self,
        timeout: Duration,
    ) -> std::result::Result<ResourceState, ResourceError> {
        let _lifecycle = self.lifecycle.lock().await;
        {
            let mut state = self.state.write();
            if state.is_terminal() {
                return Ok(*state);
            }
            *state = ResourceState::Closing;
        }
        let guard = SettleOnDrop::new(self, ResourceState::Closed);

        let client = self.client.lock().take();
        let (result, outcome) = match client {
            None => (Ok(()), CloseOutcome::Clean),
            Some(client) => match tokio::time::timeout(timeout, client.close()).await {
                Ok(Ok(())) => (Ok(()), CloseOutcome::Clean),
                Ok(Err(native)) => {
                    let error = self.translate(native);
                    let error_kind = error.kind();
                    (Err(error), CloseOutcome::Failed { error_kind })
                }
                Err(_) => {
                    let error = ResourceError::transient(
                        self.kind.domain(),
                        format!("close timed out after {}ms", duration_ms(timeout)),
                    )
                    .with_resource(self.name.clone());
                    (Err(error), CloseOutcome::TimedOut)
                }
            },
        };

        guard.disarm();
        *self.state.write() = ResourceState::Closed;

        match &result {
            Ok(()) => tracing::debug!(resource = %self.name, kind = %self.kind, "resource closed"),
            Err(error) => tracing::warn!(
                resource = %self.name,
                kind = %self.kind,
                error_kind = %error.kind(),
                outcome = outcome.as_str(),
                error = %error,
                "resource close failed"
            ),
        }
        self.emit(ResourceEvent::Closed {
            name: self.name.clone(),
            kind: self.kind,
            outcome,
        });

        result.map(|()| ResourceState::Closed)
    }

    // ---- internals ----

    fn transition(&self, to: ResourceState) -> Result<ResourceState> {
        let mut state = self.state.write();
        if !state.can_transition_to(to) {
            return Err(Error::InvalidTransition {
                name: self.name.clone(),
                from: *state,
                to,
            });
        }
        Ok(std::mem::replace(&mut *state, to))
    }

    fn translate(&self, native: BoxError) -> ResourceError {
        self.taxonomy
            .translate(self.kind.domain(), native)
            .or_resource(&self.name)
    }

    fn emit(&self, event: ResourceEvent) {
        emit_safely(self.sink.as_ref(), &event);
    }

    fn emit_error(&self, error_kind: ErrorKind) {
        self.emit(ResourceEvent::Error {
            name: self.name.clone(),
            kind: self.kind,
            error_kind,
        });
    }
}

impl std::fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn live_status(state: ResourceState) -> HealthStatus {
    match state {
        ResourceState::Ready => HealthStatus::Ready,
        ResourceState::Degraded => HealthStatus::Degraded,
        _ => HealthStatus::Failed,
    }
}

/// Forces a terminal state if an open or close future is dropped midway.
struct SettleOnDrop<'a> {
    handle: &'a ResourceHandle,
    state: ResourceState,
    armed: bool,
}

impl<'a> SettleOnDrop<'a> {
    fn new(handle: &'a ResourceHandle, state: ResourceState) -> Self {
        Self {
            handle,
            state,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for SettleOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.handle.client.lock().take();
            *self.handle.state.write() = self.state;
        }
    }
}
