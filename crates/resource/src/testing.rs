//! Test doubles for resource management.
//!
//! [`MockFactory`] builds [`MockClient`]s whose construction, probe and
//! close behavior is driven by [`Script`]s; [`RecordingSink`] captures
//! every emitted event. Services use these to exercise their own wiring
//! without a backend.

use std::future::pending;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::config::ResourceConfig;
use crate::error::BoxError;
use crate::events::{EventSink, ResourceEvent};
use crate::factory::{ResourceClient, ResourceFactory};
use crate::taxonomy::DriverError;

// ---------------------------------------------------------------------------
// Failure / Script
// ---------------------------------------------------------------------------

/// A native failure a mock reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// A [`DriverError`] with a vendor code and/or HTTP status.
    Driver {
        /// Vendor code.
        code: Option<String>,
        /// HTTP status.
        status: Option<u16>,
        /// Message.
        message: String,
    },
    /// A `std::io::Error`.
    Io(io::ErrorKind, String),
    /// A bare message error.
    Message(String),
}

impl Failure {
    /// Driver error with a vendor code.
    pub fn code(code: impl Into<String>) -> Self {
        let code = code.into();
        Self::Driver {
            message: format!("{code} reported by mock backend"),
            code: Some(code),
            status: None,
        }
    }

    /// Driver error with an HTTP status.
    pub fn status(status: u16) -> Self {
        Self::Driver {
            code: None,
            status: Some(status),
            message: "mock backend returned an error status".to_string(),
        }
    }

    /// I/O error.
    pub fn io(kind: io::ErrorKind, message: impl Into<String>) -> Self {
        Self::Io(kind, message.into())
    }

    /// Plain message error.
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    /// Materialize the native error.
    pub fn into_error(self) -> BoxError {
        match self {
            Self::Driver {
                code,
                status,
                message,
            } => {
                let mut error = DriverError::new(message);
                if let Some(code) = code {
                    error = error.with_code(code);
                }
                if let Some(status) = status {
                    error = error.with_status(status);
                }
                Box::new(error)
            }
            Self::Io(kind, message) => Box::new(io::Error::new(kind, message)),
            Self::Message(message) => message.into(),
        }
    }
}

/// Behavior of one mocked call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    delay: Option<Duration>,
    hang: bool,
    failure: Option<Failure>,
}

impl Script {
    /// Succeed immediately.
    pub fn ok() -> Self {
        Self::default()
    }

    /// Succeed after `delay`.
    pub fn delayed(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Never complete.
    pub fn hang() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }

    /// Fail immediately.
    pub fn fail(failure: Failure) -> Self {
        Self {
            failure: Some(failure),
            ..Self::default()
        }
    }

    /// Delay before the outcome.
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Play the script.
    pub async fn run(&self) -> Result<(), BoxError> {
        if self.hang {
            pending::<()>().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.failure {
            Some(failure) => Err(failure.clone().into_error()),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// MockClient / MockFactory
// ---------------------------------------------------------------------------

/// Call counters shared by a factory and every client it built.
#[derive(Debug, Default)]
pub struct MockStats {
    creates: AtomicUsize,
    pings: AtomicUsize,
    closes: AtomicUsize,
}

impl MockStats {
    /// Number of `create` calls.
    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    /// Number of `ping` calls.
    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    /// Number of `close` calls.
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

type SharedScript = Arc<Mutex<Script>>;

/// Client built by [`MockFactory`].
#[derive(Debug)]
pub struct MockClient {
    label: String,
    ping: SharedScript,
    close: SharedScript,
    stats: Arc<MockStats>,
}

impl MockClient {
    /// `mock-N`, where N counts the factory's creates.
    pub fn label(&self) -> &str {
        &self.label
    }
}

#[async_trait]
impl ResourceClient for MockClient {
    async fn ping(&self) -> Result<(), BoxError> {
        self.stats.pings.fetch_add(1, Ordering::SeqCst);
        let script = self.ping.lock().clone();
        script.run().await
    }

    async fn close(&self) -> Result<(), BoxError> {
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
        let script = self.close.lock().clone();
        script.run().await
    }
}

/// Scriptable factory.
///
/// Probe and close scripts are shared with every client already built, so
/// [`set_ping`](Self::set_ping) changes the behavior of live handles.
#[derive(Debug, Default)]
pub struct MockFactory {
    create: Mutex<Script>,
    ping: SharedScript,
    close: SharedScript,
    stats: Arc<MockStats>,
}

impl MockFactory {
    /// Factory whose every call succeeds immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script for `create`.
    pub fn with_create(self, script: Script) -> Self {
        *self.create.lock() = script;
        self
    }

    /// Script for `ping` on every client.
    pub fn with_ping(self, script: Script) -> Self {
        *self.ping.lock() = script;
        self
    }

    /// Script for `close` on every client.
    pub fn with_close(self, script: Script) -> Self {
        *self.close.lock() = script;
        self
    }

    /// Replace the `create` script.
    pub fn set_create(&self, script: Script) {
        *self.create.lock() = script;
    }

    /// Replace the `ping` script, including for clients already built.
    pub fn set_ping(&self, script: Script) {
        *self.ping.lock() = script;
    }

    /// Replace the `close` script, including for clients already built.
    pub fn set_close(&self, script: Script) {
        *self.close.lock() = script;
    }

    /// Number of `create` calls so far.
    pub fn creates(&self) -> usize {
        self.stats.creates()
    }

    /// Counters shared with built clients.
    pub fn stats(&self) -> Arc<MockStats> {
        Arc::clone(&self.stats)
    }
}

#[async_trait]
impl ResourceFactory for MockFactory {
    async fn create(&self, _config: &ResourceConfig) -> Result<Box<dyn ResourceClient>, BoxError> {
        let n = self.stats.creates.fetch_add(1, Ordering::SeqCst) + 1;
        let script = self.create.lock().clone();
        script.run().await?;
        Ok(Box::new(MockClient {
            label: format!("mock-{n}"),
            ping: Arc::clone(&self.ping),
            close: Arc::clone(&self.close),
            stats: Arc::clone(&self.stats),
        }))
    }
}

#[async_trait]
impl ResourceFactory for Arc<MockFactory> {
    async fn create(&self, config: &ResourceConfig) -> Result<Box<dyn ResourceClient>, BoxError> {
        self.as_ref().create(config).await
    }
}

// ---------------------------------------------------------------------------
// RecordingSink
// ---------------------------------------------------------------------------

/// Sink that keeps every event in emission order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ResourceEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event so far.
    pub fn events(&self) -> Vec<ResourceEvent> {
        self.events.lock().clone()
    }

    /// Names of every event so far.
    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(ResourceEvent::name).collect()
    }

    /// How many events named `name` were seen.
    pub fn count(&self, name: &str) -> usize {
        self.events.lock().iter().filter(|e| e.name() == name).count()
    }

    /// Events about resource `name`.
    pub fn events_for(&self, name: &str) -> Vec<ResourceEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.resource() == name)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &ResourceEvent) {
        self.events.lock().push(event.clone());
    }
}
