//! Lifecycle events and the sinks they are delivered to.
//!
//! Handles emit a [`ResourceEvent`] at every lifecycle transition through
//! an injected [`EventSink`]. Emission is fire-and-forget: sinks must not
//! block, and a sink that panics is contained so a broken exporter can
//! never fail a resource operation.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::config::duration_ms;
use crate::error::ErrorKind;
use crate::health::HealthStatus;
use crate::kind::ResourceKind;

// ---------------------------------------------------------------------------
// ResourceEvent
// ---------------------------------------------------------------------------

/// Events emitted during resource lifecycle operations.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceEvent {
    /// A handle finished construction and is Ready.
    Opened {
        /// The resource name.
        name: String,
        /// The resource kind.
        kind: ResourceKind,
        /// How long the factory took.
        duration: Duration,
    },
    /// A handle reached Closed. Emitted exactly once per handle.
    Closed {
        /// The resource name.
        name: String,
        /// The resource kind.
        kind: ResourceKind,
        /// How the close went.
        outcome: CloseOutcome,
    },
    /// A construction, probe or delegated operation failed. Close
    /// failures are reported through [`CloseOutcome`].
    Error {
        /// The resource name.
        name: String,
        /// The resource kind.
        kind: ResourceKind,
        /// Classification of the failure.
        error_kind: ErrorKind,
    },
    /// A probe moved a handle between Ready and Degraded.
    HealthChanged {
        /// The resource name.
        name: String,
        /// Previous status.
        from: HealthStatus,
        /// New status.
        to: HealthStatus,
    },
}

impl ResourceEvent {
    /// Dotted event name, as used for metrics and log targets.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Opened { .. } => "resource.opened",
            Self::Closed { .. } => "resource.closed",
            Self::Error { .. } => "resource.error",
            Self::HealthChanged { .. } => "resource.health_changed",
        }
    }

    /// Name of the resource the event is about.
    #[must_use]
    pub fn resource(&self) -> &str {
        match self {
            Self::Opened { name, .. }
            | Self::Closed { name, .. }
            | Self::Error { name, .. }
            | Self::HealthChanged { name, .. } => name,
        }
    }
}

/// Result of closing a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The client closed without error.
    Clean,
    /// The client's close raised; the handle is Closed regardless.
    Failed {
        /// Classification of the close failure.
        error_kind: ErrorKind,
    },
    /// The close exceeded its timeout and was abandoned.
    TimedOut,
}

impl CloseOutcome {
    /// Stable lowercase tag.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::Failed { .. } => "failed",
            Self::TimedOut => "timed_out",
        }
    }
}

// ---------------------------------------------------------------------------
// EventSink
// ---------------------------------------------------------------------------

/// Receiver of lifecycle events.
///
/// Implementations must return quickly; they are called inline on the
/// lifecycle path.
pub trait EventSink: Send + Sync {
    /// Deliver one event.
    fn emit(&self, event: &ResourceEvent);
}

/// Deliver `event`, swallowing a panicking sink.
pub(crate) fn emit_safely(sink: &dyn EventSink, event: &ResourceEvent) {
    if catch_unwind(AssertUnwindSafe(|| sink.emit(event))).is_err() {
        tracing::warn!(
            event = event.name(),
            resource = event.resource(),
            "event sink panicked; event dropped"
        );
    }
}

/// Sink that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: &ResourceEvent) {}
}

/// Sink that renders events as `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &ResourceEvent) {
        match event {
            ResourceEvent::Opened {
                name,
                kind,
                duration,
            } => tracing::info!(
                resource = %name,
                kind = %kind,
                elapsed_ms = duration_ms(*duration),
                "resource opened"
            ),
            ResourceEvent::Closed {
                name,
                kind,
                outcome,
            } => tracing::info!(
                resource = %name,
                kind = %kind,
                outcome = outcome.as_str(),
                "resource closed"
            ),
            ResourceEvent::Error {
                name,
                kind,
                error_kind,
            } => tracing::warn!(
                resource = %name,
                kind = %kind,
                error_kind = %error_kind,
                "resource error"
            ),
            ResourceEvent::HealthChanged { name, from, to } => tracing::info!(
                resource = %name,
                from = %from,
                to = %to,
                "resource health changed"
            ),
        }
    }
}

/// Sink that forwards each event to several sinks in order.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    /// Empty fan-out.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink.
    #[must_use]
    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: &ResourceEvent) {
        for sink in &self.sinks {
            emit_safely(sink.as_ref(), event);
        }
    }
}

impl std::fmt::Debug for FanoutSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutSink")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Broadcast-based sink for in-process subscribers.
///
/// Uses `tokio::sync::broadcast` under the hood. If no subscribers are
/// listening or the channel is full, events are silently dropped (no
/// backpressure on the emitter).
pub struct EventBus {
    sender: broadcast::Sender<ResourceEvent>,
}

impl EventBus {
    /// Create a new event bus with the given buffer size.
    ///
    /// Subscribers that fall more than `buffer_size` events behind receive
    /// a `Lagged` error and skip to the latest.
    #[must_use]
    pub fn new(buffer_size: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer_size);
        Self { sender }
    }

    /// Subscribe to events emitted after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ResourceEvent> {
        self.sender.subscribe()
    }
}

impl EventSink for EventBus {
    fn emit(&self, event: &ResourceEvent) {
        // No receivers is not an error.
        let _ = self.sender.send(event.clone());
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.sender.receiver_count())
            .finish()
    }
}
