//! Metrics recording for resource lifecycle events.
//!
//! [`MetricsSink`] translates events into counters and histograms via the
//! `metrics` crate. Install it next to other sinks with
//! [`FanoutSink`](crate::FanoutSink).
//!
//! Gated behind the `metrics` feature.

use crate::error::ErrorKind;
use crate::events::{CloseOutcome, EventSink, ResourceEvent};

/// Event sink that records lifecycle metrics.
///
/// | metric | type | labels |
/// |---|---|---|
/// | `resource.opened.total` | counter | `resource`, `kind` |
/// | `resource.open.duration_seconds` | histogram | `resource`, `kind` |
/// | `resource.closed.total` | counter | `resource`, `kind`, `outcome` |
/// | `resource.error.total` | counter | `resource`, `kind`, `error_kind` |
/// | `resource.health_changed.total` | counter | `resource`, `to` |
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSink;

impl MetricsSink {
    /// Create a sink recording into the globally installed recorder.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for MetricsSink {
    fn emit(&self, event: &ResourceEvent) {
        match event {
            ResourceEvent::Opened {
                name,
                kind,
                duration,
            } => {
                metrics::counter!(
                    "resource.opened.total",
                    "resource" => name.clone(),
                    "kind" => kind.as_str()
                )
                .increment(1);
                metrics::histogram!(
                    "resource.open.duration_seconds",
                    "resource" => name.clone(),
                    "kind" => kind.as_str()
                )
                .record(duration.as_secs_f64());
            }
            ResourceEvent::Closed {
                name,
                kind,
                outcome,
            } => {
                metrics::counter!(
                    "resource.closed.total",
                    "resource" => name.clone(),
                    "kind" => kind.as_str(),
                    "outcome" => outcome.as_str()
                )
                .increment(1);
                let error_kind = match outcome {
                    CloseOutcome::Clean => None,
                    CloseOutcome::Failed { error_kind } => Some(*error_kind),
                    CloseOutcome::TimedOut => Some(ErrorKind::Transient),
                };
                if let Some(error_kind) = error_kind {
                    metrics::counter!(
                        "resource.error.total",
                        "resource" => name.clone(),
                        "kind" => kind.as_str(),
                        "error_kind" => error_kind.as_str()
                    )
                    .increment(1);
                }
            }
            ResourceEvent::Error {
                name,
                kind,
                error_kind,
            } => {
                metrics::counter!(
                    "resource.error.total",
                    "resource" => name.clone(),
                    "kind" => kind.as_str(),
                    "error_kind" => error_kind.as_str()
                )
                .increment(1);
            }
            ResourceEvent::HealthChanged { name, to, .. } => {
                metrics::counter!(
                    "resource.health_changed.total",
                    "resource" => name.clone(),
                    "to" => to.as_str()
                )
                .increment(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::HealthStatus;
    use crate::kind::ResourceKind;
    use std::time::Duration;

    #[test]
    fn records_every_event_without_a_recorder() {
        // No recorder is installed; the macros fall back to no-ops.
        let sink = MetricsSink::new();
        sink.emit(&ResourceEvent::Opened {
            name: "db".to_string(),
            kind: ResourceKind::RelationalDb,
            duration: Duration::from_millis(42),
        });
        sink.emit(&ResourceEvent::Error {
            name: "db".to_string(),
            kind: ResourceKind::RelationalDb,
            error_kind: ErrorKind::Transient,
        });
        sink.emit(&ResourceEvent::Closed {
            name: "db".to_string(),
            kind: ResourceKind::RelationalDb,
            outcome: CloseOutcome::Failed {
                error_kind: ErrorKind::Generic,
            },
        });
        sink.emit(&ResourceEvent::HealthChanged {
            name: "db".to_string(),
            from: HealthStatus::Ready,
            to: HealthStatus::Degraded,
        });
    }
}
