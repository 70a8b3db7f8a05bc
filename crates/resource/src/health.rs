//! Health probing and aggregation.
//!
//! A single probe produces a [`HealthCheck`]; [`HealthAggregator`] fans
//! probes out across every live handle and folds them into a
//! [`HealthReport`] suitable for a readiness endpoint.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::{HealthAggregatorConfig, duration_ms};
use crate::error::Result;
use crate::handle::ResourceHandle;
use crate::kind::ResourceKind;
use crate::manager::ResourceManager;

// ---------------------------------------------------------------------------
// HealthCheck
// ---------------------------------------------------------------------------

/// Outcome of one probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// The probe succeeded within its timeout.
    Ready,
    /// The probe timed out, or the handle is live but its last probe failed.
    Degraded,
    /// The probe failed, or the handle is not live.
    Failed,
}

impl HealthStatus {
    /// Stable lowercase tag.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Degraded => "degraded",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of probing one handle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthCheck {
    /// Probe outcome.
    pub status: HealthStatus,
    /// Time spent probing.
    pub latency: Duration,
    /// Failure description, if any.
    pub message: Option<String>,
    /// When the probe finished.
    pub checked_at: DateTime<Utc>,
    /// Whether the probe was cut off by a timeout or deadline.
    pub timed_out: bool,
}

impl HealthCheck {
    /// A successful probe.
    #[must_use]
    pub fn ready(latency: Duration) -> Self {
        Self {
            status: HealthStatus::Ready,
            latency,
            message: None,
            checked_at: Utc::now(),
            timed_out: false,
        }
    }

    /// A probe that raised, or a handle that cannot be probed.
    pub fn failed(latency: Duration, message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Failed,
            latency,
            message: Some(message.into()),
            checked_at: Utc::now(),
            timed_out: false,
        }
    }

    /// A probe abandoned after `latency`.
    pub fn timed_out(latency: Duration, message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Degraded,
            latency,
            message: Some(message.into()),
            checked_at: Utc::now(),
            timed_out: true,
        }
    }

    /// Whether the probe succeeded.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status == HealthStatus::Ready
    }
}

// ---------------------------------------------------------------------------
// HealthReport
// ---------------------------------------------------------------------------

/// Overall status of an aggregation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    /// Every check is Ready (or there were none).
    Ready,
    /// Enough checks are Ready to keep serving.
    Degraded,
    /// Too few checks are Ready.
    Unhealthy,
}

/// One entry of a [`HealthReport`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckReport {
    /// The resource kind.
    pub kind: ResourceKind,
    /// Probe outcome.
    pub status: HealthStatus,
    /// Failure description, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Probe latency in milliseconds.
    pub latency_ms: u64,
    /// Whether the probe was cut off.
    pub timed_out: bool,
}

/// Aggregated health of every live resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    /// Overall status.
    pub status: OverallStatus,
    /// `false` only when the status is Unhealthy.
    pub healthy: bool,
    /// Per-resource results keyed by name.
    pub checks: BTreeMap<String, CheckReport>,
    /// When the pass started.
    pub checked_at: DateTime<Utc>,
    /// Wall-clock duration of the pass in milliseconds.
    pub duration_ms: u64,
}

impl HealthReport {
    /// Fold checks into a report.
    #[must_use]
    pub fn from_checks(
        checks: BTreeMap<String, CheckReport>,
        min_ready_fraction: f64,
        checked_at: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        let status = summarize(checks.values().map(|c| c.status), min_ready_fraction);
        Self {
            status,
            healthy: status != OverallStatus::Unhealthy,
            checks,
            checked_at,
            duration_ms: duration_ms(duration),
        }
    }
}

fn summarize(statuses: impl Iterator<Item = HealthStatus>, min_ready_fraction: f64) -> OverallStatus {
    let (total, ready) = statuses.fold((0usize, 0usize), |(total, ready), status| {
        (total + 1, ready + usize::from(status == HealthStatus::Ready))
    });
    if ready == total {
        OverallStatus::Ready
    } else if ready as f64 / total as f64 >= min_ready_fraction {
        OverallStatus::Degraded
    } else {
        OverallStatus::Unhealthy
    }
}

// ---------------------------------------------------------------------------
// HealthAggregator
// ---------------------------------------------------------------------------

/// Probes every live handle concurrently under a shared deadline.
///
/// Each probe is bounded by its handle's own timeout and by the
/// aggregation deadline; a probe still running at the deadline is
/// reported Degraded with `timed_out = true`. The aggregator keeps no
/// state between passes.
#[derive(Debug, Clone, Default)]
pub struct HealthAggregator {
    config: HealthAggregatorConfig,
}

impl HealthAggregator {
    /// Create an aggregator.
    #[must_use]
    pub fn new(config: HealthAggregatorConfig) -> Self {
        Self { config }
    }

    /// Validate `config` and create an aggregator.
    pub fn try_new(config: HealthAggregatorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config))
    }

    /// The aggregator's configuration.
    #[must_use]
    pub fn config(&self) -> &HealthAggregatorConfig {
        &self.config
    }

    /// Probe every live handle registered with `manager`.
    pub async fn check(&self, manager: &ResourceManager) -> HealthReport {
        self.check_handles(manager.handles()).await
    }

    /// Probe the live handles among `handles`.
    pub async fn check_handles<I>(&self, handles: I) -> HealthReport
    where
        I: IntoIterator<Item = Arc<ResourceHandle>>,
    {
        let checked_at = Utc::now();
        let started = Instant::now();
        let deadline = started + self.config.deadline();

        let probes = handles
            .into_iter()
            .filter(|handle| handle.state().is_live())
            .map(|handle| async move {
                let probe = handle.health_check(handle.health_timeout());
                let check = match tokio::time::timeout_at(deadline, probe).await {
                    Ok(check) => check,
                    Err(_) => {
                        tracing::warn!(
                            resource = %handle.name(),
                            kind = %handle.kind(),
                            "health probe cut off by aggregation deadline"
                        );
                        let check = HealthCheck::timed_out(
                            started.elapsed(),
                            "aggregation deadline exceeded",
                        );
                        handle.record_health(check.clone());
                        check
                    }
                };
                (handle, check)
            });

        let checks = join_all(probes)
            .await
            .into_iter()
            .map(|(handle, check)| {
                let report = CheckReport {
                    kind: handle.kind(),
                    status: check.status,
                    message: check.message,
                    latency_ms: duration_ms(check.latency),
                    timed_out: check.timed_out,
                };
                (handle.name().to_string(), report)
            })
            .collect();

        let report = HealthReport::from_checks(
            checks,
            self.config.min_ready_fraction,
            checked_at,
            started.elapsed(),
        );
        tracing::debug!(
            status = ?report.status,
            checks = report.checks.len(),
            elapsed_ms = report.duration_ms,
            "health aggregation finished"
        );
        report
    }
}
