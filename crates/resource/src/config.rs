//! Configuration types.
//!
//! All types deserialize from the service's settings; loading and
//! environment binding happen outside this crate.

use std::time::Duration;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::kind::ResourceKind;

/// Longest accepted resource name.
pub const MAX_NAME_LEN: usize = 128;

/// Check that `name` can be used as a resource name.
///
/// Names are non-empty, at most [`MAX_NAME_LEN`] bytes, and made of ASCII
/// alphanumerics plus `-`, `_` and `.`.
pub fn validate_resource_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        "name must not be empty"
    } else if name.len() > MAX_NAME_LEN {
        "name must be at most 128 characters"
    } else if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
    {
        "name may only contain ASCII letters, digits, '-', '_' and '.'"
    } else {
        return Ok(());
    };
    Err(Error::InvalidName {
        name: name.to_string(),
        reason,
    })
}

// ---------------------------------------------------------------------------
// ManagerConfig
// ---------------------------------------------------------------------------

/// Timeouts applied by the [`ResourceManager`](crate::ResourceManager).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Per-handle close timeout used during shutdown.
    pub close_timeout_ms: u64,
    /// Default probe timeout for health checks.
    pub health_timeout_ms: u64,
    /// Default construction timeout; `None` waits indefinitely.
    pub open_timeout_ms: Option<u64>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            close_timeout_ms: 10_000,
            health_timeout_ms: 5_000,
            open_timeout_ms: None,
        }
    }
}

impl ManagerConfig {
    /// Validate the configuration, returning an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.close_timeout_ms == 0 {
            return Err(Error::configuration(
                "close_timeout_ms must be greater than zero",
            ));
        }
        if self.health_timeout_ms == 0 {
            return Err(Error::configuration(
                "health_timeout_ms must be greater than zero",
            ));
        }
        if self.open_timeout_ms == Some(0) {
            return Err(Error::configuration(
                "open_timeout_ms must be greater than zero when set",
            ));
        }
        Ok(())
    }

    /// Close timeout as a [`Duration`].
    #[must_use]
    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }

    /// Health probe timeout as a [`Duration`].
    #[must_use]
    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }

    /// Open timeout as a [`Duration`].
    #[must_use]
    pub fn open_timeout(&self) -> Option<Duration> {
        self.open_timeout_ms.map(Duration::from_millis)
    }
}

// ---------------------------------------------------------------------------
// HealthAggregatorConfig
// ---------------------------------------------------------------------------

/// Settings for [`HealthAggregator`](crate::HealthAggregator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthAggregatorConfig {
    /// Wall-clock budget for one aggregation pass.
    pub deadline_ms: u64,
    /// Fraction of Ready checks at or above which the overall status is
    /// Degraded rather than Unhealthy.
    pub min_ready_fraction: f64,
}

impl Default for HealthAggregatorConfig {
    fn default() -> Self {
        Self {
            deadline_ms: 10_000,
            min_ready_fraction: 0.5,
        }
    }
}

impl HealthAggregatorConfig {
    /// Validate the configuration, returning an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.deadline_ms == 0 {
            return Err(Error::configuration(
                "deadline_ms must be greater than zero",
            ));
        }
        if !(0.0..=1.0).contains(&self.min_ready_fraction) {
            return Err(Error::configuration(format!(
                "min_ready_fraction ({}) must be within 0.0..=1.0",
                self.min_ready_fraction
            )));
        }
        Ok(())
    }

    /// Aggregation deadline as a [`Duration`].
    #[must_use]
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

// ---------------------------------------------------------------------------
// ResourceConfig
// ---------------------------------------------------------------------------

/// Configuration for a single named resource.
///
/// `params` is handed to the factory untouched; its shape is defined by
/// the driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// The resource family.
    pub kind: ResourceKind,
    /// Driver parameters (DSN, bucket, credentials reference, ...).
    #[serde(default)]
    pub params: serde_json::Value,
    /// Probe timeout for this resource, overriding the manager default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_timeout_ms: Option<u64>,
    /// Construction timeout for this resource, overriding the manager default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_timeout_ms: Option<u64>,
}

impl ResourceConfig {
    /// Config with no parameters and no overrides.
    #[must_use]
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            params: serde_json::Value::Null,
            health_timeout_ms: None,
            open_timeout_ms: None,
        }
    }

    /// Set the driver parameters.
    #[must_use]
    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }

    /// Override the probe timeout.
    #[must_use]
    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout_ms = Some(duration_ms(timeout));
        self
    }

    /// Override the construction timeout.
    #[must_use]
    pub fn with_open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout_ms = Some(duration_ms(timeout));
        self
    }

    /// Deserialize `params` into a driver-specific settings struct.
    pub fn params_as<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.params.clone()).map_err(|e| {
            Error::configuration(format!("invalid {} parameters: {e}", self.kind))
        })
    }

    /// Validate the configuration, returning an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.health_timeout_ms == Some(0) {
            return Err(Error::configuration(
                "health_timeout_ms must be greater than zero when set",
            ));
        }
        if self.open_timeout_ms == Some(0) {
            return Err(Error::configuration(
                "open_timeout_ms must be greater than zero when set",
            ));
        }
        Ok(())
    }
}

pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ---------------------------------------------------------------------------
// ResourcesSettings
// ---------------------------------------------------------------------------

/// Every resource a service declares, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourcesSettings {
    /// Name → configuration, in the order resources are bootstrapped.
    pub resources: IndexMap<String, ResourceConfig>,
    /// Names that must exist after bootstrap.
    pub required: Vec<String>,
}

impl ResourcesSettings {
    /// Validate every name and resource configuration.
    pub fn validate(&self) -> Result<()> {
        for (name, config) in &self.resources {
            validate_resource_name(name)?;
            config
                .validate()
                .map_err(|e| Error::configuration(format!("resource '{name}': {e}")))?;
        }
        for name in &self.required {
            validate_resource_name(name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case("primary-db" ; "dash")]
    #[test_case("cache_01" ; "underscore and digits")]
    #[test_case("events.v2" ; "dot")]
    fn accepts_valid_names(name: &str) {
        assert!(validate_resource_name(name).is_ok());
    }

    #[test_case("" ; "empty")]
    #[test_case("has space" ; "space")]
    #[test_case("slash/name" ; "slash")]
    #[test_case("naïve" ; "non ascii")]
    fn rejects_invalid_names(name: &str) {
        match validate_resource_name(name) {
            Err(Error::InvalidName { name: rejected, .. }) => assert_eq!(rejected, name),
            other => panic!("expected InvalidName, got {other:?}"),
        }
    }

    #[test]
    fn rejects_overlong_name() {
        let name = "a".repeat(MAX_NAME_LEN + 1);
        assert!(validate_resource_name(&name).is_err());
        assert!(validate_resource_name(&name[..MAX_NAME_LEN]).is_ok());
    }

    #[test]
    fn manager_defaults() {
        let config = ManagerConfig::default();
        assert_eq!(config.close_timeout(), Duration::from_secs(10));
        assert_eq!(config.health_timeout(), Duration::from_secs(5));
        assert_eq!(config.open_timeout(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn manager_rejects_zero_timeouts() {
        let config = ManagerConfig {
            close_timeout_ms: 0,
            ..ManagerConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Configuration { .. })));
    }

    #[test_case(-0.1 ; "negative")]
    #[test_case(1.5 ; "above one")]
    #[test_case(f64::NAN ; "nan")]
    fn aggregator_rejects_out_of_range_fraction(fraction: f64) {
        let config = HealthAggregatorConfig {
            min_ready_fraction: fraction,
            ..HealthAggregatorConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn resource_config_deserializes_with_defaults() {
        let config: ResourceConfig =
            serde_json::from_str(r#"{ "kind": "relational-db" }"#).expect("valid json");
        assert_eq!(config, ResourceConfig::new(ResourceKind::RelationalDb));
    }

    #[test]
    fn params_as_reports_configuration_error() {
        #[derive(Debug, Deserialize)]
        struct Redis {
            #[allow(dead_code)]
            url: String,
        }

        let config = ResourceConfig::new(ResourceKind::Cache)
            .with_params(serde_json::json!({ "port": 6379 }));
        match config.params_as::<Redis>() {
            Err(Error::Configuration { message }) => {
                assert!(message.starts_with("invalid cache parameters"), "{message}");
            }
            other => panic!("expected Configuration, got {other:?}"),
        }
    }

    #[test]
    fn settings_keep_declaration_order() {
        let settings: ResourcesSettings = serde_json::from_str(
            r#"{
                "resources": {
                    "zeta": { "kind": "cache" },
                    "alpha": { "kind": "broker" },
                    "mid": { "kind": "blob-store", "open_timeout_ms": 250 }
                },
                "required": ["alpha"]
            }"#,
        )
        .expect("valid json");

        let names: Vec<_> = settings.resources.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
        assert_eq!(settings.resources["mid"].open_timeout_ms, Some(250));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn settings_validation_names_the_resource() {
        let mut settings = ResourcesSettings::default();
        settings.resources.insert(
            "search".to_string(),
            ResourceConfig {
                open_timeout_ms: Some(0),
                ..ResourceConfig::new(ResourceKind::VectorStore)
            },
        );
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("resource 'search'"), "{err}");
    }
}
