//! # Orchid Resource Management
//!
//! Shared runtime layer for obtaining, probing and retiring connections to
//! heterogeneous backends (relational and document databases, caches,
//! message brokers, vector stores, blob storage) through one contract.
//!
//! - [`ResourceManager`] owns one [`ResourceHandle`] per name, builds it
//!   once on first use (concurrent callers share the build) and closes
//!   every handle in reverse registration order on shutdown.
//! - [`ErrorTaxonomy`] turns each backend's native failures into a
//!   [`ResourceError`] of one of four kinds: `Generic`, `Auth`,
//!   `Transient` or `Operation`. Only `Transient` is retryable.
//! - [`HealthAggregator`] probes every live handle under a deadline and
//!   produces a serializable [`HealthReport`].
//! - Lifecycle events reach an injected [`EventSink`]; [`TracingSink`]
//!   logs them and, with the `metrics` feature, `MetricsSink` records them.
//!
//! ```no_run
//! use std::sync::Arc;
//! use orchid_resource::prelude::*;
//! use orchid_resource::testing::MockFactory;
//!
//! # async fn run() -> orchid_resource::Result<()> {
//! let manager = Arc::new(ResourceManager::default().with_sink(Arc::new(TracingSink)));
//! manager.register_factory(ResourceKind::Cache, MockFactory::new());
//!
//! let config = ResourceConfig::new(ResourceKind::Cache);
//! let sessions = manager.get("sessions", ResourceKind::Cache, &config).await?;
//! let report = HealthAggregator::default().check(&manager).await;
//! assert!(report.healthy);
//!
//! manager.shutdown_all().await?;
//! # let _ = sessions;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod factory;
pub mod handle;
pub mod health;
pub mod kind;
pub mod manager;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod response;
pub mod state;
pub mod taxonomy;
pub mod testing;

pub use config::{
    HealthAggregatorConfig, ManagerConfig, ResourceConfig, ResourcesSettings,
    validate_resource_name,
};
pub use error::{BoxError, CloseFailure, Error, ErrorKind, ResourceError, Result, ShutdownError};
pub use events::{CloseOutcome, EventBus, EventSink, FanoutSink, NoopSink, ResourceEvent, TracingSink};
pub use factory::{FnFactory, ResourceClient, ResourceFactory, factory_fn};
pub use handle::ResourceHandle;
pub use health::{CheckReport, HealthAggregator, HealthCheck, HealthReport, HealthStatus, OverallStatus};
pub use kind::{ErrorDomain, ResourceKind, UnknownKind};
pub use manager::{
    ManagerPhase, ResourceManager, ResourceSnapshot, default_manager, install_default,
    shutdown_default,
};
#[cfg(feature = "metrics")]
pub use self::metrics::MetricsSink;
pub use response::ErrorResponse;
pub use state::ResourceState;
pub use taxonomy::{DriverError, ErrorTaxonomy, Matcher, Rule, Signature};

/// Common imports for services using the resource layer.
pub mod prelude {
    pub use crate::{
        BoxError, Error, ErrorKind, EventSink, HealthAggregator, HealthStatus, ResourceClient,
        ResourceConfig, ResourceError, ResourceFactory, ResourceHandle, ResourceKind,
        ResourceManager, ResourceState, TracingSink, factory_fn,
    };
}
