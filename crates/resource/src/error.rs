//! Error types for resource management.
//!
//! Every failure that crosses a resource boundary is a [`ResourceError`]:
//! one of four [`ErrorKind`]s tagged with the [`ErrorDomain`] it came
//! from. Manager-level failures (unknown names, shutdown, bad config) are
//! the remaining variants of [`Error`].

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::kind::{ErrorDomain, ResourceKind};
use crate::state::ResourceState;

/// Boxed native error as returned by drivers and factories.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for resource operations
pub type Result<T> = std::result::Result<T, Error>;

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

/// Backend-agnostic classification of a resource failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Anything the classification tables do not recognize.
    Generic,
    /// Credentials rejected, permission denied, expired or invalid token.
    Auth,
    /// Timeouts, resets, temporary unavailability, rate limiting.
    Transient,
    /// Malformed request, constraint violation, unsupported operation.
    Operation,
}

impl ErrorKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 4] = [Self::Generic, Self::Auth, Self::Transient, Self::Operation];

    /// Only transient failures are safe to retry with backoff.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Stable lowercase tag.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::Auth => "auth",
            Self::Transient => "transient",
            Self::Operation => "operation",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ResourceError
// ---------------------------------------------------------------------------

/// A translated backend failure.
///
/// The originating native error is kept as an opaque `source` and is
/// never re-interpreted after translation. The source is reference
/// counted so the same error can be handed to every caller waiting on a
/// shared construction.
#[derive(Debug, Clone)]
pub struct ResourceError {
    domain: ErrorDomain,
    kind: ErrorKind,
    message: String,
    resource: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync + 'static>>,
}

impl ResourceError {
    /// Create an error without a native cause.
    pub fn new(domain: ErrorDomain, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            domain,
            kind,
            message: message.into(),
            resource: None,
            source: None,
        }
    }

    /// Shorthand for a [`ErrorKind::Transient`] error.
    pub fn transient(domain: ErrorDomain, message: impl Into<String>) -> Self {
        Self::new(domain, ErrorKind::Transient, message)
    }

    /// Attach the native cause.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(Arc::from(source.into()));
        self
    }

    /// Attribute the error to a named resource.
    #[must_use]
    pub fn with_resource(mut self, name: impl Into<String>) -> Self {
        self.resource = Some(name.into());
        self
    }

    /// Attribute the error to `name` unless it already names a resource.
    #[must_use]
    pub(crate) fn or_resource(mut self, name: &str) -> Self {
        if self.resource.is_none() {
            self.resource = Some(name.to_string());
        }
        self
    }

    /// The resource family the error belongs to.
    #[must_use]
    pub fn domain(&self) -> ErrorDomain {
        self.domain
    }

    /// The classification of the error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Human-readable summary (the native error's message when translated).
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Name of the resource the error is attributed to, if known.
    #[must_use]
    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    /// Check if this error is retryable
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.resource {
            Some(resource) => write!(
                f,
                "{} {} error for resource '{resource}': {}",
                self.domain, self.kind, self.message
            ),
            None => write!(f, "{} {} error: {}", self.domain, self.kind, self.message),
        }
    }
}

impl std::error::Error for ResourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|source| source as &(dyn std::error::Error + 'static))
    }
}

// ---------------------------------------------------------------------------
// Shutdown aggregation
// ---------------------------------------------------------------------------

/// A single handle that failed to close cleanly during shutdown.
#[derive(Debug, Clone)]
pub struct CloseFailure {
    /// The resource name.
    pub name: String,
    /// The resource kind.
    pub kind: ResourceKind,
    /// The translated close failure.
    pub error: ResourceError,
}

/// Aggregate of every close failure seen by
/// [`ResourceManager::shutdown_all`](crate::ResourceManager::shutdown_all).
#[derive(Debug, Clone)]
pub struct ShutdownError {
    /// Failures in the order the handles were closed.
    pub failures: Vec<CloseFailure>,
}

impl ShutdownError {
    /// Names of the resources that failed to close, in close order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.name.as_str()).collect()
    }
}

impl fmt::Display for ShutdownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "shutdown failed for {} resource(s): {}",
            self.failures.len(),
            self.names().join(", ")
        )
    }
}

impl std::error::Error for ShutdownError {}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Comprehensive error type for resource management operations
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// A translated backend failure.
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// No handle is registered under the name.
    #[error("resource '{name}' is not registered")]
    NotFound {
        /// The resource name.
        name: String,
    },

    /// No factory is registered for the requested kind.
    #[error("no factory registered for resource kind '{kind}'")]
    FactoryNotRegistered {
        /// The requested kind.
        kind: ResourceKind,
    },

    /// The resource name is not acceptable.
    #[error("invalid resource name '{name}': {reason}")]
    InvalidName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The name is already bound to a resource of another kind.
    #[error("resource '{name}' is a {existing} resource, requested as {requested}")]
    KindMismatch {
        /// The resource name.
        name: String,
        /// The kind it is registered (or configured) as.
        existing: ResourceKind,
        /// The kind the caller asked for.
        requested: ResourceKind,
    },

    /// The handle was closed and is never recreated.
    #[error("resource '{name}' is closed")]
    Closed {
        /// The resource name.
        name: String,
    },

    /// The handle cannot serve operations in its current state.
    #[error("resource '{name}' is not ready (state: {state})")]
    NotReady {
        /// The resource name.
        name: String,
        /// The state the handle is in.
        state: ResourceState,
    },

    /// A lifecycle operation was attempted from the wrong state.
    #[error("invalid state transition for resource '{name}': {from} -> {to}")]
    InvalidTransition {
        /// The resource name.
        name: String,
        /// The current state.
        from: ResourceState,
        /// The attempted target state.
        to: ResourceState,
    },

    /// The owned client is not of the requested concrete type.
    #[error("client of resource '{name}' is not a {expected}")]
    ClientType {
        /// The resource name.
        name: String,
        /// The requested type name.
        expected: &'static str,
    },

    /// The manager stopped accepting resources.
    #[error("resource manager is shutting down; '{name}' cannot be registered")]
    ShuttingDown {
        /// The resource that was requested.
        name: String,
    },

    /// One or more handles failed to close.
    #[error(transparent)]
    Shutdown(#[from] ShutdownError),

    /// Resources declared as required were not constructed.
    #[error("missing required resources: {}", .names.join(", "))]
    MissingRequired {
        /// The missing names.
        names: Vec<String>,
    },

    /// Configuration is invalid.
    #[error("configuration error: {message}")]
    Configuration {
        /// The error message
        message: String,
    },

    /// The process-wide default manager was installed twice.
    #[error("default resource manager is already installed")]
    DefaultAlreadyInstalled,
}

impl Error {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Taxonomy kind of the error; manager-level failures are `Generic`.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Resource(e) => e.kind(),
            _ => ErrorKind::Generic,
        }
    }

    /// Check if this error is retryable
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// The translated backend failure, if this is one.
    #[must_use]
    pub fn as_resource(&self) -> Option<&ResourceError> {
        match self {
            Self::Resource(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn only_transient_is_retryable() {
        for kind in ErrorKind::ALL {
            assert_eq!(kind.is_retryable(), kind == ErrorKind::Transient, "{kind}");
        }
    }

    #[test]
    fn display_includes_domain_kind_and_resource() {
        let err = ResourceError::new(ErrorDomain::Cache, ErrorKind::Auth, "WRONGPASS")
            .with_resource("sessions");
        assert_eq!(
            err.to_string(),
            "cache auth error for resource 'sessions': WRONGPASS"
        );
    }

    #[test]
    fn source_is_preserved() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "read timed out");
        let err = ResourceError::transient(ErrorDomain::Database, "read timed out").with_source(io);
        let source = err.source().expect("source should be kept");
        assert_eq!(source.to_string(), "read timed out");
    }

    #[test]
    fn or_resource_keeps_existing_attribution() {
        let err = ResourceError::transient(ErrorDomain::Broker, "x")
            .with_resource("events")
            .or_resource("other");
        assert_eq!(err.resource(), Some("events"));
    }

    #[test]
    fn manager_errors_are_generic() {
        let err = Error::NotFound {
            name: "db".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Generic);
        assert!(!err.is_retryable());
    }

    #[test]
    fn wrapped_resource_error_keeps_kind() {
        let err: Error = ResourceError::transient(ErrorDomain::Vector, "unavailable").into();
        assert_eq!(err.kind(), ErrorKind::Transient);
        assert!(err.is_retryable());
    }

    #[test]
    fn shutdown_error_lists_names() {
        let err = ShutdownError {
            failures: vec![CloseFailure {
                name: "b".to_string(),
                kind: ResourceKind::Cache,
                error: ResourceError::transient(ErrorDomain::Cache, "reset"),
            }],
        };
        assert_eq!(err.to_string(), "shutdown failed for 1 resource(s): b");
    }
}
