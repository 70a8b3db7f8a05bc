//! Resource families and the error domains they report under.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Family of backend a resource belongs to.
///
/// The set is closed: new backends are supported by adding a variant,
/// never by stringly-typed extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    /// Relational database (Postgres, SQLite, ...).
    RelationalDb,
    /// Document database (MongoDB, ...).
    DocumentDb,
    /// Key-value cache (Redis, ...).
    Cache,
    /// Message broker (RabbitMQ, ...).
    Broker,
    /// Vector store (Qdrant, pgvector, ...).
    VectorStore,
    /// Blob / object storage (S3, MinIO, R2, ...).
    BlobStore,
}

impl ResourceKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::RelationalDb,
        Self::DocumentDb,
        Self::Cache,
        Self::Broker,
        Self::VectorStore,
        Self::BlobStore,
    ];

    /// The error domain failures of this kind are classified under.
    #[must_use]
    pub fn domain(self) -> ErrorDomain {
        match self {
            Self::RelationalDb => ErrorDomain::Database,
            Self::DocumentDb => ErrorDomain::Document,
            Self::Cache => ErrorDomain::Cache,
            Self::Broker => ErrorDomain::Broker,
            Self::VectorStore => ErrorDomain::Vector,
            Self::BlobStore => ErrorDomain::Storage,
        }
    }

    /// Stable kebab-case tag, identical to the serde representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RelationalDb => "relational-db",
            Self::DocumentDb => "document-db",
            Self::Cache => "cache",
            Self::Broker => "broker",
            Self::VectorStore => "vector-store",
            Self::BlobStore => "blob-store",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a [`ResourceKind`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown resource kind '{0}'")]
pub struct UnknownKind(pub String);

impl FromStr for ResourceKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

/// Resource family an error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorDomain {
    /// Relational databases.
    Database,
    /// Document databases.
    Document,
    /// Caches.
    Cache,
    /// Message brokers.
    Broker,
    /// Vector stores.
    Vector,
    /// Blob / object storage.
    Storage,
}

impl ErrorDomain {
    /// Every domain, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Database,
        Self::Document,
        Self::Cache,
        Self::Broker,
        Self::Vector,
        Self::Storage,
    ];
}

impl fmt::Display for ErrorDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Database => "database",
            Self::Document => "document",
            Self::Cache => "cache",
            Self::Broker => "broker",
            Self::Vector => "vector",
            Self::Storage => "storage",
        };
        f.write_str(name)
    }
}
