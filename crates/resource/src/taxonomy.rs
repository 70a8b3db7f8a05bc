//! Translation of native backend failures into the error taxonomy.
//!
//! Classification is table-driven: each [`ErrorDomain`] has an ordered
//! list of [`Rule`]s, followed by a table shared by every domain. The
//! first rule whose [`Matcher`] fits the error's [`Signature`] decides the
//! [`ErrorKind`]; when nothing matches the error is `Generic`. Extraction
//! and matching are total, so translation never fails.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::io;

use crate::error::{BoxError, Error, ErrorKind, ResourceError};
use crate::kind::ErrorDomain;

/// Error chains longer than this are truncated during extraction.
const MAX_CHAIN_DEPTH: usize = 32;

// ---------------------------------------------------------------------------
// DriverError
// ---------------------------------------------------------------------------

/// Carrier for driver failures that expose a vendor code or HTTP status.
///
/// Drivers whose native errors do not implement `std::error::Error` with
/// enough structure can wrap them in a `DriverError` so the vendor code
/// (SQLSTATE, Redis prefix, AMQP reply name, gRPC status, S3 code) reaches
/// the classification tables.
#[derive(Debug)]
pub struct DriverError {
    code: Option<String>,
    status: Option<u16>,
    message: String,
    source: Option<BoxError>,
}

impl DriverError {
    /// Create a driver error with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            status: None,
            message: message.into(),
            source: None,
        }
    }

    /// Attach the vendor error code.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Attach the HTTP status returned by the backend.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Attach the underlying error.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// The vendor error code.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// The HTTP status.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        self.status
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.code, self.status) {
            (Some(code), _) => write!(f, "{code}: {}", self.message),
            (None, Some(status)) => write!(f, "HTTP {status}: {}", self.message),
            (None, None) => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for DriverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|source| source as &(dyn std::error::Error + 'static))
    }
}

// ---------------------------------------------------------------------------
// Signature
// ---------------------------------------------------------------------------

/// Everything classification looks at, extracted from an error chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signature {
    /// Vendor codes found on [`DriverError`] links.
    pub codes: Vec<String>,
    /// HTTP statuses found on [`DriverError`] links.
    pub statuses: Vec<u16>,
    /// Kinds of any `std::io::Error` links.
    pub io_kinds: Vec<io::ErrorKind>,
    /// Lowercased message of every link.
    pub messages: Vec<String>,
}

impl Signature {
    /// Walk `error` and its sources.
    pub fn of(error: &(dyn std::error::Error + 'static)) -> Self {
        let mut signature = Self::default();
        let mut link = Some(error);
        let mut depth = 0;

        while let Some(current) = link {
            if depth == MAX_CHAIN_DEPTH {
                break;
            }
            if let Some(driver) = current.downcast_ref::<DriverError>() {
                if let Some(code) = driver.code() {
                    signature.codes.push(code.to_string());
                }
                if let Some(status) = driver.status() {
                    signature.statuses.push(status);
                }
            }
            if let Some(io) = current.downcast_ref::<io::Error>() {
                signature.io_kinds.push(io.kind());
            }
            signature.messages.push(current.to_string().to_lowercase());

            link = current.source();
            depth += 1;
        }

        signature
    }
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Predicate over a [`Signature`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
    /// A vendor code equal to the given one.
    Code(Cow<'static, str>),
    /// A vendor code starting with the given prefix (e.g. a SQLSTATE class).
    CodePrefix(Cow<'static, str>),
    /// An HTTP status.
    Status(u16),
    /// An `io::ErrorKind` anywhere in the chain.
    Io(io::ErrorKind),
    /// A lowercase fragment of any message in the chain.
    Message(Cow<'static, str>),
}

impl Matcher {
    /// Whether `signature` satisfies the matcher.
    #[must_use]
    pub fn matches(&self, signature: &Signature) -> bool {
        match self {
            Self::Code(code) => signature.codes.iter().any(|c| c == code.as_ref()),
            Self::CodePrefix(prefix) => signature
                .codes
                .iter()
                .any(|c| c.starts_with(prefix.as_ref())),
            Self::Status(status) => signature.statuses.contains(status),
            Self::Io(kind) => signature.io_kinds.contains(kind),
            Self::Message(fragment) => signature
                .messages
                .iter()
                .any(|m| m.contains(fragment.as_ref())),
        }
    }
}

/// One row of a classification table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// What to look for.
    pub matcher: Matcher,
    /// The kind assigned on a match.
    pub kind: ErrorKind,
}

impl Rule {
    /// Match a vendor code exactly.
    #[must_use]
    pub const fn code(code: &'static str, kind: ErrorKind) -> Self {
        Self {
            matcher: Matcher::Code(Cow::Borrowed(code)),
            kind,
        }
    }

    /// Match a vendor code prefix.
    #[must_use]
    pub const fn code_prefix(prefix: &'static str, kind: ErrorKind) -> Self {
        Self {
            matcher: Matcher::CodePrefix(Cow::Borrowed(prefix)),
            kind,
        }
    }

    /// Match an HTTP status.
    #[must_use]
    pub const fn status(status: u16, kind: ErrorKind) -> Self {
        Self {
            matcher: Matcher::Status(status),
            kind,
        }
    }

    /// Match an `io::ErrorKind`.
    #[must_use]
    pub const fn io(io_kind: io::ErrorKind, kind: ErrorKind) -> Self {
        Self {
            matcher: Matcher::Io(io_kind),
            kind,
        }
    }

    /// Match a message fragment. The fragment must be lowercase.
    #[must_use]
    pub const fn message(fragment: &'static str, kind: ErrorKind) -> Self {
        Self {
            matcher: Matcher::Message(Cow::Borrowed(fragment)),
            kind,
        }
    }

    /// Rule with an owned vendor code, for runtime reclassification.
    pub fn owned_code(code: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            matcher: Matcher::Code(Cow::Owned(code.into())),
            kind,
        }
    }

    /// Rule with an owned message fragment, for runtime reclassification.
    pub fn owned_message(fragment: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            matcher: Matcher::Message(Cow::Owned(fragment.into().to_lowercase())),
            kind,
        }
    }
}

use ErrorKind::{Auth, Operation, Transient};

/// SQLSTATE classes and SQLite result codes.
const DATABASE_RULES: &[Rule] = &[
    Rule::code("28000", Auth),
    Rule::code("28P01", Auth),
    Rule::code("42501", Auth),
    Rule::code("SQLITE_AUTH", Auth),
    Rule::code("SQLITE_PERM", Auth),
    Rule::code_prefix("08", Transient),
    Rule::code("40001", Transient),
    Rule::code("40P01", Transient),
    Rule::code("53300", Transient),
    Rule::code("57P01", Transient),
    Rule::code("57P02", Transient),
    Rule::code("57P03", Transient),
    Rule::code("SQLITE_BUSY", Transient),
    Rule::code("SQLITE_LOCKED", Transient),
    Rule::code_prefix("23", Operation),
    Rule::code_prefix("22", Operation),
    Rule::code("42601", Operation),
    Rule::code("42P01", Operation),
    Rule::code("42703", Operation),
    Rule::code("SQLITE_CONSTRAINT", Operation),
    Rule::code("SQLITE_MISMATCH", Operation),
];

/// MongoDB server error codes.
const DOCUMENT_RULES: &[Rule] = &[
    Rule::code("18", Auth),
    Rule::code("13", Auth),
    Rule::code("8000", Auth),
    Rule::code("6", Transient),
    Rule::code("7", Transient),
    Rule::code("50", Transient),
    Rule::code("89", Transient),
    Rule::code("91", Transient),
    Rule::code("189", Transient),
    Rule::code("10107", Transient),
    Rule::code("11600", Transient),
    Rule::code("11602", Transient),
    Rule::code("13435", Transient),
    Rule::code("13436", Transient),
    Rule::code("2", Operation),
    Rule::code("9", Operation),
    Rule::code("26", Operation),
    Rule::code("48", Operation),
    Rule::code("121", Operation),
    Rule::code("11000", Operation),
    Rule::code("11001", Operation),
    Rule::message("server selection timeout", Transient),
];

/// Redis error prefixes.
const CACHE_RULES: &[Rule] = &[
    Rule::code("NOAUTH", Auth),
    Rule::code("WRONGPASS", Auth),
    Rule::code("NOPERM", Auth),
    Rule::code("LOADING", Transient),
    Rule::code("BUSY", Transient),
    Rule::code("TRYAGAIN", Transient),
    Rule::code("CLUSTERDOWN", Transient),
    Rule::code("MASTERDOWN", Transient),
    Rule::code("READONLY", Transient),
    Rule::code("MOVED", Transient),
    Rule::code("ASK", Transient),
    Rule::code("WRONGTYPE", Operation),
    Rule::code("EXECABORT", Operation),
    Rule::code("NOSCRIPT", Operation),
    Rule::code("ERR", Operation),
    Rule::message("noauth", Auth),
    Rule::message("wrongpass", Auth),
];

/// AMQP 0-9-1 reply names.
const BROKER_RULES: &[Rule] = &[
    Rule::code("ACCESS_REFUSED", Auth),
    Rule::code("CONNECTION_FORCED", Transient),
    Rule::code("RESOURCE_LOCKED", Transient),
    Rule::code("RESOURCE_ERROR", Transient),
    Rule::code("CHANNEL_ERROR", Transient),
    Rule::code("INTERNAL_ERROR", Transient),
    Rule::code("NO_CONSUMERS", Transient),
    Rule::code("NOT_FOUND", Operation),
    Rule::code("PRECONDITION_FAILED", Operation),
    Rule::code("NO_ROUTE", Operation),
    Rule::code("CONTENT_TOO_LARGE", Operation),
    Rule::code("FRAME_ERROR", Operation),
    Rule::code("SYNTAX_ERROR", Operation),
    Rule::code("COMMAND_INVALID", Operation),
    Rule::code("NOT_ALLOWED", Operation),
    Rule::code("NOT_IMPLEMENTED", Operation),
    Rule::message("access_refused", Auth),
];

/// gRPC status names.
const VECTOR_RULES: &[Rule] = &[
    Rule::code("UNAUTHENTICATED", Auth),
    Rule::code("PERMISSION_DENIED", Auth),
    Rule::code("UNAVAILABLE", Transient),
    Rule::code("DEADLINE_EXCEEDED", Transient),
    Rule::code("RESOURCE_EXHAUSTED", Transient),
    Rule::code("ABORTED", Transient),
    Rule::code("INVALID_ARGUMENT", Operation),
    Rule::code("NOT_FOUND", Operation),
    Rule::code("ALREADY_EXISTS", Operation),
    Rule::code("FAILED_PRECONDITION", Operation),
    Rule::code("OUT_OF_RANGE", Operation),
    Rule::code("UNIMPLEMENTED", Operation),
];

/// S3-compatible error codes.
const STORAGE_RULES: &[Rule] = &[
    Rule::code("AccessDenied", Auth),
    Rule::code("InvalidAccessKeyId", Auth),
    Rule::code("SignatureDoesNotMatch", Auth),
    Rule::code("ExpiredToken", Auth),
    Rule::code("InvalidToken", Auth),
    Rule::code("SlowDown", Transient),
    Rule::code("RequestTimeout", Transient),
    Rule::code("ServiceUnavailable", Transient),
    Rule::code("InternalError", Transient),
    Rule::code("NoSuchBucket", Operation),
    Rule::code("NoSuchKey", Operation),
    Rule::code("BucketAlreadyExists", Operation),
    Rule::code("BucketAlreadyOwnedByYou", Operation),
    Rule::code("InvalidBucketName", Operation),
    Rule::code("EntityTooLarge", Operation),
    Rule::code("InvalidArgument", Operation),
];

/// Consulted after the domain table, for every domain.
const COMMON_RULES: &[Rule] = &[
    Rule::status(401, Auth),
    Rule::status(403, Auth),
    Rule::status(408, Transient),
    Rule::status(429, Transient),
    Rule::status(500, Transient),
    Rule::status(502, Transient),
    Rule::status(503, Transient),
    Rule::status(504, Transient),
    Rule::status(400, Operation),
    Rule::status(404, Operation),
    Rule::status(405, Operation),
    Rule::status(409, Operation),
    Rule::status(412, Operation),
    Rule::status(413, Operation),
    Rule::status(422, Operation),
    Rule::io(io::ErrorKind::PermissionDenied, Auth),
    Rule::io(io::ErrorKind::TimedOut, Transient),
    Rule::io(io::ErrorKind::ConnectionReset, Transient),
    Rule::io(io::ErrorKind::ConnectionRefused, Transient),
    Rule::io(io::ErrorKind::ConnectionAborted, Transient),
    Rule::io(io::ErrorKind::NotConnected, Transient),
    Rule::io(io::ErrorKind::BrokenPipe, Transient),
    Rule::io(io::ErrorKind::Interrupted, Transient),
    Rule::io(io::ErrorKind::WouldBlock, Transient),
    Rule::io(io::ErrorKind::UnexpectedEof, Transient),
    Rule::io(io::ErrorKind::InvalidInput, Operation),
    Rule::io(io::ErrorKind::InvalidData, Operation),
    Rule::io(io::ErrorKind::Unsupported, Operation),
    Rule::io(io::ErrorKind::AlreadyExists, Operation),
    Rule::io(io::ErrorKind::NotFound, Operation),
    Rule::message("authentication failed", Auth),
    Rule::message("permission denied", Auth),
    Rule::message("access denied", Auth),
    Rule::message("unauthorized", Auth),
    Rule::message("invalid token", Auth),
    Rule::message("token expired", Auth),
    Rule::message("timed out", Transient),
    Rule::message("timeout", Transient),
    Rule::message("connection reset", Transient),
    Rule::message("connection refused", Transient),
    Rule::message("temporarily unavailable", Transient),
    Rule::message("rate limit", Transient),
    Rule::message("too many requests", Transient),
    Rule::message("broken pipe", Transient),
    Rule::message("syntax error", Operation),
    Rule::message("constraint", Operation),
    Rule::message("unsupported", Operation),
    Rule::message("invalid argument", Operation),
    Rule::message("malformed", Operation),
];

/// The built-in table for `domain`, not including the common rules.
#[must_use]
pub fn domain_rules(domain: ErrorDomain) -> &'static [Rule] {
    match domain {
        ErrorDomain::Database => DATABASE_RULES,
        ErrorDomain::Document => DOCUMENT_RULES,
        ErrorDomain::Cache => CACHE_RULES,
        ErrorDomain::Broker => BROKER_RULES,
        ErrorDomain::Vector => VECTOR_RULES,
        ErrorDomain::Storage => STORAGE_RULES,
    }
}

/// Rules applied to every domain after its own table.
#[must_use]
pub fn common_rules() -> &'static [Rule] {
    COMMON_RULES
}

// ---------------------------------------------------------------------------
// ErrorTaxonomy
// ---------------------------------------------------------------------------

/// Per-domain classification of native errors.
///
/// Custom rules added with [`with_rule`](Self::with_rule) are consulted
/// before the built-in tables, which is how a service reclassifies an
/// error the defaults treat as `Generic`.
#[derive(Debug, Clone, Default)]
pub struct ErrorTaxonomy {
    overrides: HashMap<ErrorDomain, Vec<Rule>>,
}

impl ErrorTaxonomy {
    /// Taxonomy with only the built-in tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule for `domain`, consulted before the built-in tables.
    #[must_use]
    pub fn with_rule(mut self, domain: ErrorDomain, rule: Rule) -> Self {
        self.overrides.entry(domain).or_default().push(rule);
        self
    }

    /// Classify an extracted signature. Pure: same input, same kind.
    #[must_use]
    pub fn classify(&self, domain: ErrorDomain, signature: &Signature) -> ErrorKind {
        let custom = self.overrides.get(&domain).map_or(&[][..], Vec::as_slice);
        custom
            .iter()
            .chain(domain_rules(domain))
            .chain(common_rules())
            .find(|rule| rule.matcher.matches(signature))
            .map_or(ErrorKind::Generic, |rule| rule.kind)
    }

    /// Classify a native error in place, without taking ownership.
    #[must_use]
    pub fn classify_error(
        &self,
        domain: ErrorDomain,
        error: &(dyn std::error::Error + 'static),
    ) -> ErrorKind {
        if let Some(existing) = error.downcast_ref::<ResourceError>() {
            return existing.kind();
        }
        self.classify(domain, &Signature::of(error))
    }

    /// Translate a native error into exactly one taxonomy error.
    ///
    /// Errors that already are taxonomy errors (a [`ResourceError`], or an
    /// [`Error::Resource`]) are returned unchanged.
    pub fn translate(&self, domain: ErrorDomain, error: BoxError) -> ResourceError {
        let error = match error.downcast::<ResourceError>() {
            Ok(existing) => return *existing,
            Err(other) => other,
        };
        let error = match error.downcast::<Error>() {
            Ok(wrapped) => match *wrapped {
                Error::Resource(existing) => return existing,
                other => Box::new(other) as BoxError,
            },
            Err(other) => other,
        };

        let kind = self.classify(domain, &Signature::of(&*error));
        ResourceError::new(domain, kind, error.to_string()).with_source(error)
    }
}
