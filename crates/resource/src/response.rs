//! Framework-neutral rendering of errors as HTTP error responses.
//!
//! Web layers convert an [`Error`] into an [`ErrorResponse`] and serialize
//! [`ErrorResponse::body`]; the status code and error code follow from the
//! taxonomy kind so handlers never branch on backend-specific failures.

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::error::{Error, ErrorKind};

/// HTTP-facing description of a failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorResponse {
    /// Stable machine-readable code.
    pub code: &'static str,
    /// Human-readable message.
    pub message: String,
    /// HTTP status code.
    pub status_code: u16,
    /// Structured context.
    pub details: Map<String, Value>,
    /// The underlying failure, for logs only; never part of the body.
    #[serde(skip)]
    cause: Option<String>,
}

impl ErrorResponse {
    /// JSON body: `{"error": {code, message, details, request_id}}`.
    #[must_use]
    pub fn body(&self, request_id: Option<&str>) -> Value {
        json!({
            "error": {
                "code": self.code,
                "message": self.message,
                "details": self.details,
                "request_id": request_id.unwrap_or("unknown"),
            }
        })
    }

    /// The hidden cause of an opaque `INTERNAL_ERROR`.
    #[must_use]
    pub fn cause(&self) -> Option<&str> {
        self.cause.as_deref()
    }

    /// Whether the failure is the server's (status 500 and above).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status_code >= 500
    }

    /// Log the response: warn below 500, error at 500 and above.
    pub fn log(&self, request_id: Option<&str>) {
        let request_id = request_id.unwrap_or("unknown");
        if self.is_server_error() {
            tracing::error!(
                code = self.code,
                status = self.status_code,
                request_id,
                error = self.cause.as_deref(),
                "{}",
                self.message
            );
        } else {
            tracing::warn!(
                code = self.code,
                status = self.status_code,
                request_id,
                "{}",
                self.message
            );
        }
    }
}

impl From<&Error> for ErrorResponse {
    fn from(error: &Error) -> Self {
        match error {
            Error::Resource(resource) => {
                let (code, status_code) = match resource.kind() {
                    ErrorKind::Transient => ("RESOURCE_UNAVAILABLE", 503),
                    ErrorKind::Auth => ("RESOURCE_AUTH_FAILED", 502),
                    ErrorKind::Operation => ("RESOURCE_OPERATION_FAILED", 400),
                    ErrorKind::Generic => ("RESOURCE_ERROR", 500),
                };
                let mut details = Map::new();
                details.insert("domain".into(), json!(resource.domain()));
                details.insert("kind".into(), json!(resource.kind()));
                details.insert("retryable".into(), json!(resource.is_retryable()));
                if let Some(name) = resource.resource() {
                    details.insert("resource".into(), json!(name));
                }
                Self {
                    code,
                    message: resource.to_string(),
                    status_code,
                    details,
                    cause: None,
                }
            }
            Error::NotFound { name } => Self {
                code: "RESOURCE_NOT_FOUND",
                message: error.to_string(),
                status_code: 404,
                details: single("resource", name),
                cause: None,
            },
            Error::ShuttingDown { name } => Self {
                code: "SHUTTING_DOWN",
                message: error.to_string(),
                status_code: 503,
                details: single("resource", name),
                cause: None,
            },
            _ => Self {
                code: "INTERNAL_ERROR",
                message: "internal server error".to_string(),
                status_code: 500,
                details: Map::new(),
                cause: Some(error.to_string()),
            },
        }
    }
}

impl From<Error> for ErrorResponse {
    fn from(error: Error) -> Self {
        Self::from(&error)
    }
}

fn single(key: &str, value: &str) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(key.to_string(), Value::String(value.to_string()));
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResourceError;
    use crate::kind::ErrorDomain;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case(ErrorKind::Transient, "RESOURCE_UNAVAILABLE", 503)]
    #[test_case(ErrorKind::Auth, "RESOURCE_AUTH_FAILED", 502)]
    #[test_case(ErrorKind::Operation, "RESOURCE_OPERATION_FAILED", 400)]
    #[test_case(ErrorKind::Generic, "RESOURCE_ERROR", 500)]
    fn resource_errors_map_by_kind(kind: ErrorKind, code: &str, status: u16) {
        let error: Error = ResourceError::new(ErrorDomain::Cache, kind, "boom").into();
        let response = ErrorResponse::from(&error);
        assert_eq!(response.code, code);
        assert_eq!(response.status_code, status);
        assert_eq!(response.details["domain"], "cache");
    }

    #[test]
    fn body_has_envelope_and_request_id() {
        let error: Error = ResourceError::new(ErrorDomain::Storage, ErrorKind::Auth, "AccessDenied")
            .with_resource("uploads")
            .into();
        let body = ErrorResponse::from(error).body(Some("req-42"));

        assert_eq!(
            body,
            json!({
                "error": {
                    "code": "RESOURCE_AUTH_FAILED",
                    "message": "storage auth error for resource 'uploads': AccessDenied",
                    "details": {
                        "domain": "storage",
                        "kind": "auth",
                        "retryable": false,
                        "resource": "uploads",
                    },
                    "request_id": "req-42",
                }
            })
        );
    }

    #[test]
    fn not_found_and_shutdown_have_dedicated_codes() {
        let not_found = ErrorResponse::from(Error::NotFound {
            name: "db".to_string(),
        });
        assert_eq!((not_found.code, not_found.status_code), ("RESOURCE_NOT_FOUND", 404));

        let shutting_down = ErrorResponse::from(Error::ShuttingDown {
            name: "db".to_string(),
        });
        assert_eq!(
            (shutting_down.code, shutting_down.status_code),
            ("SHUTTING_DOWN", 503)
        );
    }

    #[test]
    fn other_errors_are_opaque() {
        let response = ErrorResponse::from(Error::configuration("secret dsn leaked"));
        assert_eq!(response.code, "INTERNAL_ERROR");
        assert_eq!(response.status_code, 500);
        assert!(!response.message.contains("secret"));
        assert_eq!(response.cause(), Some("configuration error: secret dsn leaked"));

        let body = response.body(None);
        assert_eq!(body["error"]["request_id"], "unknown");
        assert!(!body.to_string().contains("secret"));
        let serialized = serde_json::to_string(&response).expect("serialize");
        assert!(!serialized.contains("secret"));
        response.log(Some("req-7"));
    }

    #[test]
    fn classified_errors_carry_no_hidden_cause() {
        let error: Error = ResourceError::new(ErrorDomain::Cache, ErrorKind::Transient, "LOADING").into();
        assert_eq!(ErrorResponse::from(&error).cause(), None);
    }
}
