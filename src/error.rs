//! The error taxonomy.
//!
//! Every failure that can escape a route chain is one of three kinds of
//! [`RequestError`]:
//!
//! - **Client** — the caller got something wrong. Carries a 4xx status and a
//!   stable API code; message and detail are safe to put on the wire.
//! - **Validation** — a client error produced by schema validation, carrying
//!   the per-field violations.
//! - **Internal** — everything else. Rendered as a generic 500; the real
//!   cause is kept for logging and never serialized.
//!
//! [`ConfigurationError`] is deliberately *not* part of that taxonomy: it is
//! raised synchronously while routes and the app are being declared, aborts
//! startup, and never reaches the error handler.

use http::StatusCode;
use serde::Serialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::app::Phase;

/// Boxed error value accepted anywhere a cause can be attached.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// ── RequestError ─────────────────────────────────────────────────────────────

/// Which branch of the taxonomy an error belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Client,
    Validation,
    Internal,
}

/// One schema violation, addressed by dotted field path.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Violation {
    pub field: String,
    pub message: String,
}

/// A classified request-time failure.
///
/// Immutable except for the origin / correlation stamp, which the error
/// handler applies exactly once when the error surfaces from a chain.
#[derive(Debug, thiserror::Error)]
#[error("{code}: {message}")]
pub struct RequestError {
    kind: ErrorKind,
    status: StatusCode,
    code: String,
    message: String,
    detail: Option<Value>,
    violations: Vec<Violation>,
    #[source]
    cause: Option<BoxError>,
    origin: Option<String>,
    correlation: Option<Uuid>,
}

impl RequestError {
    /// A caller-caused error. `status` is expected to be in the 4xx range.
    pub fn client(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        debug_assert!(status.is_client_error(), "client errors carry 4xx statuses");
        Self {
            kind: ErrorKind::Client,
            status,
            code: code.to_owned(),
            message: message.into(),
            detail: None,
            violations: Vec::new(),
            cause: None,
            origin: None,
            correlation: None,
        }
    }

    /// A schema-validation failure with its per-field violations.
    pub fn validation(violations: Vec<Violation>) -> Self {
        Self {
            kind: ErrorKind::Validation,
            status: StatusCode::BAD_REQUEST,
            code: "VALIDATION_FAILED".to_owned(),
            message: "request validation failed".to_owned(),
            detail: None,
            violations,
            cause: None,
            origin: None,
            correlation: None,
        }
    }

    /// An unexpected failure, keeping `cause` for the logs only.
    pub fn internal(cause: impl Into<BoxError>) -> Self {
        let cause = cause.into();
        Self {
            kind: ErrorKind::Internal,
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL_ERROR".to_owned(),
            message: cause.to_string(),
            detail: None,
            violations: Vec::new(),
            cause: Some(cause),
            origin: None,
            correlation: None,
        }
    }

    /// An internal fault described by a message alone (no underlying cause).
    pub fn internal_note(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Internal,
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL_ERROR".to_owned(),
            message: message.into(),
            detail: None,
            violations: Vec::new(),
            cause: None,
            origin: None,
            correlation: None,
        }
    }

    /// The failure produced by invoking a route that declares no steps.
    /// Surfaces at call time, naming the route's URL.
    pub fn not_implemented(url: &str) -> Self {
        Self {
            kind: ErrorKind::Internal,
            status: StatusCode::NOT_IMPLEMENTED,
            code: "NOT_IMPLEMENTED".to_owned(),
            message: format!("route `{url}` is not implemented: no steps declared"),
            detail: None,
            violations: Vec::new(),
            cause: None,
            origin: None,
            correlation: None,
        }
    }

    /// Attaches structured, caller-visible detail (client errors only reach
    /// the wire with it; internal detail stays in the logs).
    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn kind(&self) -> ErrorKind { self.kind }
    pub fn status(&self) -> StatusCode { self.status }
    pub fn code(&self) -> &str { &self.code }
    pub fn message(&self) -> &str { &self.message }
    pub fn detail(&self) -> Option<&Value> { self.detail.as_ref() }
    pub fn violations(&self) -> &[Violation] { &self.violations }
    pub fn origin(&self) -> Option<&str> { self.origin.as_deref() }
    pub fn correlation(&self) -> Option<Uuid> { self.correlation }

    /// Stamps the originating route and the request correlation id. Each is
    /// written at most once; later stamps are ignored.
    pub(crate) fn stamp(&mut self, origin: &str, correlation: Uuid) {
        if self.origin.is_none() {
            self.origin = Some(origin.to_owned());
        }
        if self.correlation.is_none() {
            self.correlation = Some(correlation);
        }
    }

    /// The JSON body this error renders to. Internal faults collapse to a
    /// fixed generic shape: cause, message, and detail never leak.
    pub fn wire_body(&self) -> Value {
        match self.kind {
            ErrorKind::Internal => json!({
                "error": self.code,
                "message": "internal server error",
            }),
            ErrorKind::Validation => json!({
                "error": self.code,
                "message": self.message,
                "violations": self.violations,
            }),
            ErrorKind::Client => {
                let mut body = json!({
                    "error": self.code,
                    "message": self.message,
                });
                if let Some(detail) = &self.detail {
                    body["detail"] = detail.clone();
                }
                body
            }
        }
    }
}

// ── ConfigurationError ───────────────────────────────────────────────────────

/// A mistake in how routes or the app were declared.
///
/// Raised synchronously during declaration or `build()`; aborts startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("unsupported HTTP method `{0}`")]
    UnsupportedMethod(String),

    #[error("route URL must not be empty")]
    EmptyUrl,

    #[error("invalid URL template `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("route `{0}` declares no API version but the id template requires one")]
    MissingVersion(String),

    #[error("duplicate route id `{0}`")]
    DuplicateRoute(String),

    #[error("duplicate step `{step}` on route `{url}`")]
    DuplicateStep { url: String, step: String },

    #[error("catch on route `{0}` must follow a declared step")]
    CatchWithoutStep(String),

    #[error("invalid lifecycle transition: {from:?} -> {to:?}")]
    InvalidTransition { from: Phase, to: Phase },
}

// ── ServeError ───────────────────────────────────────────────────────────────

/// The error type returned by [`Server::serve`](crate::Server::serve).
///
/// Route-level failures never surface here: they are rendered as HTTP
/// responses by the error handler. This type covers what is left — socket
/// failures and an app handed over in the wrong lifecycle phase.
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigurationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_wire_body_never_leaks_the_cause() {
        let err = RequestError::internal(std::io::Error::other("db password was hunter2"));
        let body = err.wire_body();
        assert_eq!(body["message"], "internal server error");
        assert!(!body.to_string().contains("hunter2"));
    }

    #[test]
    fn stamp_is_idempotent() {
        let mut err = RequestError::client(StatusCode::NOT_FOUND, "NOT_FOUND", "gone");
        let first = Uuid::new_v4();
        err.stamp("get:users", first);
        err.stamp("get:other", Uuid::new_v4());
        assert_eq!(err.origin(), Some("get:users"));
        assert_eq!(err.correlation(), Some(first));
    }

    #[test]
    fn validation_wire_body_lists_violations() {
        let err = RequestError::validation(vec![Violation {
            field: "name".into(),
            message: "is required".into(),
        }]);
        let body = err.wire_body();
        assert_eq!(body["error"], "VALIDATION_FAILED");
        assert_eq!(body["violations"][0]["field"], "name");
    }
}
