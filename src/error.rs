//! # Error Module
//!
//! Two error families flow through the mapper:
//!
//! - [`MapperError`] - configuration errors raised synchronously while routes and
//!   schemas are being declared. They are never recovered at request time.
//! - [`HttpError`] - request-time signals returned by middleware stages. Returning
//!   `Err(HttpError)` short-circuits the remaining chain; the host transport turns
//!   it into a response (see [`crate::context::Context::finish`]).

use crate::validator::ValidationIssue;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde_json::Value;
use std::fmt;

/// Result type for setup-time operations
pub type MapperResult<T> = Result<T, MapperError>;

/// Result type returned by every middleware stage
pub type HandlerResult = Result<(), HttpError>;

/// Configuration error raised while building a mapper
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MapperError {
    /// A verb route was registered without any middleware
    #[error("{methods} {route}: middleware must be a function")]
    MissingMiddleware { methods: String, route: String },

    /// A type expression mixes `&` and `|`
    #[error("& and | can only have one: `{expression}`")]
    MixedComposition { expression: String },

    /// `url()` or `redirect()` referenced an unknown route name
    #[error("No route found for name: {0}")]
    RouteNotFound(String),

    /// Two routes reachable from one mapper share a name
    #[error("duplicate route name: {0}")]
    DuplicateRouteName(String),

    /// A path key was declared with a non-path location
    #[error("{0} must be in path")]
    PathParamLocation(String),

    /// `in: path` was declared for a name that is not a key of the path template
    #[error("{name} is declared in path but {path} has no such key")]
    NotAPathParam { name: String, path: String },

    /// `in: path` combined with `required: false`
    #[error("{0} is a path parameter and cannot be optional")]
    OptionalPathParam(String),

    /// The path template could not be compiled
    #[error("invalid path pattern {path}: {reason}")]
    InvalidPattern { path: String, reason: String },

    /// URL generation was missing a required key
    #[error("Expected \"{0}\" to be defined")]
    MissingUrlParam(String),

    /// URL generation received a value that does not match the key pattern
    #[error("Expected \"{name}\" to match \"{pattern}\", but received \"{value}\"")]
    UrlParamMismatch {
        name: String,
        pattern: String,
        value: String,
    },

    /// A `$ref` points at a schema that was never defined
    #[error("can't resolve reference #/components/schemas/{0}")]
    UnresolvedSchema(String),

    /// A schema references itself through its parents
    #[error("schema {0} references itself through $ref/allOf/oneOf/anyOf")]
    SchemaCycle(String),

    /// The schema validation engine rejected a schema
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// `define()` was called with a blank name
    #[error("schemaName is required")]
    EmptySchemaName,

    /// A mapper was mounted into itself
    #[error("a mapper cannot be mounted into itself")]
    SelfMount,
}

/// Request-time error signal
///
/// Carries the status the transport should answer with, the message, whether the
/// message may be shown to the client, extra response headers and an optional
/// JSON body produced by a custom error factory.
#[derive(Debug, Clone)]
pub struct HttpError {
    pub status: StatusCode,
    pub message: String,
    /// Client-facing errors (4xx) expose their message by default
    pub expose: bool,
    pub headers: HeaderMap,
    pub body: Option<Value>,
}

impl HttpError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            expose: status.is_client_error(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Error built from the canonical reason phrase of `status`
    pub fn from_status(status: StatusCode) -> Self {
        Self::new(status, status.canonical_reason().unwrap_or("Error"))
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// 400 error whose message is the newline-joined issue list
    ///
    /// Each issue renders as `[field] message`, or just `message` when the
    /// violation is not attached to a field.
    pub fn validation(issues: &[ValidationIssue]) -> Self {
        let message = issues
            .iter()
            .map(ValidationIssue::to_string)
            .collect::<Vec<_>>()
            .join("\n");
        Self::bad_request(message)
    }

    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn expose(mut self, expose: bool) -> Self {
        self.expose = expose;
        self
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status.as_u16(), self.message)
    }
}

impl std::error::Error for HttpError {}

impl From<MapperError> for HttpError {
    fn from(err: MapperError) -> Self {
        HttpError::internal(err.to_string()).expose(false)
    }
}
