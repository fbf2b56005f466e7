//! # Request Context
//!
//! [`Context`] is the single mutable value threaded through a request chain. The
//! host transport builds it from the incoming request, runs the mapper's
//! dispatch stage over it and turns the outcome into a response with
//! [`Context::finish`].
//!
//! Besides the request and response halves, dispatch records:
//!
//! - `params` - the merged, coerced parameter object of the matched routes
//! - `params_errors` / `body_errors` - the last validation issue lists, kept even
//!   when a custom policy chose not to fail the request
//! - `matched` - every route whose path matched (used for 405/501 handling)
//! - `matched_route` / `matched_route_name` / `route_name` - identification of the
//!   route that handled the request
//!
//! Two request-scoped caches live here as well: the parsed query string (keyed by
//! the raw query text) and the flag recording that path captures were already
//! decoded for this request.

use crate::error::HandlerResult;
use crate::ids::{RequestId, RouteId};
use crate::query::{parse_cookies, parse_query};
use crate::validator::ValidationIssue;
use http::header::{HeaderName, LOCATION};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Incoming request as seen by the mapper
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    /// Path without the query string
    pub path: String,
    /// Raw query string without the leading `?`
    pub querystring: String,
    pub headers: HeaderMap,
    pub raw_body: Vec<u8>,
    /// Decoded body, set by a body parser stage
    pub body: Option<Value>,
}

impl Request {
    /// Build a request from a method and a request target such as `/users?page=2`
    pub fn new(method: Method, target: &str) -> Self {
        let (path, querystring) = match target.split_once('?') {
            Some((path, query)) => (path, query),
            None => (target, ""),
        };
        Self {
            method,
            path: path.to_string(),
            querystring: querystring.to_string(),
            headers: HeaderMap::new(),
            raw_body: Vec::new(),
            body: None,
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    #[must_use]
    pub fn with_body(mut self, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        self.raw_body = body.into();
        self.with_header("content-type", content_type)
    }

    #[must_use]
    pub fn with_json(self, body: &Value) -> Self {
        self.with_body("application/json", body.to_string())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Media type of the body without parameters, lower-cased
    pub fn content_type(&self) -> Option<String> {
        self.header("content-type").map(|ct| {
            ct.split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
    }

    pub fn cookie(&self, name: &str) -> Option<String> {
        parse_cookies(self.header("cookie")).remove(name)
    }
}

/// Response being built by the chain
#[derive(Debug, Clone, Default)]
pub struct Response {
    /// `None` until a stage sets a status or a body
    pub status: Option<StatusCode>,
    pub headers: HeaderMap,
    pub body: Option<Value>,
}

impl Response {
    /// Effective status; an untouched response is a 404
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::NOT_FOUND)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// A route whose path matched the request
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedLayer {
    pub id: RouteId,
    pub path: String,
    pub name: Option<String>,
    pub methods: Vec<Method>,
}

/// Per-request state threaded through every stage
#[derive(Debug)]
pub struct Context {
    pub request_id: RequestId,
    pub request: Request,
    pub response: Response,
    pub params: Map<String, Value>,
    pub params_errors: Option<Vec<ValidationIssue>>,
    pub body_errors: Option<Vec<ValidationIssue>>,
    pub matched: Vec<MatchedLayer>,
    /// Path template of the last route that matched path and method
    pub matched_route: Option<String>,
    pub matched_route_name: Option<String>,
    /// Name of the route whose stages are currently running
    pub route_name: Option<String>,
    /// Matches against this path instead of the request path when set
    pub mapper_path: Option<String>,
    /// Free-form application data
    pub state: Map<String, Value>,
    query_cache: HashMap<String, Arc<Map<String, Value>>>,
    path_parsed: bool,
}

impl Context {
    pub fn new(request: Request) -> Self {
        let request_id = RequestId::from_header_or_new(request.header("x-request-id"));
        Self {
            request_id,
            request,
            response: Response::default(),
            params: Map::new(),
            params_errors: None,
            body_errors: None,
            matched: Vec::new(),
            matched_route: None,
            matched_route_name: None,
            route_name: None,
            mapper_path: None,
            state: Map::new(),
            query_cache: HashMap::new(),
            path_parsed: false,
        }
    }

    pub fn method(&self) -> &Method {
        &self.request.method
    }

    pub fn path(&self) -> &str {
        &self.request.path
    }

    /// Parsed query string, parsed at most once per distinct raw query
    pub fn query(&mut self) -> Arc<Map<String, Value>> {
        let raw = &self.request.querystring;
        if let Some(parsed) = self.query_cache.get(raw) {
            return Arc::clone(parsed);
        }
        let parsed = Arc::new(parse_query(raw));
        self.query_cache.insert(raw.clone(), Arc::clone(&parsed));
        parsed
    }

    pub(crate) fn path_parsed(&self) -> bool {
        self.path_parsed
    }

    pub(crate) fn mark_path_parsed(&mut self) {
        self.path_parsed = true;
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.response.status = Some(status);
    }

    pub fn set_header(&mut self, name: HeaderName, value: &str) {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.response.headers.insert(name, value);
        }
    }

    /// Set the response body; an unset status becomes 200
    pub fn set_body(&mut self, body: Value) {
        self.response.body = Some(body);
        if self.response.status.is_none() {
            self.response.status = Some(StatusCode::OK);
        }
    }

    /// Point the client at `url` with a 302
    pub fn redirect(&mut self, url: &str) {
        self.set_header(LOCATION, url);
        self.response.status = Some(StatusCode::FOUND);
        self.response.body = Some(Value::String(format!("Redirecting to {url}.")));
    }

    /// Fold the chain outcome into the response
    ///
    /// Errors replace status and body (the message is only shown when the error
    /// is exposed) and contribute their headers. A chain that never answered
    /// finishes as 404.
    pub fn finish(&mut self, result: HandlerResult) -> &Response {
        match result {
            Ok(()) => {
                if self.response.status.is_none() {
                    self.response.status = Some(StatusCode::NOT_FOUND);
                }
            }
            Err(err) => {
                let message = if err.expose {
                    err.message.clone()
                } else {
                    err.status.canonical_reason().unwrap_or("Error").to_string()
                };
                self.response.status = Some(err.status);
                self.response.body = Some(err.body.unwrap_or(Value::String(message)));
                for (name, value) in &err.headers {
                    self.response.headers.insert(name.clone(), value.clone());
                }
            }
        }
        &self.response
    }
}
