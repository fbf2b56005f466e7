//! Body decoding seam.
//!
//! The mapper only decides whether a route decodes its body and what the result
//! is validated against; the decoding itself is a [`BodyParser`]. Decoder errors
//! are returned to the transport unchanged.

use crate::context::Context;
use crate::error::{HandlerResult, HttpError};
use crate::middleware::{Middleware, Next};
use crate::query::parse_query;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Decodes `ctx.request.raw_body` into `ctx.request.body`
pub trait BodyParser: Send + Sync {
    fn parse(&self, ctx: &mut Context) -> Result<(), HttpError>;
}

/// JSON and url-encoded form decoder
///
/// Empty bodies and unknown media types decode to an empty object; multipart
/// requires an external parser.
#[derive(Debug, Clone)]
pub struct DefaultBodyParser {
    /// Largest accepted body in bytes
    pub limit: usize,
}

impl Default for DefaultBodyParser {
    fn default() -> Self {
        Self { limit: 1024 * 1024 }
    }
}

impl BodyParser for DefaultBodyParser {
    fn parse(&self, ctx: &mut Context) -> Result<(), HttpError> {
        if ctx.request.body.is_some() {
            return Ok(());
        }
        let raw = &ctx.request.raw_body;
        if raw.len() > self.limit {
            return Err(HttpError::new(
                http::StatusCode::PAYLOAD_TOO_LARGE,
                "request entity too large",
            ));
        }
        let body = if raw.is_empty() {
            Value::Object(Map::new())
        } else {
            match ctx.request.content_type().as_deref() {
                Some(ct) if ct == "application/json" || ct.ends_with("+json") => {
                    serde_json::from_slice(raw)
                        .map_err(|e| HttpError::bad_request(format!("invalid JSON body: {e}")))?
                }
                Some("application/x-www-form-urlencoded") => {
                    Value::Object(parse_query(&String::from_utf8_lossy(raw)))
                }
                Some(ct) if ct.starts_with("text/") => {
                    Value::String(String::from_utf8_lossy(raw).into_owned())
                }
                _ => Value::Object(Map::new()),
            }
        };
        ctx.request.body = Some(body);
        Ok(())
    }
}

/// Stage running a body parser before the rest of the route chain
pub(crate) struct BodyParserStage {
    pub(crate) parser: Arc<dyn BodyParser>,
}

impl Middleware for BodyParserStage {
    fn call(&self, ctx: &mut Context, next: Next<'_>) -> HandlerResult {
        self.parser.parse(ctx)?;
        next.run(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Request;
    use http::Method;
    use serde_json::json;

    fn parsed(request: Request) -> Result<Option<Value>, HttpError> {
        let mut ctx = Context::new(request);
        DefaultBodyParser::default().parse(&mut ctx)?;
        Ok(ctx.request.body)
    }

    #[test]
    fn test_json_body() {
        let req = Request::new(Method::POST, "/").with_json(&json!({"name": "rex"}));
        assert_eq!(parsed(req).unwrap(), Some(json!({"name": "rex"})));
    }

    #[test]
    fn test_form_body() {
        let req = Request::new(Method::POST, "/")
            .with_body("application/x-www-form-urlencoded; charset=utf-8", "a=1&b[]=2");
        assert_eq!(parsed(req).unwrap(), Some(json!({"a": "1", "b": ["2"]})));
    }

    #[test]
    fn test_malformed_json_is_a_client_error() {
        let req = Request::new(Method::POST, "/").with_body("application/json", "{nope");
        let err = parsed(req).unwrap_err();
        assert_eq!(err.status, http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_empty_body_decodes_to_empty_object() {
        let req = Request::new(Method::POST, "/");
        assert_eq!(parsed(req).unwrap(), Some(json!({})));
    }
}
