//! Automatic `405 Method Not Allowed`, `501 Not Implemented` and `OPTIONS`
//! answers.
//!
//! The stage runs the rest of the chain first. If nothing answered (the status is
//! unset or 404) it looks at every route whose path matched the request, recorded
//! by dispatch in `ctx.matched`, and answers on their behalf.

use crate::context::Context;
use crate::error::{HandlerResult, HttpError};
use crate::middleware::{Middleware, Next};
use http::header::ALLOW;
use http::{Method, StatusCode};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Builds the error returned in throw mode
pub type ErrorFactory = Arc<dyn Fn() -> HttpError + Send + Sync>;

/// Behavior of [`crate::router::Mapper::allowed_methods`]
#[derive(Clone, Default)]
pub struct AllowedMethodsOptions {
    /// Return errors instead of setting the status on the response
    pub throw: bool,
    pub not_implemented: Option<ErrorFactory>,
    pub method_not_allowed: Option<ErrorFactory>,
}

impl fmt::Debug for AllowedMethodsOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllowedMethodsOptions")
            .field("throw", &self.throw)
            .field("not_implemented", &self.not_implemented.is_some())
            .field("method_not_allowed", &self.method_not_allowed.is_some())
            .finish()
    }
}

impl AllowedMethodsOptions {
    #[must_use]
    pub fn throw(mut self) -> Self {
        self.throw = true;
        self
    }

    #[must_use]
    pub fn not_implemented<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> HttpError + Send + Sync + 'static,
    {
        self.not_implemented = Some(Arc::new(factory));
        self
    }

    #[must_use]
    pub fn method_not_allowed<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> HttpError + Send + Sync + 'static,
    {
        self.method_not_allowed = Some(Arc::new(factory));
        self
    }
}

pub(crate) struct AllowedMethods {
    pub(crate) implemented: Vec<Method>,
    pub(crate) options: AllowedMethodsOptions,
}

impl AllowedMethods {
    fn reject(
        &self,
        ctx: &mut Context,
        status: StatusCode,
        factory: Option<&ErrorFactory>,
        allow: &str,
    ) -> HandlerResult {
        debug!(
            request_id = %ctx.request_id,
            method = %ctx.request.method,
            status = status.as_u16(),
            allow = %allow,
            "Rejecting method"
        );
        if self.options.throw {
            let err = match factory {
                Some(factory) => factory(),
                None if status == StatusCode::METHOD_NOT_ALLOWED => {
                    HttpError::from_status(status).with_header(ALLOW, allow)
                }
                None => HttpError::from_status(status),
            };
            return Err(err);
        }
        ctx.set_status(status);
        if status == StatusCode::METHOD_NOT_ALLOWED {
            ctx.set_header(ALLOW, allow);
        }
        Ok(())
    }
}

impl Middleware for AllowedMethods {
    fn call(&self, ctx: &mut Context, next: Next<'_>) -> HandlerResult {
        next.run(ctx)?;

        if ctx
            .response
            .status
            .is_some_and(|status| status != StatusCode::NOT_FOUND)
        {
            return Ok(());
        }

        let mut allowed: Vec<Method> = Vec::new();
        for layer in &ctx.matched {
            for method in &layer.methods {
                if !allowed.contains(method) {
                    allowed.push(method.clone());
                }
            }
        }
        let allow = allowed
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        let method = ctx.request.method.clone();

        if !self.implemented.contains(&method) {
            return self.reject(
                ctx,
                StatusCode::NOT_IMPLEMENTED,
                self.options.not_implemented.as_ref(),
                &allow,
            );
        }
        if allowed.is_empty() {
            return Ok(());
        }
        if method == Method::OPTIONS {
            ctx.set_status(StatusCode::OK);
            ctx.response.body = Some(Value::String(String::new()));
            ctx.set_header(ALLOW, &allow);
            return Ok(());
        }
        if !allowed.contains(&method) {
            return self.reject(
                ctx,
                StatusCode::METHOD_NOT_ALLOWED,
                self.options.method_not_allowed.as_ref(),
                &allow,
            );
        }
        Ok(())
    }
}
