use std::time::Instant;

use tracing::{info, info_span};

use super::{Middleware, Next};
use crate::context::Context;
use crate::error::HandlerResult;

/// Wraps the rest of the chain in a `request` span and logs the outcome
pub struct TracingMiddleware;

impl Middleware for TracingMiddleware {
    fn call(&self, ctx: &mut Context, next: Next<'_>) -> HandlerResult {
        let span = info_span!(
            "request",
            method = %ctx.request.method,
            path = %ctx.request.path,
            request_id = %ctx.request_id
        );
        let _entered = span.enter();
        let started = Instant::now();

        let result = next.run(ctx);

        let status = match &result {
            Ok(()) => ctx.response.status.map(|s| s.as_u16()),
            Err(err) => Some(err.status.as_u16()),
        };
        info!(
            status = status,
            matched_route = ctx.matched_route.as_deref(),
            latency_ms = started.elapsed().as_millis() as u64,
            "Request completed"
        );
        result
    }
}
