mod core;
mod tracing;

pub use self::core::{compose, run_chain, stage, Middleware, Next, Stage};
pub use self::tracing::TracingMiddleware;
