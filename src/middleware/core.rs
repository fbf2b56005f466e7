use crate::context::Context;
use crate::error::HandlerResult;
use std::fmt;
use std::sync::Arc;

/// One stage of a request chain
///
/// A stage does its work and either returns, ending the chain, or calls
/// `next.run(ctx)` to hand control to the rest of it. Returning `Err` short-circuits
/// every stage that has not run yet.
pub trait Middleware: Send + Sync {
    fn call(&self, ctx: &mut Context, next: Next<'_>) -> HandlerResult;
}

impl<F> Middleware for F
where
    F: Fn(&mut Context, Next<'_>) -> HandlerResult + Send + Sync,
{
    fn call(&self, ctx: &mut Context, next: Next<'_>) -> HandlerResult {
        self(ctx, next)
    }
}

pub type Stage = Arc<dyn Middleware>;

/// Wrap a closure as a [`Stage`]
pub fn stage<F>(f: F) -> Stage
where
    F: Fn(&mut Context, Next<'_>) -> HandlerResult + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Continuation over the stages that have not run yet
///
/// `outer` is the continuation of the chain this one was composed into; it runs
/// once the local stages are exhausted.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    stages: &'a [Stage],
    outer: Option<&'a Next<'a>>,
}

impl<'a> Next<'a> {
    pub fn new(stages: &'a [Stage], outer: Option<&'a Next<'a>>) -> Self {
        Self { stages, outer }
    }

    /// Continuation that does nothing
    pub fn end() -> Next<'static> {
        Next {
            stages: &[],
            outer: None,
        }
    }

    pub fn run(self, ctx: &mut Context) -> HandlerResult {
        match self.stages.split_first() {
            Some((head, rest)) => head.call(
                ctx,
                Next {
                    stages: rest,
                    outer: self.outer,
                },
            ),
            None => match self.outer {
                Some(outer) => outer.run(ctx),
                None => Ok(()),
            },
        }
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("remaining", &self.stages.len())
            .field("has_outer", &self.outer.is_some())
            .finish()
    }
}

struct Composed {
    stages: Vec<Stage>,
}

impl Middleware for Composed {
    fn call(&self, ctx: &mut Context, next: Next<'_>) -> HandlerResult {
        Next::new(&self.stages, Some(&next)).run(ctx)
    }
}

/// Fold an ordered list of stages into one stage
///
/// The first stage runs first; when the last one calls `next`, control passes
/// to the continuation the composed stage was given.
pub fn compose(stages: Vec<Stage>) -> Stage {
    Arc::new(Composed { stages })
}

/// Run `stages` as a complete chain over `ctx`
pub fn run_chain(stages: &[Stage], ctx: &mut Context) -> HandlerResult {
    Next::new(stages, None).run(ctx)
}
