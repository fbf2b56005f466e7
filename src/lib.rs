//! # brrtmapper
//!
//! **brrtmapper** is a request router that documents itself. Routes declare their
//! parameters and bodies with compact type expressions (`number`,
//! `array<string>`, `Pet|Error`); the mapper uses the same declarations to
//! extract, coerce and validate request data and to generate an
//! [OpenAPI 3](https://spec.openapis.org/oas/v3.0.2) document.
//!
//! ## Architecture
//!
//! - **[`typeexpr`]** - type expression parser producing JSON Schema fragments
//! - **[`validator`]** - named-schema registry, coercion, format checks,
//!   converters and compiled validators
//! - **[`router`]** - path patterns, routes, the [`Mapper`] and 405/501 handling
//! - **[`middleware`]** - the synchronous continuation chain every stage runs in
//! - **[`context`]** - per-request state threaded through the chain
//! - **[`body`]** - body decoding seam
//! - **[`openapi`]** - document metadata and assembly
//! - **[`config`]** / **[`logging`]** - file/env configuration and subscriber setup
//!
//! ### Request Handling Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Host as Host transport
//!     participant Allowed as allowed_methods
//!     participant Dispatch as Mapper::routes
//!     participant Route as Route
//!     participant Handler as User middleware
//!
//!     Host->>Allowed: run_chain(ctx)
//!     Allowed->>Dispatch: next
//!     Dispatch->>Dispatch: match path + method
//!     Dispatch->>Route: extract params (header, cookie, query, path)
//!     Route->>Route: coerce + validate
//!     alt invalid
//!         Route-->>Host: 400 [field] message
//!     end
//!     Route->>Handler: body parser, body validation, param handlers, handlers
//!     Handler-->>Allowed: unwind
//!     Allowed->>Allowed: 405 / 501 / OPTIONS when unanswered
//!     Allowed-->>Host: ctx.finish(result)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use brrtmapper::{stage, Context, Mapper, Request, RouteOptions, ParamSpec};
//! use http::Method;
//! use serde_json::json;
//!
//! let mapper = Mapper::new();
//! mapper.define("User", &json!({"id": "number", "name": "string"}), &json!(null))?;
//! mapper.get(
//!     "/users/:id",
//!     RouteOptions::new()
//!         .param("id", ParamSpec::new("number"))
//!         .responses(json!({"200": {"description": "ok"}})),
//!     vec![stage(|ctx: &mut Context, _next| {
//!         ctx.set_body(json!({"id": ctx.params["id"].clone()}));
//!         Ok(())
//!     })],
//! )?;
//!
//! let mut ctx = Context::new(Request::new(Method::GET, "/users/42"));
//! let result = mapper.handle(&mut ctx);
//! let response = ctx.finish(result);
//! assert_eq!(response.body, Some(json!({"id": 42})));
//! ```
//!
//! ## Runtime Considerations
//!
//! Stages are synchronous: a stage runs to completion or hands control to
//! `next`. Hosts built on coroutine runtimes can run a chain per coroutine;
//! async hosts run it inside a blocking section. All shared state (routes,
//! registry, validator cache) is `Send + Sync`.

pub mod body;
pub mod config;
pub mod context;
pub mod error;
pub mod ids;
pub mod logging;
pub mod middleware;
pub mod openapi;
pub mod options;
pub mod query;
pub mod router;
pub mod typeexpr;
pub mod validator;
mod validator_cache;

pub use body::{BodyParser, DefaultBodyParser};
pub use config::MapperConfig;
pub use context::{Context, MatchedLayer, Request, Response};
pub use error::{HandlerResult, HttpError, MapperError, MapperResult};
pub use middleware::{compose, run_chain, stage, Middleware, Next, Stage, TracingMiddleware};
pub use options::{
    BodySpec, BodyType, DocFields, MapperOptions, ParamLocation, ParamSpec, RouteOptions,
    ValidationPolicy,
};
pub use router::{AllowedMethodsOptions, Mapper, Route};
pub use validator::{ValidationIssue, Validator};
pub use validator_cache::ValidatorCache;
