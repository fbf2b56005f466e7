//! # Router Module
//!
//! Path matching, route registration and request dispatch.
//!
//! ## Overview
//!
//! - [`pattern`] compiles path templates (`/users/:id(\d+)`) into regular
//!   expressions and generates URLs back from them
//! - [`Route`] is one registration with its stages and parameter declarations
//! - [`Mapper`] holds the ordered route list, dispatches requests and assembles
//!   the OpenAPI document
//! - [`AllowedMethodsOptions`] configures the 405/501/OPTIONS stage
//!
//! ## Example
//!
//! ```rust,ignore
//! use brrtmapper::{stage, Context, Mapper, ParamSpec, RouteOptions};
//! use serde_json::json;
//!
//! let mapper = Mapper::new();
//! mapper.get(
//!     "/users/:id",
//!     RouteOptions::new().name("user").param("id", ParamSpec::new("number")),
//!     vec![stage(|ctx: &mut Context, _next| {
//!         let id = ctx.params["id"].clone();
//!         ctx.set_body(json!({ "id": id }));
//!         Ok(())
//!     })],
//! )?;
//! assert_eq!(mapper.url("user", &json!({"id": 3}), &json!(null))?, "/users/3");
//! ```
//!
//! ## Performance
//!
//! Matching is linear in the number of routes: every template is tested in
//! registration order because several routes may run for one request.

mod allowed;
mod mapper;
pub mod pattern;
mod route;

pub use allowed::{AllowedMethodsOptions, ErrorFactory};
pub use mapper::{Mapper, Matched, Paths, SharedRoute};
pub use pattern::{ParamVec, PathKey, PathPattern, PatternOptions};
pub use route::{ParamHandler, Parameter, Route, SharedParamHandler};
