//! # Mapper
//!
//! [`Mapper`] owns an ordered list of routes, a schema registry and the document
//! metadata. Routes are registered with the verb methods, pass-through middleware
//! with [`Mapper::use_middleware`] and whole mappers with [`Mapper::mount`].
//!
//! ## Dispatch
//!
//! [`Mapper::routes`] returns the dispatch stage. For each request it:
//!
//! 1. picks the path to match (`mapper_path` option, then `ctx.mapper_path`,
//!    then the request path)
//! 2. records every path-matching route in `ctx.matched`
//! 3. calls `next` untouched when no route with verbs matches path and method
//! 4. otherwise runs, for each route matching path and method in registration
//!    order, parameter extraction followed by that route's stages, then the
//!    outer `next`
//!
//! ## Concurrency
//!
//! Registration takes `&self`; the route list sits behind an `RwLock` and each
//! route behind its own. Dispatch holds no lock while stages run, so handlers
//! may register parameters or schemas without deadlocking.

use super::allowed::{AllowedMethods, AllowedMethodsOptions};
use super::pattern::PatternOptions;
use super::route::{ParamHandler, Route, RouteInit, SharedParamHandler};
use crate::context::Context;
use crate::error::{HandlerResult, MapperError, MapperResult};
use crate::ids::RouteIdSequence;
use crate::middleware::{run_chain, Middleware, Next, Stage};
use crate::openapi::{deep_merge, DocumentMeta};
use crate::options::{MapperOptions, RouteOptions};
use crate::validator::Validator;
use http::{Method, StatusCode};
use serde_json::{Map, Value};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use tracing::{debug, info, warn};

pub type SharedRoute = Arc<RwLock<Route>>;

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Verbs registered by [`Mapper::all`]
const ALL_METHODS: [Method; 9] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
    Method::HEAD,
    Method::OPTIONS,
    Method::CONNECT,
    Method::TRACE,
];

/// One or more path templates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths(Vec<String>);

impl Paths {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl From<&str> for Paths {
    fn from(path: &str) -> Self {
        Paths(vec![path.to_string()])
    }
}

impl From<String> for Paths {
    fn from(path: String) -> Self {
        Paths(vec![path])
    }
}

impl From<&String> for Paths {
    fn from(path: &String) -> Self {
        Paths(vec![path.clone()])
    }
}

impl From<Vec<&str>> for Paths {
    fn from(paths: Vec<&str>) -> Self {
        Paths(paths.into_iter().map(String::from).collect())
    }
}

impl From<Vec<String>> for Paths {
    fn from(paths: Vec<String>) -> Self {
        Paths(paths)
    }
}

impl<const N: usize> From<[&str; N]> for Paths {
    fn from(paths: [&str; N]) -> Self {
        Paths(paths.iter().map(|p| p.to_string()).collect())
    }
}

/// Routes matching a path, and the subset also matching the method
#[derive(Debug, Clone, Default)]
pub struct Matched {
    pub path: Vec<SharedRoute>,
    pub path_and_method: Vec<SharedRoute>,
    /// Whether a route with verbs matched both
    pub route: bool,
}

struct MapperState {
    options: MapperOptions,
    stack: Vec<SharedRoute>,
    params: Vec<(String, SharedParamHandler)>,
    document: DocumentMeta,
    ids: RouteIdSequence,
}

impl MapperState {
    fn has_name(&self, name: &str) -> bool {
        self.stack.iter().any(|r| read(r).name() == Some(name))
    }


    fn find(&self, name: &str) -> Option<SharedRoute> {
        self.stack
            .iter()
            .find(|r| read(r).name() == Some(name))
            .map(Arc::clone)
    }

    fn match_request(&self, path: &str, method: &Method) -> Matched {
        let mut matched = Matched::default();
        for shared in &self.stack {
            let route = read(shared);
            if !route.match_path(path) {
                continue;
            }
            matched.path.push(Arc::clone(shared));
            if route.methods().is_empty() || route.methods().contains(method) {
                matched.path_and_method.push(Arc::clone(shared));
                if !route.methods().is_empty() {
                    matched.route = true;
                }
            }
        }
        matched
    }

    fn document(&self, validator: &Validator) -> Value {
        let mut paths = Value::Object(Map::new());
        for route in &self.stack {
            if let Some((path, item)) = read(route).get_path_item() {
                let mut entry = Map::new();
                entry.insert(path, item);
                deep_merge(&mut paths, &Value::Object(entry));
            }
        }
        let paths = match paths {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self.document.render(paths, &validator.get_schemas())
    }
}

/// Router with schema-aware parameter handling and OpenAPI generation
///
/// Clones share the same routes and registry.
#[derive(Clone)]
pub struct Mapper {
    state: Arc<RwLock<MapperState>>,
    validator: Validator,
}

impl Default for Mapper {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Mapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = read(&self.state);
        f.debug_struct("Mapper")
            .field("prefix", &state.options.prefix)
            .field("routes", &state.stack.len())
            .field("validator", &self.validator)
            .finish()
    }
}

impl Mapper {
    /// Mapper with default options, serving its document at `/openapi.json`
    pub fn new() -> Self {
        let options = MapperOptions::default();
        let url = options.openapi_url.clone();
        let mapper = Self::bare(options);
        if let Some(url) = url {
            if let Err(err) = mapper.serve_document(&url) {
                warn!(url = %url, error = %err, "Failed to register document endpoint");
            }
        }
        mapper
    }

    /// Mapper with explicit options
    ///
    /// # Errors
    ///
    /// Returns an error if the document endpoint path does not compile.
    pub fn with_options(options: MapperOptions) -> MapperResult<Self> {
        let url = options.openapi_url.clone();
        let mapper = Self::bare(options);
        if let Some(url) = url {
            mapper.serve_document(&url)?;
        }
        Ok(mapper)
    }

    fn bare(options: MapperOptions) -> Self {
        let validator = Validator::with_cache(options.schema_cache);
        Self {
            state: Arc::new(RwLock::new(MapperState {
                document: options.document.clone(),
                options,
                stack: Vec::new(),
                params: Vec::new(),
                ids: RouteIdSequence::new(),
            })),
            validator,
        }
    }

    fn serve_document(&self, url: &str) -> MapperResult<()> {
        let endpoint = DocumentEndpoint {
            state: Arc::downgrade(&self.state),
            validator: self.validator.clone(),
        };
        let endpoint: Stage = Arc::new(endpoint);
        self.get(url, RouteOptions::new(), vec![endpoint])?;
        Ok(())
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    /// Snapshot of the route list in registration order
    pub fn stack(&self) -> Vec<SharedRoute> {
        read(&self.state).stack.clone()
    }

    pub fn get(&self, path: impl Into<Paths>, options: RouteOptions, middleware: Vec<Stage>) -> MapperResult<&Self> {
        self.register(path, &[Method::GET], options, middleware)
    }

    pub fn post(&self, path: impl Into<Paths>, options: RouteOptions, middleware: Vec<Stage>) -> MapperResult<&Self> {
        self.register(path, &[Method::POST], options, middleware)
    }

    pub fn put(&self, path: impl Into<Paths>, options: RouteOptions, middleware: Vec<Stage>) -> MapperResult<&Self> {
        self.register(path, &[Method::PUT], options, middleware)
    }

    pub fn patch(&self, path: impl Into<Paths>, options: RouteOptions, middleware: Vec<Stage>) -> MapperResult<&Self> {
        self.register(path, &[Method::PATCH], options, middleware)
    }

    pub fn delete(&self, path: impl Into<Paths>, options: RouteOptions, middleware: Vec<Stage>) -> MapperResult<&Self> {
        self.register(path, &[Method::DELETE], options, middleware)
    }

    /// Alias of [`Mapper::delete`]
    pub fn del(&self, path: impl Into<Paths>, options: RouteOptions, middleware: Vec<Stage>) -> MapperResult<&Self> {
        self.delete(path, options, middleware)
    }

    pub fn head(&self, path: impl Into<Paths>, options: RouteOptions, middleware: Vec<Stage>) -> MapperResult<&Self> {
        self.register(path, &[Method::HEAD], options, middleware)
    }

    pub fn options(&self, path: impl Into<Paths>, options: RouteOptions, middleware: Vec<Stage>) -> MapperResult<&Self> {
        self.register(path, &[Method::OPTIONS], options, middleware)
    }

    /// Register `path` for every standard verb
    pub fn all(&self, path: impl Into<Paths>, options: RouteOptions, middleware: Vec<Stage>) -> MapperResult<&Self> {
        self.register(path, &ALL_METHODS, options, middleware)
    }

    /// Register one route per path
    ///
    /// Route options are merged with the mapper's: `strict` and `sensitive` are
    /// enabled if either side enables them, `end` defaults to `true`, the body
    /// parser and parameter policy fall back to the mapper defaults. Parameter
    /// handlers already registered on the mapper are attached to the new route.
    ///
    /// # Errors
    ///
    /// Any [`Route`] construction error, or [`MapperError::DuplicateRouteName`].
    pub fn register(
        &self,
        paths: impl Into<Paths>,
        methods: &[Method],
        options: RouteOptions,
        middleware: Vec<Stage>,
    ) -> MapperResult<&Self> {
        let paths = paths.into();
        let mut state = write(&self.state);
        if let Some(name) = &options.name {
            if state.has_name(name) {
                return Err(MapperError::DuplicateRouteName(name.clone()));
            }
        }
        // Copies fanned out over several paths share the name; nothing is
        // pushed until every path has compiled.
        let mut routes = Vec::with_capacity(paths.iter().count());
        for path in paths.iter() {
            let mut options = options.clone();
            if options.body_parser.is_none() {
                options.body_parser = state.options.body_parser.clone();
            }
            let pattern = PatternOptions {
                strict: options.strict.unwrap_or(false) || state.options.strict,
                sensitive: options.sensitive.unwrap_or(false) || state.options.sensitive,
                end: options.end.unwrap_or(true),
            };
            let mut route = Route::new(RouteInit {
                id: state.ids.next_id(),
                path: path.to_string(),
                methods: methods.to_vec(),
                middleware: middleware.clone(),
                options,
                prefix: state.options.prefix.clone(),
                validator: self.validator.clone(),
                pattern,
                params_error: state.options.params_error.clone().unwrap_or_default(),
            })?;
            for (name, handler) in &state.params {
                route.param(name, Arc::clone(handler));
            }
            routes.push(Arc::new(RwLock::new(route)));
        }
        state.stack.extend(routes);
        Ok(self)
    }

    /// Register pass-through middleware
    ///
    /// Without paths the middleware runs for every request that reaches a
    /// matching verb route; with paths it runs for requests under them. Either
    /// way it only runs as part of a dispatch that found a verb route.
    ///
    /// # Errors
    ///
    /// [`MapperError::MissingMiddleware`] for an empty list, or a path compile
    /// error.
    pub fn use_middleware(&self, paths: Option<Paths>, middleware: Vec<Stage>) -> MapperResult<&Self> {
        let options = RouteOptions::new().end(false);
        match paths {
            Some(paths) => self.register(paths, &[], options, middleware),
            None => self.register("(.*)", &[], options.ignore_params(), middleware),
        }
    }

    /// Mount every route of `nested`, optionally under `path`
    ///
    /// Routes are shared: they are re-prefixed with `path` and this mapper's
    /// prefix and appended to this mapper's list. This mapper's parameter
    /// handlers are registered on `nested`, and `nested`'s schemas are imported
    /// into this registry (existing names win).
    ///
    /// # Errors
    ///
    /// [`MapperError::SelfMount`], [`MapperError::DuplicateRouteName`] when a
    /// nested route name is already taken here, or a prefix compile error.
    pub fn mount(&self, path: Option<&str>, nested: &Mapper) -> MapperResult<&Self> {
        if Arc::ptr_eq(&self.state, &nested.state) {
            return Err(MapperError::SelfMount);
        }
        let routes = nested.stack();
        let (prefix, params) = {
            let state = read(&self.state);
            for route in &routes {
                if let Some(name) = read(route).name() {
                    if state.has_name(name) {
                        return Err(MapperError::DuplicateRouteName(name.to_string()));
                    }
                }
            }
            (state.options.prefix.clone(), state.params.clone())
        };

        for route in &routes {
            let mut route = write(route);
            if let Some(path) = path.filter(|p| !p.is_empty() && *p != "/") {
                route.set_prefix(path)?;
            }
            if !prefix.is_empty() {
                route.set_prefix(&prefix)?;
            }
        }
        for (name, handler) in params {
            nested.param_shared(&name, handler);
        }
        let imported = self.validator.import(&nested.validator);
        write(&self.state).stack.extend(routes.iter().map(Arc::clone));
        debug!(
            path = path.unwrap_or(""),
            routes = routes.len(),
            schemas_imported = imported,
            "Mapper mounted"
        );
        Ok(self)
    }

    /// Set the path prefix and re-prefix every route already registered
    ///
    /// A trailing `/` is dropped from `prefix`.
    pub fn prefix(&self, prefix: &str) -> MapperResult<&Self> {
        let prefix = prefix.strip_suffix('/').unwrap_or(prefix);
        let mut state = write(&self.state);
        state.options.prefix = prefix.to_string();
        for route in &state.stack {
            write(route).set_prefix(prefix)?;
        }
        Ok(self)
    }

    /// Register a handler for parameter `name`
    ///
    /// The handler is attached to every current route declaring the parameter
    /// and to every route registered later.
    pub fn param<F>(&self, name: &str, handler: F) -> &Self
    where
        F: Fn(Value, &mut Context, Next<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        self.param_shared(name, Arc::new(handler))
    }

    fn param_shared(&self, name: &str, handler: Arc<dyn ParamHandler>) -> &Self {
        let mut state = write(&self.state);
        match state.params.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = Arc::clone(&handler),
            None => state.params.push((name.to_string(), Arc::clone(&handler))),
        }
        for route in &state.stack {
            write(route).param(name, Arc::clone(&handler));
        }
        self
    }

    /// Route registered under `name`
    pub fn route(&self, name: &str) -> Option<SharedRoute> {
        read(&self.state).find(name)
    }

    /// URL of the named route
    ///
    /// # Errors
    ///
    /// [`MapperError::RouteNotFound`] or a URL generation error.
    pub fn url(&self, name: &str, params: &Value, query: &Value) -> MapperResult<String> {
        let route = self
            .route(name)
            .ok_or_else(|| MapperError::RouteNotFound(name.to_string()))?;
        let route = read(&route);
        route.url(params, query)
    }

    /// Redirect `source` to `destination` for every verb
    ///
    /// Either side may be a route name instead of a path. The status defaults
    /// to `301 Moved Permanently`.
    pub fn redirect(&self, source: &str, destination: &str, status: Option<StatusCode>) -> MapperResult<&Self> {
        let source = self.resolve_target(source)?;
        let destination = self.resolve_target(destination)?;
        let status = status.unwrap_or(StatusCode::MOVED_PERMANENTLY);
        let redirect = move |ctx: &mut Context, _next: Next<'_>| -> HandlerResult {
            ctx.redirect(&destination);
            ctx.set_status(status);
            Ok(())
        };
        let redirect: Stage = Arc::new(redirect);
        self.all(source, RouteOptions::new(), vec![redirect])
    }

    fn resolve_target(&self, target: &str) -> MapperResult<String> {
        if target.starts_with('/') {
            Ok(target.to_string())
        } else {
            self.url(target, &Value::Null, &Value::Null)
        }
    }

    /// Routes matching `path`, and those also matching `method`
    pub fn match_request(&self, path: &str, method: &Method) -> Matched {
        read(&self.state).match_request(path, method)
    }

    /// Dispatch stage
    pub fn routes(&self) -> Stage {
        Arc::new(Dispatch {
            state: Arc::clone(&self.state),
        })
    }

    /// Alias of [`Mapper::routes`]
    pub fn middleware(&self) -> Stage {
        self.routes()
    }

    /// Stage answering OPTIONS, 405 and 501 for requests dispatch left unanswered
    pub fn allowed_methods(&self, options: AllowedMethodsOptions) -> Stage {
        Arc::new(AllowedMethods {
            implemented: read(&self.state).options.methods.clone(),
            options,
        })
    }

    /// Run dispatch wrapped in the default allowed-methods handling
    pub fn handle(&self, ctx: &mut Context) -> HandlerResult {
        let chain = [self.allowed_methods(AllowedMethodsOptions::default()), self.routes()];
        run_chain(&chain, ctx)
    }

    /// Register a named schema; see [`Validator::add_schema`]
    pub fn define(&self, name: &str, props: &Value, options: &Value) -> MapperResult<&Self> {
        self.validator.add_schema(name, props, options)?;
        Ok(self)
    }

    /// Replace the document `info` object
    pub fn info(&self, info: &Value) -> &Self {
        write(&self.state).document.info = info.clone();
        self
    }

    pub fn add_tag(&self, tag: Value) -> &Self {
        write(&self.state).document.tags.push(tag);
        self
    }

    pub fn add_server(&self, server: Value) -> &Self {
        write(&self.state).document.servers.push(server);
        self
    }

    /// Generated OpenAPI document
    pub fn document(&self) -> Value {
        read(&self.state).document(&self.validator)
    }

    /// Compile every route's parameter and body schema now
    ///
    /// Surfaces unresolved references at startup instead of on the first
    /// request. Returns the number of schemas compiled.
    pub fn precompile(&self) -> MapperResult<usize> {
        let routes = self.stack();
        let mut compiled = 0;
        for route in &routes {
            compiled += read(route).precompile()?;
        }
        info!(
            routes = routes.len(),
            compiled_count = compiled,
            cache_size = self.validator.cache().size(),
            "Schemas precompiled"
        );
        Ok(compiled)
    }
}

struct Dispatch {
    state: Arc<RwLock<MapperState>>,
}

impl Middleware for Dispatch {
    fn call(&self, ctx: &mut Context, next: Next<'_>) -> HandlerResult {
        let (path, matched) = {
            let state = read(&self.state);
            let path = state
                .options
                .mapper_path
                .clone()
                .or_else(|| ctx.mapper_path.clone())
                .unwrap_or_else(|| ctx.request.path.clone());
            let matched = state.match_request(&path, &ctx.request.method);
            (path, matched)
        };

        for route in &matched.path {
            ctx.matched.push(read(route).matched_layer());
        }
        if !matched.route {
            debug!(
                request_id = %ctx.request_id,
                method = %ctx.request.method,
                path = %path,
                "No route matched"
            );
            return next.run(ctx);
        }

        if let Some(last) = matched.path_and_method.last() {
            let last = read(last);
            ctx.matched_route = Some(last.path().to_string());
            ctx.matched_route_name = last.name().map(str::to_string);
        }

        let mut chain: Vec<Stage> = Vec::new();
        for route in &matched.path_and_method {
            chain.push(Arc::new(ExtractParams {
                route: Arc::clone(route),
                path: path.clone(),
            }));
            chain.extend(read(route).stages());
        }
        debug!(
            request_id = %ctx.request_id,
            method = %ctx.request.method,
            path = %path,
            routes = matched.path_and_method.len(),
            "Dispatching request"
        );
        Next::new(&chain, Some(&next)).run(ctx)
    }
}

struct ExtractParams {
    route: SharedRoute,
    path: String,
}

impl Middleware for ExtractParams {
    fn call(&self, ctx: &mut Context, next: Next<'_>) -> HandlerResult {
        {
            let route = read(&self.route);
            route.params(&self.path, ctx)?;
            ctx.route_name = route.name().map(str::to_string);
        }
        next.run(ctx)
    }
}

struct DocumentEndpoint {
    state: Weak<RwLock<MapperState>>,
    validator: Validator,
}

impl Middleware for DocumentEndpoint {
    fn call(&self, ctx: &mut Context, next: Next<'_>) -> HandlerResult {
        let Some(state) = self.state.upgrade() else {
            return next.run(ctx);
        };
        let document = read(&state).document(&self.validator);
        ctx.set_body(document);
        Ok(())
    }
}
