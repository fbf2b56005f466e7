//! # Routes
//!
//! A [`Route`] is one registration: a path template, the verbs it answers (none
//! for pass-through middleware registered with `use`), its ordered stage list and
//! its parameter declarations.
//!
//! ## Stage order
//!
//! The stage list is assembled as:
//!
//! 1. parameter handlers, each placed before the first stage that is not a
//!    parameter handler or that handles a parameter declared later in the path
//! 2. the body parser, when the route decodes a body
//! 3. body validation, when the route declares a body schema
//! 4. the user middleware
//!
//! Parameter handlers are inserted ahead of the body stages, so they run
//! before the body is decoded.
//!
//! ## Parameters
//!
//! Every key of the template is a `path` parameter with a placeholder
//! `{ "type": "string" }` schema. Declarations in [`RouteOptions::params`] with
//! the same name refine it; other declarations add query, header or cookie
//! parameters. At request time [`Route::params`] reads all of them into
//! `ctx.params`, coerces and validates the object and applies the route's
//! validation policy.

use super::pattern::{decode_captures, PathPattern, PatternOptions};
use crate::body::{BodyParserStage, DefaultBodyParser};
use crate::context::{Context, MatchedLayer};
use crate::error::{HandlerResult, HttpError, MapperError, MapperResult};
use crate::ids::RouteId;
use crate::middleware::{Middleware, Next, Stage};
use crate::options::{BodyType, ParamLocation, RouteOptions, ValidationPolicy};
use crate::query::to_uri;
use crate::validator::{LazyValidator, Validator};
use http::Method;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::debug;

/// Handler invoked with the value of one named parameter
///
/// Handlers run after parameter extraction and before the user middleware. Like
/// any stage they call `next.run(ctx)` to continue.
pub trait ParamHandler: Send + Sync {
    fn handle(&self, value: Value, ctx: &mut Context, next: Next<'_>) -> HandlerResult;
}

impl<F> ParamHandler for F
where
    F: Fn(Value, &mut Context, Next<'_>) -> HandlerResult + Send + Sync,
{
    fn handle(&self, value: Value, ctx: &mut Context, next: Next<'_>) -> HandlerResult {
        self(value, ctx, next)
    }
}

pub type SharedParamHandler = Arc<dyn ParamHandler>;

/// One documented and extracted parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub location: ParamLocation,
    pub required: bool,
    pub schema: Option<Value>,
    /// Parameter-object fields (`description`, `style`, ...)
    pub fields: Map<String, Value>,
}

impl Parameter {
    /// OpenAPI parameter object
    pub fn to_document(&self) -> Value {
        let mut doc = Map::new();
        doc.insert("name".to_string(), Value::String(self.name.clone()));
        doc.insert("in".to_string(), Value::String(self.location.to_string()));
        if self.required || self.location == ParamLocation::Path {
            doc.insert("required".to_string(), Value::Bool(self.required));
        }
        if let Some(schema) = &self.schema {
            doc.insert("schema".to_string(), schema.clone());
        }
        doc.extend(self.fields.clone());
        Value::Object(doc)
    }
}

struct TaggedStage {
    /// Parameter name for parameter handlers
    param: Option<String>,
    stage: Stage,
}

struct ParamStage {
    name: String,
    handler: SharedParamHandler,
}

impl Middleware for ParamStage {
    fn call(&self, ctx: &mut Context, next: Next<'_>) -> HandlerResult {
        let value = ctx.params.get(&self.name).cloned().unwrap_or(Value::Null);
        self.handler.handle(value, ctx, next)
    }
}

struct BodyValidationStage {
    schema: Value,
    validator: Validator,
    compiled: LazyValidator,
    policy: ValidationPolicy,
}

impl Middleware for BodyValidationStage {
    fn call(&self, ctx: &mut Context, next: Next<'_>) -> HandlerResult {
        let compiled = self
            .compiled
            .get(&self.validator, &self.schema)
            .map_err(HttpError::from)?;
        let mut body = ctx
            .request
            .body
            .take()
            .unwrap_or_else(|| Value::Object(Map::new()));
        let outcome = compiled.validate(&mut body);
        ctx.request.body = Some(body);
        match outcome {
            Ok(()) => ctx.body_errors = None,
            Err(issues) => {
                debug!(
                    request_id = %ctx.request_id,
                    issues = issues.len(),
                    "Body validation failed"
                );
                ctx.body_errors = Some(issues.clone());
                self.policy.apply(&issues)?;
            }
        }
        next.run(ctx)
    }
}

/// Everything a route needs from the mapper that registers it
pub(crate) struct RouteInit {
    pub id: RouteId,
    pub path: String,
    pub methods: Vec<Method>,
    pub middleware: Vec<Stage>,
    pub options: RouteOptions,
    pub prefix: String,
    pub validator: Validator,
    pub pattern: PatternOptions,
    pub params_error: ValidationPolicy,
}

/// A registered route
pub struct Route {
    id: RouteId,
    path: String,
    pattern: PathPattern,
    pattern_options: PatternOptions,
    methods: Vec<Method>,
    /// Verbs as declared, used for documentation
    operations: Vec<Method>,
    stack: Vec<TaggedStage>,
    parameters: Vec<Parameter>,
    params_schema: Option<Value>,
    params_compiled: LazyValidator,
    params_error: ValidationPolicy,
    body_schema: Option<Value>,
    validator: Validator,
    options: RouteOptions,
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("methods", &self.methods)
            .field("name", &self.options.name)
            .field("stack", &self.stack.len())
            .field("parameters", &self.parameters)
            .finish()
    }
}

impl Route {
    /// Build a route and compile its (prefixed) template
    ///
    /// # Errors
    ///
    /// - [`MapperError::MissingMiddleware`] when verbs are given without middleware
    /// - [`MapperError::InvalidPattern`] when the template does not compile
    /// - parameter declaration errors from [`Route::set_parameters`]
    /// - type expression errors from the body or parameter declarations
    pub(crate) fn new(init: RouteInit) -> MapperResult<Self> {
        let RouteInit {
            id,
            path,
            methods,
            middleware,
            options,
            prefix,
            validator,
            pattern,
            params_error,
        } = init;

        if middleware.is_empty() {
            return Err(MapperError::MissingMiddleware {
                methods: methods
                    .iter()
                    .map(Method::as_str)
                    .collect::<Vec<_>>()
                    .join(","),
                route: options.name.clone().unwrap_or(path),
            });
        }

        let mut all_methods: Vec<Method> = Vec::with_capacity(methods.len() + 1);
        for method in &methods {
            if !all_methods.contains(method) {
                all_methods.push(method.clone());
            }
        }
        if all_methods.contains(&Method::GET) && !all_methods.contains(&Method::HEAD) {
            all_methods.insert(0, Method::HEAD);
        }

        let mut stack: Vec<TaggedStage> = Vec::new();
        let body_schema = match &options.body {
            Some(body) => body.to_schema()?,
            None => None,
        };
        if options.body_parser.is_some() || body_schema.is_some() {
            let parser = options
                .body_parser
                .clone()
                .unwrap_or_else(|| Arc::new(DefaultBodyParser::default()));
            stack.push(TaggedStage {
                param: None,
                stage: Arc::new(BodyParserStage { parser }),
            });
        }
        if let Some(schema) = &body_schema {
            stack.push(TaggedStage {
                param: None,
                stage: Arc::new(BodyValidationStage {
                    schema: schema.clone(),
                    validator: validator.clone(),
                    compiled: LazyValidator::default(),
                    policy: options.body_error.clone().unwrap_or_default(),
                }),
            });
        }
        stack.extend(middleware.into_iter().map(|stage| TaggedStage { param: None, stage }));

        let compiled = PathPattern::compile(&path, pattern)?;
        let mut route = Self {
            id,
            path,
            pattern: compiled,
            pattern_options: pattern,
            methods: all_methods,
            operations: methods,
            stack,
            parameters: Vec::new(),
            params_schema: None,
            params_compiled: LazyValidator::default(),
            params_error: options.params_error.clone().unwrap_or(params_error),
            body_schema,
            validator,
            options,
        };
        route.set_prefix(&prefix)?;
        debug!(
            route_id = %route.id,
            methods = ?route.methods,
            path = %route.path,
            "Route defined"
        );
        Ok(route)
    }

    pub fn id(&self) -> RouteId {
        self.id
    }

    /// Full (prefixed) path template
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn name(&self) -> Option<&str> {
        self.options.name.as_deref()
    }

    /// Verbs the route answers, with `HEAD` ahead of `GET`
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn body_schema(&self) -> Option<&Value> {
        self.body_schema.as_ref()
    }

    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    pub fn match_path(&self, path: &str) -> bool {
        self.pattern.is_match(path)
    }

    pub(crate) fn matched_layer(&self) -> MatchedLayer {
        MatchedLayer {
            id: self.id,
            path: self.path.clone(),
            name: self.options.name.clone(),
            methods: self.methods.clone(),
        }
    }

    /// Stages to run after parameter extraction
    pub(crate) fn stages(&self) -> Vec<Stage> {
        self.stack.iter().map(|s| Arc::clone(&s.stage)).collect()
    }

    /// Prepend `prefix` to the template and recompile
    ///
    /// Prefixing is cumulative: a route mounted under `/users` and then under a
    /// mapper prefix `/api` ends up at `/api/users/...`.
    pub fn set_prefix(&mut self, prefix: &str) -> MapperResult<()> {
        if !prefix.is_empty() {
            self.path = format!("{prefix}{}", self.path);
        }
        if !self.pattern_options.strict && self.path.len() > 1 && self.path.ends_with('/') {
            self.path.pop();
        }
        self.pattern = PathPattern::compile(&self.path, self.pattern_options)?;
        self.set_parameters()
    }

    /// Rebuild the parameter list from the template keys and the declarations
    ///
    /// # Errors
    ///
    /// - [`MapperError::PathParamLocation`] when a template key is declared in
    ///   another location
    /// - [`MapperError::OptionalPathParam`] when a mandatory template key is
    ///   declared optional
    /// - [`MapperError::NotAPathParam`] when `in: path` names no template key
    pub fn set_parameters(&mut self) -> MapperResult<()> {
        let keys = self.pattern.keys();
        let mut parameters: Vec<Parameter> = keys
            .iter()
            .map(|key| Parameter {
                name: key.name.clone(),
                location: ParamLocation::Path,
                required: !key.optional,
                schema: Some(json!({"type": "string"})),
                fields: Map::new(),
            })
            .collect();

        for (name, spec) in &self.options.params {
            let schema = spec.resolved_schema()?;
            match keys.iter().position(|key| &key.name == name) {
                Some(index) => {
                    if spec.location.is_some_and(|l| l != ParamLocation::Path) {
                        return Err(MapperError::PathParamLocation(name.clone()));
                    }
                    if spec.required == Some(false) && !keys[index].optional {
                        return Err(MapperError::OptionalPathParam(name.clone()));
                    }
                    let parameter = &mut parameters[index];
                    if schema.is_some() {
                        parameter.schema = schema;
                    }
                    parameter.fields.extend(spec.parameter_fields());
                }
                None => {
                    if spec.location == Some(ParamLocation::Path) {
                        return Err(MapperError::NotAPathParam {
                            name: name.clone(),
                            path: self.path.clone(),
                        });
                    }
                    parameters.push(Parameter {
                        name: name.clone(),
                        location: spec.location.unwrap_or_default(),
                        required: spec.required.unwrap_or(false),
                        schema,
                        fields: spec.parameter_fields(),
                    });
                }
            }
        }

        self.params_schema = params_schema(&parameters);
        self.params_compiled.reset();
        self.parameters = parameters;
        Ok(())
    }

    /// Extract, coerce and validate this route's parameters into `ctx.params`
    ///
    /// Path captures are decoded only once per request: the first matched route
    /// whose template has keys stores them, and routes matched later see those
    /// values. Routes without keys leave the flag alone.
    ///
    /// # Errors
    ///
    /// Whatever the validation policy returns for invalid parameters, or a 500
    /// when the parameter schema cannot be compiled.
    pub fn params(&self, path: &str, ctx: &mut Context) -> HandlerResult {
        if self.options.ignore_params {
            return Ok(());
        }

        for parameter in &self.parameters {
            let value = match parameter.location {
                ParamLocation::Header => ctx.request.header(&parameter.name).map(str::to_string),
                ParamLocation::Cookie => ctx.request.cookie(&parameter.name),
                ParamLocation::Query | ParamLocation::Path => continue,
            };
            if let Some(value) = value {
                ctx.params.insert(parameter.name.clone(), Value::String(value));
            }
        }

        if self
            .parameters
            .iter()
            .any(|p| p.location == ParamLocation::Query)
        {
            let query = ctx.query();
            for parameter in &self.parameters {
                if parameter.location != ParamLocation::Query {
                    continue;
                }
                if let Some(value) = query.get(&parameter.name) {
                    ctx.params.insert(parameter.name.clone(), value.clone());
                }
            }
        }

        if !ctx.path_parsed() && !self.pattern.keys().is_empty() {
            if let Some(captures) = self.pattern.exec(path) {
                for (name, value) in decode_captures(&captures) {
                    if let Some(value) = value {
                        ctx.params
                            .insert(name.to_string(), Value::String(value.into_owned()));
                    }
                }
            }
            ctx.mark_path_parsed();
        }

        let Some(schema) = &self.params_schema else {
            return Ok(());
        };
        let compiled = self
            .params_compiled
            .get(&self.validator, schema)
            .map_err(HttpError::from)?;
        let mut params = Value::Object(std::mem::take(&mut ctx.params));
        let outcome = compiled.validate(&mut params);
        if let Value::Object(params) = params {
            ctx.params = params;
        }
        match outcome {
            Ok(()) => {
                ctx.params_errors = None;
                Ok(())
            }
            Err(issues) => {
                debug!(
                    request_id = %ctx.request_id,
                    route = %self.path,
                    issues = issues.len(),
                    "Parameter validation failed"
                );
                ctx.params_errors = Some(issues.clone());
                self.params_error.apply(&issues)
            }
        }
    }

    /// Attach a handler for parameter `name`
    ///
    /// Routes without such a parameter ignore the call.
    pub fn param(&mut self, name: &str, handler: SharedParamHandler) {
        let names: Vec<&str> = self.parameters.iter().map(|p| p.name.as_str()).collect();
        let Some(index) = names.iter().position(|n| *n == name) else {
            return;
        };
        let at = self.stack.iter().position(|tagged| match &tagged.param {
            None => true,
            Some(other) => names
                .iter()
                .position(|n| n == other)
                .is_some_and(|other_index| other_index > index),
        });
        let tagged = TaggedStage {
            param: Some(name.to_string()),
            stage: Arc::new(ParamStage {
                name: name.to_string(),
                handler,
            }),
        };
        match at {
            Some(at) => self.stack.insert(at, tagged),
            None => self.stack.push(tagged),
        }
    }

    /// Compile the parameter and body schemas ahead of the first request;
    /// returns how many were compiled
    pub fn precompile(&self) -> MapperResult<usize> {
        let mut compiled = 0;
        if let Some(schema) = &self.params_schema {
            self.params_compiled.get(&self.validator, schema)?;
            compiled += 1;
        }
        if let Some(schema) = &self.body_schema {
            self.validator.compile(schema)?;
            compiled += 1;
        }
        Ok(compiled)
    }

    /// Documentation path and path item for this route
    ///
    /// Routes that skip parameter handling are not documented.
    pub fn get_path_item(&self) -> Option<(String, Value)> {
        if self.options.ignore_params {
            return None;
        }
        let parameters: Vec<Value> = self.parameters.iter().map(Parameter::to_document).collect();

        let mut item = Map::new();
        if self.operations.is_empty() {
            item = self.options.doc.path_fields();
            if !parameters.is_empty() {
                item.insert("parameters".to_string(), Value::Array(parameters));
            }
        } else {
            let mut operation = self.options.doc.operation_fields();
            if !parameters.is_empty() {
                operation.insert("parameters".to_string(), Value::Array(parameters));
            }
            if let Some(schema) = &self.body_schema {
                let body_types = if self.options.body_type.is_empty() {
                    BodyType::defaults()
                } else {
                    self.options.body_type.clone()
                };
                let content: Map<String, Value> = body_types
                    .iter()
                    .map(|t| (t.media_type().to_string(), json!({ "schema": schema })))
                    .collect();
                operation.insert("requestBody".to_string(), json!({ "content": content }));
            }
            for method in &self.operations {
                item.insert(
                    method.as_str().to_ascii_lowercase(),
                    Value::Object(operation.clone()),
                );
            }
        }
        Some((self.pattern.doc_path(), Value::Object(item)))
    }

    /// Build a URL from this route's template
    ///
    /// # Errors
    ///
    /// See [`PathPattern::url`].
    pub fn url(&self, params: &Value, query: &Value) -> MapperResult<String> {
        let base = self.pattern.url(params)?;
        Ok(to_uri(&base, query))
    }
}

fn params_schema(parameters: &[Parameter]) -> Option<Value> {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for parameter in parameters {
        let Some(schema) = &parameter.schema else {
            continue;
        };
        properties.insert(parameter.name.clone(), schema.clone());
        if parameter.required {
            required.push(Value::String(parameter.name.clone()));
        }
    }
    if properties.is_empty() {
        return None;
    }
    Some(json!({
        "type": "object",
        "properties": properties,
        "required": required,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Request;
    use crate::ids::RouteIdSequence;
    use crate::middleware::{run_chain, stage};
    use crate::options::ParamSpec;

    fn route(path: &str, methods: Vec<Method>, options: RouteOptions) -> MapperResult<Route> {
        Route::new(RouteInit {
            id: RouteIdSequence::new().next_id(),
            path: path.to_string(),
            methods,
            middleware: vec![stage(|ctx: &mut Context, _next: Next<'_>| {
                ctx.set_body(json!("ok"));
                Ok(())
            })],
            options,
            prefix: String::new(),
            validator: Validator::new(),
            pattern: PatternOptions::default(),
            params_error: ValidationPolicy::Raise,
        })
    }

    #[test]
    fn test_get_adds_head() {
        let r = route("/users", vec![Method::GET], RouteOptions::new()).unwrap();
        assert_eq!(r.methods(), &[Method::HEAD, Method::GET]);
    }

    #[test]
    fn test_missing_middleware() {
        let err = Route::new(RouteInit {
            id: RouteIdSequence::new().next_id(),
            path: "/foo".to_string(),
            methods: vec![Method::GET],
            middleware: Vec::new(),
            options: RouteOptions::new(),
            prefix: String::new(),
            validator: Validator::new(),
            pattern: PatternOptions::default(),
            params_error: ValidationPolicy::Raise,
        })
        .unwrap_err();
        assert_eq!(err.to_string(), "GET /foo: middleware must be a function");
    }

    #[test]
    fn test_path_keys_become_parameters() {
        let r = route(
            "/users/:id",
            vec![Method::GET],
            RouteOptions::new()
                .param("id", ParamSpec::new("number"))
                .param("verbose", ParamSpec::new("boolean")),
        )
        .unwrap();
        let params = r.parameters();
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].location, ParamLocation::Path);
        assert!(params[0].required);
        assert_eq!(params[0].schema, Some(json!({"type": "number"})));
        assert_eq!(params[1].location, ParamLocation::Query);
    }

    #[test]
    fn test_parameter_declaration_errors() {
        let err = route(
            "/users/:id",
            vec![Method::GET],
            RouteOptions::new().param("id", ParamSpec::new("number").in_header()),
        )
        .unwrap_err();
        assert_eq!(err, MapperError::PathParamLocation("id".to_string()));

        let err = route(
            "/users",
            vec![Method::GET],
            RouteOptions::new().param("id", ParamSpec::new("number").in_path()),
        )
        .unwrap_err();
        assert!(matches!(err, MapperError::NotAPathParam { .. }));

        let err = route(
            "/users/:id",
            vec![Method::GET],
            RouteOptions::new().param("id", ParamSpec::new("number").optional()),
        )
        .unwrap_err();
        assert_eq!(err, MapperError::OptionalPathParam("id".to_string()));
    }

    #[test]
    fn test_params_coerces_path_and_query() {
        let r = route(
            "/users/:id",
            vec![Method::GET],
            RouteOptions::new()
                .param("id", ParamSpec::new("number"))
                .param("tags", ParamSpec::new("array<string>")),
        )
        .unwrap();
        let mut ctx = Context::new(Request::new(Method::GET, "/users/123?tags=a"));
        r.params("/users/123", &mut ctx).unwrap();
        assert_eq!(ctx.params["id"], json!(123));
        assert_eq!(ctx.params["tags"], json!(["a"]));
        assert!(ctx.params_errors.is_none());
    }

    #[test]
    fn test_params_reports_field_errors() {
        let r = route(
            "/users/:id",
            vec![Method::GET],
            RouteOptions::new().param("id", ParamSpec::new("number")),
        )
        .unwrap();
        let mut ctx = Context::new(Request::new(Method::GET, "/users/abc"));
        let err = r.params("/users/abc", &mut ctx).unwrap_err();
        assert_eq!(err.status, http::StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "[id] should be number");
        assert_eq!(ctx.params_errors.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn test_param_handlers_are_ordered_by_path_position() {
        let mut r = route("/:a/:b", vec![Method::GET], RouteOptions::new()).unwrap();
        let record = |label: &'static str| -> SharedParamHandler {
            Arc::new(move |value: Value, ctx: &mut Context, next: Next<'_>| {
                let entry = format!("{label}={}", value.as_str().unwrap_or_default());
                if let Some(items) = ctx.state.entry("log").or_insert_with(|| json!([])).as_array_mut() {
                    items.push(json!(entry));
                }
                next.run(ctx)
            })
        };
        r.param("b", record("b"));
        r.param("a", record("a"));
        r.param("missing", record("missing"));

        let mut ctx = Context::new(Request::new(Method::GET, "/x/y"));
        r.params("/x/y", &mut ctx).unwrap();
        run_chain(&r.stages(), &mut ctx).unwrap();
        assert_eq!(ctx.state["log"], json!(["a=x", "b=y"]));
        assert_eq!(ctx.response.body, Some(json!("ok")));
    }

    #[test]
    fn test_path_item_for_operation() {
        let r = route(
            "/users/:id",
            vec![Method::PUT],
            RouteOptions::new()
                .summary("Update")
                .param("id", ParamSpec::new("number"))
                .body(json!({"name": {"type": "string", "required": true}})),
        )
        .unwrap();
        let (path, item) = r.get_path_item().unwrap();
        assert_eq!(path, "/users/{id}");
        assert_eq!(item["put"]["summary"], "Update");
        assert_eq!(
            item["put"]["parameters"],
            json!([{"name": "id", "in": "path", "required": true, "schema": {"type": "number"}}])
        );
        assert_eq!(
            item["put"]["requestBody"]["content"]["application/json"]["schema"]["required"],
            json!(["name"])
        );
        assert!(item["put"]["requestBody"]["content"]
            .get("application/x-www-form-urlencoded")
            .is_some());
    }

    #[test]
    fn test_prefix_is_cumulative() {
        let mut r = route("/:id", vec![Method::GET], RouteOptions::new()).unwrap();
        r.set_prefix("/users").unwrap();
        r.set_prefix("/api").unwrap();
        assert_eq!(r.path(), "/api/users/:id");
        assert!(r.match_path("/api/users/7"));
        assert_eq!(r.url(&json!({"id": 7}), &json!({"q": "x"})).unwrap(), "/api/users/7?q=x");
    }
}
