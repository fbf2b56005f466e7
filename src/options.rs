//! # Options
//!
//! Explicit configuration structs for mappers and routes. Each field has one
//! named effect; documentation fields the mapper does not interpret are carried
//! through to the generated document untouched.
//!
//! [`ParamSpec`], [`BodySpec`] and [`DocFields`] deserialize from JSON/YAML so
//! route declarations can live in configuration files:
//!
//! ```yaml
//! params:
//!   id: { type: number, in: path }
//!   verbose: { type: boolean, default: false }
//! body: User
//! summary: Update a user
//! tags: [users]
//! ```

use crate::body::BodyParser;
use crate::error::{HandlerResult, HttpError, MapperResult};
use crate::openapi::DocumentMeta;
use crate::typeexpr::parse_type;
use crate::validator::{props_to_schema, ValidationIssue};
use http::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Where a parameter is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Path,
    #[default]
    Query,
    Header,
    Cookie,
}

impl ParamLocation {
    pub fn as_str(self) -> &'static str {
        match self {
            ParamLocation::Path => "path",
            ParamLocation::Query => "query",
            ParamLocation::Header => "header",
            ParamLocation::Cookie => "cookie",
        }
    }
}

impl fmt::Display for ParamLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameter-object fields; every other extra key is a schema keyword
const PARAM_FIELDS: [&str; 8] = [
    "description",
    "deprecated",
    "allowEmptyValue",
    "style",
    "explode",
    "allowReserved",
    "example",
    "examples",
];

/// Declaration of one route parameter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Type expression, e.g. `number` or `array<string>`
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_expr: Option<String>,
    #[serde(rename = "in", default, skip_serializing_if = "Option::is_none")]
    pub location: Option<ParamLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    /// Explicit schema; keywords from `type` and the extra fields are laid over it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    /// `description`, `explode`, `enum`, `default`, `items`, ...
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ParamSpec {
    pub fn new(type_expr: impl Into<String>) -> Self {
        Self {
            type_expr: Some(type_expr.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn location(mut self, location: ParamLocation) -> Self {
        self.location = Some(location);
        self
    }

    #[must_use]
    pub fn in_path(self) -> Self {
        self.location(ParamLocation::Path)
    }

    #[must_use]
    pub fn in_header(self) -> Self {
        self.location(ParamLocation::Header)
    }

    #[must_use]
    pub fn in_cookie(self) -> Self {
        self.location(ParamLocation::Cookie)
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = Some(true);
        self
    }

    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = Some(false);
        self
    }

    #[must_use]
    pub fn schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    #[must_use]
    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.extra.insert(key.to_string(), value);
        self
    }

    /// Schema of the parameter, `None` when nothing constrains it
    pub(crate) fn resolved_schema(&self) -> MapperResult<Option<Value>> {
        let mut schema = match &self.schema {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };
        if let Some(expr) = &self.type_expr {
            if let Value::Object(fragment) = parse_type(expr)? {
                schema.extend(fragment);
            }
        }
        for (key, value) in &self.extra {
            if !PARAM_FIELDS.contains(&key.as_str()) {
                schema.insert(key.clone(), value.clone());
            }
        }
        Ok((!schema.is_empty()).then_some(Value::Object(schema)))
    }

    /// Parameter-object fields to document (`description`, `explode`, ...)
    pub(crate) fn parameter_fields(&self) -> Map<String, Value> {
        self.extra
            .iter()
            .filter(|(k, _)| PARAM_FIELDS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Request body declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BodySpec {
    /// Name of a registered schema
    Named(String),
    /// Field declarations, same shape as schema properties
    Fields(Map<String, Value>),
}

impl BodySpec {
    pub(crate) fn to_schema(&self) -> MapperResult<Option<Value>> {
        match self {
            BodySpec::Named(name) => props_to_schema(&Value::String(name.clone()), &Map::new()),
            BodySpec::Fields(fields) => props_to_schema(&Value::Object(fields.clone()), &Map::new()),
        }
    }
}

impl From<&str> for BodySpec {
    fn from(name: &str) -> Self {
        BodySpec::Named(name.to_string())
    }
}

impl From<Value> for BodySpec {
    fn from(value: Value) -> Self {
        match value {
            Value::String(name) => BodySpec::Named(name),
            Value::Object(fields) => BodySpec::Fields(fields),
            _ => BodySpec::Fields(Map::new()),
        }
    }
}

/// Media type listed for a request body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BodyType {
    Json,
    Form,
    Multipart,
    Other(String),
}

impl BodyType {
    pub fn media_type(&self) -> &str {
        match self {
            BodyType::Json => "application/json",
            BodyType::Form => "application/x-www-form-urlencoded",
            BodyType::Multipart => "multipart/form-data",
            BodyType::Other(media) => media,
        }
    }

    pub(crate) fn defaults() -> Vec<BodyType> {
        vec![BodyType::Json, BodyType::Form]
    }
}

impl From<String> for BodyType {
    fn from(name: String) -> Self {
        match name.as_str() {
            "json" => BodyType::Json,
            "form" => BodyType::Form,
            "multipart" => BodyType::Multipart,
            _ => BodyType::Other(name),
        }
    }
}

impl From<BodyType> for String {
    fn from(body_type: BodyType) -> Self {
        match body_type {
            BodyType::Json => "json".to_string(),
            BodyType::Form => "form".to_string(),
            BodyType::Multipart => "multipart".to_string(),
            BodyType::Other(media) => media,
        }
    }
}

/// Documentation fields of a route
///
/// All of them are copied onto each operation; a route without verbs only
/// contributes `summary` and `description` to its path item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_docs: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responses: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callbacks: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub servers: Option<Value>,
    /// Anything else (`operationId`, `x-*` extensions, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DocFields {
    pub(crate) fn operation_fields(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    pub(crate) fn path_fields(&self) -> Map<String, Value> {
        let mut map = Map::new();
        if let Some(summary) = &self.summary {
            map.insert("summary".to_string(), Value::String(summary.clone()));
        }
        if let Some(description) = &self.description {
            map.insert("description".to_string(), Value::String(description.clone()));
        }
        map
    }
}

/// What happens when parameter or body validation fails
#[derive(Clone, Default)]
pub enum ValidationPolicy {
    /// Fail the request with a 400 listing every issue
    #[default]
    Raise,
    /// Record the issues on the context and carry on
    Ignore,
    /// Let the callback decide; `Ok` continues the chain
    Custom(Arc<dyn Fn(&[ValidationIssue]) -> HandlerResult + Send + Sync>),
}

impl ValidationPolicy {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&[ValidationIssue]) -> HandlerResult + Send + Sync + 'static,
    {
        ValidationPolicy::Custom(Arc::new(f))
    }

    pub(crate) fn apply(&self, issues: &[ValidationIssue]) -> HandlerResult {
        match self {
            ValidationPolicy::Raise => Err(HttpError::validation(issues)),
            ValidationPolicy::Ignore => Ok(()),
            ValidationPolicy::Custom(f) => f(issues),
        }
    }
}

impl fmt::Debug for ValidationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationPolicy::Raise => f.write_str("Raise"),
            ValidationPolicy::Ignore => f.write_str("Ignore"),
            ValidationPolicy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Per-route options
#[derive(Clone, Default)]
pub struct RouteOptions {
    pub name: Option<String>,
    /// Parameter declarations in declaration order
    pub params: Vec<(String, ParamSpec)>,
    pub body: Option<BodySpec>,
    /// Media types documented for the body; empty means json and form
    pub body_type: Vec<BodyType>,
    pub body_parser: Option<Arc<dyn BodyParser>>,
    pub strict: Option<bool>,
    pub sensitive: Option<bool>,
    /// `false` lets the pattern match any path it is a prefix of
    pub end: Option<bool>,
    /// Skip parameter extraction and documentation
    pub ignore_params: bool,
    pub params_error: Option<ValidationPolicy>,
    pub body_error: Option<ValidationPolicy>,
    pub doc: DocFields,
}

impl fmt::Debug for RouteOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteOptions")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("body", &self.body)
            .field("body_type", &self.body_type)
            .field("body_parser", &self.body_parser.is_some())
            .field("strict", &self.strict)
            .field("sensitive", &self.sensitive)
            .field("end", &self.end)
            .field("ignore_params", &self.ignore_params)
            .field("params_error", &self.params_error)
            .field("body_error", &self.body_error)
            .field("doc", &self.doc)
            .finish()
    }
}

impl RouteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn param(mut self, name: impl Into<String>, spec: ParamSpec) -> Self {
        self.params.push((name.into(), spec));
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<BodySpec>) -> Self {
        self.body = Some(body.into());
        self
    }

    #[must_use]
    pub fn body_type(mut self, body_type: BodyType) -> Self {
        self.body_type.push(body_type);
        self
    }

    #[must_use]
    pub fn body_parser(mut self, parser: Arc<dyn BodyParser>) -> Self {
        self.body_parser = Some(parser);
        self
    }

    #[must_use]
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = Some(strict);
        self
    }

    #[must_use]
    pub fn sensitive(mut self, sensitive: bool) -> Self {
        self.sensitive = Some(sensitive);
        self
    }

    #[must_use]
    pub fn end(mut self, end: bool) -> Self {
        self.end = Some(end);
        self
    }

    #[must_use]
    pub fn ignore_params(mut self) -> Self {
        self.ignore_params = true;
        self
    }

    #[must_use]
    pub fn params_error(mut self, policy: ValidationPolicy) -> Self {
        self.params_error = Some(policy);
        self
    }

    #[must_use]
    pub fn body_error(mut self, policy: ValidationPolicy) -> Self {
        self.body_error = Some(policy);
        self
    }

    #[must_use]
    pub fn doc(mut self, doc: DocFields) -> Self {
        self.doc = doc;
        self
    }

    #[must_use]
    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.doc.summary = Some(summary.into());
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.doc.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.doc.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn responses(mut self, responses: Value) -> Self {
        self.doc.responses = Some(responses);
        self
    }

    /// Options from a JSON/YAML-shaped declaration
    ///
    /// Recognizes `name`, `params`, `body`, `bodyType`, `strict`, `sensitive`,
    /// `end`, `ignoreParams`; every other key is a documentation field.
    pub fn from_value(value: &Value) -> MapperResult<Self> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Declared {
            name: Option<String>,
            #[serde(default)]
            params: Map<String, Value>,
            body: Option<BodySpec>,
            #[serde(default)]
            body_type: Vec<BodyType>,
            strict: Option<bool>,
            sensitive: Option<bool>,
            end: Option<bool>,
            #[serde(default)]
            ignore_params: bool,
            #[serde(flatten)]
            doc: DocFields,
        }

        let invalid = |e: serde_json::Error| crate::error::MapperError::InvalidSchema(e.to_string());
        let declared: Declared = serde_json::from_value(value.clone()).map_err(invalid)?;
        let mut params = Vec::with_capacity(declared.params.len());
        for (name, spec) in declared.params {
            let spec = match spec {
                Value::String(expr) => ParamSpec::new(expr),
                other => serde_json::from_value(other).map_err(invalid)?,
            };
            params.push((name, spec));
        }
        Ok(Self {
            name: declared.name,
            params,
            body: declared.body,
            body_type: declared.body_type,
            strict: declared.strict,
            sensitive: declared.sensitive,
            end: declared.end,
            ignore_params: declared.ignore_params,
            doc: declared.doc,
            ..Self::default()
        })
    }
}

/// Mapper-wide options
#[derive(Clone)]
pub struct MapperOptions {
    pub prefix: String,
    /// Verbs the mapper implements; anything else answers 501
    pub methods: Vec<Method>,
    pub strict: bool,
    pub sensitive: bool,
    /// Where the generated document is served; `None` disables the endpoint
    pub openapi_url: Option<String>,
    pub schema_cache: bool,
    pub document: DocumentMeta,
    /// Default decoder for routes that declare a body
    pub body_parser: Option<Arc<dyn BodyParser>>,
    pub params_error: Option<ValidationPolicy>,
    /// Fixed path to match instead of the request path
    pub mapper_path: Option<String>,
}

impl Default for MapperOptions {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            methods: default_methods(),
            strict: false,
            sensitive: false,
            openapi_url: Some("/openapi.json".to_string()),
            schema_cache: true,
            document: DocumentMeta::default(),
            body_parser: None,
            params_error: None,
            mapper_path: None,
        }
    }
}

impl fmt::Debug for MapperOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapperOptions")
            .field("prefix", &self.prefix)
            .field("methods", &self.methods)
            .field("strict", &self.strict)
            .field("sensitive", &self.sensitive)
            .field("openapi_url", &self.openapi_url)
            .field("schema_cache", &self.schema_cache)
            .field("document", &self.document)
            .field("body_parser", &self.body_parser.is_some())
            .field("params_error", &self.params_error)
            .field("mapper_path", &self.mapper_path)
            .finish()
    }
}

impl MapperOptions {
    /// Options without the document endpoint
    pub fn without_openapi() -> Self {
        Self {
            openapi_url: None,
            ..Self::default()
        }
    }
}

/// `HEAD, OPTIONS, GET, PUT, PATCH, POST, DELETE`
pub fn default_methods() -> Vec<Method> {
    vec![
        Method::HEAD,
        Method::OPTIONS,
        Method::GET,
        Method::PUT,
        Method::PATCH,
        Method::POST,
        Method::DELETE,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_param_spec_splits_schema_and_parameter_fields() {
        let spec: ParamSpec = serde_json::from_value(json!({
            "type": "number",
            "in": "query",
            "required": true,
            "description": "page number",
            "explode": false,
            "default": 1,
            "minimum": 1
        }))
        .unwrap();
        assert_eq!(spec.location, Some(ParamLocation::Query));
        assert_eq!(
            spec.resolved_schema().unwrap(),
            Some(json!({"type": "number", "default": 1, "minimum": 1}))
        );
        assert_eq!(
            Value::Object(spec.parameter_fields()),
            json!({"description": "page number", "explode": false})
        );
    }

    #[test]
    fn test_param_spec_without_constraints_has_no_schema() {
        let spec = ParamSpec::default().in_header().with("description", json!("token"));
        assert_eq!(spec.resolved_schema().unwrap(), None);
    }

    #[test]
    fn test_body_type_names() {
        assert_eq!(BodyType::from("json".to_string()).media_type(), "application/json");
        assert_eq!(
            BodyType::from("text/plain".to_string()).media_type(),
            "text/plain"
        );
    }

    #[test]
    fn test_route_options_from_value() {
        let options = RouteOptions::from_value(&json!({
            "name": "user",
            "params": {"id": {"type": "number", "in": "path"}, "q": "string"},
            "body": "User",
            "bodyType": ["json", "multipart"],
            "summary": "Update a user",
            "operationId": "updateUser"
        }))
        .unwrap();
        assert_eq!(options.name.as_deref(), Some("user"));
        assert_eq!(options.params.len(), 2);
        assert_eq!(options.params[1].1, ParamSpec::new("string"));
        assert_eq!(options.body, Some(BodySpec::Named("User".into())));
        assert_eq!(options.body_type, vec![BodyType::Json, BodyType::Multipart]);
        assert_eq!(options.doc.summary.as_deref(), Some("Update a user"));
        assert_eq!(options.doc.extra.get("operationId"), Some(&json!("updateUser")));
    }

    #[test]
    fn test_operation_fields_pass_extras_through() {
        let doc = DocFields {
            summary: Some("s".into()),
            tags: Some(vec!["t".into()]),
            ..DocFields::default()
        };
        let mut doc = doc;
        doc.extra.insert("x-internal".into(), json!(true));
        assert_eq!(
            Value::Object(doc.operation_fields()),
            json!({"summary": "s", "tags": ["t"], "x-internal": true})
        );
        assert_eq!(Value::Object(doc.path_fields()), json!({"summary": "s"}));
    }
}
