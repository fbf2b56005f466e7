use super::coerce::coerce;
use super::keywords;
use super::messages::issue_from_error;
use super::resolve::{strip_mapper_formats, Resolver};
use super::ValidationIssue;
use crate::error::{MapperError, MapperResult};
use crate::typeexpr::{parse_declared_name, parse_type, schema_ref, Inheritance};
use crate::validator_cache::ValidatorCache;
use arc_swap::ArcSwap;
use jsonschema::{Draft, JSONSchema};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Named value transform referenced by `"convert": "<name>"`
pub type Converter = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// One field declaration inside a property map
///
/// `type` is a type expression; every other key is copied into the property
/// schema verbatim and wins over what the expression produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropSpec {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_expr: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
    #[serde(flatten)]
    pub keywords: Map<String, Value>,
}

impl PropSpec {
    pub fn new(type_expr: impl Into<String>) -> Self {
        Self {
            type_expr: Some(type_expr.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn with(mut self, keyword: &str, value: Value) -> Self {
        self.keywords.insert(keyword.to_string(), value);
        self
    }

    /// Accepts the object form or a bare type expression string
    pub fn from_value(value: &Value) -> MapperResult<Self> {
        match value {
            Value::String(expr) => Ok(Self::new(expr.clone())),
            other => serde_json::from_value(other.clone())
                .map_err(|e| MapperError::InvalidSchema(e.to_string())),
        }
    }

    /// Property schema: the parsed type fragment overlaid with the extra keywords
    pub fn to_schema(&self) -> MapperResult<Value> {
        let mut schema = match parse_type(self.type_expr.as_deref().unwrap_or_default())? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        for (k, v) in &self.keywords {
            schema.insert(k.clone(), v.clone());
        }
        Ok(Value::Object(schema))
    }
}

/// Synthesize an object schema from a property map
///
/// A string names a registered schema and becomes a `$ref`. An object maps field
/// names to [`PropSpec`] declarations. Anything else (or an empty object) yields
/// `None`. `options.required` seeds the required list.
pub fn props_to_schema(props: &Value, options: &Map<String, Value>) -> MapperResult<Option<Value>> {
    let fields = match props {
        Value::String(name) if !name.trim().is_empty() => {
            return Ok(Some(schema_ref(name.trim())))
        }
        Value::Object(fields) if !fields.is_empty() => fields,
        _ => return Ok(None),
    };

    let mut required: Vec<Value> = options
        .get("required")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let mut properties = Map::new();
    for (field, declaration) in fields {
        let spec = PropSpec::from_value(declaration)?;
        properties.insert(field.clone(), spec.to_schema()?);
        let name = Value::String(field.clone());
        if spec.required && !required.contains(&name) {
            required.push(name);
        }
    }
    Ok(Some(json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })))
}

/// A schema compiled against one snapshot of the registry
pub struct CompiledSchema {
    schema: Value,
    root: Value,
    engine: JSONSchema,
    schemas: Arc<Map<String, Value>>,
    converters: Arc<HashMap<String, Converter>>,
    version: u64,
}

impl CompiledSchema {
    fn build(
        schema: &Value,
        schemas: Arc<Map<String, Value>>,
        converters: Arc<HashMap<String, Converter>>,
        version: u64,
    ) -> MapperResult<Self> {
        Resolver::new(&schemas).check(schema)?;

        let registry = Value::Object((*schemas).clone());
        let root = json!({
            "allOf": [strip_mapper_formats(schema)],
            "components": { "schemas": strip_mapper_formats(&registry) },
        });
        let engine = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&root)
            .map_err(|e| MapperError::InvalidSchema(e.to_string()))?;

        Ok(Self {
            schema: schema.clone(),
            root,
            engine,
            schemas,
            converters,
            version,
        })
    }

    /// Coerce, validate and convert `value` in place
    ///
    /// # Errors
    ///
    /// Every violation found, in schema-engine order followed by the mapper
    /// keyword checks. Converters are not applied when this fails.
    pub fn validate(&self, value: &mut Value) -> Result<(), Vec<ValidationIssue>> {
        let resolver = Resolver::new(&self.schemas);
        coerce(&resolver, &self.schema, value);

        let mut issues: Vec<ValidationIssue> = match self.engine.validate(value) {
            Ok(()) => Vec::new(),
            Err(errors) => errors.map(|e| issue_from_error(&e, &self.root)).collect(),
        };
        issues.extend(keywords::check(&resolver, &self.schema, value));
        if !issues.is_empty() {
            return Err(issues);
        }

        keywords::convert(&resolver, &self.schema, value, &self.converters);
        Ok(())
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Registry version this schema was compiled against
    pub fn version(&self) -> u64 {
        self.version
    }
}

impl fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledSchema")
            .field("schema", &self.schema)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

struct Registry {
    schemas: ArcSwap<Map<String, Value>>,
    converters: ArcSwap<HashMap<String, Converter>>,
    version: AtomicU64,
    cache: ValidatorCache,
}

/// Shared handle to a named-schema registry
///
/// Clones share the registry. Every mutation bumps the registry version and
/// drops cached compilations, so validators compiled earlier are rebuilt on
/// next use.
#[derive(Clone)]
pub struct Validator {
    inner: Arc<Registry>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator")
            .field("schemas", &self.inner.schemas.load().keys().collect::<Vec<_>>())
            .field("version", &self.version())
            .finish()
    }
}

impl Validator {
    pub fn new() -> Self {
        Self::with_cache(true)
    }

    pub fn with_cache(enabled: bool) -> Self {
        Self {
            inner: Arc::new(Registry {
                schemas: ArcSwap::from_pointee(Map::new()),
                converters: ArcSwap::from_pointee(HashMap::new()),
                version: AtomicU64::new(0),
                cache: ValidatorCache::new(enabled),
            }),
        }
    }

    /// Register a schema under a declared name
    ///
    /// # Arguments
    ///
    /// * `declared` - `Name` or `Name: Parent1, Parent2`
    /// * `props` - field declarations, a schema name, or `Value::Null`
    /// * `options` - schema keywords merged into the top level (`description`,
    ///   `required`, `example`, ...)
    ///
    /// With parents, the synthesized schema joins the parents under `allOf`; a
    /// single parent (and no own properties) is merged directly.
    ///
    /// # Errors
    ///
    /// [`MapperError::EmptySchemaName`] for a blank name, and any error from
    /// parsing the field type expressions.
    pub fn add_schema(&self, declared: &str, props: &Value, options: &Value) -> MapperResult<()> {
        let Inheritance { name, mut parents } = parse_declared_name(declared);
        if name.is_empty() {
            return Err(MapperError::EmptySchemaName);
        }
        let options = options.as_object().cloned().unwrap_or_default();
        let own = props_to_schema(props, &options)?;

        let mut schema = options;
        if parents.is_empty() {
            if let Some(Value::Object(own)) = own {
                schema.extend(own);
            }
        } else {
            parents.extend(own);
            if parents.len() == 1 {
                if let Some(Value::Object(parent)) = parents.pop() {
                    schema.extend(parent);
                }
            } else {
                schema.insert("allOf".to_string(), Value::Array(parents));
            }
        }

        self.store(&name, Value::Object(schema));
        Ok(())
    }

    /// Register an already-normalized schema, replacing any previous entry
    pub fn insert_schema(&self, name: &str, schema: Value) {
        self.store(name, schema);
    }

    /// Copy every entry of `other` not already defined here; returns the
    /// number of schemas imported
    pub fn import(&self, other: &Validator) -> usize {
        if Arc::ptr_eq(&self.inner, &other.inner) {
            return 0;
        }
        let incoming = other.get_schemas();
        let mut imported = 0;
        for (name, schema) in incoming.iter() {
            if !self.inner.schemas.load().contains_key(name) {
                self.store(name, schema.clone());
                imported += 1;
            }
        }
        imported
    }

    fn store(&self, name: &str, schema: Value) {
        self.inner.schemas.rcu(|current| {
            let mut next = Map::clone(current);
            next.insert(name.to_string(), schema.clone());
            next
        });
        let version = self.bump();
        debug!(schema = %name, registry_version = version, "Schema registered");
    }

    fn bump(&self) -> u64 {
        self.inner.cache.clear();
        self.inner.version.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Snapshot of the full name -> schema map
    pub fn get_schemas(&self) -> Arc<Map<String, Value>> {
        self.inner.schemas.load_full()
    }

    pub fn get_schema(&self, name: &str) -> Option<Value> {
        self.inner.schemas.load().get(name).cloned()
    }

    /// Register a converter usable as `"convert": "<name>"`
    pub fn add_converter<F>(&self, name: &str, converter: F)
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        let converter: Converter = Arc::new(converter);
        self.inner.converters.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.insert(name.to_string(), Arc::clone(&converter));
            next
        });
        self.bump();
    }

    /// Compile `schema` against the current registry
    ///
    /// # Errors
    ///
    /// [`MapperError::UnresolvedSchema`] for dangling references,
    /// [`MapperError::SchemaCycle`] for self-inheriting schemas and
    /// [`MapperError::InvalidSchema`] when the schema engine rejects the result.
    pub fn compile(&self, schema: &Value) -> MapperResult<Arc<CompiledSchema>> {
        let version = self.version();
        let key = ValidatorCache::cache_key(version, schema);
        self.inner.cache.get_or_compile(&key, || {
            CompiledSchema::build(
                schema,
                self.inner.schemas.load_full(),
                self.inner.converters.load_full(),
                version,
            )
        })
    }

    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::Acquire)
    }

    pub fn cache(&self) -> &ValidatorCache {
        &self.inner.cache
    }

    /// Whether both handles point at the same registry
    pub fn same_registry(&self, other: &Validator) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Per-owner memo of one compiled schema
///
/// Recompiles only when the registry version moved since the last compilation.
#[derive(Debug, Default)]
pub struct LazyValidator {
    slot: RwLock<Option<Arc<CompiledSchema>>>,
}

impl LazyValidator {
    pub fn get(&self, validator: &Validator, schema: &Value) -> MapperResult<Arc<CompiledSchema>> {
        let version = validator.version();
        if let Some(compiled) = self
            .slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|c| c.version() == version)
        {
            return Ok(Arc::clone(compiled));
        }
        let compiled = validator.compile(schema)?;
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&compiled));
        Ok(compiled)
    }

    pub fn reset(&self) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
