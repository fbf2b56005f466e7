//! # OpenAPI Document Assembly
//!
//! The mapper documents itself from its registrations: every route contributes a
//! path item, path items sharing a documentation path are deep-merged, and the
//! schema registry becomes `components.schemas`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Top-level document metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMeta {
    #[serde(default = "default_openapi_version")]
    pub openapi: String,
    #[serde(default = "empty_object")]
    pub info: Value,
    #[serde(default)]
    pub tags: Vec<Value>,
    #[serde(default)]
    pub servers: Vec<Value>,
    /// Extra top-level fields (`security`, `externalDocs`, `x-*`)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_openapi_version() -> String {
    "3.0.2".to_string()
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl Default for DocumentMeta {
    fn default() -> Self {
        Self {
            openapi: default_openapi_version(),
            info: empty_object(),
            tags: Vec::new(),
            servers: Vec::new(),
            extra: Map::new(),
        }
    }
}

impl DocumentMeta {
    /// Full document from the merged path items and the schema map
    pub fn render(&self, paths: Map<String, Value>, schemas: &Map<String, Value>) -> Value {
        let mut doc = match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        doc.insert("paths".to_string(), Value::Object(paths));
        let mut components = Map::new();
        components.insert("schemas".to_string(), Value::Object(schemas.clone()));
        doc.insert("components".to_string(), Value::Object(components));
        Value::Object(doc)
    }
}

/// Recursively merge `source` into `target`
///
/// Objects merge key by key, arrays merge index by index, and any other value in
/// `source` replaces the one in `target`.
pub fn deep_merge(target: &mut Value, source: &Value) {
    match (target, source) {
        (Value::Object(t), Value::Object(s)) => {
            for (key, value) in s {
                match t.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        t.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (Value::Array(t), Value::Array(s)) => {
            for (index, value) in s.iter().enumerate() {
                match t.get_mut(index) {
                    Some(existing) => deep_merge(existing, value),
                    None => t.push(value.clone()),
                }
            }
        }
        (target, source) => *target = source.clone(),
    }
}
