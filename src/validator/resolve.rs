//! Reference resolution over the named-schema registry.

use crate::error::{MapperError, MapperResult};
use crate::typeexpr::ref_name;
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Longest `$ref -> $ref` chain followed before giving up
const MAX_REF_HOPS: usize = 32;

/// Formats checked by the mapper itself rather than the schema engine
pub(crate) const MAPPER_FORMATS: [&str; 5] = ["date", "time", "date-time", "int32", "int64"];

/// Composite keywords whose members describe the same value as their parent
const STRUCTURAL_KEYWORDS: [&str; 3] = ["allOf", "oneOf", "anyOf"];

pub(crate) struct Resolver<'a> {
    schemas: &'a Map<String, Value>,
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(schemas: &'a Map<String, Value>) -> Self {
        Self { schemas }
    }

    /// Follow registry `$ref`s until a concrete schema is reached
    pub(crate) fn deref(&self, schema: &'a Value) -> &'a Value {
        let mut current = schema;
        for _ in 0..MAX_REF_HOPS {
            let target = current
                .get("$ref")
                .and_then(Value::as_str)
                .and_then(ref_name)
                .and_then(|name| self.schemas.get(name));
            match target {
                Some(next) => current = next,
                None => break,
            }
        }
        current
    }

    /// Check every registry reference reachable from `schema` exists and that no
    /// schema reaches itself through `$ref`/`allOf`/`oneOf`/`anyOf`.
    pub(crate) fn check(&self, schema: &Value) -> MapperResult<()> {
        let mut reachable = Vec::new();
        let mut seen = HashSet::new();
        let mut pending = Vec::new();
        collect_refs(schema, &mut pending);
        while let Some(name) = pending.pop() {
            if !seen.insert(name.clone()) {
                continue;
            }
            let target = self
                .schemas
                .get(&name)
                .ok_or_else(|| MapperError::UnresolvedSchema(name.clone()))?;
            collect_refs(target, &mut pending);
            reachable.push(name);
        }

        let mut done = HashSet::new();
        for name in &reachable {
            let mut path = Vec::new();
            self.find_cycle(name, &mut path, &mut done)?;
        }
        Ok(())
    }

    fn find_cycle(
        &self,
        name: &str,
        path: &mut Vec<String>,
        done: &mut HashSet<String>,
    ) -> MapperResult<()> {
        if done.contains(name) {
            return Ok(());
        }
        if path.iter().any(|p| p == name) {
            return Err(MapperError::SchemaCycle(name.to_string()));
        }
        path.push(name.to_string());
        if let Some(schema) = self.schemas.get(name) {
            let mut parents = Vec::new();
            structural_refs(schema, &mut parents);
            for parent in parents {
                self.find_cycle(&parent, path, done)?;
            }
        }
        path.pop();
        done.insert(name.to_string());
        Ok(())
    }
}

/// Every registry reference anywhere inside `value`
fn collect_refs(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            if let Some(name) = map.get("$ref").and_then(Value::as_str).and_then(ref_name) {
                out.push(name.to_string());
            }
            for v in map.values() {
                collect_refs(v, out);
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_refs(v, out)),
        _ => {}
    }
}

/// References that describe the value itself (inheritance edges), skipping
/// `properties`/`items` which only describe children
fn structural_refs(schema: &Value, out: &mut Vec<String>) {
    let Some(map) = schema.as_object() else {
        return;
    };
    if let Some(name) = map.get("$ref").and_then(Value::as_str).and_then(ref_name) {
        out.push(name.to_string());
    }
    for key in STRUCTURAL_KEYWORDS {
        if let Some(members) = map.get(key).and_then(Value::as_array) {
            members.iter().for_each(|m| structural_refs(m, out));
        }
    }
    if let Some(not) = map.get("not") {
        structural_refs(not, out);
    }
}

/// Copy of `value` with the formats the mapper checks itself removed, so the
/// schema engine does not apply its own stricter date grammar
pub(crate) fn strip_mapper_formats(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, v)| {
                    !(k.as_str() == "format"
                        && v.as_str().is_some_and(|f| MAPPER_FORMATS.contains(&f)))
                })
                .map(|(k, v)| (k.clone(), strip_mapper_formats(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(strip_mapper_formats).collect()),
        other => other.clone(),
    }
}

/// Types declared by `type` (string or array form)
pub(crate) fn declared_types(schema: &Map<String, Value>) -> Vec<&str> {
    match schema.get("type") {
        Some(Value::String(t)) => vec![t.as_str()],
        Some(Value::Array(ts)) => ts.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

/// Whether `value` is an instance of the JSON Schema primitive type `ty`
pub(crate) fn matches_type(value: &Value, ty: &str) -> bool {
    match ty {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => match value {
            Value::Number(n) => {
                n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            _ => false,
        },
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        _ => true,
    }
}

/// Shallow type check used to pick a `oneOf`/`anyOf` branch
pub(crate) fn branch_accepts(resolver: &Resolver<'_>, branch: &Value, value: &Value) -> bool {
    let branch = resolver.deref(branch);
    let Some(map) = branch.as_object() else {
        return true;
    };
    let types = declared_types(map);
    if !types.is_empty() && !types.iter().any(|t| matches_type(value, t)) {
        return false;
    }
    map.get("allOf")
        .and_then(Value::as_array)
        .map_or(true, |all| all.iter().all(|s| branch_accepts(resolver, s, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_deref_follows_chain() {
        let schemas = registry(json!({
            "Info": {"$ref": "#/components/schemas/User"},
            "User": {"type": "object"}
        }));
        let resolver = Resolver::new(&schemas);
        let start = json!({"$ref": "#/components/schemas/Info"});
        assert_eq!(resolver.deref(&start), &json!({"type": "object"}));
    }

    #[test]
    fn test_check_reports_missing_reference() {
        let schemas = registry(json!({
            "User": {"allOf": [{"$ref": "#/components/schemas/Model"}]}
        }));
        let resolver = Resolver::new(&schemas);
        let err = resolver
            .check(&json!({"$ref": "#/components/schemas/User"}))
            .unwrap_err();
        assert_eq!(err, MapperError::UnresolvedSchema("Model".to_string()));
    }

    #[test]
    fn test_check_rejects_parent_cycle() {
        let schemas = registry(json!({
            "A": {"allOf": [{"$ref": "#/components/schemas/B"}, {"type": "object"}]},
            "B": {"$ref": "#/components/schemas/A"}
        }));
        let resolver = Resolver::new(&schemas);
        let err = resolver
            .check(&json!({"$ref": "#/components/schemas/A"}))
            .unwrap_err();
        assert!(matches!(err, MapperError::SchemaCycle(_)));
    }

    #[test]
    fn test_recursive_properties_are_allowed() {
        let schemas = registry(json!({
            "Tree": {
                "type": "object",
                "properties": {
                    "children": {"type": "array", "items": {"$ref": "#/components/schemas/Tree"}}
                }
            }
        }));
        let resolver = Resolver::new(&schemas);
        assert!(resolver
            .check(&json!({"$ref": "#/components/schemas/Tree"}))
            .is_ok());
    }

    #[test]
    fn test_strip_mapper_formats_keeps_property_named_format() {
        let schema = json!({
            "type": "object",
            "properties": {
                "format": {"type": "string"},
                "born": {"type": "string", "format": "date", "convert": true},
                "email": {"type": "string", "format": "email"}
            }
        });
        let stripped = strip_mapper_formats(&schema);
        assert_eq!(stripped["properties"]["format"], json!({"type": "string"}));
        assert_eq!(
            stripped["properties"]["born"],
            json!({"type": "string", "convert": true})
        );
        assert_eq!(stripped["properties"]["email"]["format"], "email");
    }
}
