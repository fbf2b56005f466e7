//! Type coercion and default insertion, run before schema validation.
//!
//! Request parameters arrive as strings, so values are converted to the declared
//! type when the conversion is lossless: `"123"` becomes `123` for a number,
//! `"true"` becomes `true`, and any scalar is wrapped into a one-element array when
//! the schema expects an array.

use super::resolve::{branch_accepts, declared_types, matches_type, Resolver};
use serde_json::{Number, Value};

/// Coerce `value` in place against `schema` and fill in missing defaults
pub(crate) fn coerce(resolver: &Resolver<'_>, schema: &Value, value: &mut Value) {
    let schema = resolver.deref(schema);
    let Some(rules) = schema.as_object() else {
        return;
    };

    if let Some(all) = rules.get("allOf").and_then(Value::as_array) {
        for member in all {
            coerce(resolver, member, value);
        }
    }
    for key in ["oneOf", "anyOf"] {
        if let Some(branches) = rules.get(key).and_then(Value::as_array) {
            coerce_first_branch(resolver, branches, value);
        }
    }

    let types = declared_types(rules);
    if !types.is_empty() && !types.iter().any(|t| matches_type(value, t)) {
        if let Some(coerced) = types.iter().find_map(|t| coerce_to(value, t)) {
            *value = coerced;
        }
    }

    match value {
        Value::Object(map) => {
            let props = rules.get("properties").and_then(Value::as_object);
            if let Some(props) = props {
                for (key, prop_schema) in props {
                    if !map.contains_key(key) {
                        if let Some(default) = resolver.deref(prop_schema).get("default") {
                            map.insert(key.clone(), default.clone());
                        }
                    }
                    if let Some(child) = map.get_mut(key) {
                        coerce(resolver, prop_schema, child);
                    }
                }
            }
            if let Some(extra) = rules.get("additionalProperties").filter(|s| s.is_object()) {
                for (key, child) in map.iter_mut() {
                    if props.map_or(true, |p| !p.contains_key(key)) {
                        coerce(resolver, extra, child);
                    }
                }
            }
        }
        Value::Array(items) => match rules.get("items") {
            Some(item_schema @ Value::Object(_)) => {
                for item in items.iter_mut() {
                    coerce(resolver, item_schema, item);
                }
            }
            Some(Value::Array(tuple)) => {
                for (item_schema, item) in tuple.iter().zip(items.iter_mut()) {
                    coerce(resolver, item_schema, item);
                }
            }
            _ => {}
        },
        _ => {}
    }
}

/// Apply the first `oneOf`/`anyOf` branch, in declaration order, whose type the
/// coerced value satisfies
fn coerce_first_branch(resolver: &Resolver<'_>, branches: &[Value], value: &mut Value) {
    for branch in branches {
        let mut candidate = value.clone();
        coerce(resolver, branch, &mut candidate);
        if branch_accepts(resolver, branch, &candidate) {
            *value = candidate;
            return;
        }
    }
}

/// Lossless conversion of `value` to the primitive type `ty`
fn coerce_to(value: &Value, ty: &str) -> Option<Value> {
    match ty {
        "string" => match value {
            Value::Number(n) => Some(Value::String(n.to_string())),
            Value::Bool(b) => Some(Value::String(b.to_string())),
            Value::Null => Some(Value::String(String::new())),
            Value::Array(items) => single(items).and_then(|v| coerce_to(v, ty)),
            _ => None,
        },
        "number" => match value {
            Value::String(s) => parse_number(s),
            Value::Bool(b) => Some(Value::from(u8::from(*b))),
            Value::Null => Some(Value::from(0)),
            Value::Array(items) => single(items).and_then(|v| coerce_to(v, ty)),
            _ => None,
        },
        "integer" => match value {
            Value::String(s) => parse_number(s).filter(|n| matches_type(n, "integer")),
            Value::Bool(b) => Some(Value::from(u8::from(*b))),
            Value::Null => Some(Value::from(0)),
            Value::Array(items) => single(items).and_then(|v| coerce_to(v, ty)),
            _ => None,
        },
        "boolean" => match value {
            Value::String(s) if s == "true" => Some(Value::Bool(true)),
            Value::String(s) if s == "false" => Some(Value::Bool(false)),
            Value::Number(n) if n.as_f64() == Some(1.0) => Some(Value::Bool(true)),
            Value::Number(n) if n.as_f64() == Some(0.0) => Some(Value::Bool(false)),
            Value::Null => Some(Value::Bool(false)),
            Value::Array(items) => single(items).and_then(|v| coerce_to(v, ty)),
            _ => None,
        },
        "null" => match value {
            Value::String(s) if s.is_empty() => Some(Value::Null),
            Value::Number(n) if n.as_f64() == Some(0.0) => Some(Value::Null),
            Value::Bool(false) => Some(Value::Null),
            _ => None,
        },
        "array" => match value {
            Value::Array(_) => None,
            other => Some(Value::Array(vec![other.clone()])),
        },
        _ => None,
    }
}

/// The only element of a one-element array of scalars
fn single(items: &[Value]) -> Option<&Value> {
    match items {
        [only] if !only.is_array() && !only.is_object() => Some(only),
        _ => None,
    }
}

/// Parse a numeric string, keeping integers integral
fn parse_number(text: &str) -> Option<Value> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(i) = text.parse::<i64>() {
        return Some(Value::from(i));
    }
    let f = text.parse::<f64>().ok().filter(|f| f.is_finite())?;
    if f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 {
        #[allow(clippy::cast_possible_truncation)]
        return Some(Value::from(f as i64));
    }
    Number::from_f64(f).map(Value::Number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn run(schema: Value, mut value: Value) -> Value {
        let schemas = Map::new();
        coerce(&Resolver::new(&schemas), &schema, &mut value);
        value
    }

    #[test]
    fn test_numeric_strings_become_numbers() {
        assert_eq!(run(json!({"type": "number"}), json!("123")), json!(123));
        assert_eq!(run(json!({"type": "number"}), json!("1.5")), json!(1.5));
        assert_eq!(run(json!({"type": "integer"}), json!("1.5")), json!("1.5"));
        assert_eq!(run(json!({"type": "number"}), json!("abc")), json!("abc"));
        assert_eq!(run(json!({"type": "number"}), json!("")), json!(""));
    }

    #[test]
    fn test_booleans_and_strings() {
        assert_eq!(run(json!({"type": "boolean"}), json!("true")), json!(true));
        assert_eq!(run(json!({"type": "boolean"}), json!("yes")), json!("yes"));
        assert_eq!(run(json!({"type": "string"}), json!(345)), json!("345"));
    }

    #[test]
    fn test_scalar_wraps_into_array() {
        let schema = json!({"type": "array", "items": {"type": "number"}});
        assert_eq!(run(schema.clone(), json!("7")), json!([7]));
        assert_eq!(run(schema, json!(["1", "2"])), json!([1, 2]));
    }

    #[test]
    fn test_defaults_fill_missing_properties() {
        let schema = json!({
            "type": "object",
            "properties": {
                "page": {"type": "number", "default": 1},
                "size": {"type": "number"}
            }
        });
        assert_eq!(run(schema, json!({"size": "20"})), json!({"page": 1, "size": 20}));
    }

    #[test]
    fn test_one_of_takes_first_matching_branch() {
        let schema = json!({"oneOf": [{"type": "number"}, {"type": "string"}]});
        assert_eq!(run(schema.clone(), json!("42")), json!(42));
        assert_eq!(run(schema, json!("abc")), json!("abc"));
        let schema = json!({"anyOf": [{"type": "boolean"}, {"type": "string"}]});
        assert_eq!(run(schema, json!("true")), json!(true));
    }
}
