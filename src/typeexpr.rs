//! # Type Expressions
//!
//! Compact string grammar describing the shape of a value, resolved into JSON
//! Schema fragments:
//!
//! | expression          | fragment                                              |
//! |---------------------|-------------------------------------------------------|
//! | `""`                | `{}`                                                  |
//! | `number`            | `{"type": "number"}`                                  |
//! | `date`              | `{"type": "string", "format": "date", "convert": true}` |
//! | `file`              | `{"type": "object", "file": true}`                    |
//! | `User`              | `{"$ref": "#/components/schemas/User"}`               |
//! | `array<User>`       | `{"type": "array", "items": {"$ref": ...}}`           |
//! | `A\|B`              | `{"oneOf": [A, B]}`                                   |
//! | `A&B`               | `{"allOf": [A, B]}`                                   |
//!
//! Schema *names* additionally accept an inheritance form, `Child: Parent1, Parent2`,
//! parsed by [`parse_declared_name`].

use crate::error::{MapperError, MapperResult};
use serde_json::{json, Map, Value};

/// Location of named schemas inside the generated document
pub const SCHEMA_REF_PREFIX: &str = "#/components/schemas/";

const TYPES: [&str; 7] = [
    "array", "boolean", "integer", "null", "number", "object", "string",
];
const FORMATS: [&str; 4] = ["date", "time", "date-time", "regex"];

/// `$ref` pointer for a named schema
pub fn ref_path(name: &str) -> String {
    format!("{SCHEMA_REF_PREFIX}{name}")
}

/// `{"$ref": ...}` fragment for a named schema
pub fn schema_ref(name: &str) -> Value {
    json!({ "$ref": ref_path(name) })
}

/// Name of the schema a `$ref` pointer targets, if it points into the registry
pub fn ref_name(pointer: &str) -> Option<&str> {
    pointer.strip_prefix(SCHEMA_REF_PREFIX)
}

/// A declared schema name split into its own name and parent references
#[derive(Debug, Clone, PartialEq)]
pub struct Inheritance {
    pub name: String,
    pub parents: Vec<Value>,
}

/// Parse `Name` or `Name: Parent1, Parent2`; blank parent tokens are skipped.
pub fn parse_declared_name(declared: &str) -> Inheritance {
    let mut parts = declared.split(':');
    let name = parts.next().unwrap_or_default().trim().to_string();
    let parents = parts
        .next()
        .map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(schema_ref)
                .collect()
        })
        .unwrap_or_default();
    Inheritance { name, parents }
}

/// Parse a type expression into a schema fragment
///
/// # Errors
///
/// [`MapperError::MixedComposition`] when the expression mixes `&` and `|`.
pub fn parse_type(expression: &str) -> MapperResult<Value> {
    let expression = expression.trim();
    if expression.is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    match array_items(expression) {
        Some(inner) if inner.trim().is_empty() => Ok(json!({ "type": "array" })),
        Some(inner) => Ok(json!({ "type": "array", "items": parse_mix(inner)? })),
        None => parse_mix(expression),
    }
}

/// Inner text of `array<...>` (case-insensitive, one optional space before `<`)
fn array_items(expression: &str) -> Option<&str> {
    let head = expression.get(..5)?;
    if !head.eq_ignore_ascii_case("array") {
        return None;
    }
    let rest = &expression[5..];
    let rest = rest.strip_prefix(' ').unwrap_or(rest);
    let inner = rest.strip_prefix('<')?.strip_suffix('>')?;
    if inner.contains(['<', '>']) {
        return None;
    }
    Some(inner)
}

/// Union / intersection of keywords and named references
fn parse_mix(expression: &str) -> MapperResult<Value> {
    let has_and = expression.contains('&');
    let has_or = expression.contains('|');
    if has_and && has_or {
        return Err(MapperError::MixedComposition {
            expression: expression.to_string(),
        });
    }
    let mut members: Vec<Value> = expression
        .split(['&', '|'])
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| keyword(t).unwrap_or_else(|| schema_ref(t)))
        .collect();
    Ok(match members.len() {
        0 => Value::Object(Map::new()),
        1 => members.remove(0),
        _ if has_and => json!({ "allOf": members }),
        _ => json!({ "oneOf": members }),
    })
}

/// Built-in keyword fragment, matched case-insensitively
fn keyword(token: &str) -> Option<Value> {
    let lower = token.to_ascii_lowercase();
    let lower = if lower == "datetime" {
        "date-time".to_string()
    } else {
        lower
    };
    if lower == "file" {
        return Some(json!({ "type": "object", "file": true }));
    }
    if TYPES.contains(&lower.as_str()) {
        return Some(json!({ "type": lower }));
    }
    if FORMATS.contains(&lower.as_str()) {
        return Some(json!({ "type": "string", "format": lower, "convert": true }));
    }
    None
}
