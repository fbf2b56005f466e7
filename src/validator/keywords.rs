//! Mapper-specific keywords: `file`, the integer-width and date formats, and
//! the `convert` post-validation transform.

use super::registry::Converter;
use super::resolve::{branch_accepts, Resolver};
use super::ValidationIssue;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

const INT32_MIN: i64 = -(1 << 31);
const INT32_MAX: i64 = (1 << 31) - 1;
const MAX_SAFE_INTEGER: i64 = (1 << 53) - 1;

/// Shape of an uploaded file as produced by body decoders
///
/// A value passes the `file` keyword when it is an object with a string `path`
/// and an unsigned `size`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub path: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl UploadedFile {
    pub fn matches(value: &Value) -> bool {
        value.get("path").is_some_and(Value::is_string)
            && value.get("size").is_some_and(Value::is_u64)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

type Visitor<'v> = dyn FnMut(&Map<String, Value>, &[String], &mut Value) + 'v;

/// Depth-first walk pairing each schema object with the value it describes
fn walk(
    resolver: &Resolver<'_>,
    schema: &Value,
    value: &mut Value,
    path: &mut Vec<String>,
    visit: &mut Visitor<'_>,
) {
    let schema = resolver.deref(schema);
    let Some(rules) = schema.as_object() else {
        return;
    };
    visit(rules, path, value);

    if let Some(all) = rules.get("allOf").and_then(Value::as_array) {
        for member in all {
            walk(resolver, member, value, path, visit);
        }
    }
    for key in ["oneOf", "anyOf"] {
        let branch = rules
            .get(key)
            .and_then(Value::as_array)
            .and_then(|branches| branches.iter().find(|b| branch_accepts(resolver, b, value)));
        if let Some(branch) = branch {
            walk(resolver, branch, value, path, visit);
        }
    }

    match value {
        Value::Object(map) => {
            let props = rules.get("properties").and_then(Value::as_object);
            for (key, child) in map.iter_mut() {
                let child_schema = props
                    .and_then(|p| p.get(key))
                    .or_else(|| rules.get("additionalProperties").filter(|s| s.is_object()));
                if let Some(child_schema) = child_schema {
                    path.push(key.clone());
                    walk(resolver, child_schema, child, path, visit);
                    path.pop();
                }
            }
        }
        Value::Array(items) => {
            for (index, item) in items.iter_mut().enumerate() {
                let item_schema = match rules.get("items") {
                    Some(s @ Value::Object(_)) => Some(s),
                    Some(Value::Array(tuple)) => tuple.get(index),
                    _ => None,
                };
                if let Some(item_schema) = item_schema {
                    path.push(index.to_string());
                    walk(resolver, item_schema, item, path, visit);
                    path.pop();
                }
            }
        }
        _ => {}
    }
}

/// Evaluate `file` and the mapper-owned formats
pub(crate) fn check(resolver: &Resolver<'_>, schema: &Value, value: &mut Value) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let mut visit = |rules: &Map<String, Value>, path: &[String], value: &mut Value| {
        let field = path.join(".");
        if rules.get("file").and_then(Value::as_bool) == Some(true) && !UploadedFile::matches(value) {
            issues.push(ValidationIssue::new(
                field.clone(),
                "file",
                "should pass \"file\" keyword validation",
            ));
        }
        if let Some(format) = rules.get("format").and_then(Value::as_str) {
            if !format_holds(format, value) {
                issues.push(ValidationIssue::new(
                    field,
                    "format",
                    format!("should match format \"{format}\""),
                ));
            }
        }
    };
    walk(resolver, schema, value, &mut Vec::new(), &mut visit);
    issues
}

/// Apply `convert` transforms; only called on values that passed validation
pub(crate) fn convert(
    resolver: &Resolver<'_>,
    schema: &Value,
    value: &mut Value,
    converters: &HashMap<String, Converter>,
) {
    let mut visit = |rules: &Map<String, Value>, _: &[String], value: &mut Value| {
        match rules.get("convert") {
            Some(Value::Bool(true)) => {
                if let Some(format) = rules.get("format").and_then(Value::as_str) {
                    if let Some(converted) = convert_builtin(format, value) {
                        *value = converted;
                    }
                }
            }
            Some(Value::String(name)) => {
                if let Some(converter) = converters.get(name) {
                    *value = converter(value);
                } else {
                    tracing::warn!(converter = %name, "unknown converter, value left unchanged");
                }
            }
            _ => {}
        }
    };
    walk(resolver, schema, value, &mut Vec::new(), &mut visit);
}

/// Built-in conversion for `date`, `time` and `date-time` strings
///
/// Produces an ISO-8601 UTC timestamp with millisecond precision; `date` maps to
/// midnight UTC and `time` to that time of day on 1970-01-01.
pub fn convert_builtin(format: &str, value: &Value) -> Option<Value> {
    let text = value.as_str()?;
    let instant = match format {
        "date" => parse_date(text)?.and_hms_opt(0, 0, 0)?.and_utc(),
        "time" => {
            let (time, offset) = parse_time(text)?;
            let local = NaiveDate::from_ymd_opt(1970, 1, 1)?.and_time(time);
            local.and_local_timezone(offset).single()?.with_timezone(&Utc)
        }
        "date-time" => parse_date_time(text)?,
        _ => return None,
    };
    Some(Value::String(
        instant.to_rfc3339_opts(SecondsFormat::Millis, true),
    ))
}

fn format_holds(format: &str, value: &Value) -> bool {
    match (format, value) {
        ("int32", Value::Number(n)) => {
            safe_integer(n).is_some_and(|i| (INT32_MIN..=INT32_MAX).contains(&i))
        }
        ("int64", Value::Number(n)) => safe_integer(n).is_some(),
        ("date", Value::String(s)) => parse_date(s).is_some(),
        ("time", Value::String(s)) => parse_time(s).is_some(),
        ("date-time", Value::String(s)) => parse_date_time(s).is_some(),
        _ => true,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn safe_integer(n: &serde_json::Number) -> Option<i64> {
    let i = match n.as_i64() {
        Some(i) => i,
        None => {
            let f = n.as_f64()?;
            if f.fract() != 0.0 || f.abs() > MAX_SAFE_INTEGER as f64 {
                return None;
            }
            f as i64
        }
    };
    (-MAX_SAFE_INTEGER..=MAX_SAFE_INTEGER).contains(&i).then_some(i)
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()
}

/// `HH:MM:SS[.fff][Z|+HH:MM|+HHMM|+HH]`
fn parse_time(text: &str) -> Option<(NaiveTime, FixedOffset)> {
    let split = text
        .char_indices()
        .skip(8)
        .find(|(_, c)| matches!(c, 'Z' | 'z' | '+' | '-'))
        .map(|(i, _)| i);
    let (clock, zone) = match split {
        Some(i) => text.split_at(i),
        None => (text, ""),
    };
    let time = NaiveTime::parse_from_str(clock, "%H:%M:%S%.f").ok()?;
    Some((time, parse_offset(zone)?))
}

fn parse_offset(zone: &str) -> Option<FixedOffset> {
    if zone.is_empty() || zone.eq_ignore_ascii_case("z") {
        return FixedOffset::east_opt(0);
    }
    let sign = match zone.as_bytes().first()? {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let digits: String = zone[1..].chars().filter(|c| *c != ':').collect();
    if digits.len() != 2 && digits.len() != 4 {
        return None;
    }
    let hours: i32 = digits.get(..2)?.parse().ok()?;
    let minutes: i32 = digits.get(2..).filter(|m| !m.is_empty()).map_or(Some(0), |m| m.parse().ok())?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

fn parse_date_time(text: &str) -> Option<DateTime<Utc>> {
    let normalized = text.replacen(' ', "T", 1);
    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
