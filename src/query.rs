//! Query-string and cookie helpers.
//!
//! Query strings are parsed the way nested-form parsers do it: repeated keys
//! collect into arrays, `a[]=x` appends, `a[b]=x` nests and `a[0]=x` indexes.
//! [`stringify`] is the inverse and is what URL generation appends.

use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::HashMap;

/// Percent-decode `text`, falling back to the raw text when it is not valid UTF-8
pub fn safe_decode(text: &str) -> Cow<'_, str> {
    match urlencoding::decode(text) {
        Ok(decoded) => decoded,
        Err(_) => Cow::Borrowed(text),
    }
}

/// Parse a raw query string (without the leading `?`) into a JSON object
pub fn parse_query(query: &str) -> Map<String, Value> {
    let query = query.strip_prefix('?').unwrap_or(query);
    let mut out = Map::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        if key.is_empty() {
            continue;
        }
        let segments = key_segments(&key);
        assign(&mut out, &segments, Value::String(value.into_owned()));
    }
    out
}

/// `a[b][]` -> `["a", "b", ""]`
fn key_segments(key: &str) -> Vec<&str> {
    match key.find('[') {
        Some(open) if open > 0 && key.ends_with(']') => {
            let mut segments = vec![&key[..open]];
            segments.extend(key[open + 1..key.len() - 1].split("]["));
            segments
        }
        _ => vec![key],
    }
}

fn assign(target: &mut Map<String, Value>, segments: &[&str], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    match rest {
        [] => match target.get_mut(*head) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let previous = existing.take();
                *existing = Value::Array(vec![previous, value]);
            }
            None => {
                target.insert((*head).to_string(), value);
            }
        },
        [""] => {
            let slot = target
                .entry((*head).to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            match slot {
                Value::Array(items) => items.push(value),
                other => {
                    let previous = other.take();
                    *other = Value::Array(vec![previous, value]);
                }
            }
        }
        [index] if index.parse::<usize>().is_ok() => {
            let slot = target
                .entry((*head).to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            match slot {
                Value::Array(items) => {
                    let at = index.parse::<usize>().unwrap_or(items.len());
                    if at < items.len() {
                        items[at] = value;
                    } else {
                        items.push(value);
                    }
                }
                Value::Object(map) => {
                    map.insert((*index).to_string(), value);
                }
                other => *other = Value::Array(vec![other.take(), value]),
            }
        }
        _ => {
            let slot = target
                .entry((*head).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            if let Value::Object(child) = slot {
                assign(child, rest, value);
            }
        }
    }
}

/// Serialize a JSON object as a query string
///
/// Scalars render as `k=v`, arrays as `k[]=v` per element, objects as `k[child]=v`,
/// and `null` as `k=`. Names and values are percent-encoded; brackets are kept.
pub fn stringify(query: &Map<String, Value>) -> String {
    let mut pairs = Vec::new();
    for (key, value) in query {
        encode_pair(&urlencoding::encode(key), value, &mut pairs);
    }
    pairs.join("&")
}

fn encode_pair(prefix: &str, value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Array(items) => {
            let key = format!("{prefix}[]");
            for item in items {
                encode_pair(&key, item, out);
            }
        }
        Value::Object(map) => {
            for (child, v) in map {
                encode_pair(&format!("{prefix}[{}]", urlencoding::encode(child)), v, out);
            }
        }
        Value::Null => out.push(format!("{prefix}=")),
        Value::String(s) => out.push(format!("{prefix}={}", urlencoding::encode(s))),
        other => out.push(format!("{prefix}={}", urlencoding::encode(&other.to_string()))),
    }
}

/// Append `query` to `base` with `?` or `&`
///
/// `query` may be an object or a raw query string; empty queries leave `base`
/// untouched.
pub fn to_uri(base: &str, query: &Value) -> String {
    let encoded = match query {
        Value::Object(map) => stringify(map),
        Value::String(raw) => stringify(&parse_query(raw)),
        _ => String::new(),
    };
    if encoded.is_empty() {
        return base.to_string();
    }
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}{encoded}")
}

/// Parse a `Cookie` header into name/value pairs (values are kept verbatim)
pub fn parse_cookies(header: Option<&str>) -> HashMap<String, String> {
    header
        .map(|c| {
            c.split(';')
                .filter_map(|pair| {
                    let mut parts = pair.trim().splitn(2, '=');
                    let name = parts.next()?.trim();
                    if name.is_empty() {
                        return None;
                    }
                    let value = parts.next().unwrap_or("").trim();
                    Some((name.to_string(), value.to_string()))
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_repeated_and_nested_keys() {
        let parsed = parse_query("?a=1&a=2&tags[]=x&user[name]=bo%20b&q=a+b&list[0]=p&list[1]=q");
        assert_eq!(
            Value::Object(parsed),
            json!({
                "a": ["1", "2"],
                "tags": ["x"],
                "user": {"name": "bo b"},
                "q": "a b",
                "list": ["p", "q"]
            })
        );
    }

    #[test]
    fn test_stringify_round_trips() {
        let query = json!({"a": "x y", "ids": [1, 2], "f": {"k": "v"}});
        let text = stringify(query.as_object().unwrap());
        assert_eq!(text, "a=x%20y&ids[]=1&ids[]=2&f[k]=v");
        assert_eq!(
            Value::Object(parse_query(&text)),
            json!({"a": "x y", "ids": ["1", "2"], "f": {"k": "v"}})
        );
    }

    #[test]
    fn test_to_uri() {
        assert_eq!(to_uri("/users", &Value::Null), "/users");
        assert_eq!(to_uri("/users", &json!({"page": 2})), "/users?page=2");
        assert_eq!(to_uri("/users?a=1", &json!("b=2")), "/users?a=1&b=2");
        assert_eq!(to_uri("/users", &json!({})), "/users");
    }

    #[test]
    fn test_safe_decode_falls_back() {
        assert_eq!(safe_decode("caf%C3%A9"), "café");
        assert_eq!(safe_decode("%E0%A4%A"), "%E0%A4%A");
        assert_eq!(safe_decode("%FF"), "%FF");
    }

    #[test]
    fn test_parse_cookies() {
        let cookies = parse_cookies(Some("session=abc; theme=dark ; empty="));
        assert_eq!(cookies.get("session").map(String::as_str), Some("abc"));
        assert_eq!(cookies.get("theme").map(String::as_str), Some("dark"));
        assert_eq!(cookies.get("empty").map(String::as_str), Some(""));
        assert!(parse_cookies(None).is_empty());
    }
}
