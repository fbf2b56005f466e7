//! # Path Patterns
//!
//! Route templates compile to a regular expression plus the ordered list of their
//! named keys. The template grammar:
//!
//! - `:name` - named segment matching `[^/]+?` (the text up to the next delimiter)
//! - `:name(\d+)` - named segment with a custom pattern
//! - `(\d+)` - unnamed segment, keyed by its position (`0`, `1`, ...)
//! - `*` - unnamed segment matching anything, including `/`
//! - a `?`, `*` or `+` after a segment marks it optional, optional-repeating or
//!   repeating
//! - a `/` or `.` right before a segment belongs to it (it disappears together
//!   with an omitted optional segment)
//! - `\` escapes the next character
//!
//! The same tokens drive reverse URL generation ([`PathPattern::url`]) and the
//! documentation form of the path ([`PathPattern::doc_path`]), where keys render
//! as `{name}`.

use crate::error::{MapperError, MapperResult};
use regex::Regex;
use serde_json::Value;
use smallvec::SmallVec;
use std::borrow::Cow;
use std::sync::Arc;

/// Maximum number of path captures stored inline before spilling to the heap
pub const MAX_INLINE_PARAMS: usize = 8;

/// Raw captures of one match: key name and captured text (`None` for an omitted
/// optional segment)
pub type ParamVec = SmallVec<[(Arc<str>, Option<String>); MAX_INLINE_PARAMS]>;

/// Matching flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternOptions {
    /// Keep a trailing slash significant
    pub strict: bool,
    /// Match case-sensitively
    pub sensitive: bool,
    /// Require the whole path to match (otherwise a prefix up to a `/` suffices)
    pub end: bool,
}

impl Default for PatternOptions {
    fn default() -> Self {
        Self {
            strict: false,
            sensitive: false,
            end: true,
        }
    }
}

/// One key of a compiled template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathKey {
    pub name: String,
    /// `/`, `.` or empty
    pub prefix: String,
    pub optional: bool,
    pub repeat: bool,
    /// Prefix is followed by more literal text, so it stays when the key is omitted
    pub partial: bool,
    pub asterisk: bool,
    pub pattern: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Key(PathKey),
}

/// A compiled route template
#[derive(Debug, Clone)]
pub struct PathPattern {
    source: String,
    tokens: Vec<Token>,
    keys: Vec<PathKey>,
    regex: Regex,
    key_matchers: Vec<Regex>,
}

impl PathPattern {
    /// Compile `path`
    ///
    /// # Errors
    ///
    /// [`MapperError::InvalidPattern`] for unbalanced groups or custom patterns
    /// the regex engine rejects.
    pub fn compile(path: &str, options: PatternOptions) -> MapperResult<Self> {
        let tokens = tokenize(path)?;
        let keys: Vec<PathKey> = tokens
            .iter()
            .filter_map(|t| match t {
                Token::Key(k) => Some(k.clone()),
                Token::Literal(_) => None,
            })
            .collect();

        let source = build_regex(&tokens, options);
        let regex = Regex::new(&source).map_err(|e| invalid(path, e.to_string()))?;
        let key_matchers = keys
            .iter()
            .map(|k| Regex::new(&format!("^(?:{})$", k.pattern)))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| invalid(path, e.to_string()))?;

        Ok(Self {
            source: path.to_string(),
            tokens,
            keys,
            regex,
            key_matchers,
        })
    }

    /// Template this pattern was compiled from
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn keys(&self) -> &[PathKey] {
        &self.keys
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// Raw (still percent-encoded) captures keyed by key name
    pub fn exec(&self, path: &str) -> Option<ParamVec> {
        let captures = self.regex.captures(path)?;
        Some(
            self.keys
                .iter()
                .enumerate()
                .map(|(i, key)| {
                    let text = captures.get(i + 1).map(|m| m.as_str().to_string());
                    (Arc::from(key.name.as_str()), text)
                })
                .collect(),
        )
    }

    /// Substitute `params` into the template
    ///
    /// `params` is either an object keyed by key name or an array of values in key
    /// order; a single scalar fills the first key. Values are percent-encoded and
    /// must satisfy the key's pattern.
    ///
    /// # Errors
    ///
    /// [`MapperError::MissingUrlParam`] when a required key has no value and
    /// [`MapperError::UrlParamMismatch`] when a value does not match its key.
    pub fn url(&self, params: &Value) -> MapperResult<String> {
        let mut out = String::new();
        let mut key_index = 0;
        for token in &self.tokens {
            let key = match token {
                Token::Literal(text) => {
                    out.push_str(text);
                    continue;
                }
                Token::Key(key) => key,
            };
            let matcher = &self.key_matchers[key_index];
            let value = lookup(params, key, key_index);
            key_index += 1;

            let values: Vec<String> = match value {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Array(items)) if key.repeat => {
                    items.iter().filter_map(scalar_text).collect()
                }
                Some(other) => scalar_text(other).into_iter().collect(),
            };
            if values.is_empty() {
                if key.optional {
                    if key.partial {
                        out.push_str(&key.prefix);
                    }
                    continue;
                }
                return Err(MapperError::MissingUrlParam(key.name.clone()));
            }

            for (i, raw) in values.iter().enumerate() {
                let encoded = if key.asterisk {
                    encode_asterisk(raw)
                } else {
                    encode_segment(raw)
                };
                if !matcher.is_match(&encoded) {
                    return Err(MapperError::UrlParamMismatch {
                        name: key.name.clone(),
                        pattern: key.pattern.clone(),
                        value: encoded,
                    });
                }
                out.push_str(&key.prefix);
                if i > 0 && key.prefix.is_empty() {
                    out.push('/');
                }
                out.push_str(&encoded);
            }
        }
        Ok(out)
    }

    /// Template with every key rendered as `{name}`
    pub fn doc_path(&self) -> String {
        let mut out = String::new();
        for token in &self.tokens {
            match token {
                Token::Literal(text) => out.push_str(text),
                Token::Key(key) => {
                    out.push_str(&key.prefix);
                    out.push('{');
                    out.push_str(&key.name);
                    out.push('}');
                }
            }
        }
        out
    }
}

fn invalid(path: &str, reason: impl Into<String>) -> MapperError {
    MapperError::InvalidPattern {
        path: path.to_string(),
        reason: reason.into(),
    }
}

fn lookup<'v>(params: &'v Value, key: &PathKey, index: usize) -> Option<&'v Value> {
    match params {
        Value::Object(map) => map.get(&key.name),
        Value::Array(items) => items.get(index),
        Value::Null => None,
        scalar if index == 0 => Some(scalar),
        _ => None,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Percent-encode everything outside the unreserved set and `;,:@&=+$!*'()`
fn encode_segment(raw: &str) -> String {
    encode_except(raw, |c| {
        c.is_ascii_alphanumeric() || "-_.~;,:@&=+$!*'()".contains(c)
    })
}

/// Like [`encode_segment`] but keeps `/`, for catch-all segments
fn encode_asterisk(raw: &str) -> String {
    encode_except(raw, |c| {
        c.is_ascii_alphanumeric() || "-_.~;,:@&=+$!*'()/".contains(c)
    })
}

fn encode_except(raw: &str, keep: impl Fn(char) -> bool) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut buf = [0u8; 4];
    for c in raw.chars() {
        if keep(c) {
            out.push(c);
        } else {
            for byte in c.encode_utf8(&mut buf).bytes() {
                out.push_str(&format!("%{byte:02X}"));
            }
        }
    }
    out
}

fn tokenize(path: &str) -> MapperResult<Vec<Token>> {
    let chars: Vec<char> = path.chars().collect();
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut unnamed = 0usize;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '\\' {
            if let Some(&escaped) = chars.get(i + 1) {
                literal.push(escaped);
                i += 2;
                continue;
            }
        }

        let (prefix, start) = if (c == '/' || c == '.') && starts_key(&chars, i + 1) {
            (Some(c), i + 1)
        } else if starts_key(&chars, i) {
            (None, i)
        } else {
            literal.push(c);
            i += 1;
            continue;
        };

        let mut j = start;
        let mut name = None;
        let mut pattern = None;
        let mut asterisk = false;
        match chars[j] {
            ':' => {
                j += 1;
                let from = j;
                while j < chars.len() && is_word(chars[j]) {
                    j += 1;
                }
                name = Some(chars[from..j].iter().collect::<String>());
                if chars.get(j) == Some(&'(') {
                    let (group, end) = read_group(&chars, j, path)?;
                    pattern = Some(group);
                    j = end;
                }
            }
            '(' => {
                let (group, end) = read_group(&chars, j, path)?;
                pattern = Some(group);
                j = end;
            }
            _ => {
                asterisk = true;
                j += 1;
            }
        }

        let modifier = if asterisk {
            None
        } else {
            chars.get(j).copied().filter(|m| matches!(m, '?' | '*' | '+'))
        };
        if modifier.is_some() {
            j += 1;
        }

        if !literal.is_empty() {
            tokens.push(Token::Literal(std::mem::take(&mut literal)));
        }
        let prefix_text = prefix.map(String::from).unwrap_or_default();
        let delimiter = prefix.unwrap_or('/');
        let next = chars.get(j).copied();
        let name = name.unwrap_or_else(|| {
            let n = unnamed.to_string();
            unnamed += 1;
            n
        });
        let pattern = match (pattern, asterisk) {
            (Some(p), _) => escape_group(&p),
            (None, true) => ".*".to_string(),
            (None, false) => format!("[^{}]+?", regex::escape(&delimiter.to_string())),
        };
        tokens.push(Token::Key(PathKey {
            name,
            partial: prefix.is_some() && next.is_some() && next != prefix,
            prefix: prefix_text,
            optional: matches!(modifier, Some('?' | '*')),
            repeat: matches!(modifier, Some('+' | '*')),
            asterisk,
            pattern,
        }));
        i = j;
    }

    if !literal.is_empty() {
        tokens.push(Token::Literal(literal));
    }
    Ok(tokens)
}

fn is_word(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn starts_key(chars: &[char], at: usize) -> bool {
    match chars.get(at) {
        Some(':') => chars.get(at + 1).is_some_and(|c| is_word(*c)),
        Some('(' | '*') => true,
        _ => false,
    }
}

/// Read a `( ... )` group starting at `open`; returns its body and the index
/// after the closing parenthesis
fn read_group(chars: &[char], open: usize, path: &str) -> MapperResult<(String, usize)> {
    let mut body = String::new();
    let mut j = open + 1;
    while j < chars.len() {
        match chars[j] {
            '\\' => {
                body.push('\\');
                if let Some(&next) = chars.get(j + 1) {
                    body.push(next);
                }
                j += 2;
            }
            ')' => {
                if body.is_empty() {
                    return Err(invalid(path, "empty group"));
                }
                return Ok((body, j + 1));
            }
            '(' => return Err(invalid(path, "capturing groups are not allowed inside a segment pattern")),
            c => {
                body.push(c);
                j += 1;
            }
        }
    }
    Err(invalid(path, "unterminated group"))
}

/// Make a custom pattern safe to embed: `$` anchors become literals
fn escape_group(group: &str) -> String {
    let mut out = String::with_capacity(group.len());
    let mut escaped = false;
    for c in group.chars() {
        if c == '$' && !escaped {
            out.push('\\');
        }
        escaped = c == '\\' && !escaped;
        out.push(c);
    }
    out
}

fn build_regex(tokens: &[Token], options: PatternOptions) -> String {
    let mut route = String::new();
    for token in tokens {
        match token {
            Token::Literal(text) => route.push_str(&regex::escape(text)),
            Token::Key(key) => {
                let prefix = regex::escape(&key.prefix);
                let mut capture = format!("(?:{})", key.pattern);
                if key.repeat {
                    capture = format!("{capture}(?:{prefix}{capture})*");
                }
                let segment = if key.optional {
                    if key.partial {
                        format!("{prefix}({capture})?")
                    } else {
                        format!("(?:{prefix}({capture}))?")
                    }
                } else {
                    format!("{prefix}({capture})")
                };
                route.push_str(&segment);
            }
        }
    }

    let ends_with_delimiter = route.ends_with('/');
    if !options.strict {
        if ends_with_delimiter {
            route.pop();
        }
        route.push_str("(?:/)?");
    }
    if options.end {
        route.push('$');
    } else if !(options.strict && ends_with_delimiter) {
        route.push_str("(?:/|$)");
    }

    let flags = if options.sensitive { "" } else { "(?i)" };
    format!("{flags}^{route}")
}

/// Percent-decoded captures; invalid encodings keep the raw text
pub fn decode_captures(captures: &ParamVec) -> impl Iterator<Item = (&str, Option<Cow<'_, str>>)> {
    captures.iter().map(|(name, raw)| {
        (
            name.as_ref(),
            raw.as_deref().map(crate::query::safe_decode),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compile(path: &str) -> PathPattern {
        PathPattern::compile(path, PatternOptions::default()).unwrap()
    }

    fn names(pattern: &PathPattern) -> Vec<&str> {
        pattern.keys().iter().map(|k| k.name.as_str()).collect()
    }

    #[test]
    fn test_named_segments() {
        let p = compile("/users/:id/posts/:post");
        assert_eq!(names(&p), vec!["id", "post"]);
        let caps = p.exec("/users/42/posts/7").unwrap();
        assert_eq!(caps[0], (Arc::from("id"), Some("42".to_string())));
        assert_eq!(caps[1], (Arc::from("post"), Some("7".to_string())));
        assert!(!p.is_match("/users/42"));
        assert!(p.is_match("/USERS/42/posts/7/"));
    }

    #[test]
    fn test_optional_segment() {
        let p = compile("/files/:name?");
        assert!(p.keys()[0].optional);
        assert!(p.is_match("/files"));
        let caps = p.exec("/files").unwrap();
        assert_eq!(caps[0].1, None);
        assert_eq!(p.url(&json!({})).unwrap(), "/files");
        assert_eq!(p.url(&json!({"name": "a b"})).unwrap(), "/files/a%20b");
    }

    #[test]
    fn test_custom_and_unnamed_patterns() {
        let p = compile("/items/:id(\\d+)/(.*)");
        assert_eq!(names(&p), vec!["id", "0"]);
        assert!(p.is_match("/items/12/x/y"));
        assert!(!p.is_match("/items/ab/x"));
        let err = p.url(&json!({"id": "ab", "0": "x"})).unwrap_err();
        assert!(matches!(err, MapperError::UrlParamMismatch { .. }));
    }

    #[test]
    fn test_strict_and_end() {
        let strict = PathPattern::compile(
            "/users/",
            PatternOptions { strict: true, ..PatternOptions::default() },
        )
        .unwrap();
        assert!(strict.is_match("/users/"));
        assert!(!strict.is_match("/users"));

        let prefix = PathPattern::compile(
            "/api",
            PatternOptions { end: false, ..PatternOptions::default() },
        )
        .unwrap();
        assert!(prefix.is_match("/api/users"));
        assert!(prefix.is_match("/api"));
        assert!(!prefix.is_match("/apiusers"));
    }

    #[test]
    fn test_case_sensitivity() {
        let sensitive = PathPattern::compile(
            "/Users",
            PatternOptions { sensitive: true, ..PatternOptions::default() },
        )
        .unwrap();
        assert!(sensitive.is_match("/Users"));
        assert!(!sensitive.is_match("/users"));
    }

    #[test]
    fn test_url_positional_and_missing() {
        let p = compile("/users/:id/posts/:post");
        assert_eq!(p.url(&json!([3, "x"])).unwrap(), "/users/3/posts/x");
        assert_eq!(
            p.url(&json!({"id": 3})).unwrap_err(),
            MapperError::MissingUrlParam("post".to_string())
        );
    }

    #[test]
    fn test_repeat_segments() {
        let p = compile("/tree/:path+");
        assert!(p.is_match("/tree/a/b/c"));
        assert_eq!(p.url(&json!({"path": ["a", "b"]})).unwrap(), "/tree/a/b");
    }

    #[test]
    fn test_doc_path() {
        assert_eq!(compile("/users/:id").doc_path(), "/users/{id}");
        assert_eq!(compile("/files/:name?").doc_path(), "/files/{name}");
        assert_eq!(compile("/a/(\\d+)").doc_path(), "/a/{0}");
    }

    #[test]
    fn test_escaped_characters_are_literal() {
        let p = compile("/time\\:now");
        assert!(p.keys().is_empty());
        assert!(p.is_match("/time:now"));
    }

    #[test]
    fn test_unterminated_group_is_rejected() {
        let err = PathPattern::compile("/a/(\\d+", PatternOptions::default()).unwrap_err();
        assert!(matches!(err, MapperError::InvalidPattern { .. }));
    }

    #[test]
    fn test_round_trip_with_encoding() {
        let p = compile("/search/:term/:page");
        let url = p.url(&json!({"term": "rust lang/ü", "page": 2})).unwrap();
        let caps = p.exec(&url).unwrap();
        let decoded: Vec<(String, String)> = decode_captures(&caps)
            .map(|(k, v)| (k.to_string(), v.unwrap_or_default().into_owned()))
            .collect();
        assert_eq!(
            decoded,
            vec![
                ("term".to_string(), "rust lang/ü".to_string()),
                ("page".to_string(), "2".to_string())
            ]
        );
    }
}
