//! Translation of schema-engine errors into short `should ...` messages.

use super::ValidationIssue;
use jsonschema::error::{TypeKind, ValidationErrorKind};
use jsonschema::ValidationError;
use serde_json::Value;

/// Build a [`ValidationIssue`] from an engine error
///
/// `root` is the schema document the engine compiled; the failing keyword's
/// argument is looked up there through the error's schema path.
pub(crate) fn issue_from_error(err: &ValidationError<'_>, root: &Value) -> ValidationIssue {
    let field = pointer_to_field(&err.instance_path.to_string());
    let schema_path = err.schema_path.to_string();
    let keyword = schema_path.rsplit('/').next().unwrap_or_default().to_string();
    let argument = root.pointer(&schema_path);

    let message = match &err.kind {
        ValidationErrorKind::Required { property } => Some(format!(
            "should have required property '{}'",
            property.as_str().map_or_else(|| property.to_string(), str::to_string)
        )),
        ValidationErrorKind::Type { kind } => argument.map(describe_types).or_else(|| match kind {
            TypeKind::Single(ty) => Some(format!("should be {ty}")),
            TypeKind::Multiple(_) => None,
        }),
        _ => argument.and_then(|arg| keyword_message(&keyword, arg)),
    }
    .unwrap_or_else(|| err.to_string());

    ValidationIssue::new(field, keyword, message)
}

/// `/user/id` -> `user.id`
fn pointer_to_field(pointer: &str) -> String {
    pointer
        .trim_start_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| s.replace("~1", "/").replace("~0", "~"))
        .collect::<Vec<_>>()
        .join(".")
}

fn describe_types(types: &Value) -> String {
    match types {
        Value::Array(list) => format!(
            "should be {}",
            list.iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(",")
        ),
        Value::String(ty) => format!("should be {ty}"),
        other => format!("should be {other}"),
    }
}

fn keyword_message(keyword: &str, arg: &Value) -> Option<String> {
    let plural = |n: &Value, noun: &str| {
        if n.as_u64() == Some(1) {
            noun.to_string()
        } else {
            format!("{noun}s")
        }
    };
    Some(match keyword {
        "minimum" => format!("should be >= {arg}"),
        "maximum" => format!("should be <= {arg}"),
        "exclusiveMinimum" => format!("should be > {arg}"),
        "exclusiveMaximum" => format!("should be < {arg}"),
        "multipleOf" => format!("should be multiple of {arg}"),
        "minLength" => format!("should NOT be shorter than {arg} {}", plural(arg, "character")),
        "maxLength" => format!("should NOT be longer than {arg} {}", plural(arg, "character")),
        "minItems" => format!("should NOT have fewer than {arg} {}", plural(arg, "item")),
        "maxItems" => format!("should NOT have more than {arg} {}", plural(arg, "item")),
        "minProperties" => format!(
            "should NOT have fewer than {arg} {}",
            plural(arg, "property").replace("propertys", "properties")
        ),
        "maxProperties" => format!(
            "should NOT have more than {arg} {}",
            plural(arg, "property").replace("propertys", "properties")
        ),
        "pattern" => format!("should match pattern \"{}\"", arg.as_str().unwrap_or_default()),
        "format" => format!("should match format \"{}\"", arg.as_str().unwrap_or_default()),
        "enum" => "should be equal to one of the allowed values".to_string(),
        "const" => "should be equal to constant".to_string(),
        "uniqueItems" => "should NOT have duplicate items".to_string(),
        "additionalProperties" => "should NOT have additional properties".to_string(),
        "oneOf" => "should match exactly one schema in oneOf".to_string(),
        "anyOf" => "should match some schema in anyOf".to_string(),
        "not" => "should NOT be valid".to_string(),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pointer_to_field() {
        assert_eq!(pointer_to_field(""), "");
        assert_eq!(pointer_to_field("/id"), "id");
        assert_eq!(pointer_to_field("/user/tags/0"), "user.tags.0");
        assert_eq!(pointer_to_field("/a~1b"), "a/b");
    }

    #[test]
    fn test_keyword_messages() {
        assert_eq!(
            keyword_message("minimum", &json!(100)).as_deref(),
            Some("should be >= 100")
        );
        assert_eq!(
            keyword_message("maxLength", &json!(1)).as_deref(),
            Some("should NOT be longer than 1 character")
        );
        assert_eq!(
            keyword_message("minProperties", &json!(2)).as_deref(),
            Some("should NOT have fewer than 2 properties")
        );
        assert_eq!(describe_types(&json!(["number", "null"])), "should be number,null");
        assert_eq!(keyword_message("$ref", &json!("x")), None);
    }
}
