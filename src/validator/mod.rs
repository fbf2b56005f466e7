//! # Validator Module
//!
//! Named-schema registry plus compilation of schemas into validating, coercing
//! functions.
//!
//! Compilation is two-phase: [`Validator::define`] only normalizes a declaration and
//! stores it by name (forward references are fine), while [`Validator::compile`]
//! resolves `$ref`s transitively, rejects reference cycles and hands the result to
//! the JSON Schema engine.
//!
//! A compiled schema validates in four steps:
//!
//! 1. coerce string scalars to the declared types and apply `default`s
//! 2. validate with the JSON Schema engine
//! 3. run the mapper keywords (`file`, `int32`/`int64`, date formats)
//! 4. if everything passed, apply `convert` transforms in place

mod coerce;
mod keywords;
mod messages;
mod registry;
mod resolve;

pub use keywords::{convert_builtin, UploadedFile};
pub use registry::{props_to_schema, CompiledSchema, Converter, LazyValidator, PropSpec, Validator};

use std::fmt;

/// One field-level violation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Dotted path of the offending value (`user.id`), empty for the root
    pub field: String,
    /// Schema keyword that failed (`type`, `minimum`, `required`, ...)
    pub keyword: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(
        field: impl Into<String>,
        keyword: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        ValidationIssue {
            field: field.into(),
            keyword: keyword.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.field.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "[{}] {}", self.field, self.message)
        }
    }
}
