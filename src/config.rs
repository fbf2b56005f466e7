//! # Mapper Configuration
//!
//! File- and environment-level configuration for a [`Mapper`](crate::Mapper).
//! [`MapperConfig`] deserializes from YAML (or JSON, which is valid YAML) and
//! converts into [`MapperOptions`]:
//!
//! ```yaml
//! prefix: /api
//! strict: false
//! sensitive: false
//! schema_cache: true
//! openapi:
//!   enabled: true
//!   url: /openapi.json
//! methods: [HEAD, OPTIONS, GET, PUT, PATCH, POST, DELETE]
//! document:
//!   info: { title: Pet Store, version: 1.0.0 }
//!   tags: [{ name: pets }]
//! ```
//!
//! ## Environment Variables
//!
//! [`MapperConfig::apply_env`] lets deployments override the file:
//!
//! - `MAPPER_PREFIX` - path prefix
//! - `MAPPER_OPENAPI_URL` - document endpoint; `off`, `false` or an empty value
//!   disable it
//! - `MAPPER_STRICT`, `MAPPER_SENSITIVE`, `MAPPER_SCHEMA_CACHE` - booleans
//!   (`1/true/yes/on` and `0/false/no/off`)

use crate::openapi::DocumentMeta;
use crate::options::{default_methods, MapperOptions};
use anyhow::{Context, Result};
use http::Method;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use tracing::warn;

/// Document endpoint settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenApiEndpoint {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_openapi_url")]
    pub url: String,
}

impl Default for OpenApiEndpoint {
    fn default() -> Self {
        Self {
            enabled: true,
            url: default_openapi_url(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_openapi_url() -> String {
    "/openapi.json".to_string()
}

fn default_method_names() -> Vec<String> {
    default_methods().iter().map(|m| m.as_str().to_string()).collect()
}

/// Serializable mapper configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapperConfig {
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "default_method_names")]
    pub methods: Vec<String>,
    #[serde(default)]
    pub strict: bool,
    #[serde(default)]
    pub sensitive: bool,
    #[serde(default = "default_true")]
    pub schema_cache: bool,
    #[serde(default)]
    pub openapi: OpenApiEndpoint,
    #[serde(default)]
    pub document: DocumentMeta,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            methods: default_method_names(),
            strict: false,
            sensitive: false,
            schema_cache: true,
            openapi: OpenApiEndpoint::default(),
            document: DocumentMeta::default(),
        }
    }
}

impl MapperConfig {
    /// Load configuration from a YAML or JSON file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not parse.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read mapper config {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse mapper config {}", path.display()))
    }

    /// Parse configuration from YAML text
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid configuration.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: MapperConfig = serde_yaml::from_str(content)?;
        Ok(config)
    }

    /// Override fields from `MAPPER_*` environment variables
    #[must_use]
    pub fn apply_env(self) -> Self {
        self.apply_vars(|name| env::var(name).ok())
    }

    /// Override fields from an arbitrary variable source
    #[must_use]
    pub fn apply_vars<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(prefix) = lookup("MAPPER_PREFIX") {
            self.prefix = prefix;
        }
        if let Some(url) = lookup("MAPPER_OPENAPI_URL") {
            let disabled = url.trim().is_empty()
                || matches!(url.trim().to_lowercase().as_str(), "off" | "false" | "none");
            if disabled {
                self.openapi.enabled = false;
            } else {
                self.openapi.enabled = true;
                self.openapi.url = url;
            }
        }
        if let Some(strict) = lookup("MAPPER_STRICT").and_then(|v| parse_bool("MAPPER_STRICT", &v)) {
            self.strict = strict;
        }
        if let Some(sensitive) =
            lookup("MAPPER_SENSITIVE").and_then(|v| parse_bool("MAPPER_SENSITIVE", &v))
        {
            self.sensitive = sensitive;
        }
        if let Some(cache) =
            lookup("MAPPER_SCHEMA_CACHE").and_then(|v| parse_bool("MAPPER_SCHEMA_CACHE", &v))
        {
            self.schema_cache = cache;
        }
        self
    }

    /// Convert into mapper options
    ///
    /// Unknown method names are skipped with a warning.
    pub fn into_options(self) -> MapperOptions {
        let methods = self
            .methods
            .iter()
            .filter_map(|name| match Method::from_bytes(name.to_uppercase().as_bytes()) {
                Ok(method) => Some(method),
                Err(_) => {
                    warn!(method = %name, "Ignoring invalid method in mapper config");
                    None
                }
            })
            .collect();
        MapperOptions {
            prefix: self.prefix,
            methods,
            strict: self.strict,
            sensitive: self.sensitive,
            openapi_url: self.openapi.enabled.then_some(self.openapi.url),
            schema_cache: self.schema_cache,
            document: self.document,
            ..MapperOptions::default()
        }
    }
}

fn parse_bool(name: &str, value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        other => {
            warn!(variable = %name, value = %other, "Ignoring non-boolean value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let options = MapperConfig::default().into_options();
        assert_eq!(options.openapi_url.as_deref(), Some("/openapi.json"));
        assert_eq!(options.methods, default_methods());
        assert!(options.schema_cache);
    }

    #[test]
    fn test_vars_override_file_values() {
        let vars: HashMap<&str, &str> = [
            ("MAPPER_PREFIX", "/v2"),
            ("MAPPER_OPENAPI_URL", "off"),
            ("MAPPER_STRICT", "yes"),
            ("MAPPER_SCHEMA_CACHE", "maybe"),
        ]
        .into_iter()
        .collect();
        let config = MapperConfig::default()
            .apply_vars(|name| vars.get(name).map(|v| v.to_string()));
        assert_eq!(config.prefix, "/v2");
        assert!(!config.openapi.enabled);
        assert!(config.strict);
        assert!(config.schema_cache);
        assert_eq!(config.into_options().openapi_url, None);
    }

    #[test]
    fn test_invalid_methods_are_skipped() {
        let config = MapperConfig {
            methods: vec!["get".into(), "NOT A METHOD".into()],
            ..MapperConfig::default()
        };
        assert_eq!(config.into_options().methods, vec![Method::GET]);
    }
}
