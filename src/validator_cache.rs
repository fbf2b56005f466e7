//! # Schema Validator Cache Module
//!
//! Thread-safe cache of compiled schemas, so that routes sharing a parameter or
//! body schema compile it once.
//!
//! ## Cache Key Structure
//!
//! Cache keys are formatted as `{registry_version}:{schema_hash}`:
//! - `registry_version`: counter bumped by every schema or converter registration
//! - `schema_hash`: first 16 hex characters of the SHA-256 of the schema's JSON text
//!
//! A registry change therefore makes every older key unreachable; the registry
//! also clears the cache on change so stale entries do not pile up.
//!
//! ## Thread Safety
//!
//! `Arc<RwLock<HashMap>>`: lookups take the read lock, compilations take the
//! write lock and re-check before inserting. Compiled schemas are handed out as
//! `Arc<CompiledSchema>`.
//!
//! ## Configuration
//!
//! Disabled with `schema_cache: false` in [`crate::config::MapperConfig`] or
//! `MAPPER_SCHEMA_CACHE=off`; every compile then builds a fresh schema.

use crate::error::MapperResult;
use crate::validator::CompiledSchema;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

/// Thread-safe cache for compiled schemas
#[derive(Clone, Debug)]
pub struct ValidatorCache {
    cache: Arc<RwLock<HashMap<String, Arc<CompiledSchema>>>>,
    enabled: bool,
}

impl ValidatorCache {
    /// Create a new validator cache
    ///
    /// # Arguments
    ///
    /// * `enabled` - Whether compiled schemas are kept
    pub fn new(enabled: bool) -> Self {
        debug!(enabled = enabled, "Initializing schema validator cache");
        Self {
            cache: Arc::new(RwLock::new(HashMap::new())),
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Generate a cache key for a schema compiled at `registry_version`
    ///
    /// # Returns
    ///
    /// Cache key string in format: "{version}:{hash}"
    pub fn cache_key(registry_version: u64, schema: &Value) -> String {
        let digest = Sha256::digest(schema.to_string().as_bytes());
        let hash: String = digest
            .iter()
            .take(8)
            .map(|b| format!("{b:02x}"))
            .collect();
        format!("{registry_version}:{hash}")
    }

    /// Get a cached schema or compile and cache a new one
    ///
    /// # Arguments
    ///
    /// * `key` - Key from [`ValidatorCache::cache_key`]
    /// * `compile` - Builds the schema on a miss
    ///
    /// # Errors
    ///
    /// Whatever `compile` returns; failed compilations are not cached.
    pub fn get_or_compile<F>(&self, key: &str, compile: F) -> MapperResult<Arc<CompiledSchema>>
    where
        F: FnOnce() -> MapperResult<CompiledSchema>,
    {
        if !self.enabled {
            return compile().map(Arc::new);
        }

        {
            let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(compiled) = cache.get(key) {
                debug!(cache_key = %key, "Schema validator cache hit");
                return Ok(Arc::clone(compiled));
            }
        }

        let compiled = Arc::new(compile()?);
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = cache.get(key) {
            debug!(cache_key = %key, "Schema validator compiled by another thread");
            return Ok(Arc::clone(existing));
        }
        cache.insert(key.to_string(), Arc::clone(&compiled));
        info!(
            cache_key = %key,
            cache_size = cache.len(),
            "Schema validator compiled and cached"
        );
        Ok(compiled)
    }

    /// Number of cached schemas
    pub fn size(&self) -> usize {
        self.cache.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Drop every cached schema
    pub fn clear(&self) {
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        let cleared = cache.len();
        cache.clear();
        if cleared > 0 {
            debug!(cleared = cleared, "Schema validator cache cleared");
        }
    }
}
