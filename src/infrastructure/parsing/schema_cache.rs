//! Feature-schema cache
//!
//! Per-category feature schemas are keyed by the normalized
//! `"category-group"` slug and fetched lazily through the blob store,
//! falling back to the public schema location and writing the document
//! back into the store. Every fetched document stays cached for the
//! run; the cache is never authoritative and can be dropped and
//! rebuilt at any time.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::infrastructure::blob_store::BlobStore;
use crate::infrastructure::http_client::HttpClient;
use crate::infrastructure::parsing::error::{ExtractError, ExtractResult};

/// Normalize a category, group or feature name into its slug form.
/// The same normalization builds cache keys and external schema URLs.
pub fn normalize_slug(raw: &str) -> String {
    raw.to_lowercase()
        .chars()
        .map(|c| match c {
            ' ' | '/' | '.' | '(' | ')' => '_',
            other => other,
        })
        .collect()
}

/// A JSON-Schema-like document describing one category feature group
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeatureSchema {
    #[serde(default)]
    pub properties: HashMap<String, SchemaEntry>,
}

/// One property of a feature schema.
///
/// Entries carry either a `$ref` to a shared unit schema (atomic or
/// range) or a plain JSON type, which some schemas write as a single
/// string and some as a union list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchemaEntry {
    #[serde(rename = "$ref")]
    pub reference: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: TypeField,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TypeField {
    One(String),
    Many(Vec<String>),
}

impl Default for TypeField {
    fn default() -> Self {
        TypeField::Many(Vec::new())
    }
}

impl TypeField {
    /// The primary type of a union entry
    pub fn first(&self) -> Option<&str> {
        match self {
            TypeField::One(kind) => Some(kind),
            TypeField::Many(kinds) => kinds.first().map(String::as_str),
        }
    }
}

/// Run-scoped schema cache backed by a blob store
pub struct SchemaCache {
    store: Arc<dyn BlobStore>,
    http: Option<Arc<HttpClient>>,
    schema_dir: String,
    base_url: String,
    schemas: Mutex<HashMap<String, Arc<FeatureSchema>>>,
    fetches: AtomicU64,
}

impl SchemaCache {
    pub fn new(
        store: Arc<dyn BlobStore>,
        schema_dir: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            http: None,
            schema_dir: schema_dir.into(),
            base_url: base_url.into(),
            schemas: Mutex::new(HashMap::new()),
            fetches: AtomicU64::new(0),
        }
    }

    /// Enables fetching schemas missing from the store from their
    /// public URL. Fetched documents are written back into the store.
    pub fn with_http(mut self, http: Arc<HttpClient>) -> Self {
        self.http = Some(http);
        self
    }

    /// External URL recorded in product metadata for a schema key
    pub fn schema_url(&self, key: &str) -> String {
        format!("{}/{}.json", self.base_url.trim_end_matches('/'), key)
    }

    /// Fetch-or-reuse the schema for a slug key.
    ///
    /// The lock is held across the fetch so concurrent resolvers asking
    /// for the same key trigger a single backing-store read.
    pub async fn get(&self, key: &str) -> ExtractResult<Arc<FeatureSchema>> {
        let mut schemas = self.schemas.lock().await;
        if let Some(schema) = schemas.get(key) {
            return Ok(Arc::clone(schema));
        }

        let path = if self.schema_dir.is_empty() {
            format!("{key}.json")
        } else {
            format!("{}/{key}.json", self.schema_dir.trim_end_matches('/'))
        };

        let stored = self
            .store
            .exists(&path)
            .await
            .map_err(|error| ExtractError::schema_lookup_failed(key, error.to_string()))?;
        let bytes = if stored {
            self.store
                .get(&path)
                .await
                .map_err(|error| ExtractError::schema_lookup_failed(key, error.to_string()))?
        } else {
            let Some(http) = &self.http else {
                return Err(ExtractError::schema_lookup_failed(
                    key,
                    format!("{path} not in the schema store"),
                ));
            };
            let url = self.schema_url(key);
            let response = http
                .get(&url)
                .await
                .map_err(|error| ExtractError::schema_lookup_failed(key, error.to_string()))?;
            let bytes = response
                .bytes()
                .await
                .map_err(|error| ExtractError::schema_lookup_failed(key, error.to_string()))?
                .to_vec();
            if let Err(error) = self.store.put(&path, &bytes).await {
                warn!(key = %key, %error, "Schema write-back failed");
            }
            bytes
        };
        let schema: FeatureSchema = serde_json::from_slice(&bytes)
            .map_err(|error| ExtractError::schema_lookup_failed(key, error.to_string()))?;

        self.fetches.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, properties = schema.properties.len(), "Fetched feature schema");

        let schema = Arc::new(schema);
        schemas.insert(key.to_string(), Arc::clone(&schema));
        Ok(schema)
    }

    /// Backing-store reads performed so far (cache misses)
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::blob_store::FsBlobStore;

    const DISPLAY_SCHEMA: &str = r#"{
        "properties": {
            "display_diagonal": { "$ref": "https://schemas.example.com/atomic_uom.json" },
            "touchscreen": { "type": ["boolean", "null"] },
            "display_brand": { "type": "string" }
        }
    }"#;

    #[test]
    fn slugs_fold_case_and_separators() {
        assert_eq!(normalize_slug("Notebooks"), "notebooks");
        assert_eq!(normalize_slug("Audio/Video"), "audio_video");
        assert_eq!(normalize_slug("Ports & Interfaces (rear)"), "ports_&_interfaces__rear_");
        assert_eq!(normalize_slug("Ver. 2"), "ver__2");
    }

    #[tokio::test]
    async fn second_get_reuses_the_cached_schema() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("schemas")).unwrap();
        std::fs::write(dir.path().join("schemas/notebooks-display.json"), DISPLAY_SCHEMA).unwrap();

        let store = Arc::new(FsBlobStore::new(dir.path()));
        let cache = SchemaCache::new(store, "schemas", "https://schemas.example.com");

        let first = cache.get("notebooks-display").await.unwrap();
        let second = cache.get("notebooks-display").await.unwrap();

        assert_eq!(cache.fetch_count(), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(first.properties.contains_key("display_diagonal"));
        assert_eq!(
            first.properties["display_brand"].kind.first(),
            Some("string")
        );
    }

    #[tokio::test]
    async fn missing_schema_is_a_lookup_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FsBlobStore::new(dir.path()));
        let cache = SchemaCache::new(store, "schemas", "https://schemas.example.com");

        let error = cache.get("notebooks-unknown").await.unwrap_err();
        assert!(matches!(error, ExtractError::SchemaLookupFailed { .. }));
        assert!(error.is_recoverable());
        assert_eq!(cache.fetch_count(), 0);
    }

    #[test]
    fn schema_urls_follow_the_slug_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FsBlobStore::new(dir.path()));
        let cache = SchemaCache::new(store, "schemas", "https://schemas.example.com/");

        assert_eq!(
            cache.schema_url("notebooks-display"),
            "https://schemas.example.com/notebooks-display.json"
        );
    }
}
