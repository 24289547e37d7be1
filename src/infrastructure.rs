//! Infrastructure layer for feed access, parsing, and external integrations
//!
//! This module provides the blob-store feed access, streaming XML parsing,
//! commerce platform client, local job persistence and the supporting
//! configuration and logging plumbing.

pub mod blob_store;
pub mod config;  // Configuration tiers and manager
pub mod http_client;
pub mod job_store;
pub mod logging;  // Logging infrastructure
pub mod parsing;  // Streaming extraction and detail parsing
pub mod platform_client;
pub mod reference_loader;
pub mod webhook;

// Re-export commonly used items
pub use blob_store::{BlobStore, FsBlobStore};
pub use config::{AppConfig, ConfigManager};
pub use http_client::{HttpClient, HttpClientConfig};
pub use job_store::JobStore;
pub use logging::init_logging;
pub use parsing::{
    DetailDocumentParser, ExtractError, ExtractResult, IndexExtractor, MixinResolver,
    SchemaCache, SelectionPolicy,
};
pub use platform_client::{PlatformClient, PlatformError};
pub use reference_loader::{ReferenceError, ReferenceTables};
pub use webhook::WebhookNotifier;
