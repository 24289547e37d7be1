//! Catalog feed parsing infrastructure
//!
//! Streaming extraction of the free-format index feed, event-driven parsing
//! of per-product detail documents and schema-backed mixin resolution.

pub mod config;
pub mod context;
pub mod detail_parser;
pub mod error;
pub mod index_extractor;
pub mod mixin_resolver;
pub mod schema_cache;

// Re-export public types
pub use config::ExtractorConfig;
pub use context::{DetailParseContext, ExtractContext, FilterCombinator, SelectionPolicy};
pub use detail_parser::{DetailDocumentParser, ParsedDetail, RawFeature};
pub use error::{ExtractError, ExtractResult};
pub use index_extractor::{ExtractedItem, IndexExtractor};
pub use mixin_resolver::MixinResolver;
pub use schema_cache::{FeatureSchema, SchemaCache, normalize_slug};
