//! Domain module - Core business entities for catalog feed imports
//!
//! This module contains the entities and value objects shared across the
//! extraction and import pipeline: catalog records, the category tree,
//! reference tables, import jobs and lifecycle events.
//!
//! Modern Rust module organization (Rust 2018+ style):
//! - Each module is its own file in the domain/ directory
//! - Public exports are defined here for convenience

pub mod catalog_record;
pub mod category;
pub mod events;
pub mod import_job;
pub mod reference;

// Re-export commonly used items for convenience
pub use catalog_record::{CatalogRecord, DetailDocument, MediaEntry, MixinValue};
pub use category::{CategoryIndex, CategoryNode, ROOT_PARENT_ID};
pub use events::LifecycleEvent;
pub use import_job::{
    ImportJobKind, ImportJobStatus, ImportStatistics, JobEvent, RunJob, RunJobStatus,
};
pub use reference::{FeatureLogoRef, LanguageRef, SupplierBrand};
