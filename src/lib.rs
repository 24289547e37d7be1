//! Catfeed - streaming catalog-feed extraction and bulk-import pipeline
//!
//! Extracts product records from a gzipped vendor catalog feed, enriches
//! them with schema-typed feature data, and drives the chunked import of
//! products, category assignments, images, prices and stock levels into
//! a commerce platform tenant.

// Module declarations
pub mod application;
pub mod domain;
pub mod infrastructure;

// Re-export the run entry points for binary and integration use
pub use application::{BatchImportOrchestrator, ImportRunRequest, RunOutcome};
