//! Application layer module
//!
//! Use cases on top of the domain and infrastructure layers: request
//! validation, price and stock generation, and the orchestrator that
//! drives a full import run.

pub mod import_engine;
pub mod pricing;
pub mod run_request;
pub mod stocking;

pub use import_engine::{BatchImportOrchestrator, RunOutcome};
pub use pricing::PriceBook;
pub use run_request::{
    ImportRunRequest, PriceBound, PriceRule, RequestValidationError, ValidatedImportRequest,
};
pub use stocking::{StockTiers, stock_level};
