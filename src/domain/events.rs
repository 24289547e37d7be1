//! Lifecycle events emitted during an import run
//!
//! Every event serializes with a `type` tag and a `job_id`, plus
//! stage-specific fields. The wire names mix COMPLETE and COMPLETED
//! because downstream consumers already depend on the historical
//! spelling of each stage.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum LifecycleEvent {
    #[serde(rename = "INITIAL_CONFIRM")]
    InitialConfirm {
        job_id: String,
        tenant: String,
        suppliers: Vec<String>,
        categories: Vec<String>,
    },
    #[serde(rename = "NUMBER_OF_PRODUCTS")]
    NumberOfProducts { job_id: String, number_of_products: u64 },
    #[serde(rename = "PRODUCT_IMPORT_START")]
    ProductImportStart {
        job_id: String,
        import_job_id: String,
        product_id: Vec<String>,
    },
    #[serde(rename = "PRODUCT_IMPORT_COMPLETE")]
    ProductImportComplete {
        job_id: String,
        import_job_id: String,
        number_successful_products: u64,
        number_failed_products: u64,
    },
    #[serde(rename = "ASSIGN_PRODUCTS_START")]
    AssignProductsStart { job_id: String, import_job_id: String },
    #[serde(rename = "ASSIGN_PRODUCTS_COMPLETED")]
    AssignProductsCompleted {
        job_id: String,
        import_job_id: String,
        number_successful_products: u64,
        product_id: Vec<String>,
    },
    #[serde(rename = "IMAGE_IMPORT_START")]
    ImageImportStart {
        job_id: String,
        import_job_id: String,
        product_id: Vec<String>,
    },
    #[serde(rename = "IMAGE_IMPORT_COMPLETED")]
    ImageImportCompleted {
        job_id: String,
        import_job_id: String,
        number_successful_products: u64,
        product_id: Vec<String>,
    },
    #[serde(rename = "PRICE_IMPORT_START")]
    PriceImportStart {
        job_id: String,
        import_job_id: String,
        product_id: Vec<String>,
    },
    #[serde(rename = "PRICE_IMPORT_COMPLETE")]
    PriceImportComplete {
        job_id: String,
        import_job_id: String,
        number_success_price: u64,
        number_failed_price: u64,
        product_id: Vec<String>,
    },
    #[serde(rename = "STOCK_IMPORT_START")]
    StockImportStart {
        job_id: String,
        import_job_id: String,
        product_id: Vec<String>,
    },
    #[serde(rename = "STOCK_IMPORT_COMPLETE")]
    StockImportComplete {
        job_id: String,
        import_job_id: String,
        number_successful_stock: u64,
        number_failed_stock: u64,
        product_id: Vec<String>,
    },
    #[serde(rename = "FAILED")]
    Failed {
        job_id: String,
        number_successful_products: u64,
        number_failed_products: u64,
        failed_products_list: Vec<String>,
        imported_category_list: Vec<String>,
    },
    #[serde(rename = "COMPLETED")]
    Completed {
        job_id: String,
        number_successful_products: u64,
        number_failed_products: u64,
        failed_products_list: Vec<String>,
        imported_category_list: Vec<String>,
        /// Elapsed wall time of the product upload loop, e.g. "73s".
        upload_product_time: String,
    },
}

impl LifecycleEvent {
    /// The wire tag, also used as the event type column in the job store.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::InitialConfirm { .. } => "INITIAL_CONFIRM",
            Self::NumberOfProducts { .. } => "NUMBER_OF_PRODUCTS",
            Self::ProductImportStart { .. } => "PRODUCT_IMPORT_START",
            Self::ProductImportComplete { .. } => "PRODUCT_IMPORT_COMPLETE",
            Self::AssignProductsStart { .. } => "ASSIGN_PRODUCTS_START",
            Self::AssignProductsCompleted { .. } => "ASSIGN_PRODUCTS_COMPLETED",
            Self::ImageImportStart { .. } => "IMAGE_IMPORT_START",
            Self::ImageImportCompleted { .. } => "IMAGE_IMPORT_COMPLETED",
            Self::PriceImportStart { .. } => "PRICE_IMPORT_START",
            Self::PriceImportComplete { .. } => "PRICE_IMPORT_COMPLETE",
            Self::StockImportStart { .. } => "STOCK_IMPORT_START",
            Self::StockImportComplete { .. } => "STOCK_IMPORT_COMPLETE",
            Self::Failed { .. } => "FAILED",
            Self::Completed { .. } => "COMPLETED",
        }
    }

    pub fn job_id(&self) -> &str {
        match self {
            Self::InitialConfirm { job_id, .. }
            | Self::NumberOfProducts { job_id, .. }
            | Self::ProductImportStart { job_id, .. }
            | Self::ProductImportComplete { job_id, .. }
            | Self::AssignProductsStart { job_id, .. }
            | Self::AssignProductsCompleted { job_id, .. }
            | Self::ImageImportStart { job_id, .. }
            | Self::ImageImportCompleted { job_id, .. }
            | Self::PriceImportStart { job_id, .. }
            | Self::PriceImportComplete { job_id, .. }
            | Self::StockImportStart { job_id, .. }
            | Self::StockImportComplete { job_id, .. }
            | Self::Failed { job_id, .. }
            | Self::Completed { job_id, .. } => job_id,
        }
    }

    /// Remote import job the event belongs to, when it has one.
    pub fn import_job_id(&self) -> Option<&str> {
        match self {
            Self::ProductImportStart { import_job_id, .. }
            | Self::ProductImportComplete { import_job_id, .. }
            | Self::AssignProductsStart { import_job_id, .. }
            | Self::AssignProductsCompleted { import_job_id, .. }
            | Self::ImageImportStart { import_job_id, .. }
            | Self::ImageImportCompleted { import_job_id, .. }
            | Self::PriceImportStart { import_job_id, .. }
            | Self::PriceImportComplete { import_job_id, .. }
            | Self::StockImportStart { import_job_id, .. }
            | Self::StockImportComplete { import_job_id, .. } => Some(import_job_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn initial_confirm_wire_shape() {
        let event = LifecycleEvent::InitialConfirm {
            job_id: "run-1".into(),
            tenant: "acme".into(),
            suppliers: vec!["7".into()],
            categories: vec!["151".into()],
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "type": "INITIAL_CONFIRM",
                "job_id": "run-1",
                "tenant": "acme",
                "suppliers": ["7"],
                "categories": ["151"]
            })
        );
    }

    #[test]
    fn tag_matches_event_type_helper() {
        let event = LifecycleEvent::StockImportComplete {
            job_id: "run-1".into(),
            import_job_id: "imp-9".into(),
            number_successful_stock: 12,
            number_failed_stock: 0,
            product_id: vec!["p1".into()],
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], event.event_type());
        assert_eq!(event.import_job_id(), Some("imp-9"));
    }

    #[test]
    fn run_level_events_have_no_import_job() {
        let event = LifecycleEvent::Failed {
            job_id: "run-1".into(),
            number_successful_products: 0,
            number_failed_products: 500,
            failed_products_list: vec![],
            imported_category_list: vec![],
        };
        assert_eq!(event.import_job_id(), None);
        assert_eq!(event.job_id(), "run-1");
    }
}
