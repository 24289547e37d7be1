//! Import job tracking
//!
//! Two layers of jobs exist: remote import jobs opened on the commerce
//! platform (one per chunk and stage), and the local run job that tracks
//! one whole orchestrated import together with its lifecycle events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Stage flavor of a remote import job. Each flavor submits to its own
/// data endpoint and reports statistics under its own group key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportJobKind {
    Products,
    Prices,
    Stock,
}

impl ImportJobKind {
    /// `importType` value sent when creating a remote job.
    pub fn wire_type(&self) -> &'static str {
        match self {
            Self::Products => "PRODUCTS",
            Self::Prices => "PRICES",
            Self::Stock => "SITESTOCKLEVELS",
        }
    }

    /// Path segment of the data submission endpoint.
    pub fn data_path(&self) -> &'static str {
        match self {
            Self::Products => "products",
            Self::Prices => "siteprices",
            Self::Stock => "sitestocklevels",
        }
    }

    /// Reads the per-kind statistics counters from a remote job payload.
    /// Returns `None` until the platform has finished processing and the
    /// counters appear.
    pub fn statistics_from(&self, job: &Value) -> Option<ImportStatistics> {
        let (group, succeeded, failed) = match self {
            Self::Products => ("products", "numberOfSuccessfullyImported", "numberOfFailures"),
            Self::Prices => (
                "prices",
                "numberOfSuccessfullyImportedPrices",
                "numberOfFailedImportedPrices",
            ),
            Self::Stock => (
                "stocklevel",
                "numberOfSuccessfullyImportedStocklevels",
                "numberOfFailedImportedStocklevels",
            ),
        };
        let counters = job.get("statistics")?.get(group)?;
        let succeeded = counters.get(succeeded)?.as_u64()?;
        let failed = counters.get(failed).and_then(Value::as_u64).unwrap_or(0);
        Some(ImportStatistics { succeeded, failed })
    }
}

/// Remote import job status values, as exchanged with the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportJobStatus {
    Created,
    InProgress,
    UploadFinished,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportStatistics {
    pub succeeded: u64,
    pub failed: u64,
}

/// Status of one locally tracked import run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunJobStatus {
    InProgress,
    Completed,
    Failed,
}

impl RunJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

/// One orchestrated import run, persisted in the local job store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunJob {
    pub id: String,
    pub tenant: String,
    pub status: RunJobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunJob {
    pub fn new(tenant: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            tenant: tenant.into(),
            status: RunJobStatus::InProgress,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One lifecycle event row attached to a run job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub job_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import_job_id: Option<String>,
    pub event_type: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn product_statistics_are_read_from_job_payload() {
        let job = json!({
            "id": "j-1",
            "statistics": {
                "products": {
                    "numberOfSuccessfullyImported": 480,
                    "numberOfFailures": 20
                }
            }
        });
        let stats = ImportJobKind::Products.statistics_from(&job).unwrap();
        assert_eq!(stats.succeeded, 480);
        assert_eq!(stats.failed, 20);
    }

    #[test]
    fn statistics_are_absent_while_processing() {
        let job = json!({"id": "j-1", "status": "IN_PROGRESS"});
        assert!(ImportJobKind::Prices.statistics_from(&job).is_none());

        // Group present but counters not yet written.
        let job = json!({"statistics": {"stocklevel": {}}});
        assert!(ImportJobKind::Stock.statistics_from(&job).is_none());
    }

    #[test]
    fn stage_kinds_map_to_their_endpoints() {
        assert_eq!(ImportJobKind::Products.data_path(), "products");
        assert_eq!(ImportJobKind::Prices.data_path(), "siteprices");
        assert_eq!(ImportJobKind::Stock.data_path(), "sitestocklevels");
        assert_eq!(ImportJobKind::Stock.wire_type(), "SITESTOCKLEVELS");
    }

    #[test]
    fn job_statuses_use_wire_casing() {
        let text = serde_json::to_string(&ImportJobStatus::UploadFinished).unwrap();
        assert_eq!(text, "\"UPLOAD_FINISHED\"");
        let parsed: ImportJobStatus = serde_json::from_str("\"IN_PROGRESS\"").unwrap();
        assert_eq!(parsed, ImportJobStatus::InProgress);
    }
}
