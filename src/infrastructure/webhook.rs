//! Lifecycle event delivery
//!
//! Events are posted to the configured hook URL as JSON, one request per
//! event in emission order, and mirrored into the local job store. Event
//! delivery is observability, not control flow: a failed post is logged
//! and the import carries on.

use std::sync::Arc;

use chrono::Utc;
use reqwest::Method;
use tracing::{debug, info, warn};

use crate::domain::{JobEvent, LifecycleEvent};
use crate::infrastructure::http_client::HttpClient;
use crate::infrastructure::job_store::JobStore;

pub struct WebhookNotifier {
    http: Arc<HttpClient>,
    hook_url: Option<String>,
    store: Option<Arc<JobStore>>,
}

impl WebhookNotifier {
    pub fn new(http: Arc<HttpClient>, hook_url: Option<String>) -> Self {
        Self {
            http,
            hook_url: hook_url.filter(|u| !u.is_empty()),
            store: None,
        }
    }

    /// Mirror every emitted event into the job store as well.
    pub fn with_store(mut self, store: Arc<JobStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn hook_url(&self) -> Option<&str> {
        self.hook_url.as_deref()
    }

    /// Record and deliver one lifecycle event. Never fails the caller.
    pub async fn emit(&self, event: &LifecycleEvent) {
        info!(
            event = event.event_type(),
            job_id = event.job_id(),
            "📣 Lifecycle event"
        );

        if let Some(store) = &self.store {
            let row = JobEvent {
                id: None,
                job_id: event.job_id().to_string(),
                import_job_id: event.import_job_id().map(str::to_string),
                event_type: event.event_type().to_string(),
                payload: serde_json::to_value(event).unwrap_or_default(),
                created_at: Utc::now(),
            };
            if let Err(error) = store.record_event(&row).await {
                warn!(event = event.event_type(), %error, "Event row not recorded");
            }
        }

        let Some(url) = &self.hook_url else {
            debug!(event = event.event_type(), "No hook URL configured");
            return;
        };

        let request = self.http.request(Method::POST, url).json(event);
        match self.http.send(request).await {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                warn!(
                    event = event.event_type(),
                    status = %response.status(),
                    "Hook endpoint rejected event"
                );
            }
            Err(error) => {
                warn!(event = event.event_type(), %error, "Event delivery failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::http_client::HttpClientConfig;
    use tempfile::tempdir;

    fn test_http() -> Arc<HttpClient> {
        Arc::new(HttpClient::new(HttpClientConfig::default()).unwrap())
    }

    fn sample_event() -> LifecycleEvent {
        LifecycleEvent::NumberOfProducts {
            job_id: "run-1".to_string(),
            number_of_products: 42,
        }
    }

    #[tokio::test]
    async fn emit_without_url_or_store_is_a_no_op() {
        let notifier = WebhookNotifier::new(test_http(), None);
        notifier.emit(&sample_event()).await;
        assert!(notifier.hook_url().is_none());
    }

    #[tokio::test]
    async fn empty_url_counts_as_unconfigured() {
        let notifier = WebhookNotifier::new(test_http(), Some(String::new()));
        assert!(notifier.hook_url().is_none());
    }

    #[tokio::test]
    async fn events_are_mirrored_into_the_store() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("jobs.db");
        let store = Arc::new(
            JobStore::new(&format!("sqlite://{}", db_path.display()))
                .await
                .unwrap(),
        );
        let job = crate::domain::RunJob::new("acme");
        store.insert_job(&job).await.unwrap();

        let notifier = WebhookNotifier::new(test_http(), None).with_store(Arc::clone(&store));
        let event = LifecycleEvent::ProductImportStart {
            job_id: job.id.clone(),
            import_job_id: "imp-1".to_string(),
            product_id: vec!["p1".to_string()],
        };
        notifier.emit(&event).await;

        let rows = store.events_for(&job.id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].event_type, "PRODUCT_IMPORT_START");
        assert_eq!(rows[0].import_job_id.as_deref(), Some("imp-1"));
        assert_eq!(rows[0].payload["type"], "PRODUCT_IMPORT_START");
    }

    #[tokio::test]
    async fn delivery_failures_are_swallowed() {
        // Nothing listens on the discard port; the post fails fast and
        // emit still returns.
        let notifier =
            WebhookNotifier::new(test_http(), Some("http://127.0.0.1:9/hook".to_string()));
        notifier.emit(&sample_event()).await;
    }
}
