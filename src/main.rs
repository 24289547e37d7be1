//! Import runner CLI
//!
//! Reads an import run request from a JSON file, wires the feed blob
//! store, job store and platform HTTP client from the application
//! config, and drives one full import run.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use catfeed::application::{BatchImportOrchestrator, ImportRunRequest};
use catfeed::infrastructure::blob_store::{BlobStore, FsBlobStore};
use catfeed::infrastructure::config::ConfigManager;
use catfeed::infrastructure::http_client::{HttpClient, HttpClientConfig};
use catfeed::infrastructure::job_store::JobStore;
use catfeed::infrastructure::logging;

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let Some(request_path) = args.next() else {
        eprintln!("Usage: catfeed <request.json> [feed-root]");
        std::process::exit(2);
    };
    let feed_root = args.next().map(PathBuf::from);

    let manager = ConfigManager::new()?;
    let config = manager.initialize_on_first_run().await?;
    logging::init_logging_with_config(&config.user.logging)?;
    logging::log_system_info();

    let raw = tokio::fs::read(&request_path)
        .await
        .with_context(|| format!("Failed to read run request: {request_path}"))?;
    let request: ImportRunRequest =
        serde_json::from_slice(&raw).context("Run request is not valid JSON")?;
    let request = request.validate()?;

    let data_dir = ConfigManager::get_app_data_dir()?;
    let feed_root = feed_root.unwrap_or_else(|| data_dir.join("feed"));
    info!(
        feed_root = %feed_root.display(),
        tenant = %request.tenant,
        "Starting import run"
    );

    let store: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(feed_root));
    let http = Arc::new(HttpClient::new(HttpClientConfig::from_advanced(
        &config.advanced,
    ))?);
    let database_url = format!("sqlite://{}", data_dir.join("catfeed.db").display());
    let jobs = Arc::new(JobStore::new(&database_url).await?);

    let orchestrator = BatchImportOrchestrator::new(config, request, store, http, jobs);
    let outcome = orchestrator.execute().await?;

    println!(
        "Run {}: {} products imported, {} failed, {} categories created",
        outcome.job_id,
        outcome.succeeded,
        outcome.failed,
        outcome.imported_categories.len()
    );
    if !outcome.completed {
        anyhow::bail!("run {} finished with failed chunks", outcome.job_id);
    }
    Ok(())
}
