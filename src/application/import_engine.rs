//! Batch import orchestration
//!
//! Drives one full import run: extract and rank the selected records
//! from the index feed, materialize their category tree, catalogs,
//! brands and labels on the platform, enrich the records with detail
//! documents, then push products, assignments, images, prices and
//! stock levels chunk by chunk through the platform's import jobs.
//! Lifecycle events are emitted at every stage boundary.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use futures::future::join_all;
use serde_json::{Map, Value, json};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::application::pricing::PriceBook;
use crate::application::run_request::ValidatedImportRequest;
use crate::application::stocking::{StockTiers, stock_level};
use crate::domain::{
    CatalogRecord, ImportJobKind, LifecycleEvent, RunJob, RunJobStatus,
};
use crate::infrastructure::blob_store::BlobStore;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::http_client::HttpClient;
use crate::infrastructure::job_store::JobStore;
use crate::infrastructure::parsing::{
    DetailDocumentParser, DetailParseContext, ExtractContext, ExtractorConfig, FilterCombinator,
    IndexExtractor, MixinResolver, SchemaCache, SelectionPolicy,
};
use crate::infrastructure::platform_client::{PlatformClient, media_location};
use crate::infrastructure::reference_loader::{ReferenceLoader, ReferenceTables};
use crate::infrastructure::webhook::WebhookNotifier;

/// Parent id the platform expects for top level categories.
const PLATFORM_ROOT_CATEGORY: &str = "root";

/// Placeholder supplier attached to every imported product.
const SAMPLE_SUPPLIER_ID: &str = "sample_supplier";

/// Validity window stamped on every generated price.
const PRICE_WINDOW_START: &str = "2021-02-10T23:00:00";
const PRICE_WINDOW_END: &str = "2039-01-01T22:59:59";

/// Fixed mixin schema references every product payload carries, on top
/// of the per product feature group schemas.
const PLATFORM_SCHEMA_REFS: [(&str, &str); 5] = [
    (
        "generalFeatures",
        "https://storage.googleapis.com/icecat_mixin/icecat_general_mixin.json",
    ),
    (
        "productCustomAttributes",
        "https://res.cloudinary.com/saas-ag/raw/upload/v1560527845/schemata/CAAS/productCustomAttributesMixIn-v40.json",
    ),
    (
        "salePricesData",
        "https://res.cloudinary.com/saas-ag/raw/upload/schemata/salePriceData.json",
    ),
    (
        "productBundle",
        "https://res.cloudinary.com/saas-ag/raw/upload/schemata/productBundleMixIn.v5.json",
    ),
    (
        "externalAttributes",
        "https://res.cloudinary.com/saas-ag/raw/upload/v1612513656/schemata/CAAS/externalAttributes-v7.json",
    ),
];

/// Result of one completed orchestration run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub job_id: String,
    pub succeeded: u64,
    pub failed: u64,
    pub failed_products: Vec<String>,
    pub imported_categories: Vec<String>,
    /// False when at least one chunk failed entirely.
    pub completed: bool,
}

/// External category ids mapped onto the tenant's category tree.
#[derive(Debug, Default)]
struct CategoryMaterialization {
    /// External id to platform id, for every category of the closure.
    platform_ids: HashMap<String, String>,
    /// External ids created during this run, in creation order.
    imported: Vec<String>,
    /// Top level external ids of the closure, in closure order.
    roots: Vec<String>,
}

/// Accumulated counters of the chunked upload loop.
#[derive(Debug, Default)]
struct BatchSummary {
    succeeded: u64,
    failed: u64,
    failed_products: Vec<String>,
    run_failed: bool,
    elapsed: Duration,
}

/// Orchestrates one import run end to end.
pub struct BatchImportOrchestrator {
    config: AppConfig,
    request: ValidatedImportRequest,
    store: Arc<dyn BlobStore>,
    http: Arc<HttpClient>,
    jobs: Arc<JobStore>,
    notifier: WebhookNotifier,
}

impl BatchImportOrchestrator {
    pub fn new(
        config: AppConfig,
        request: ValidatedImportRequest,
        store: Arc<dyn BlobStore>,
        http: Arc<HttpClient>,
        jobs: Arc<JobStore>,
    ) -> Self {
        let notifier = WebhookNotifier::new(Arc::clone(&http), request.hook_url.clone())
            .with_store(Arc::clone(&jobs));
        Self {
            config,
            request,
            store,
            http,
            jobs,
            notifier,
        }
    }

    /// Runs the import. A returned error means the run aborted; partial
    /// progress on the platform is left in place and the local run job
    /// is marked failed.
    pub async fn execute(&self) -> Result<RunOutcome> {
        if self.config.user.chunk_size == 0 {
            bail!("chunk_size must be at least 1");
        }

        let run = RunJob::new(&self.request.tenant);
        self.jobs.insert_job(&run).await?;
        info!(job_id = %run.id, tenant = %self.request.tenant, "🚀 Import run started");

        self.notifier
            .emit(&LifecycleEvent::InitialConfirm {
                job_id: run.id.clone(),
                tenant: self.request.tenant.clone(),
                suppliers: self.request.supplier_ids.clone(),
                categories: self.request.category_ids.clone(),
            })
            .await;

        match self.run_stages(&run).await {
            Ok(outcome) => Ok(outcome),
            Err(error) => {
                if let Err(store_error) =
                    self.jobs.update_status(&run.id, RunJobStatus::Failed).await
                {
                    warn!(%store_error, "Run status update failed");
                }
                Err(error)
            }
        }
    }

    async fn run_stages(&self, run: &RunJob) -> Result<RunOutcome> {
        let references = ReferenceLoader::new(
            Arc::clone(&self.store),
            self.request.language_id.clone(),
        )
        .with_files(&self.config.advanced.feed)
        .load()
        .await?;

        let content_language = match references.language(&self.request.language_id) {
            Some(language) => language.content_language(),
            None => {
                warn!(
                    language_id = %self.request.language_id,
                    "Requested language not in the reference tables, using en"
                );
                "en".to_string()
            }
        };

        let platform = Arc::new(
            PlatformClient::new(
                Arc::clone(&self.http),
                &self.config.advanced.api_base_url,
                &self.request.tenant,
                &self.request.client_id,
                &self.request.client_secret,
            )
            .with_content_language(content_language)
            .with_category_api_version(&self.config.advanced.category_api_version),
        );
        platform.login().await.context("Platform sign-in failed")?;

        // Requested categories select their whole subtree.
        let mut selected_categories: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for id in &self.request.category_ids {
            for descendant in references.categories.with_descendants(id) {
                if seen.insert(descendant.clone()) {
                    selected_categories.push(descendant);
                }
            }
        }

        let combinator =
            if !selected_categories.is_empty() && !self.request.supplier_ids.is_empty() {
                FilterCombinator::And
            } else {
                FilterCombinator::Or
            };
        let policy = SelectionPolicy::new(
            selected_categories.iter().cloned().collect(),
            self.request.supplier_ids.iter().cloned().collect(),
            combinator,
        );

        let mut records = self.extract_selected(policy, &references).await?;
        records.sort_by(|a, b| b.product_view.cmp(&a.product_view));
        // Most viewed products first; the operator ceiling backstops
        // whatever cap the request asked for. Zero means unlimited.
        let cap = match (self.request.max_products, self.config.user.max_products) {
            (0, 0) => usize::MAX,
            (0, ceiling) => ceiling,
            (asked, 0) => asked,
            (asked, ceiling) => asked.min(ceiling),
        };
        records.truncate(cap);
        info!(selected = records.len(), "Index extraction finished");

        // Products drive the category scope when no categories were
        // requested explicitly.
        let scope: Vec<String> = if selected_categories.is_empty() {
            let mut seen = HashSet::new();
            records
                .iter()
                .filter(|record| seen.insert(record.catid.clone()))
                .map(|record| record.catid.clone())
                .collect()
        } else {
            selected_categories
        };

        let categories = self
            .materialize_categories(&platform, &references, &scope)
            .await?;
        info!(
            known = categories.platform_ids.len(),
            created = categories.imported.len(),
            "Categories materialized"
        );

        self.publish_catalogs(&platform, &references, &categories)
            .await?;
        self.create_brands(&platform, &references, &records).await?;

        let records = self.enrich_with_details(&run.id, records).await?;

        self.import_labels(&platform, &references, &records).await?;
        platform.configure_taxes().await?;

        let summary = self
            .run_import_batches(run, &platform, &categories, &records)
            .await?;

        if !summary.run_failed {
            self.notifier
                .emit(&LifecycleEvent::Completed {
                    job_id: run.id.clone(),
                    number_successful_products: summary.succeeded,
                    number_failed_products: summary.failed,
                    failed_products_list: summary.failed_products.clone(),
                    imported_category_list: categories.imported.clone(),
                    upload_product_time: format!("{}s", summary.elapsed.as_secs()),
                })
                .await;
            self.jobs
                .update_status(&run.id, RunJobStatus::Completed)
                .await?;
            info!(
                job_id = %run.id,
                succeeded = summary.succeeded,
                failed = summary.failed,
                "✅ Import run completed"
            );
        }

        Ok(RunOutcome {
            job_id: run.id.clone(),
            succeeded: summary.succeeded,
            failed: summary.failed,
            failed_products: summary.failed_products,
            imported_categories: categories.imported,
            completed: !summary.run_failed,
        })
    }

    /// Streams the index feed and keeps the records the policy selects.
    async fn extract_selected(
        &self,
        policy: SelectionPolicy,
        references: &ReferenceTables,
    ) -> Result<Vec<CatalogRecord>> {
        let index_file = self.config.advanced.feed.index_file.clone();
        let reader = self.store.open(&index_file).await?;
        let gzipped = index_file.ends_with(".gz");
        let suppliers = references.suppliers.clone();

        let records = tokio::task::spawn_blocking(move || -> Result<Vec<CatalogRecord>> {
            let mut extractor =
                IndexExtractor::from_reader(reader, gzipped, ExtractorConfig::default());
            let context = ExtractContext::new(policy)
                .with_suppliers(&suppliers)
                .with_source(index_file);
            Ok(extractor.records(&context)?)
        })
        .await??;
        Ok(records)
    }

    /// Walks every selected category up to the root and creates the
    /// missing part of the chain on the tenant, parents first.
    async fn materialize_categories(
        &self,
        platform: &PlatformClient,
        references: &ReferenceTables,
        scope: &[String],
    ) -> Result<CategoryMaterialization> {
        let mut ordered: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for catid in scope {
            let chain = references.categories.ancestors_to_root(catid);
            for node in chain.iter().rev() {
                if seen.insert(node.id.clone()) {
                    ordered.push(node.id.clone());
                }
            }
        }
        anyhow::ensure!(
            !ordered.is_empty(),
            "None of the requested categories exist in the reference tables"
        );

        let mut materialization = CategoryMaterialization::default();
        for catid in &ordered {
            let Some(node) = references.categories.get(catid) else {
                continue;
            };
            if node.is_root() {
                materialization.roots.push(catid.clone());
            }

            if let Some(existing) = platform.find_category_by_ecn(catid).await? {
                debug!(catid = %catid, platform_id = %existing, "Category already on the tenant");
                materialization.platform_ids.insert(catid.clone(), existing);
                continue;
            }

            let parent_id = if node.is_root() {
                PLATFORM_ROOT_CATEGORY.to_string()
            } else {
                match materialization.platform_ids.get(&node.parent_id) {
                    Some(id) => id.clone(),
                    None => {
                        warn!(
                            catid = %catid,
                            parent = %node.parent_id,
                            "Parent category unavailable, creation skipped"
                        );
                        continue;
                    }
                }
            };

            match platform.create_category(&node.name, &parent_id, catid).await? {
                Some(platform_id) => {
                    info!(catid = %catid, platform_id = %platform_id, "Category created");
                    materialization.imported.push(catid.clone());
                    materialization
                        .platform_ids
                        .insert(catid.clone(), platform_id);
                }
                None => warn!(catid = %catid, "Category creation failed"),
            }
        }
        Ok(materialization)
    }

    /// Publishes one catalog per imported root category, reusing and
    /// version-bumping a catalog that already covers the category.
    async fn publish_catalogs(
        &self,
        platform: &PlatformClient,
        references: &ReferenceTables,
        categories: &CategoryMaterialization,
    ) -> Result<()> {
        if categories.roots.is_empty() {
            return Ok(());
        }
        let site_codes = platform.list_site_codes().await?;

        for catid in &categories.roots {
            let Some(platform_id) = categories.platform_ids.get(catid) else {
                warn!(catid = %catid, "Root category has no platform id, catalog skipped");
                continue;
            };
            let (name, description) = references
                .categories
                .get(catid)
                .map(|node| {
                    (
                        node.name.clone(),
                        node.description.clone().unwrap_or_default(),
                    )
                })
                .unwrap_or_default();

            match platform.find_catalog_for_category(platform_id).await? {
                Some(catalog_id) => {
                    let version = platform.catalog_version(&catalog_id).await?;
                    platform
                        .update_catalog(
                            &catalog_id,
                            &name,
                            &description,
                            &site_codes,
                            platform_id,
                            version,
                        )
                        .await?;
                    info!(catid = %catid, catalog_id = %catalog_id, "Catalog updated");
                }
                None => {
                    if platform
                        .create_catalog(&name, &description, &site_codes, platform_id)
                        .await?
                    {
                        info!(catid = %catid, "Catalog created");
                    } else {
                        warn!(catid = %catid, "Catalog creation rejected");
                    }
                }
            }
        }
        Ok(())
    }

    /// Registers a brand for every distinct supplier of the selection.
    async fn create_brands(
        &self,
        platform: &PlatformClient,
        references: &ReferenceTables,
        records: &[CatalogRecord],
    ) -> Result<()> {
        let mut seen = HashSet::new();
        let mut created = 0usize;
        for record in records {
            if !seen.insert(record.supplier_id.clone()) {
                continue;
            }
            let Some(brand) = references.supplier(&record.supplier_id) else {
                debug!(supplier_id = %record.supplier_id, "Supplier missing from reference tables");
                continue;
            };
            if platform.create_brand(brand).await? {
                created += 1;
            }
        }
        info!(created, "Brands registered");
        Ok(())
    }

    /// Fetches and parses the detail document of every record, with a
    /// bounded number of concurrent workers. Records whose document is
    /// missing or malformed keep their index skeleton.
    async fn enrich_with_details(
        &self,
        run_id: &str,
        records: Vec<CatalogRecord>,
    ) -> Result<Vec<CatalogRecord>> {
        self.notifier
            .emit(&LifecycleEvent::NumberOfProducts {
                job_id: run_id.to_string(),
                number_of_products: records.len() as u64,
            })
            .await;

        let feed = &self.config.advanced.feed;
        let cache = Arc::new(
            SchemaCache::new(
                Arc::clone(&self.store),
                feed.schema_dir.clone(),
                feed.schema_base_url.clone(),
            )
            .with_http(Arc::clone(&self.http)),
        );
        let resolver = Arc::new(MixinResolver::new(cache));
        let parser = Arc::new(DetailDocumentParser::new());
        let semaphore = Arc::new(Semaphore::new(
            self.config.user.workers.detail_workers.max(1),
        ));
        let details_dir = feed.details_dir.trim_end_matches('/').to_string();

        let mut handles = Vec::with_capacity(records.len());
        for record in records {
            let store = Arc::clone(&self.store);
            let parser = Arc::clone(&parser);
            let resolver = Arc::clone(&resolver);
            let semaphore = Arc::clone(&semaphore);
            let details_dir = details_dir.clone();
            handles.push(tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return record,
                };
                enrich_record(store, parser, resolver, &details_dir, record).await
            }));
        }

        let mut enriched = Vec::with_capacity(handles.len());
        for joined in join_all(handles).await {
            enriched.push(joined?);
        }
        let with_features = enriched.iter().filter(|r| r.has_mixins()).count();
        info!(products = enriched.len(), with_features, "📦 Detail documents resolved");
        Ok(enriched)
    }

    /// Creates one label per distinct feature logo matched by the
    /// selected products' features.
    async fn import_labels(
        &self,
        platform: &PlatformClient,
        references: &ReferenceTables,
        records: &[CatalogRecord],
    ) -> Result<()> {
        let mut labels: Vec<Value> = Vec::new();
        let mut seen_names: HashSet<String> = HashSet::new();
        for record in records {
            for feature_id in record.feature_ids() {
                for logo in references.logos_for(feature_id, &record.catid) {
                    let Some(name) = logo.name.as_deref() else {
                        continue;
                    };
                    if !seen_names.insert(name.to_string()) {
                        continue;
                    }
                    labels.push(json!({
                        "id": logo.id,
                        "name": name,
                        "image": logo.image_url,
                        "overlay": { "position": 0 },
                        "description": logo.description,
                    }));
                }
            }
        }
        if labels.is_empty() {
            debug!("No feature labels matched the selected products");
            return Ok(());
        }

        let mut created = 0usize;
        for label in &labels {
            if platform.create_label(label).await? {
                created += 1;
            }
        }
        info!(matched = labels.len(), created, "Labels imported");
        Ok(())
    }

    /// Uploads the records chunk by chunk and runs the per chunk follow
    /// up stages on the accepted products.
    async fn run_import_batches(
        &self,
        run: &RunJob,
        platform: &Arc<PlatformClient>,
        categories: &CategoryMaterialization,
        records: &[CatalogRecord],
    ) -> Result<BatchSummary> {
        platform.login_import().await.context("Import sign-in failed")?;

        let chunk_size = self.config.user.chunk_size;
        let interval = Duration::from_secs(self.config.user.polling.interval_secs.max(1));
        let timeout = self.config.user.polling.timeout_secs.map(Duration::from_secs);
        let site_code = self.config.user.site_code.clone();
        let price_book = PriceBook::new(self.request.price_rules.clone());
        let started = Instant::now();

        let mut summary = BatchSummary::default();

        for chunk in records.chunks(chunk_size) {
            let product_job_id = match platform.find_in_progress_job().await? {
                Some(id) => {
                    info!(import_job_id = %id, "Reusing open import job");
                    id
                }
                None => platform.create_import_job(ImportJobKind::Products).await?,
            };

            self.notifier
                .emit(&LifecycleEvent::ProductImportStart {
                    job_id: run.id.clone(),
                    import_job_id: product_job_id.clone(),
                    product_id: chunk.iter().map(|r| r.product_id.clone()).collect(),
                })
                .await;

            let mut payloads = Vec::with_capacity(chunk.len());
            for record in chunk {
                if record.has_mixins() {
                    payloads.push(product_payload(record));
                } else {
                    debug!(product_id = %record.product_id, "Record has no resolved features, skipped");
                }
            }

            platform
                .submit_import_data(&product_job_id, ImportJobKind::Products, &payloads)
                .await?;
            platform.finish_import_job(&product_job_id).await?;
            let statistics = platform
                .await_statistics(&product_job_id, ImportJobKind::Products, interval, timeout)
                .await?;
            summary.succeeded += statistics.succeeded;
            summary.failed += statistics.failed;

            self.notifier
                .emit(&LifecycleEvent::ProductImportComplete {
                    job_id: run.id.clone(),
                    import_job_id: product_job_id.clone(),
                    number_successful_products: statistics.succeeded,
                    number_failed_products: statistics.failed,
                })
                .await;

            let mut accepted_ids: Vec<String> = Vec::new();
            for entry in platform.import_job_logs(&product_job_id).await? {
                let Some(product_id) = entry.product_id.clone().filter(|id| !id.is_empty())
                else {
                    continue;
                };
                if entry.is_success() {
                    accepted_ids.push(product_id);
                } else {
                    summary.failed_products.push(product_id);
                }
            }

            if statistics.succeeded == 0 {
                warn!(import_job_id = %product_job_id, "Chunk import failed entirely, later stages skipped");
                self.notifier
                    .emit(&LifecycleEvent::Failed {
                        job_id: run.id.clone(),
                        number_successful_products: summary.succeeded,
                        number_failed_products: summary.failed,
                        failed_products_list: summary.failed_products.clone(),
                        imported_category_list: categories.imported.clone(),
                    })
                    .await;
                self.jobs.update_status(&run.id, RunJobStatus::Failed).await?;
                summary.run_failed = true;
                continue;
            }

            let accepted: Vec<&CatalogRecord> = if statistics.succeeded as usize == chunk.len() {
                chunk.iter().collect()
            } else {
                let wanted: HashSet<&str> = accepted_ids.iter().map(String::as_str).collect();
                chunk
                    .iter()
                    .filter(|record| wanted.contains(record.product_id.as_str()))
                    .collect()
            };

            self.assign_chunk(run, platform, categories, &product_job_id, &accepted)
                .await;
            self.import_chunk_images(run, platform, &product_job_id, &accepted, &accepted_ids)
                .await;

            if !price_book.is_empty() {
                self.import_chunk_prices(
                    run,
                    platform,
                    &price_book,
                    &site_code,
                    interval,
                    timeout,
                    &accepted,
                )
                .await?;
            }
            self.import_chunk_stocks(
                run,
                platform,
                &site_code,
                interval,
                timeout,
                &accepted,
                &accepted_ids,
            )
            .await?;
        }

        summary.elapsed = started.elapsed();
        Ok(summary)
    }

    /// Assigns every accepted product into its platform category, with
    /// a bounded number of concurrent API calls.
    async fn assign_chunk(
        &self,
        run: &RunJob,
        platform: &Arc<PlatformClient>,
        categories: &CategoryMaterialization,
        product_job_id: &str,
        accepted: &[&CatalogRecord],
    ) {
        self.notifier
            .emit(&LifecycleEvent::AssignProductsStart {
                job_id: run.id.clone(),
                import_job_id: product_job_id.to_string(),
            })
            .await;

        let semaphore = Arc::new(Semaphore::new(self.config.user.workers.api_workers.max(1)));
        let mut handles = Vec::new();
        for record in accepted {
            let Some(platform_category) = categories.platform_ids.get(&record.catid) else {
                warn!(
                    product_id = %record.product_id,
                    catid = %record.catid,
                    "No platform category for product, assignment skipped"
                );
                continue;
            };
            let platform = Arc::clone(platform);
            let semaphore = Arc::clone(&semaphore);
            let product_id = record.product_id.clone();
            let category_id = platform_category.clone();
            handles.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return None;
                };
                match platform
                    .assign_product_to_category(&category_id, &product_id)
                    .await
                {
                    Ok(true) => Some(product_id),
                    Ok(false) => {
                        warn!(%product_id, "Category assignment rejected");
                        None
                    }
                    Err(error) => {
                        warn!(%product_id, %error, "Category assignment failed");
                        None
                    }
                }
            }));
        }

        let assigned: Vec<String> = join_all(handles)
            .await
            .into_iter()
            .filter_map(|joined| joined.ok().flatten())
            .collect();

        self.notifier
            .emit(&LifecycleEvent::AssignProductsCompleted {
                job_id: run.id.clone(),
                import_job_id: product_job_id.to_string(),
                number_successful_products: assigned.len() as u64,
                product_id: assigned,
            })
            .await;
    }

    /// Mirrors the gallery images of every accepted product into the
    /// platform's media store. A product counts as successful when all
    /// of its selected images went through.
    async fn import_chunk_images(
        &self,
        run: &RunJob,
        platform: &Arc<PlatformClient>,
        product_job_id: &str,
        accepted: &[&CatalogRecord],
        accepted_ids: &[String],
    ) {
        self.notifier
            .emit(&LifecycleEvent::ImageImportStart {
                job_id: run.id.clone(),
                import_job_id: product_job_id.to_string(),
                product_id: accepted_ids.to_vec(),
            })
            .await;

        let semaphore = Arc::new(Semaphore::new(self.config.user.workers.api_workers.max(1)));
        let max_images = match (self.request.max_images, self.config.user.max_images) {
            (0, ceiling) => ceiling,
            (asked, 0) => asked,
            (asked, ceiling) => asked.min(ceiling),
        };
        let mut handles = Vec::new();
        for record in accepted {
            if record.media().is_empty() {
                continue;
            }
            let platform = Arc::clone(platform);
            let http = Arc::clone(&self.http);
            let semaphore = Arc::clone(&semaphore);
            let product_id = record.product_id.clone();
            let media = record.media().to_vec();
            handles.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return None;
                };
                upload_product_media(&platform, &http, product_id, &media, max_images).await
            }));
        }

        let uploaded: Vec<String> = join_all(handles)
            .await
            .into_iter()
            .filter_map(|joined| joined.ok().flatten())
            .collect();

        self.notifier
            .emit(&LifecycleEvent::ImageImportCompleted {
                job_id: run.id.clone(),
                import_job_id: product_job_id.to_string(),
                number_successful_products: uploaded.len() as u64,
                product_id: uploaded,
            })
            .await;
    }

    #[allow(clippy::too_many_arguments)]
    async fn import_chunk_prices(
        &self,
        run: &RunJob,
        platform: &PlatformClient,
        price_book: &PriceBook,
        site_code: &str,
        interval: Duration,
        timeout: Option<Duration>,
        accepted: &[&CatalogRecord],
    ) -> Result<()> {
        let price_job_id = platform.create_import_job(ImportJobKind::Prices).await?;
        let priced: Vec<String> = accepted.iter().map(|r| r.product_id.clone()).collect();

        self.notifier
            .emit(&LifecycleEvent::PriceImportStart {
                job_id: run.id.clone(),
                import_job_id: price_job_id.clone(),
                product_id: priced.clone(),
            })
            .await;

        let rows: Vec<Value> = accepted
            .iter()
            .map(|record| price_row(record, price_book, site_code))
            .collect();
        platform
            .submit_import_data(&price_job_id, ImportJobKind::Prices, &rows)
            .await?;
        platform.finish_import_job(&price_job_id).await?;
        let statistics = platform
            .await_statistics(&price_job_id, ImportJobKind::Prices, interval, timeout)
            .await?;

        self.notifier
            .emit(&LifecycleEvent::PriceImportComplete {
                job_id: run.id.clone(),
                import_job_id: price_job_id,
                number_success_price: statistics.succeeded,
                number_failed_price: statistics.failed,
                product_id: priced,
            })
            .await;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn import_chunk_stocks(
        &self,
        run: &RunJob,
        platform: &PlatformClient,
        site_code: &str,
        interval: Duration,
        timeout: Option<Duration>,
        accepted: &[&CatalogRecord],
        accepted_ids: &[String],
    ) -> Result<()> {
        let stock_job_id = platform.create_import_job(ImportJobKind::Stock).await?;

        self.notifier
            .emit(&LifecycleEvent::StockImportStart {
                job_id: run.id.clone(),
                import_job_id: stock_job_id.clone(),
                product_id: accepted_ids.to_vec(),
            })
            .await;

        let today = Utc::now().format("%Y-%m-%d").to_string();
        let rows: Vec<Value> = accepted
            .iter()
            .map(|record| stock_row(record, &self.request.stock_tiers, site_code, &today))
            .collect();
        platform
            .submit_import_data(&stock_job_id, ImportJobKind::Stock, &rows)
            .await?;
        platform.finish_import_job(&stock_job_id).await?;
        let statistics = platform
            .await_statistics(&stock_job_id, ImportJobKind::Stock, interval, timeout)
            .await?;

        self.notifier
            .emit(&LifecycleEvent::StockImportComplete {
                job_id: run.id.clone(),
                import_job_id: stock_job_id,
                number_successful_stock: statistics.succeeded,
                number_failed_stock: statistics.failed,
                product_id: accepted_ids.to_vec(),
            })
            .await;
        Ok(())
    }
}

/// Fetch, parse and resolve one record's detail document. Any failure
/// leaves the record as its index skeleton.
async fn enrich_record(
    store: Arc<dyn BlobStore>,
    parser: Arc<DetailDocumentParser>,
    resolver: Arc<MixinResolver>,
    details_dir: &str,
    record: CatalogRecord,
) -> CatalogRecord {
    let Some(file_name) = Path::new(&record.path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
    else {
        warn!(product_id = %record.product_id, path = %record.path, "Record has no detail document path");
        return record;
    };
    let blob_path = format!("{details_dir}/{file_name}");

    let bytes = match store.get(&blob_path).await {
        Ok(bytes) => bytes,
        Err(error) => {
            warn!(product_id = %record.product_id, path = %blob_path, %error, "Detail document unavailable");
            return record;
        }
    };

    let context = DetailParseContext::new(&record.product_id, &blob_path);
    let mut parsed = match parser.parse(&bytes, &context) {
        Ok(parsed) => parsed,
        Err(error) => {
            warn!(product_id = %record.product_id, %error, "Detail document parse failed");
            return record;
        }
    };

    let resolved = resolver.resolve_all(&mut parsed).await;
    debug!(product_id = %record.product_id, resolved, "Detail features resolved");
    record.with_detail(parsed.document)
}

/// Mirrors the first `max_images` gallery entries of one product into
/// the platform media store. Returns the product id when every selected
/// image went through.
async fn upload_product_media(
    platform: &PlatformClient,
    http: &HttpClient,
    product_id: String,
    media: &[crate::domain::MediaEntry],
    max_images: u32,
) -> Option<String> {
    let limit = if max_images == 0 {
        media.len()
    } else {
        media.len().min(max_images as usize)
    };

    let mut all_ok = limit > 0;
    for entry in &media[..limit] {
        if let Err(error) = mirror_media(platform, http, &product_id, entry).await {
            warn!(%product_id, position = entry.position, %error, "Media upload failed");
            all_ok = false;
        }
    }
    all_ok.then_some(product_id)
}

async fn mirror_media(
    platform: &PlatformClient,
    http: &HttpClient,
    product_id: &str,
    entry: &crate::domain::MediaEntry,
) -> Result<()> {
    let location = media_location(&entry.original_url)
        .context("Gallery URL carries no img/ segment")?;
    let content_type = http
        .head_content_type(&entry.original_url)
        .await?
        .unwrap_or_else(|| "image/jpeg".to_string());

    let body = json!({
        "url": location.cdn_url,
        "position": entry.position,
        "contentType": content_type,
        "tags": ["product"],
        "customAttributes": {
            "name": format!("image for product {product_id}"),
            "type": "image/jpeg",
            "uploadLink": location.cdn_url,
            "commitLink": "notUsing",
            "id": location.media_id
        }
    });

    platform
        .delete_product_media(product_id, &location.media_id)
        .await?;
    if platform.create_product_media(product_id, &body).await? {
        Ok(())
    } else {
        anyhow::bail!("media rejected by the platform")
    }
}

/// Builds the bulk import payload for one record.
fn product_payload(record: &CatalogRecord) -> Value {
    let detail = record.detail.as_ref();
    let description = record.description().unwrap_or_default();
    let first_ean = record
        .ean_codes()
        .first()
        .map(String::as_str)
        .unwrap_or_default();

    let mut metadata_refs = Map::new();
    if let Some(detail) = detail {
        for (group, url) in &detail.metadata_refs {
            metadata_refs.insert(group.clone(), Value::String(url.clone()));
        }
    }
    for (group, url) in PLATFORM_SCHEMA_REFS {
        metadata_refs.insert(group.to_string(), Value::String(url.to_string()));
    }

    let mut mixins = Map::new();
    if let Some(detail) = detail {
        for (group, values) in &detail.mixins {
            mixins.insert(group.clone(), json!(values));
        }
    }

    let mut custom = json!({
        "brand": record.supplier_id,
        "gtin8": first_ean,
        "longDescription": description,
    });
    if record.product_view != 0 {
        custom["popularity"] = json!(record.product_view);
    }
    mixins.insert("productCustomAttributes".to_string(), custom);

    mixins.insert(
        "externalAttributes".to_string(),
        json!({
            "acn": [{ "acn": record.catid }],
            "supplier": SAMPLE_SUPPLIER_ID,
        }),
    );

    let release_date = detail.and_then(|d| d.release_date.as_deref()).unwrap_or_default();
    let end_of_life = detail
        .and_then(|d| d.end_of_life_date.as_deref())
        .unwrap_or_default();
    let reasons = detail
        .and_then(|d| d.reasons_to_buy.as_deref())
        .unwrap_or_default();
    let bullets = detail
        .and_then(|d| d.bullet_points.as_deref())
        .unwrap_or_default();
    let manual_pdf = detail
        .and_then(|d| d.manual_pdf_url.as_deref())
        .unwrap_or_default();
    let warranty = detail
        .and_then(|d| d.warranty_info.as_deref())
        .unwrap_or_default();
    mixins.insert(
        "generalFeatures".to_string(),
        json!({
            "release_date": release_date,
            "end_of_life_date": end_of_life,
            "reasons_tobuy": reasons,
            "bullet_points": bullets,
            "manual_pdf_url": manual_pdf,
            "warranty_info": warranty,
            "on_market": record.on_market,
            "country_markets": record.country_markets,
            "ean_upc_list": record.ean_codes(),
        }),
    );

    json!({
        "name": record.display_name(),
        "code": record.product_id,
        "processMode": "MODIFY",
        "metadata": { "mixins": metadata_refs },
        "mixins": mixins,
        "description": description,
        "published": record.on_market,
        "id": record.product_id,
        "supplier": sample_supplier()
    })
}

fn sample_supplier() -> Value {
    json!({
        "id": SAMPLE_SUPPLIER_ID,
        "name": SAMPLE_SUPPLIER_ID,
        "supplierNo": SAMPLE_SUPPLIER_ID,
        "customerNo": "",
        "street": "",
        "zipCode": "",
        "city": "",
        "countryId": "",
        "contactPerson1": "",
        "phone1": "",
        "email1": "",
        "contactPerson2": "",
        "phone2": "",
        "email2": "",
        "website": "",
        "comment": "",
        "fax": "",
        "orderEmail1": "sample-suppliers@emporix.com",
        "orderEmail2": "",
        "orderChannel": ["EMAIL"],
        "orderMethod": "COLLECTED_PICKING"
    })
}

/// Builds one site price row. Products no rule matches get a zero
/// price row so the price record exists either way.
fn price_row(record: &CatalogRecord, price_book: &PriceBook, site_code: &str) -> Value {
    let price = price_book.price_for(record);
    json!({
        "prices": [{
            "type": "V1NO",
            "effectiveAmount": 1,
            "dateRange": {
                "startDate": PRICE_WINDOW_START,
                "endDate": PRICE_WINDOW_END
            },
            "basePrice": {
                "effectiveAmount": price,
                "originalAmount": price,
                "priceFactor": 1,
                "basePriceFactor": price
            },
            "presentationPrice": {
                "effectiveAmount": 1,
                "originalAmount": 1,
                "priceFactor": 1,
                "basePriceFactor": price
            },
            "originalAmount": 1,
            "currency": "EUR"
        }],
        "processMode": "MODIFY",
        "siteCode": site_code,
        "productId": record.product_id
    })
}

/// Builds one stock level row, drawing a tiered random level for
/// released products and zero for everything else.
fn stock_row(
    record: &CatalogRecord,
    tiers: &StockTiers,
    site_code: &str,
    today: &str,
) -> Value {
    json!({
        "site": site_code,
        "productId": record.product_id,
        "stockLevel": stock_level(record, tiers, today)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::application::run_request::{PriceBound, PriceRule};
    use crate::domain::{DetailDocument, MixinValue};

    fn record_with_detail() -> CatalogRecord {
        let mut mixin_group = BTreeMap::new();
        mixin_group.insert(
            "diagonal".to_string(),
            MixinValue::Measured {
                value: 39.6,
                uom: "cm".to_string(),
            },
        );
        let mut mixins = BTreeMap::new();
        mixins.insert("notebooks-display".to_string(), mixin_group);
        let mut metadata_refs = BTreeMap::new();
        metadata_refs.insert(
            "notebooks-display".to_string(),
            "https://schemas.example.com/notebooks-display.json".to_string(),
        );

        CatalogRecord {
            product_id: "1001".to_string(),
            supplier_id: "5".to_string(),
            catid: "151".to_string(),
            on_market: true,
            product_view: 141,
            country_markets: vec!["DE".to_string()],
            model_name: Some("Alpha 100".to_string()),
            detail: Some(DetailDocument {
                title: Some("Acme Alpha 100".to_string()),
                long_description: Some("A fine notebook.".to_string()),
                release_date: Some("2024-01-05".to_string()),
                ean_codes: vec!["4711".to_string(), "4712".to_string()],
                mixins,
                metadata_refs,
                ..DetailDocument::default()
            }),
            ..CatalogRecord::default()
        }
    }

    #[test]
    fn product_payload_carries_mixins_and_schema_refs() {
        let payload = product_payload(&record_with_detail());

        assert_eq!(payload["name"], "Acme Alpha 100");
        assert_eq!(payload["code"], "1001");
        assert_eq!(payload["id"], "1001");
        assert_eq!(payload["processMode"], "MODIFY");
        assert_eq!(payload["published"], true);
        assert_eq!(payload["description"], "A fine notebook.");

        let refs = &payload["metadata"]["mixins"];
        assert_eq!(
            refs["notebooks-display"],
            "https://schemas.example.com/notebooks-display.json"
        );
        for (group, url) in PLATFORM_SCHEMA_REFS {
            assert_eq!(refs[group], url);
        }

        let mixins = &payload["mixins"];
        assert_eq!(mixins["notebooks-display"]["diagonal"]["value"], 39.6);
        assert_eq!(mixins["notebooks-display"]["diagonal"]["uom"], "cm");
        assert_eq!(mixins["productCustomAttributes"]["brand"], "5");
        assert_eq!(mixins["productCustomAttributes"]["gtin8"], "4711");
        assert_eq!(mixins["productCustomAttributes"]["popularity"], 141);
        assert_eq!(mixins["externalAttributes"]["acn"][0]["acn"], "151");
        assert_eq!(mixins["externalAttributes"]["supplier"], SAMPLE_SUPPLIER_ID);
        assert_eq!(mixins["generalFeatures"]["on_market"], true);
        assert_eq!(mixins["generalFeatures"]["release_date"], "2024-01-05");
        assert_eq!(mixins["generalFeatures"]["ean_upc_list"][1], "4712");

        assert_eq!(payload["supplier"]["id"], SAMPLE_SUPPLIER_ID);
        assert_eq!(payload["supplier"]["orderChannel"][0], "EMAIL");
    }

    #[test]
    fn product_payload_omits_zero_popularity_and_uses_summary_fallback() {
        let mut record = record_with_detail();
        record.product_view = 0;
        record.on_market = false;
        if let Some(detail) = record.detail.as_mut() {
            detail.long_description = None;
            detail.long_summary = Some("Alpha 100 summary.".to_string());
        }

        let payload = product_payload(&record);
        assert!(payload["mixins"]["productCustomAttributes"]
            .get("popularity")
            .is_none());
        assert_eq!(payload["description"], "Alpha 100 summary.");
        assert_eq!(payload["published"], false);
        assert_eq!(payload["mixins"]["generalFeatures"]["on_market"], false);
    }

    #[test]
    fn price_rows_price_unmatched_products_at_zero() {
        let book = PriceBook::new(vec![PriceRule {
            category: Some("999".to_string()),
            supplier: None,
            from: PriceBound::Integer(10),
            to: PriceBound::Integer(20),
        }]);
        let row = price_row(&record_with_detail(), &book, "main");

        assert_eq!(row["productId"], "1001");
        assert_eq!(row["siteCode"], "main");
        assert_eq!(row["processMode"], "MODIFY");
        let price = &row["prices"][0];
        assert_eq!(price["type"], "V1NO");
        assert_eq!(price["currency"], "EUR");
        assert_eq!(price["basePrice"]["effectiveAmount"], 0.0);
        assert_eq!(price["basePrice"]["basePriceFactor"], 0.0);
        assert_eq!(price["presentationPrice"]["effectiveAmount"], 1);
        assert_eq!(price["dateRange"]["startDate"], PRICE_WINDOW_START);
        assert_eq!(price["dateRange"]["endDate"], PRICE_WINDOW_END);
    }

    #[test]
    fn price_rows_draw_within_a_matching_rule() {
        let book = PriceBook::new(vec![PriceRule {
            category: Some("151".to_string()),
            supplier: Some("5".to_string()),
            from: PriceBound::Integer(100),
            to: PriceBound::Integer(200),
        }]);
        let row = price_row(&record_with_detail(), &book, "main");
        let drawn = row["prices"][0]["basePrice"]["effectiveAmount"]
            .as_f64()
            .unwrap();
        assert!((100.0..=200.0).contains(&drawn));
    }

    #[test]
    fn stock_rows_follow_the_release_gate() {
        let tiers = StockTiers {
            low_max: 10,
            medium_max: 50,
            high_max: 100,
        };

        let released = record_with_detail();
        let row = stock_row(&released, &tiers, "main", "2024-06-15");
        assert_eq!(row["site"], "main");
        assert_eq!(row["productId"], "1001");
        assert!(row["stockLevel"].as_u64().unwrap() <= 100);

        let mut unreleased = record_with_detail();
        if let Some(detail) = unreleased.detail.as_mut() {
            detail.release_date = Some("2030-01-01".to_string());
        }
        let row = stock_row(&unreleased, &tiers, "main", "2024-06-15");
        assert_eq!(row["stockLevel"], 0);
    }
}
