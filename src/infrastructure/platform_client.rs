//! Commerce platform API client
//!
//! Wraps every call the import pipeline makes against the platform:
//! OAuth logins, category and brand setup, catalogs, tax configuration,
//! the import job lifecycle and the per-product fan-out calls. All
//! requests go through the shared rate-limited [`HttpClient`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use crate::domain::{ImportJobKind, ImportStatistics, SupplierBrand};
use crate::infrastructure::http_client::HttpClient;

/// Scope requested for catalog, brand and label management calls.
pub const CATALOG_SCOPE: &str = "product.product_create product.product_publish category.category_create category.category_publish category.category_update saasag.brand_manage product.product_update product.product_publish product.product_delete product.product_delete_all import.import_view import.import_manage saasag.label_manage";

/// Scope requested for the bulk import job endpoints.
pub const IMPORT_SCOPE: &str = "import.import_admin import.import_view import.import_manage";

/// Public base of the image CDN the platform serves product media from.
pub const MEDIA_CDN_BASE: &str =
    "https://res.cloudinary.com/saas-ag/image/upload/icecatimgstage/icecatproducts/";

/// Tax locations seeded on every run: (country code, standard rate,
/// reduced rate).
pub const TAX_LOCATIONS: [(&str, f64, f64); 4] = [
    ("AT", 20.0, 10.0),
    ("DE", 19.0, 7.0),
    ("CH", 7.7, 2.5),
    ("GB", 20.0, 5.0),
];

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Authentication failed for tenant '{tenant}': {reason}")]
    AuthenticationFailed { tenant: String, reason: String },

    #[error("Not authenticated for {scope} calls")]
    MissingToken { scope: &'static str },

    #[error("{endpoint} returned status {status}")]
    RequestFailed { endpoint: String, status: u16 },

    #[error("Unexpected response from {endpoint}: {reason}")]
    UnexpectedResponse { endpoint: String, reason: String },

    #[error("Import job {job_id} still processing after {seconds}s")]
    PollTimeout { job_id: String, seconds: u64 },

    #[error("Transport error: {0}")]
    Transport(#[from] anyhow::Error),
}

impl PlatformError {
    pub fn request_failed(endpoint: impl Into<String>, status: StatusCode) -> Self {
        Self::RequestFailed {
            endpoint: endpoint.into(),
            status: status.as_u16(),
        }
    }

    pub fn unexpected(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    /// Credential failures abort the whole run instead of one stage.
    pub fn is_credential(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed { .. } | Self::MissingToken { .. }
        )
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::RequestFailed { status, .. } => *status >= 500 || *status == 429,
            Self::Transport(_) => true,
            Self::AuthenticationFailed { .. }
            | Self::MissingToken { .. }
            | Self::UnexpectedResponse { .. }
            | Self::PollTimeout { .. } => false,
        }
    }
}

pub type PlatformResult<T> = Result<T, PlatformError>;

/// One line of an import job's processing log.
#[derive(Debug, Clone, Deserialize)]
pub struct ImportLogEntry {
    #[serde(rename = "logLevel")]
    pub log_level: String,
    #[serde(rename = "productId", default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ImportLogEntry {
    /// INFO lines mark records the platform accepted.
    pub fn is_success(&self) -> bool {
        self.log_level == "INFO"
    }
}

/// CDN path and platform media id derived from a gallery URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaLocation {
    pub cdn_url: String,
    pub media_id: String,
}

/// The platform media id is the gallery path after `img/` with slashes
/// folded to `~`. URLs without that segment cannot be mirrored.
pub fn media_location(original_url: &str) -> Option<MediaLocation> {
    let parsed = Url::parse(original_url).ok()?;
    let (_, image_path) = parsed.path().split_once("img/")?;
    if image_path.is_empty() {
        return None;
    }
    Some(MediaLocation {
        cdn_url: format!("{MEDIA_CDN_BASE}{image_path}"),
        media_id: image_path.replace('/', "~"),
    })
}

/// Submission metadata envelope for one import job flavor.
pub fn kind_metadata(kind: ImportJobKind) -> Value {
    match kind {
        ImportJobKind::Products => json!({"updateStrategies": {}}),
        ImportJobKind::Prices => json!({"updateStrategies": {"prices": "insert_update"}}),
        ImportJobKind::Stock => json!({"importType": "SITESTOCKLEVELS"}),
    }
}

/// Appends any of STANDARD, REDUCED and ZERO missing from a location's
/// tax classes. Returns whether anything was appended.
fn ensure_tax_classes(tax_classes: &mut Vec<Value>, standard_rate: f64, reduced_rate: f64) -> bool {
    let mut appended = false;
    let required = [
        ("STANDARD", "Standard", 0, standard_rate),
        ("REDUCED", "Reduced", 1, reduced_rate),
        ("ZERO", "Zero", 2, 0.0),
    ];
    for (code, name, order, rate) in required {
        let present = tax_classes
            .iter()
            .any(|class| class.get("code").and_then(Value::as_str) == Some(code));
        if !present {
            tax_classes.push(json!({
                "code": code,
                "name": name,
                "order": order,
                "rate": rate
            }));
            appended = true;
        }
    }
    appended
}

fn first_id(value: &Value) -> Option<String> {
    value
        .as_array()?
        .first()?
        .get("id")?
        .as_str()
        .map(str::to_string)
}

#[derive(Default)]
struct AuthTokens {
    catalog: Option<String>,
    import: Option<String>,
}

pub struct PlatformClient {
    http: Arc<HttpClient>,
    base_url: String,
    tenant: String,
    client_id: String,
    client_secret: String,
    category_api_version: String,
    content_language: String,
    tokens: RwLock<AuthTokens>,
}

impl PlatformClient {
    pub fn new(
        http: Arc<HttpClient>,
        base_url: impl Into<String>,
        tenant: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            tenant: tenant.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            category_api_version: "v2".to_string(),
            content_language: "en".to_string(),
            tokens: RwLock::new(AuthTokens::default()),
        }
    }

    pub fn with_content_language(mut self, language: impl Into<String>) -> Self {
        self.content_language = language.into();
        self
    }

    pub fn with_category_api_version(mut self, version: impl Into<String>) -> Self {
        self.category_api_version = version.into();
        self
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Canonical product URL, used as the assignment reference target.
    pub fn product_url(&self, product_id: &str) -> String {
        format!(
            "{}/product/{}/products/{product_id}",
            self.base_url, self.tenant
        )
    }

    // ---- authentication ----------------------------------------------

    /// Acquires the catalog-scope access token. Required before any
    /// category, brand, label, catalog, tax or media call.
    pub async fn login(&self) -> PlatformResult<()> {
        let token = self.request_token(CATALOG_SCOPE).await?;
        self.tokens.write().await.catalog = Some(token);
        info!(tenant = %self.tenant, "🔑 Catalog scope authenticated");
        Ok(())
    }

    /// Acquires the import-scope access token used by the job endpoints.
    pub async fn login_import(&self) -> PlatformResult<()> {
        let token = self.request_token(IMPORT_SCOPE).await?;
        self.tokens.write().await.import = Some(token);
        info!(tenant = %self.tenant, "🔑 Import scope authenticated");
        Ok(())
    }

    async fn request_token(&self, scope: &str) -> PlatformResult<String> {
        let url = format!("{}/oauth/token", self.base_url);
        let form = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "client_credentials"),
            ("scope", scope),
        ];
        let response = self
            .http
            .send(self.http.request(Method::POST, &url).form(&form))
            .await?;
        let status = response.status();
        let body: Value = response.json().await.map_err(|_| {
            PlatformError::AuthenticationFailed {
                tenant: self.tenant.clone(),
                reason: format!("token endpoint returned non-JSON body (status {status})"),
            }
        })?;
        let token = body
            .get("access_token")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| PlatformError::AuthenticationFailed {
                tenant: self.tenant.clone(),
                reason: format!("no access_token in response (status {status})"),
            })?;

        // The granted scope names the tenant the credentials belong to;
        // a mismatch means the caller pointed valid credentials at the
        // wrong tenant.
        let granted_tenant = body
            .get("scope")
            .and_then(Value::as_str)
            .and_then(|scope| scope.split_once("tenant="))
            .map(|(_, tenant)| tenant.trim());
        match granted_tenant {
            Some(granted) if granted == self.tenant => Ok(token),
            Some(granted) => Err(PlatformError::AuthenticationFailed {
                tenant: self.tenant.clone(),
                reason: format!("credentials belong to tenant '{granted}'"),
            }),
            None => Err(PlatformError::AuthenticationFailed {
                tenant: self.tenant.clone(),
                reason: "granted scope names no tenant".to_string(),
            }),
        }
    }

    async fn catalog_token(&self) -> PlatformResult<String> {
        self.tokens
            .read()
            .await
            .catalog
            .clone()
            .ok_or(PlatformError::MissingToken { scope: "catalog" })
    }

    async fn import_token(&self) -> PlatformResult<String> {
        self.tokens
            .read()
            .await
            .import
            .clone()
            .ok_or(PlatformError::MissingToken { scope: "import" })
    }

    async fn catalog_request(&self, method: Method, url: &str) -> PlatformResult<RequestBuilder> {
        let token = self.catalog_token().await?;
        Ok(self.http.request(method, url).bearer_auth(token))
    }

    async fn import_request(&self, method: Method, url: &str) -> PlatformResult<RequestBuilder> {
        let token = self.import_token().await?;
        Ok(self.http.request(method, url).bearer_auth(token))
    }

    fn with_language(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("Content-Language", &self.content_language)
            .header("X-Version", &self.category_api_version)
    }

    fn with_version(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("X-Version", &self.category_api_version)
    }

    // ---- categories --------------------------------------------------

    /// Platform id of the category carrying this external category
    /// number, when the tenant already has it.
    pub async fn find_category_by_ecn(&self, ecn: &str) -> PlatformResult<Option<String>> {
        let url = format!("{}/category/{}/categories", self.base_url, self.tenant);
        let request = self
            .catalog_request(Method::GET, &url)
            .await?
            .query(&[("ecn", ecn)]);
        let response = self.http.send(self.with_language(request)).await?;
        if !response.status().is_success() {
            return Ok(None);
        }
        let body = json_body(response, &url).await?;
        Ok(first_id(&body))
    }

    /// Creates a published category and returns its platform id. A 400
    /// response is retried once with the default `en` localization for
    /// tenants that reject the run language.
    pub async fn create_category(
        &self,
        name: &str,
        parent_id: &str,
        ecn: &str,
    ) -> PlatformResult<Option<String>> {
        let url = format!(
            "{}/category/{}/categories?publish=true",
            self.base_url, self.tenant
        );
        let body = json!({
            "localizedName": { (self.content_language.as_str()): name },
            "name": name,
            "position": null,
            "published": true,
            "parentId": parent_id,
            "ecn": [ecn]
        });
        let request = self.catalog_request(Method::POST, &url).await?.json(&body);
        let response = self.http.send(self.with_language(request)).await?;
        let status = response.status();
        let parsed = json_body(response, &url).await?;

        if let Some(id) = parsed.get("id").and_then(Value::as_str) {
            return Ok(Some(id.to_string()));
        }

        let rejected_language = status == StatusCode::BAD_REQUEST
            || parsed.get("code").and_then(Value::as_i64) == Some(400);
        if !rejected_language {
            warn!(ecn, status = %status, "Category creation rejected");
            return Ok(None);
        }

        debug!(ecn, "Retrying category creation with default localization");
        let fallback = json!({
            "localizedName": { "en": name },
            "name": name,
            "position": null,
            "published": true,
            "parentId": parent_id,
            "ecn": [ecn]
        });
        let request = self
            .catalog_request(Method::POST, &url)
            .await?
            .json(&fallback);
        let response = self.http.send(self.with_version(request)).await?;
        let parsed = json_body(response, &url).await?;
        Ok(parsed
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    /// Assigns one imported product into a platform category.
    pub async fn assign_product_to_category(
        &self,
        platform_category_id: &str,
        product_id: &str,
    ) -> PlatformResult<bool> {
        let url = format!(
            "{}/category/{}/categories/{platform_category_id}/assignments",
            self.base_url, self.tenant
        );
        let body = json!({
            "ref": {
                "id": product_id,
                "url": self.product_url(product_id),
                "type": "PRODUCT"
            }
        });
        let request = self.catalog_request(Method::POST, &url).await?.json(&body);
        let response = self.http.send(self.with_language(request)).await?;
        let status = response.status();
        // An assignment that already exists still counts.
        Ok(status.is_success() || status == StatusCode::CONFLICT)
    }

    // ---- brands and labels -------------------------------------------

    pub async fn create_brand(&self, brand: &SupplierBrand) -> PlatformResult<bool> {
        let url = format!("{}/brand/brands", self.base_url);
        let body = json!({
            "name": brand.name,
            "id": brand.id,
            "image": brand.logo_url.clone().unwrap_or_default()
        });
        let request = self.catalog_request(Method::POST, &url).await?.json(&body);
        let response = self.http.send(self.with_language(request)).await?;
        let body = json_body(response, &url).await?;
        Ok(body.get("id").is_some())
    }

    pub async fn create_label(&self, label: &Value) -> PlatformResult<bool> {
        let url = format!("{}/label/labels", self.base_url);
        let request = self.catalog_request(Method::POST, &url).await?.json(label);
        let response = self.http.send(request).await?;
        Ok(response.status().is_success())
    }

    // ---- sites and catalogs ------------------------------------------

    pub async fn list_site_codes(&self) -> PlatformResult<Vec<String>> {
        let url = format!("{}/site/{}/sites", self.base_url, self.tenant);
        let request = self.catalog_request(Method::GET, &url).await?;
        let response = self.http.send(self.with_language(request)).await?;
        let body = json_body(response, &url).await?;
        let codes = body
            .as_array()
            .map(|sites| {
                sites
                    .iter()
                    .filter_map(|site| site.get("code").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(codes)
    }

    /// Id of the catalog publishing this platform category, if any.
    pub async fn find_catalog_for_category(
        &self,
        platform_category_id: &str,
    ) -> PlatformResult<Option<String>> {
        let url = format!(
            "{}/catalog/{}/catalogs/categories/{platform_category_id}",
            self.base_url, self.tenant
        );
        let request = self.catalog_request(Method::GET, &url).await?;
        let response = self.http.send(self.with_version(request)).await?;
        if !response.status().is_success() {
            return Ok(None);
        }
        let body = json_body(response, &url).await?;
        Ok(first_id(&body))
    }

    pub async fn catalog_version(&self, catalog_id: &str) -> PlatformResult<i64> {
        let url = format!(
            "{}/catalog/{}/catalogs/{catalog_id}",
            self.base_url, self.tenant
        );
        let request = self.catalog_request(Method::GET, &url).await?;
        let response = self.http.send(self.with_version(request)).await?;
        let body = json_body(response, &url).await?;
        body.get("metadata")
            .and_then(|m| m.get("version"))
            .and_then(Value::as_i64)
            .ok_or_else(|| PlatformError::unexpected(&url, "no metadata.version"))
    }

    pub async fn update_catalog(
        &self,
        catalog_id: &str,
        name: &str,
        description: &str,
        site_codes: &[String],
        platform_category_id: &str,
        version: i64,
    ) -> PlatformResult<()> {
        let url = format!(
            "{}/catalog/{}/catalogs/{catalog_id}",
            self.base_url, self.tenant
        );
        let body = json!({
            "name": { "en": name },
            "description": { "en": description },
            "publishedSites": site_codes,
            "categoryIds": [platform_category_id],
            "metadata": { "version": version }
        });
        let request = self
            .catalog_request(Method::PATCH, &url)
            .await?
            .json(&body);
        let response = self.http.send(self.with_version(request)).await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(PlatformError::request_failed(&url, response.status()))
        }
    }

    pub async fn create_catalog(
        &self,
        name: &str,
        description: &str,
        site_codes: &[String],
        platform_category_id: &str,
    ) -> PlatformResult<bool> {
        let url = format!("{}/catalog/{}/catalogs", self.base_url, self.tenant);
        let body = json!({
            "name": { "en": name },
            "description": { "en": description },
            "visibility": { "visible": true },
            "publishedSites": site_codes,
            "categoryIds": [platform_category_id]
        });
        let request = self.catalog_request(Method::POST, &url).await?.json(&body);
        let response = self.http.send(self.with_version(request)).await?;
        let body = json_body(response, &url).await?;
        Ok(body.get("id").is_some())
    }

    // ---- tax configuration -------------------------------------------

    /// Seeds the standard tax classes for every supported location.
    /// Existing locations are only touched when a class is missing; each
    /// location is best effort.
    pub async fn configure_taxes(&self) -> PlatformResult<()> {
        for (country, standard_rate, reduced_rate) in TAX_LOCATIONS {
            if let Err(error) = self
                .configure_tax_location(country, standard_rate, reduced_rate)
                .await
            {
                if error.is_credential() {
                    return Err(error);
                }
                warn!(country, %error, "Tax configuration skipped");
            }
        }
        Ok(())
    }

    async fn configure_tax_location(
        &self,
        country: &str,
        standard_rate: f64,
        reduced_rate: f64,
    ) -> PlatformResult<()> {
        let location_url = format!("{}/tax/{}/taxes/{country}", self.base_url, self.tenant);
        let request = self.catalog_request(Method::GET, &location_url).await?;
        let response = self.http.send(request).await?;

        match response.status() {
            StatusCode::OK => {
                let body = json_body(response, &location_url).await?;
                let version = body
                    .get("metadata")
                    .and_then(|m| m.get("version"))
                    .cloned()
                    .unwrap_or(Value::Null);
                let mut tax_classes = body
                    .get("taxClasses")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                if !ensure_tax_classes(&mut tax_classes, standard_rate, reduced_rate) {
                    debug!(country, "Tax classes already complete");
                    return Ok(());
                }
                let update = json!({
                    "location": { "countryCode": country },
                    "taxClasses": tax_classes,
                    "metadata": { "version": version }
                });
                let request = self
                    .catalog_request(Method::PUT, &location_url)
                    .await?
                    .json(&update);
                let response = self.http.send(request).await?;
                if response.status().is_success() {
                    info!(country, "Tax classes completed");
                    Ok(())
                } else {
                    Err(PlatformError::request_failed(
                        &location_url,
                        response.status(),
                    ))
                }
            }
            StatusCode::NOT_FOUND => {
                let url = format!("{}/tax/{}/taxes", self.base_url, self.tenant);
                let mut tax_classes = Vec::new();
                ensure_tax_classes(&mut tax_classes, standard_rate, reduced_rate);
                let create = json!({
                    "location": { "countryCode": country },
                    "taxClasses": tax_classes
                });
                let request = self.catalog_request(Method::POST, &url).await?.json(&create);
                let response = self.http.send(request).await?;
                if response.status().is_success() {
                    info!(country, "Tax location created");
                    Ok(())
                } else {
                    Err(PlatformError::request_failed(&url, response.status()))
                }
            }
            status => Err(PlatformError::request_failed(&location_url, status)),
        }
    }

    // ---- import jobs -------------------------------------------------

    fn jobs_url(&self) -> String {
        format!("{}/import/{}/jobs", self.base_url, self.tenant)
    }

    /// Id of an already open job, if the tenant has one. Open jobs are
    /// reused instead of piling up new ones.
    pub async fn find_in_progress_job(&self) -> PlatformResult<Option<String>> {
        let url = self.jobs_url();
        let request = self.import_request(Method::GET, &url).await?;
        let response = self.http.send(request).await?;
        if !response.status().is_success() {
            return Ok(None);
        }
        let body = json_body(response, &url).await?;
        let open = body.as_array().and_then(|jobs| {
            jobs.iter().find_map(|job| {
                (job.get("status").and_then(Value::as_str) == Some("IN_PROGRESS"))
                    .then(|| job.get("id").and_then(Value::as_str).map(str::to_string))
                    .flatten()
            })
        });
        Ok(open)
    }

    pub async fn create_import_job(&self, kind: ImportJobKind) -> PlatformResult<String> {
        let url = self.jobs_url();
        let body = json!({
            "importType": kind.wire_type(),
            "timestamp": Utc::now().timestamp().to_string(),
            "updateType": "MODIFY"
        });
        let request = self.import_request(Method::POST, &url).await?.json(&body);
        let response = self.http.send(request).await?;
        let status = response.status();
        let parsed = json_body(response, &url).await?;
        parsed
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                PlatformError::unexpected(&url, format!("job creation returned status {status}"))
            })
    }

    /// Uploads one batch of records into an open import job.
    pub async fn submit_import_data(
        &self,
        job_id: &str,
        kind: ImportJobKind,
        records: &[Value],
    ) -> PlatformResult<()> {
        let url = format!("{}/{job_id}/data/{}", self.jobs_url(), kind.data_path());
        let body = json!({
            "data": records,
            "metadata": kind_metadata(kind)
        });
        let request = self.import_request(Method::POST, &url).await?.json(&body);
        let response = self.http.send(request).await?;
        if response.status().is_success() {
            debug!(job_id, records = records.len(), "Import data submitted");
            Ok(())
        } else {
            Err(PlatformError::request_failed(&url, response.status()))
        }
    }

    /// Marks the job's upload phase finished so processing starts.
    pub async fn finish_import_job(&self, job_id: &str) -> PlatformResult<()> {
        let url = format!("{}/{job_id}", self.jobs_url());
        let request = self
            .import_request(Method::PUT, &url)
            .await?
            .json(&json!({"status": "UPLOAD_FINISHED"}));
        let response = self.http.send(request).await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(PlatformError::request_failed(&url, response.status()))
        }
    }

    pub async fn fetch_import_job(&self, job_id: &str) -> PlatformResult<Value> {
        let url = format!("{}/{job_id}", self.jobs_url());
        let request = self.import_request(Method::GET, &url).await?;
        let response = self.http.send(request).await?;
        json_body(response, &url).await
    }

    /// Polls the job until its statistics section for `kind` appears.
    /// Without a timeout this polls for as long as the platform keeps
    /// processing.
    pub async fn await_statistics(
        &self,
        job_id: &str,
        kind: ImportJobKind,
        interval: Duration,
        timeout: Option<Duration>,
    ) -> PlatformResult<ImportStatistics> {
        let started = tokio::time::Instant::now();
        loop {
            let job = self.fetch_import_job(job_id).await?;
            if let Some(statistics) = kind.statistics_from(&job) {
                return Ok(statistics);
            }
            if let Some(limit) = timeout {
                if started.elapsed() >= limit {
                    return Err(PlatformError::PollTimeout {
                        job_id: job_id.to_string(),
                        seconds: limit.as_secs(),
                    });
                }
            }
            tokio::time::sleep(interval).await;
        }
    }

    pub async fn import_job_logs(&self, job_id: &str) -> PlatformResult<Vec<ImportLogEntry>> {
        let url = format!("{}/{job_id}/logs", self.jobs_url());
        let request = self.import_request(Method::GET, &url).await?;
        let response = self.http.send(request).await?;
        if !response.status().is_success() {
            return Ok(Vec::new());
        }
        let body = json_body(response, &url).await?;
        match serde_json::from_value(body) {
            Ok(entries) => Ok(entries),
            Err(error) => {
                warn!(job_id, %error, "Import job log shape not understood");
                Ok(Vec::new())
            }
        }
    }

    // ---- product media -----------------------------------------------

    /// Clears a previous upload of the same media id. Absence is fine.
    pub async fn delete_product_media(
        &self,
        product_id: &str,
        media_id: &str,
    ) -> PlatformResult<()> {
        let url = format!(
            "{}/product/{}/products/{product_id}/media/{media_id}",
            self.base_url, self.tenant
        );
        let request = self.catalog_request(Method::DELETE, &url).await?;
        let response = self.http.send(self.with_language(request)).await?;
        debug!(product_id, media_id, status = %response.status(), "Prior media cleared");
        Ok(())
    }

    pub async fn create_product_media(
        &self,
        product_id: &str,
        body: &Value,
    ) -> PlatformResult<bool> {
        let url = format!(
            "{}/product/{}/products/{product_id}/media2",
            self.base_url, self.tenant
        );
        let request = self.catalog_request(Method::POST, &url).await?.json(body);
        let response = self.http.send(self.with_language(request)).await?;
        Ok(response.status().is_success())
    }
}

async fn json_body(response: Response, endpoint: &str) -> PlatformResult<Value> {
    response
        .json()
        .await
        .map_err(|error| PlatformError::unexpected(endpoint, error.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::http_client::HttpClientConfig;

    fn test_client() -> PlatformClient {
        let http = Arc::new(HttpClient::new(HttpClientConfig::default()).unwrap());
        PlatformClient::new(http, "https://api.example.com/", "acme", "id", "secret")
    }

    #[test]
    fn base_url_and_product_url_are_normalized() {
        let client = test_client();
        assert_eq!(client.base_url(), "https://api.example.com");
        assert_eq!(
            client.product_url("p-1"),
            "https://api.example.com/product/acme/products/p-1"
        );
    }

    #[tokio::test]
    async fn calls_without_login_fail_with_missing_token() {
        let client = test_client();
        let error = client.find_category_by_ecn("151").await.unwrap_err();
        assert!(error.is_credential());
        assert!(!error.is_recoverable());
    }

    #[test]
    fn error_classification() {
        assert!(
            PlatformError::request_failed("/jobs", StatusCode::SERVICE_UNAVAILABLE)
                .is_recoverable()
        );
        assert!(
            PlatformError::request_failed("/jobs", StatusCode::TOO_MANY_REQUESTS).is_recoverable()
        );
        assert!(!PlatformError::request_failed("/jobs", StatusCode::BAD_REQUEST).is_recoverable());
        assert!(
            !PlatformError::AuthenticationFailed {
                tenant: "acme".into(),
                reason: "nope".into()
            }
            .is_recoverable()
        );
    }

    #[test]
    fn media_location_derives_cdn_url_and_id() {
        let location =
            media_location("https://images.example.com/img/norm/high/4483/1234-5678.jpg").unwrap();
        assert_eq!(
            location.cdn_url,
            format!("{MEDIA_CDN_BASE}norm/high/4483/1234-5678.jpg")
        );
        assert_eq!(location.media_id, "norm~high~4483~1234-5678.jpg");

        assert!(media_location("https://images.example.com/nope.jpg").is_none());
        assert!(media_location("https://images.example.com/img/").is_none());
        assert!(media_location("img/relative/only.jpg").is_none());
    }

    #[test]
    fn kind_metadata_shapes() {
        assert_eq!(
            kind_metadata(ImportJobKind::Products),
            serde_json::json!({"updateStrategies": {}})
        );
        assert_eq!(
            kind_metadata(ImportJobKind::Prices),
            serde_json::json!({"updateStrategies": {"prices": "insert_update"}})
        );
        assert_eq!(
            kind_metadata(ImportJobKind::Stock),
            serde_json::json!({"importType": "SITESTOCKLEVELS"})
        );
    }

    #[test]
    fn tax_classes_are_only_appended_when_missing() {
        let mut classes = vec![serde_json::json!({"code": "STANDARD", "rate": 20})];
        assert!(ensure_tax_classes(&mut classes, 20.0, 10.0));
        assert_eq!(classes.len(), 3);
        let codes: Vec<&str> = classes
            .iter()
            .map(|c| c["code"].as_str().unwrap())
            .collect();
        assert_eq!(codes, vec!["STANDARD", "REDUCED", "ZERO"]);
        assert_eq!(classes[2]["rate"], 0.0);

        // Second pass changes nothing.
        assert!(!ensure_tax_classes(&mut classes, 20.0, 10.0));
        assert_eq!(classes.len(), 3);
    }

    #[test]
    fn import_logs_classify_success_lines() {
        let raw = serde_json::json!([
            {"logLevel": "INFO", "productId": "p1", "message": "imported"},
            {"logLevel": "ERROR", "productId": "p2", "message": "bad mixin"}
        ]);
        let entries: Vec<ImportLogEntry> = serde_json::from_value(raw).unwrap();
        assert!(entries[0].is_success());
        assert!(!entries[1].is_success());
        assert_eq!(entries[1].product_id.as_deref(), Some("p2"));
    }
}
