//! Configuration infrastructure
//!
//! Contains configuration loading and management for catalog feed imports.
//!
//! Configuration is organized into three tiers:
//! 1. User-configurable settings (exposed to operators)
//! 2. Hidden/Advanced settings (in config file only)
//! 3. Application-managed settings (auto-updated by the app)

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::info;

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// User-configurable settings
    pub user: UserConfig,

    /// Hidden/Advanced settings (config file only)
    pub advanced: AdvancedConfig,

    /// Application-managed settings (auto-updated)
    pub app_managed: AppManagedConfig,
}

/// User-configurable settings that operators are expected to touch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    /// Records submitted per remote import job
    pub chunk_size: usize,

    /// Cap on records per run, applied after the product-view sort.
    /// Zero disables the cap.
    pub max_products: usize,

    /// Cap on gallery images uploaded per product. Zero means unlimited.
    pub max_images: u32,

    /// Site code used for price and stock rows
    pub site_code: String,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Worker pool sizes for the fan-out stages
    pub workers: WorkerConfig,

    /// Remote job status polling
    pub polling: PollingConfig,
}

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Concurrent detail-document fetches during enrichment
    pub detail_workers: usize,

    /// Concurrent platform API calls during sub-import fan-outs
    pub api_workers: usize,
}

/// Remote job polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Seconds between status polls of a remote import job
    pub interval_secs: u64,

    /// Optional ceiling on total polling time per job. `None` polls
    /// until the platform reports statistics.
    pub timeout_secs: Option<u64>,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted logs
    pub json_format: bool,

    /// Enable console output
    pub console_output: bool,

    /// Enable file output
    pub file_output: bool,

    /// Number of log files to keep (older files will be deleted)
    pub max_files: u32,

    /// Enable automatic log cleanup on startup
    pub auto_cleanup_logs: bool,

    /// Module-specific log level filters (e.g., "sqlx": "warn")
    pub module_filters: HashMap<String, String>,
}

/// Hidden/Advanced settings that are in the config file but rarely edited
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedConfig {
    /// Base URL of the commerce platform API
    pub api_base_url: String,

    /// Value of the X-Version header on category endpoints
    pub category_api_version: String,

    /// Timeout for HTTP requests in seconds
    pub request_timeout_seconds: u64,

    /// Platform API rate limit
    pub max_requests_per_second: u32,

    /// Retry attempts for failed requests
    pub retry_attempts: u32,

    /// Retry delay in milliseconds
    pub retry_delay_ms: u64,

    /// Feed layout inside the blob store
    pub feed: FeedConfig,
}

/// Where the feed files live inside the blob store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Index document listing all products
    pub index_file: String,

    /// Directory holding per-product detail documents
    pub details_dir: String,

    /// Supplier reference file
    pub suppliers_file: String,

    /// Category reference file
    pub categories_file: String,

    /// Language reference file
    pub languages_file: String,

    /// Feature logo reference file
    pub feature_logos_file: String,

    /// Directory holding generated feature-group schemas
    pub schema_dir: String,

    /// Public base URL recorded in payload metadata for each schema
    pub schema_base_url: String,
}

/// Application-managed settings that are automatically updated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppManagedConfig {
    /// Timestamp of the last completed run
    pub last_successful_run: Option<String>,

    /// Products imported by the last completed run
    pub last_run_product_count: Option<u32>,

    /// Configuration version for migration purposes
    pub config_version: u32,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            chunk_size: defaults::CHUNK_SIZE,
            max_products: defaults::MAX_PRODUCTS,
            max_images: defaults::MAX_IMAGES,
            site_code: defaults::SITE_CODE.to_string(),
            logging: LoggingConfig::default(),
            workers: WorkerConfig::default(),
            polling: PollingConfig::default(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            detail_workers: defaults::DETAIL_WORKERS,
            api_workers: defaults::API_WORKERS,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: defaults::POLL_INTERVAL_SECS,
            timeout_secs: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: defaults::LOG_JSON_FORMAT,
            console_output: defaults::LOG_CONSOLE_OUTPUT,
            file_output: defaults::LOG_FILE_OUTPUT,
            max_files: defaults::LOG_MAX_FILES,
            auto_cleanup_logs: defaults::LOG_AUTO_CLEANUP,
            module_filters: {
                let mut filters = HashMap::new();
                filters.insert("sqlx".to_string(), "warn".to_string());
                filters.insert("reqwest".to_string(), "info".to_string());
                filters.insert("hyper".to_string(), "warn".to_string());
                filters.insert("tokio".to_string(), "info".to_string());
                filters.insert("catfeed".to_string(), "info".to_string());
                filters
            },
        }
    }
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            api_base_url: defaults::API_BASE_URL.to_string(),
            category_api_version: defaults::CATEGORY_API_VERSION.to_string(),
            request_timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
            max_requests_per_second: defaults::MAX_REQUESTS_PER_SECOND,
            retry_attempts: defaults::RETRY_ATTEMPTS,
            retry_delay_ms: defaults::RETRY_DELAY_MS,
            feed: FeedConfig::default(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            index_file: defaults::FEED_INDEX_FILE.to_string(),
            details_dir: defaults::FEED_DETAILS_DIR.to_string(),
            suppliers_file: defaults::FEED_SUPPLIERS_FILE.to_string(),
            categories_file: defaults::FEED_CATEGORIES_FILE.to_string(),
            languages_file: defaults::FEED_LANGUAGES_FILE.to_string(),
            feature_logos_file: defaults::FEED_FEATURE_LOGOS_FILE.to_string(),
            schema_dir: defaults::FEED_SCHEMA_DIR.to_string(),
            schema_base_url: defaults::SCHEMA_BASE_URL.to_string(),
        }
    }
}

impl Default for AppManagedConfig {
    fn default() -> Self {
        Self {
            last_successful_run: None,
            last_run_product_count: None,
            config_version: 1,
        }
    }
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    pub config_path: PathBuf,
}

impl ConfigManager {
    /// Get the application configuration directory
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join("catfeed");

        Ok(config_dir)
    }

    /// Create a new configuration manager with the default config path
    pub fn new() -> Result<Self> {
        let config_dir = Self::get_config_dir()?;
        let config_path = config_dir.join("catfeed_config.json");

        Ok(Self { config_path })
    }

    /// Create a manager reading from an explicit path
    pub fn with_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    /// Initialize configuration system on first run
    pub async fn initialize_on_first_run(&self) -> Result<AppConfig> {
        let config_dir = self
            .config_path
            .parent()
            .context("Failed to get config directory")?;

        if !config_dir.exists() {
            fs::create_dir_all(config_dir)
                .await
                .context("Failed to create config directory")?;
            info!("✅ Created configuration directory: {:?}", config_dir);
        }

        let is_first_run = !self.config_path.exists();

        if is_first_run {
            info!("🎉 First run detected - initializing default configuration");

            let default_config = AppConfig::default();
            self.save_config(&default_config).await?;
            self.create_data_directories().await?;

            info!("✅ Initial configuration setup completed");
            Ok(default_config)
        } else {
            self.load_config().await
        }
    }

    /// Create necessary data directories
    async fn create_data_directories(&self) -> Result<()> {
        let app_data_dir = Self::get_app_data_dir()?;

        let directories = [
            app_data_dir.join("database"),
            app_data_dir.join("logs"),
            app_data_dir.join("feed"),
            app_data_dir.join("cache"),
        ];

        for dir in &directories {
            if !dir.exists() {
                fs::create_dir_all(dir)
                    .await
                    .with_context(|| format!("Failed to create directory: {dir:?}"))?;
                info!("📁 Created directory: {:?}", dir);
            }
        }

        Ok(())
    }

    /// Get application data directory
    pub fn get_app_data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .context("Failed to get user data directory")?
            .join("catfeed");

        Ok(data_dir)
    }

    /// Load configuration from file, creating default if it doesn't exist
    pub async fn load_config(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            info!(
                "Configuration file not found, creating default: {:?}",
                self.config_path
            );
            let default_config = AppConfig::default();
            self.save_config(&default_config).await?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(&self.config_path)
            .await
            .context("Failed to read configuration file")?;

        match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => {
                info!("Loaded configuration from: {:?}", self.config_path);
                Ok(config)
            }
            Err(parse_error) => {
                tracing::warn!("⚠️  Configuration file unreadable: {}", parse_error);
                tracing::warn!("⚠️  Resetting to default configuration");

                // Keep the unreadable file around for inspection.
                let backup_path = self.config_path.with_extension("json.corrupted");
                if let Err(e) = fs::copy(&self.config_path, &backup_path).await {
                    tracing::warn!("Failed to create backup of corrupted config: {}", e);
                } else {
                    tracing::info!("Backed up corrupted config to: {:?}", backup_path);
                }

                let default_config = AppConfig::default();
                self.save_config(&default_config)
                    .await
                    .context("Failed to save default configuration")?;

                tracing::info!("✅ Reset to default configuration");
                Ok(default_config)
            }
        }
    }

    /// Save configuration to file
    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        let content =
            serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;

        fs::write(&self.config_path, content)
            .await
            .context("Failed to write configuration file")?;

        info!("Saved configuration to: {:?}", self.config_path);
        Ok(())
    }

    /// Update app-managed settings (like the last successful run)
    pub async fn update_app_managed<F>(&self, updater: F) -> Result<()>
    where
        F: FnOnce(&mut AppManagedConfig),
    {
        let mut config = self.load_config().await?;
        updater(&mut config.app_managed);
        self.save_config(&config).await
    }

    /// Update user configuration settings
    pub async fn update_user_config<F>(&self, updater: F) -> Result<()>
    where
        F: FnOnce(&mut UserConfig),
    {
        let mut config = self.load_config().await?;
        updater(&mut config.user);
        self.save_config(&config).await
    }

    /// Get the configuration file path
    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }
}

/// Default configuration values
pub mod defaults {
    /// Default records per remote import job
    pub const CHUNK_SIZE: usize = 500;

    /// Default cap on records per run
    pub const MAX_PRODUCTS: usize = 1000;

    /// Default cap on images per product
    pub const MAX_IMAGES: u32 = 1;

    /// Default site code for price and stock rows
    pub const SITE_CODE: &str = "main";

    /// Default concurrent detail-document fetches
    pub const DETAIL_WORKERS: usize = 10;

    /// Default concurrent platform API calls
    pub const API_WORKERS: usize = 5;

    /// Default seconds between remote job status polls
    pub const POLL_INTERVAL_SECS: u64 = 1;

    /// Default platform API base URL
    pub const API_BASE_URL: &str = "https://api.emporix.io";

    /// Default category API version header
    pub const CATEGORY_API_VERSION: &str = "v2";

    /// Default request timeout in seconds
    pub const REQUEST_TIMEOUT_SECONDS: u64 = 30;

    /// Default platform API rate limit
    pub const MAX_REQUESTS_PER_SECOND: u32 = 20;

    /// Default retry attempts for failed requests
    pub const RETRY_ATTEMPTS: u32 = 3;

    /// Default retry delay in milliseconds
    pub const RETRY_DELAY_MS: u64 = 2000;

    /// Default feed index document
    pub const FEED_INDEX_FILE: &str = "files.index.xml.gz";

    /// Default directory of per-product detail documents
    pub const FEED_DETAILS_DIR: &str = "details";

    /// Default supplier reference file
    pub const FEED_SUPPLIERS_FILE: &str = "SuppliersList.xml.gz";

    /// Default category reference file
    pub const FEED_CATEGORIES_FILE: &str = "CategoriesList.xml.gz";

    /// Default language reference file
    pub const FEED_LANGUAGES_FILE: &str = "LanguageList.xml.gz";

    /// Default feature logo reference file
    pub const FEED_FEATURE_LOGOS_FILE: &str = "FeatureLogosList.xml.gz";

    /// Default schema directory inside the blob store
    pub const FEED_SCHEMA_DIR: &str = "schemas";

    /// Default public base URL for schema references
    pub const SCHEMA_BASE_URL: &str = "https://storage.googleapis.com/catfeed-schemas";

    // Log configuration defaults
    /// Default log level
    pub const LOG_LEVEL: &str = "info";

    /// Default JSON format setting
    pub const LOG_JSON_FORMAT: bool = false;

    /// Default console output setting
    pub const LOG_CONSOLE_OUTPUT: bool = true;

    /// Default file output setting
    pub const LOG_FILE_OUTPUT: bool = true;

    /// Default maximum log files to keep
    pub const LOG_MAX_FILES: u32 = 5;

    /// Default auto cleanup logs setting
    pub const LOG_AUTO_CLEANUP: bool = true;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_config_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("catfeed_config.json"));

        let config = manager.load_config().await.unwrap();
        assert_eq!(config.user.chunk_size, defaults::CHUNK_SIZE);
        assert!(manager.config_path().exists());
    }

    #[tokio::test]
    async fn saved_config_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("catfeed_config.json"));

        let mut config = AppConfig::default();
        config.user.chunk_size = 42;
        config.user.polling.timeout_secs = Some(900);
        manager.save_config(&config).await.unwrap();

        let loaded = manager.load_config().await.unwrap();
        assert_eq!(loaded.user.chunk_size, 42);
        assert_eq!(loaded.user.polling.timeout_secs, Some(900));
    }

    #[tokio::test]
    async fn corrupted_config_is_backed_up_and_reset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catfeed_config.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let manager = ConfigManager::with_path(&path);
        let config = manager.load_config().await.unwrap();

        assert_eq!(config.user.chunk_size, defaults::CHUNK_SIZE);
        assert!(path.with_extension("json.corrupted").exists());
    }
}
