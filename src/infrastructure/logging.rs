//! Logging system configuration and initialization
//!
//! This module provides the logging setup for import runs:
//! - File logging with startup rotation and cleanup
//! - Configuration file based log level control
//! - Structured JSON logging (optional)
//! - Console and file output support

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use lazy_static::lazy_static;
use tracing::{info, warn};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{self, time::ChronoUtc},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

// Re-export LoggingConfig from config module
pub use crate::infrastructure::config::LoggingConfig;

const LOG_FILE_NAME: &str = "catfeed.log";
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

// Global guard to keep the log file writer alive
lazy_static! {
    static ref LOG_GUARDS: Mutex<Vec<tracing_appender::non_blocking::WorkerGuard>> =
        Mutex::new(Vec::new());
}

/// Get the log directory relative to the executable location
pub fn get_log_directory() -> PathBuf {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());

    exe_dir.join("logs")
}

/// Initialize the logging system with default configuration
pub fn init_logging() -> Result<()> {
    let config = LoggingConfig::default();
    init_logging_with_config(&config)
}

/// Rename an existing log file with its modification timestamp so each
/// run starts a fresh file.
fn rotate_existing_log_file(log_dir: &Path) -> Result<()> {
    let log_file_path = log_dir.join(LOG_FILE_NAME);

    if log_file_path.exists() {
        let metadata = std::fs::metadata(&log_file_path)
            .map_err(|e| anyhow!("Failed to get log file metadata: {e}"))?;

        let file_time = metadata
            .created()
            .or_else(|_| metadata.modified())
            .unwrap_or_else(|_| std::time::SystemTime::now());

        let datetime: chrono::DateTime<chrono::Utc> = file_time.into();
        let file_stem = LOG_FILE_NAME.trim_end_matches(".log");
        let timestamped_name = format!("{}.{}.log", file_stem, datetime.format("%Y%m%dT%H%M%S"));
        let timestamped_path = log_dir.join(&timestamped_name);

        std::fs::rename(&log_file_path, &timestamped_path).map_err(|e| {
            anyhow!(
                "Failed to rotate log file {} to {}: {e}",
                log_file_path.display(),
                timestamped_path.display()
            )
        })?;
    }

    Ok(())
}

/// Initialize logging with custom configuration
///
/// Verbose dependency targets (sqlx, reqwest, hyper, tokio) are
/// suppressed unless the configured level is `trace`. The `RUST_LOG`
/// environment variable overrides everything, e.g.
/// `RUST_LOG="debug,sqlx::query=debug"`.
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<()> {
    let log_dir = get_log_directory();

    std::fs::create_dir_all(&log_dir)
        .map_err(|e| anyhow!("Failed to create log directory {log_dir:?}: {e}"))?;

    rotate_existing_log_file(&log_dir)?;

    if config.auto_cleanup_logs {
        cleanup_old_logs(&log_dir, config)?;
    }

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut filter = EnvFilter::new(&config.level);

        if !config.level.to_lowercase().contains("trace") {
            filter = filter
                .add_directive("sqlx::query=warn".parse().unwrap())
                .add_directive("sqlx::migrate=info".parse().unwrap())
                .add_directive("sqlx::sqlite=warn".parse().unwrap())
                .add_directive("reqwest=info".parse().unwrap())
                .add_directive("hyper=warn".parse().unwrap())
                .add_directive("h2=warn".parse().unwrap())
                .add_directive("tokio=info".parse().unwrap())
                .add_directive("runtime=warn".parse().unwrap());

            for (module, level) in &config.module_filters {
                if let Ok(directive) = format!("{module}={level}").parse() {
                    filter = filter.add_directive(directive);
                }
            }
        }

        filter
    });

    let registry = Registry::default().with(env_filter);
    let timer = ChronoUtc::new(TIME_FORMAT.to_string());

    match (config.file_output, config.console_output) {
        (true, true) => {
            let file_appender = rolling::never(&log_dir, LOG_FILE_NAME);
            let (file_writer, file_guard) = non_blocking(file_appender);

            // Keep the guard alive for the lifetime of the process.
            LOG_GUARDS.lock().unwrap().push(file_guard);

            if config.json_format {
                let file_layer = fmt::Layer::new()
                    .json()
                    .with_writer(file_writer)
                    .with_timer(timer.clone())
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_ansi(false);
                let console_layer = fmt::Layer::new()
                    .with_writer(std::io::stdout)
                    .with_timer(timer)
                    .with_target(false);

                registry.with(file_layer).with(console_layer).init();
            } else {
                let file_layer = fmt::Layer::new()
                    .with_writer(file_writer)
                    .with_timer(timer.clone())
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .with_ansi(false);
                let console_layer = fmt::Layer::new()
                    .with_writer(std::io::stdout)
                    .with_timer(timer)
                    .with_target(false);

                registry.with(file_layer).with(console_layer).init();
            }
        }
        (true, false) => {
            let file_appender = rolling::never(&log_dir, LOG_FILE_NAME);
            let (file_writer, file_guard) = non_blocking(file_appender);

            LOG_GUARDS.lock().unwrap().push(file_guard);

            if config.json_format {
                let file_layer = fmt::Layer::new()
                    .json()
                    .with_writer(file_writer)
                    .with_timer(timer)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_ansi(false);

                registry.with(file_layer).init();
            } else {
                let file_layer = fmt::Layer::new()
                    .with_writer(file_writer)
                    .with_timer(timer)
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .with_ansi(false);

                registry.with(file_layer).init();
            }
        }
        (false, true) => {
            let console_layer = fmt::Layer::new()
                .with_writer(std::io::stdout)
                .with_timer(timer)
                .with_target(false);

            registry.with(console_layer).init();
        }
        (false, false) => {
            return Err(anyhow!("No logging output configured"));
        }
    }

    info!("Logging system initialized");
    info!("Log directory: {:?}", log_dir);
    info!("Log level: {}", config.level);
    if !config.level.to_lowercase().contains("trace") {
        info!("SQL and verbose logs suppressed (use TRACE level to see all logs)");
    }

    Ok(())
}

/// Log system information for diagnostics
pub fn log_system_info() {
    info!("=== catfeed system information ===");
    info!("Application version: {}", env!("CARGO_PKG_VERSION"));
    info!("Operating system: {}", std::env::consts::OS);
    info!("Architecture: {}", std::env::consts::ARCH);

    if let Ok(current_dir) = std::env::current_dir() {
        info!("Working directory: {:?}", current_dir);
    }

    info!("Log directory: {:?}", get_log_directory());
}

/// Clean up old log files based on configuration
fn cleanup_old_logs(log_dir: &Path, config: &LoggingConfig) -> Result<()> {
    if !log_dir.exists() {
        return Ok(());
    }

    let mut log_files = Vec::new();

    for entry in std::fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();

        if path.is_file()
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(".log"))
        {
            if let Ok(metadata) = entry.metadata() {
                if let Ok(modified) = metadata.modified() {
                    log_files.push((path, modified));
                }
            }
        }
    }

    // Newest first.
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    if log_files.len() > config.max_files as usize {
        let files_to_remove = log_files.len() - config.max_files as usize;
        info!(
            "Removing {} old log files (keeping {})",
            files_to_remove, config.max_files
        );

        for (path, _) in log_files.iter().skip(config.max_files as usize) {
            if let Err(e) = std::fs::remove_file(path) {
                warn!("Failed to remove old log file {:?}: {}", path, e);
            }
        }
    }

    Ok(())
}
