//! Configuration management for the harvester using the prefer crate.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::rate_limit::{RouteLimits, ThrottleConfig};
use crate::scheduler::RetryPolicy;

/// Default database filename.
const DEFAULT_DATABASE_FILENAME: &str = "harvest.db";

/// Name used for config discovery and the default data directory.
const APP_NAME: &str = "cocktail-harvest";

/// Desktop browser user agent; several recipe publishers serve stripped pages to bots.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database filename.
    pub database_filename: String,
    /// Database URL (overrides data_dir/database_filename if set).
    pub database_url: Option<String>,
    /// User agent for HTTP requests.
    pub user_agent: String,
    /// Fetch timeout in seconds. Always applied.
    pub request_timeout: u64,
    /// Retry schedule for failed jobs.
    pub retry: RetryPolicy,
    /// Caller-facing per-minute limits.
    pub rate_limits: RouteLimits,
    /// Per-destination-domain fetch throttle.
    pub throttle: ThrottleConfig,
    /// Concurrent jobs per sweep.
    pub workers: usize,
    /// Seconds between daemon sweeps.
    pub sweep_interval_secs: u64,
    /// Shared secret identifying trusted internal callers.
    pub internal_token: Option<String>,
    /// Number of most recent jobs considered by telemetry.
    pub telemetry_window_jobs: i64,
    /// Minimum jobs before calibration produces numbers.
    pub calibration_min_jobs: i64,
    /// Multiplier applied over observed rates during calibration.
    pub calibration_buffer_multiplier: f64,
}

impl Default for Settings {
    fn default() -> Self {
        // Data dir -> Home dir -> Current dir
        let data_dir = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_NAME);

        Self {
            data_dir,
            database_filename: DEFAULT_DATABASE_FILENAME.to_string(),
            database_url: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout: 12,
            retry: RetryPolicy::default(),
            rate_limits: RouteLimits::default(),
            throttle: ThrottleConfig::default(),
            workers: 4,
            sweep_interval_secs: 60,
            internal_token: None,
            telemetry_window_jobs: 2000,
            calibration_min_jobs: 20,
            calibration_buffer_multiplier: 1.25,
        }
    }
}

impl Settings {
    /// Create settings with a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            ..Default::default()
        }
    }

    /// Get the database URL, constructing from path if not explicitly set.
    pub fn database_url(&self) -> String {
        if let Some(ref url) = self.database_url {
            url.clone()
        } else {
            format!("sqlite:{}", self.database_path().display())
        }
    }

    /// Get the full path to the database file.
    pub fn database_path(&self) -> PathBuf {
        if let Some(ref url) = self.database_url {
            let stripped = url
                .strip_prefix("sqlite://")
                .or_else(|| url.strip_prefix("sqlite:"))
                .unwrap_or(url);
            return PathBuf::from(stripped);
        }
        self.data_dir.join(&self.database_filename)
    }

    /// Check if the database appears to be initialized.
    pub fn database_exists(&self) -> bool {
        self.database_path().exists()
    }

    /// Ensure the data directory exists.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        if let Some(parent) = self.database_path().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}

/// Retry schedule section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, prefer::FromValue)]
pub struct RetryConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<i32>,
    /// Seconds a claimed run may stay `running` before it counts as abandoned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_seconds: Option<i64>,
}

/// Caller-facing limits section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, prefer::FromValue)]
pub struct RateLimitsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingest_per_minute: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub harvest_per_minute: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_harvest_per_minute: Option<u32>,
}

/// Per-domain throttle section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, prefer::FromValue)]
pub struct ThrottleSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_multiplier: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_multiplier: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_per_domain: Option<usize>,
}

/// Calibration defaults section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, prefer::FromValue)]
pub struct CalibrationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_jobs: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_multiplier: Option<f64>,
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, prefer::FromValue)]
pub struct Config {
    /// Data directory path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    /// Database filename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// User agent string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Fetch timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    #[prefer(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    #[prefer(default)]
    pub rate_limits: RateLimitsConfig,
    #[serde(default)]
    #[prefer(default)]
    pub throttle: ThrottleSection,
    #[serde(default)]
    #[prefer(default)]
    pub calibration: CalibrationConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sweep_interval_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telemetry_window_jobs: Option<i64>,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    #[prefer(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    /// Discovers harvest.{toml,yaml,json} in the standard locations.
    pub async fn load() -> Self {
        match prefer::load("harvest").await {
            Ok(pref_config) => {
                if let Some(path) = pref_config.source_path() {
                    match Self::load_from_path(path).await {
                        Ok(config) => config,
                        Err(e) => {
                            tracing::warn!("Ignoring unreadable config {}: {}", path.display(), e);
                            Self::default()
                        }
                    }
                } else {
                    Self::default()
                }
            }
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file path.
    /// Format is chosen from the file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents)
                .map_err(|e| format!("Failed to parse TOML config: {}", e))?,
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e))?,
            _ => serde_json::from_str(&contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e))?,
        };

        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Get the base directory for resolving relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            settings.data_dir = self.resolve_path(data_dir, base_dir);
        }
        if let Some(ref database) = self.database {
            settings.database_filename = database.clone();
        }
        if let Some(ref user_agent) = self.user_agent {
            settings.user_agent = user_agent.clone();
        }
        if let Some(timeout) = self.request_timeout_secs {
            settings.request_timeout = timeout.max(1);
        }

        if let Some(base) = self.retry.base_seconds {
            settings.retry.base_seconds = base;
        }
        if let Some(max) = self.retry.max_seconds {
            settings.retry.max_seconds = max;
        }
        if let Some(attempts) = self.retry.max_attempts {
            settings.retry.max_attempts = attempts;
        }
        if let Some(lease) = self.retry.lease_seconds {
            settings.retry.lease_seconds = lease.max(1);
        }

        if let Some(n) = self.rate_limits.ingest_per_minute {
            settings.rate_limits.ingest_per_minute = n;
        }
        if let Some(n) = self.rate_limits.harvest_per_minute {
            settings.rate_limits.harvest_per_minute = n;
        }
        if let Some(n) = self.rate_limits.auto_harvest_per_minute {
            settings.rate_limits.auto_harvest_per_minute = n;
        }

        let throttle = &mut settings.throttle;
        if let Some(ms) = self.throttle.base_delay_ms {
            throttle.base_delay = std::time::Duration::from_millis(ms);
        }
        if let Some(ms) = self.throttle.min_delay_ms {
            throttle.min_delay = std::time::Duration::from_millis(ms);
        }
        if let Some(ms) = self.throttle.max_delay_ms {
            throttle.max_delay = std::time::Duration::from_millis(ms);
        }
        if let Some(m) = self.throttle.backoff_multiplier {
            throttle.backoff_multiplier = m;
        }
        if let Some(m) = self.throttle.recovery_multiplier {
            throttle.recovery_multiplier = m;
        }
        if let Some(n) = self.throttle.max_concurrent_per_domain {
            throttle.max_concurrent_per_domain = n.max(1);
        }

        if let Some(n) = self.calibration.min_jobs {
            settings.calibration_min_jobs = n;
        }
        if let Some(m) = self.calibration.buffer_multiplier {
            settings.calibration_buffer_multiplier = m;
        }
        if let Some(workers) = self.workers {
            settings.workers = workers.max(1);
        }
        if let Some(secs) = self.sweep_interval_secs {
            settings.sweep_interval_secs = secs.max(1);
        }
        if let Some(ref token) = self.internal_token {
            settings.internal_token = Some(token.clone());
        }
        if let Some(window) = self.telemetry_window_jobs {
            settings.telemetry_window_jobs = window.max(1);
        }
    }

    /// Compute SHA-256 hash of the serialized config.
    pub fn hash(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file (--config).
    pub config_path: Option<PathBuf>,
    /// Explicit data directory (--data).
    pub data_dir: Option<PathBuf>,
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

/// Load settings with explicit options.
/// Returns (Settings, Config) tuple.
pub async fn load_settings_with_options(options: LoadOptions) -> (Settings, Config) {
    let config = match options.config_path {
        Some(ref path) => Config::load_from_path(path).await.unwrap_or_else(|e| {
            tracing::warn!("Falling back to defaults: {}", e);
            Config::default()
        }),
        None => Config::load().await,
    };

    let mut settings = Settings::default();
    let base_dir = config
        .base_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    config.apply_to_settings(&mut settings, &base_dir);

    if let Some(data_dir) = options.data_dir {
        settings.data_dir = data_dir;
    }

    if let Some(dir) = env_value("HARVEST_DATA_DIR") {
        tracing::debug!("Using HARVEST_DATA_DIR from environment: {}", dir);
        settings.data_dir = config.resolve_path(&dir, &base_dir);
    }

    // DATABASE_URL environment variable takes highest precedence
    if let Some(database_url) = env_value("DATABASE_URL") {
        tracing::debug!("Using DATABASE_URL from environment: {}", database_url);
        settings.database_url = Some(database_url);
    }

    if let Some(token) = env_value("HARVEST_INTERNAL_TOKEN") {
        settings.internal_token = Some(token);
    }

    if let Some(attempts) = env_value("HARVEST_MAX_ATTEMPTS").and_then(|v| v.parse::<i32>().ok()) {
        tracing::debug!("Using HARVEST_MAX_ATTEMPTS from environment: {}", attempts);
        settings.retry.max_attempts = attempts.max(1);
    }

    (settings, config)
}
