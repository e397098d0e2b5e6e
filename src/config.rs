//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use crate::ingest::{HttpFetcherConfig, CISCO_UMBRELLA_TEMPLATE};
use crate::query::EngineSettings;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub lake: LakeConfig,

    #[serde(default)]
    pub download: DownloadConfig,

    #[serde(default)]
    pub query: QueryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Lake layout configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LakeConfig {
    /// Root of the lake; raw and columnar snapshots live under `{root}/raw`
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Where per-domain yearly shards are written
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_root() -> PathBuf {
    dirs::data_local_dir()
        .map(|p| p.join("ranklake"))
        .unwrap_or_else(|| PathBuf::from("./ranklake_data"))
}

fn default_output_dir() -> PathBuf {
    default_root().join("output")
}

impl Default for LakeConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            output_dir: default_output_dir(),
        }
    }
}

/// Remote download configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadConfig {
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Remote locator; `{date}` is replaced by `YYYY-MM-DD`
    #[serde(default = "default_url_template")]
    pub url_template: String,
}

fn default_max_in_flight() -> usize {
    4
}

fn default_connect_timeout() -> u64 {
    90
}

fn default_request_timeout() -> u64 {
    6000 // archives are large and the bucket is slow
}

fn default_url_template() -> String {
    CISCO_UMBRELLA_TEMPLATE.to_string()
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
            url_template: default_url_template(),
        }
    }
}

impl DownloadConfig {
    pub fn http(&self) -> HttpFetcherConfig {
        HttpFetcherConfig {
            connect_timeout_secs: self.connect_timeout_secs,
            request_timeout_secs: self.request_timeout_secs,
            max_idle_per_host: self.max_in_flight,
        }
    }
}

/// Embedded engine configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryConfig {
    /// e.g. "16GB"
    pub memory_limit: Option<String>,

    pub threads: Option<usize>,
}

impl QueryConfig {
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            memory_limit: self.memory_limit.clone(),
            threads: self.threads,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("ranklake").join("config.toml")),
            Some(PathBuf::from("./ranklake.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        if let Ok(root) = std::env::var("RANKLAKE_ROOT") {
            self.lake.root = PathBuf::from(root);
        }
        if let Ok(output) = std::env::var("RANKLAKE_OUTPUT_DIR") {
            self.lake.output_dir = PathBuf::from(output);
        }

        if let Ok(max) = std::env::var("RANKLAKE_MAX_IN_FLIGHT") {
            if let Ok(n) = max.parse() {
                self.download.max_in_flight = n;
            }
        }

        if let Ok(level) = std::env::var("RANKLAKE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("RANKLAKE_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Ranklake Configuration
#
# Environment variables override these settings:
# - RANKLAKE_ROOT
# - RANKLAKE_OUTPUT_DIR
# - RANKLAKE_MAX_IN_FLIGHT
# - RANKLAKE_LOG_LEVEL
# - RANKLAKE_LOG_FORMAT

[lake]
# Lake root; snapshots are stored under {root}/raw/YYYY/MM/DD.{csv,parquet}
root = "~/.local/share/ranklake"

# Per-domain yearly shards are written to {output_dir}/{domain}/{year}.parquet
output_dir = "~/.local/share/ranklake/output"

[download]
# Maximum simultaneous remote fetches
max_in_flight = 4

# Seconds allowed to establish a connection
connect_timeout_secs = 90

# Seconds allowed for a whole request, body included
request_timeout_secs = 6000

# Remote locator; {date} is replaced by YYYY-MM-DD
url_template = "http://s3-us-west-1.amazonaws.com/umbrella-static/top-1m-{date}.csv.zip"

[query]
# DuckDB memory limit, e.g. "16GB"
# memory_limit = "16GB"

# DuckDB worker threads
# threads = 8

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
