//! TOML configuration. Every key is optional.
//!
//! ```toml
//! workers = 4
//!
//! [reporter]
//! type = "redis"
//!
//! [reporter.json]
//! directory = "results"
//! policy = "append"
//!
//! [reporter.redis]
//! url = "redis://127.0.0.1:6379/"
//! prefix = "bench"
//! channel_type = "list"
//!
//! [connector.json]
//! path = "session.json"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ReportError, Result};

// ─── Defaults ────────────────────────────────────────────────────

fn default_reporter_type() -> String {
    "json".into()
}

fn default_connector_type() -> String {
    "json".into()
}

fn default_results_directory() -> PathBuf {
    PathBuf::from("results")
}

fn default_session_path() -> PathBuf {
    PathBuf::from("session.json")
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379/".into()
}

fn default_redis_prefix() -> String {
    "bench".into()
}

// ─── Top level ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Blocking worker pool size; `None` → physical CPU count.
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub reporter: ReporterConfig,
    #[serde(default)]
    pub connector: ConnectorConfig,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| ReportError::Config(format!("cannot read {}: {e}", path.display())))?;
        contents.parse()
    }

    fn validate(&self) -> Result<()> {
        if self.workers == Some(0) {
            return Err(ReportError::Config("workers must be at least 1".into()));
        }
        if self.reporter.redis.prefix.trim().is_empty() {
            return Err(ReportError::Config("reporter.redis.prefix must not be empty".into()));
        }
        Ok(())
    }
}

impl FromStr for Config {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

/// Load `path` when given, else the defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path),
        None => Ok(Config::default()),
    }
}

// ─── Reporters ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReporterConfig {
    /// Registry tag of the backend to use.
    #[serde(rename = "type", default = "default_reporter_type")]
    pub reporter_type: String,
    #[serde(default)]
    pub json: FileReporterConfig,
    #[serde(default)]
    pub redis: RedisReporterConfig,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            reporter_type: default_reporter_type(),
            json: FileReporterConfig::default(),
            redis: RedisReporterConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WritePolicy {
    /// One pretty JSON array per file, replaced on every run.
    #[default]
    Overwrite,
    /// One JSON object per line, appended.
    Append,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileReporterConfig {
    #[serde(default = "default_results_directory")]
    pub directory: PathBuf,
    #[serde(default)]
    pub policy: WritePolicy,
}

impl Default for FileReporterConfig {
    fn default() -> Self {
        Self {
            directory: default_results_directory(),
            policy: WritePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedisChannelType {
    /// `RPUSH <prefix>:<category>`
    #[default]
    List,
    /// `PUBLISH <prefix>:<category>`
    Channel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedisReporterConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
    #[serde(default = "default_redis_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub channel_type: RedisChannelType,
}

impl Default for RedisReporterConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            prefix: default_redis_prefix(),
            channel_type: RedisChannelType::default(),
        }
    }
}

// ─── Connectors ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorConfig {
    #[serde(rename = "type", default = "default_connector_type")]
    pub connector_type: String,
    #[serde(default)]
    pub json: FileConnectorConfig,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            connector_type: default_connector_type(),
            json: FileConnectorConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileConnectorConfig {
    #[serde(default = "default_session_path")]
    pub path: PathBuf,
}

impl Default for FileConnectorConfig {
    fn default() -> Self {
        Self {
            path: default_session_path(),
        }
    }
}
