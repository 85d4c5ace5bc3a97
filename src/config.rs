//! Node Configuration
//!
//! Loaded from a JSON file named on the command line. Every field has a
//! default, so a file only needs what differs.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Address to serve both protocols on (default: "127.0.0.1:9599")
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Identity reported to clients of proxied requests (default: random)
    #[serde(default)]
    pub node_id: Option<String>,

    /// Maximum tracing level (default: "info")
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Cap on a single peer attempt, in milliseconds (default: 100)
    #[serde(default = "default_proxy_timeout_ms")]
    pub proxy_timeout_ms: u64,

    /// Budget of an inbound request, in milliseconds (default: 1000)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Fixed seed for peer ordering. Random when absent.
    #[serde(default)]
    pub selector_seed: Option<u64>,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub peers: Vec<PeerConfig>,
}

/// The database version this node serves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_name")]
    pub name: String,

    #[serde(default = "default_version")]
    pub version: String,

    /// 0 serves nothing.
    #[serde(default)]
    pub partition_count: u32,

    /// Creation time of the version (default: load time)
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,

    #[serde(default)]
    pub local_partitions: Vec<u32>,

    /// JSON object of `key -> value` strings to load the local partitions from
    #[serde(default)]
    pub data_file: Option<PathBuf>,
}

/// A remote node and the partitions it owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerConfig {
    pub id: String,
    pub addr: String,
    #[serde(default)]
    pub partitions: Vec<u32>,
}

fn default_bind() -> String {
    "127.0.0.1:9599".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_proxy_timeout_ms() -> u64 {
    100
}

fn default_request_timeout_ms() -> u64 {
    1000
}

fn default_database_name() -> String {
    "default".to_string()
}

fn default_version() -> String {
    "v1".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            name: default_database_name(),
            version: default_version(),
            partition_count: 0,
            created: None,
            local_partitions: Vec::new(),
            data_file: None,
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            node_id: None,
            log_level: default_log_level(),
            proxy_timeout_ms: default_proxy_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            selector_seed: None,
            database: DatabaseConfig::default(),
            peers: Vec::new(),
        }
    }
}

impl NodeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn proxy_timeout(&self) -> Duration {
        Duration::from_millis(self.proxy_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Configured log level, falling back to INFO when unparseable.
    pub fn max_level(&self) -> tracing::Level {
        self.log_level.parse().unwrap_or(tracing::Level::INFO)
    }
}
