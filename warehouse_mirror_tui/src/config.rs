use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use warehouse_mirror_core::MirrorConfig;

/// Viewer configuration, loaded from TOML. Every field has a default.
#[derive(Debug, Clone, Deserialize)]
pub struct ViewerConfig {
    /// Base URL of the simulation server.
    #[serde(default = "default_server")]
    pub server: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Also poll the camera detections endpoint.
    #[serde(default)]
    pub detections: bool,
    /// Minimum time between two detection fetches.
    #[serde(default = "default_detection_interval_ms")]
    pub detection_interval_ms: u64,
    /// Boxes a shelf holds when full; the clock stops once every shelf is.
    #[serde(default = "default_shelf_capacity")]
    pub shelf_capacity: usize,
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
    #[serde(default = "default_message_ttl_ms")]
    pub message_ttl_ms: u64,
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
    #[serde(default)]
    pub mirror: MirrorConfig,
}

fn default_server() -> String {
    "http://localhost:5000".to_string()
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_request_timeout_ms() -> u64 {
    2000
}

fn default_detection_interval_ms() -> u64 {
    500
}

fn default_shelf_capacity() -> usize {
    5
}

fn default_max_messages() -> usize {
    5
}

fn default_message_ttl_ms() -> u64 {
    3000
}

fn default_log_file() -> PathBuf {
    PathBuf::from("warehouse_mirror.log")
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            server: default_server(),
            poll_interval_ms: default_poll_interval_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            detections: false,
            detection_interval_ms: default_detection_interval_ms(),
            shelf_capacity: default_shelf_capacity(),
            max_messages: default_max_messages(),
            message_ttl_ms: default_message_ttl_ms(),
            log_file: default_log_file(),
            mirror: MirrorConfig::default(),
        }
    }
}

/// Load configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ViewerConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))
}
