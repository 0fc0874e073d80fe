use std::time::Duration;

use reqwest::blocking::Client;
use tracing::debug;
use warehouse_mirror_core::{
    FetchError,
    detections::{DetectionReport, parse_detections},
    fetch::SnapshotSource,
    snapshot::{SnapshotMessage, parse_message},
};

/// Fetches snapshots from the simulation server's HTTP endpoints.
pub struct HttpSource {
    client: Client,
    base_url: String,
}

impl HttpSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent("warehouse-mirror/0.1")
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn get_text(&self, path: &str) -> Result<String, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "polling");
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        response
            .text()
            .map_err(|e| FetchError::Transport(e.to_string()))
    }
}

impl SnapshotSource for HttpSource {
    fn init(&mut self) -> Result<SnapshotMessage, FetchError> {
        Ok(parse_message(&self.get_text("/init")?)?)
    }

    fn next(&mut self) -> Result<SnapshotMessage, FetchError> {
        Ok(parse_message(&self.get_text("/state")?)?)
    }

    fn detections(&mut self) -> Result<Vec<DetectionReport>, FetchError> {
        Ok(parse_detections(&self.get_text("/detections")?)?)
    }
}
