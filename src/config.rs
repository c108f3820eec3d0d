use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;

/// Engine settings. Missing fields in a config file fall back to the defaults.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct EngineConfig {
    /// Extra attempts allowed for every network call.
    pub max_retry_count: u32,
    /// Ceiling on the number of chunks a ranged download is split into.
    pub max_threads: usize,
    pub default_save_path: PathBuf,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    /// Engine-wide byte rate limit per second.
    pub rate_limit: Option<u32>,
    pub user_agent: String,
    pub connect_timeout_secs: u64,
    /// Silence on an open body after which the read fails and is retried.
    pub read_timeout_ms: u64,
    /// Buffered status updates per download before writers wait on the reader.
    pub channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retry_count: 3,
            max_threads: 3,
            default_save_path: PathBuf::from("downloads"),
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 10_000,
            rate_limit: None,
            user_agent: concat!("rdl/", env!("CARGO_PKG_VERSION")).to_string(),
            connect_timeout_secs: 10,
            read_timeout_ms: 30_000,
            channel_capacity: 64,
        }
    }
}

impl EngineConfig {
    pub async fn from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}
