use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::error::{DownloadError, Result};
use crate::record::TemporaryRecord;

pub type SharedRecord = Arc<tokio::sync::Mutex<TemporaryRecord>>;

/// URLs currently downloading, each with the record its download mutates.
#[derive(Default)]
pub struct Registry {
    active: Mutex<HashMap<String, SharedRecord>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `url` unless a download for it is already running.
    pub fn admit(&self, url: &str, save_name: &str, save_path: PathBuf) -> Result<SharedRecord> {
        let mut active = self.active.lock();
        if active.contains_key(url) {
            return Err(DownloadError::AlreadyDownloading { url: url.to_string() });
        }

        let record = Arc::new(tokio::sync::Mutex::new(TemporaryRecord::new(
            url, save_name, save_path,
        )));
        active.insert(url.to_string(), record.clone());
        debug!(url, "Admitted download");
        Ok(record)
    }

    pub fn release(&self, url: &str) {
        if self.active.lock().remove(url).is_some() {
            debug!(url, "Released download");
        }
    }

    pub fn contains(&self, url: &str) -> bool {
        self.active.lock().contains_key(url)
    }

    pub fn get(&self, url: &str) -> Result<SharedRecord> {
        self.active
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| DownloadError::NotFound { url: url.to_string() })
    }

    pub fn len(&self) -> usize {
        self.active.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
