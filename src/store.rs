//! Durable record files kept next to each download (`<name>.rdl.json`).

use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::Result;
use crate::record::TemporaryRecord;

const RECORD_SUFFIX: &str = ".rdl.json";

/// Reads the record at `path`. A missing or unreadable record counts as absent.
pub async fn load(path: &Path) -> Result<Option<TemporaryRecord>> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    match serde_json::from_str(&content) {
        Ok(record) => Ok(Some(record)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Discarding corrupt download record");
            Ok(None)
        }
    }
}

/// Writes the record through a sibling temp file so a crash never leaves half a record.
pub async fn save(record: &TemporaryRecord) -> Result<()> {
    let path = record.record_path();
    let tmp = path.with_extension("json.tmp");
    let content = serde_json::to_vec(record)?;
    fs::write(&tmp, content).await?;
    fs::rename(&tmp, &path).await?;
    Ok(())
}

pub async fn delete(record: &TemporaryRecord) -> Result<()> {
    let path = record.record_path();
    match fs::remove_file(&path).await {
        Ok(()) => {
            debug!(path = %path.display(), "Removed download record");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Every readable record in `dir`, sorted by save name.
pub async fn list(dir: &Path) -> Result<Vec<TemporaryRecord>> {
    let mut records = vec![];
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(records),
        Err(e) => return Err(e.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_record = path
            .file_name()
            .map(|name| name.to_string_lossy().ends_with(RECORD_SUFFIX))
            .unwrap_or(false);
        if !is_record {
            continue;
        }
        if let Some(record) = load(&path).await? {
            records.push(record);
        }
    }

    records.sort_by(|a, b| a.save_name.cmp(&b.save_name));
    Ok(records)
}
