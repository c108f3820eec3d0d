use std::io::ErrorKind;
use tokio::fs;
use tracing::{debug, info};

use crate::error::Result;
use crate::record::TemporaryRecord;
use crate::session::Session;
use crate::status::DownloadStatus;
use crate::{checks, multi, single, store};

/// How a download proceeds, decided once per run by [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Fresh sequential download; the server ignores ranges or gave no length.
    Normal,
    /// Fresh chunked download.
    MultiThread,
    /// Chunked download picking up persisted offsets.
    Continue,
    /// The file on disk is complete and the server copy is unchanged.
    AlreadyDownloaded,
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::MultiThread => "multi-thread",
            Self::Continue => "continue",
            Self::AlreadyDownloaded => "already-downloaded",
        }
    }

    pub async fn prepare(&self, session: &Session) -> Result<()> {
        match self {
            Self::Normal => single::prepare(session).await,
            Self::MultiThread => multi::prepare_fresh(session).await,
            Self::Continue => multi::prepare_resume(session).await,
            Self::AlreadyDownloaded => Ok(()),
        }
    }

    pub async fn execute(&self, session: &Session) -> Result<DownloadStatus> {
        match self {
            Self::Normal => single::download(session).await,
            Self::MultiThread | Self::Continue => multi::download(session).await,
            Self::AlreadyDownloaded => {
                let length = session.record.lock().await.content_length.unwrap_or(0);
                let progress = session.progress(Some(length), length);
                progress.emit().await;
                info!(url = %session.url, "File already downloaded");
                Ok(progress.snapshot().await)
            }
        }
    }
}

fn fresh(record: &TemporaryRecord) -> Strategy {
    if record.supports_range && record.content_length.is_some_and(|len| len > 0) {
        Strategy::MultiThread
    } else {
        Strategy::Normal
    }
}

/// Queries the server and compares with what an earlier run left on disk.
pub async fn classify(session: &Session) -> Result<Strategy> {
    checks::check_url(session).await?;
    checks::check_range(session).await?;

    let (file_path, record_path) = {
        let record = session.record.lock().await;
        (record.file_path(), record.record_path())
    };

    let file_len = match fs::metadata(&file_path).await {
        Ok(metadata) => Some(metadata.len()),
        Err(e) if e.kind() == ErrorKind::NotFound => None,
        Err(e) => return Err(e.into()),
    };
    session.record.lock().await.file_already_exists = file_len.is_some();

    let Some(file_len) = file_len else {
        let strategy = fresh(&*session.record.lock().await);
        debug!(url = %session.url, strategy = strategy.name(), "No local file");
        return Ok(strategy);
    };

    let stored = store::load(&record_path).await?;
    let stored_tag = stored.as_ref().and_then(|s| s.last_modified.clone());
    checks::check_server_file(session, stored_tag.as_deref()).await?;

    let mut record = session.record.lock().await;
    let strategy = match stored {
        Some(stored) if !record.server_file_changed => {
            if record.can_resume_from(&stored, session.max_threads, file_len) {
                record.ranges = stored.ranges;
                Strategy::Continue
            } else if record.matches_completed(&stored, file_len) {
                Strategy::AlreadyDownloaded
            } else {
                fresh(&record)
            }
        }
        _ => {
            info!(url = %session.url, "Discarding local state, restarting download");
            fresh(&record)
        }
    };

    debug!(url = %session.url, strategy = strategy.name(), file_len, "Classified download");
    Ok(strategy)
}
