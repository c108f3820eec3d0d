use reqwest::header::HeaderMap;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{DownloadError, Result};
use crate::retry::retry;
use crate::session::Session;
use crate::status::DownloadStatus;
use crate::store;

/// Truncates the destination and records that a plain download is under way.
pub async fn prepare(session: &Session) -> Result<()> {
    let mut record = session.record.lock().await;
    fs::File::create(record.file_path()).await?;
    record.ranges.clear();
    record.completed = false;
    record.touch();
    store::save(&record).await
}

/// Streams the whole body to the destination file. Only issuing the request is
/// retried; a body that breaks off fails the download.
pub async fn download(session: &Session) -> Result<DownloadStatus> {
    let (file_path, known_length) = {
        let record = session.record.lock().await;
        (record.file_path(), record.content_length)
    };

    let response = retry(&session.retry, &session.token, "download", |_| async move {
        let response = session.get(HeaderMap::new()).await?;
        if !response.status.is_success() {
            return Err(DownloadError::http_status(
                response.status,
                session.url.clone(),
                "download",
            ));
        }
        Ok(response)
    })
    .await?;

    let total = known_length.or_else(|| response.content_length());
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&file_path)
        .await?;

    let progress = session.progress(total, 0);
    let mut body = response.body;
    let mut written: u64 = 0;

    loop {
        let Some(chunk) = session.next_chunk(&mut body).await else {
            break;
        };
        let chunk = chunk?;
        if chunk.is_empty() {
            continue;
        }

        session.throttle(chunk.len()).await;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
        progress.advance(chunk.len() as u64).await;
    }
    file.flush().await?;

    if let Some(total) = total {
        if written != total {
            return Err(DownloadError::network(format!(
                "body ended after {written} of {total} bytes"
            )));
        }
    }

    {
        let mut record = session.record.lock().await;
        record.completed = true;
        record.touch();
        store::save(&record).await?;
    }

    debug!(url = %session.url, written, "Body fully written");
    info!(url = %session.url, path = %file_path.display(), "Download completed");
    Ok(progress.snapshot().await)
}
