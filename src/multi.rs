use reqwest::header::{HeaderMap, HeaderValue, RANGE};
use reqwest::StatusCode;
use std::path::Path;
use std::sync::Arc;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncSeekExt, AsyncWriteExt, SeekFrom};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::error::{DownloadError, Result};
use crate::range::partition;
use crate::retry::retry;
use crate::session::{Progress, Session};
use crate::status::DownloadStatus;
use crate::store;

/// Sizes the destination file and lays out fresh chunk ranges.
pub async fn prepare_fresh(session: &Session) -> Result<()> {
    let mut record = session.record.lock().await;
    let length = record.content_length.unwrap_or(0);

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(record.file_path())
        .await?;
    file.set_len(length).await?;

    record.ranges = partition(length, session.max_threads);
    record.completed = false;
    record.touch();
    debug!(url = %session.url, chunks = record.ranges.len(), "Prepared chunked download");
    store::save(&record).await
}

/// Keeps the stored ranges; only checks the destination is still writable.
pub async fn prepare_resume(session: &Session) -> Result<()> {
    let mut record = session.record.lock().await;
    OpenOptions::new().write(true).open(record.file_path()).await?;
    record.touch();
    info!(
        url = %session.url,
        downloaded = record.downloaded(),
        total = ?record.content_length,
        "Resuming chunked download"
    );
    store::save(&record).await
}

/// Runs one worker per unfinished range and waits for all of them.
///
/// The first failure cancels the remaining workers; progress they persisted stays
/// on disk for a later resume.
pub async fn download(session: &Session) -> Result<DownloadStatus> {
    let (file_path, total, pending, already) = {
        let record = session.record.lock().await;
        let pending: Vec<usize> = record
            .ranges
            .iter()
            .filter(|range| !range.is_complete())
            .map(|range| range.index)
            .collect();
        (
            record.file_path(),
            record.content_length.unwrap_or(0),
            pending,
            record.downloaded(),
        )
    };

    let progress = Arc::new(session.progress(Some(total), already));
    if pending.is_empty() {
        progress.emit().await;
    }

    let workers_token = session.token.child_token();
    let mut workers = JoinSet::new();
    for index in pending {
        let worker = session.with_token(workers_token.child_token());
        let progress = progress.clone();
        let file_path = file_path.clone();
        workers.spawn(async move {
            download_range(&worker, &file_path, index, &progress)
                .await
                .map(|_| index)
                .map_err(|e| if e.is_cancelled() { e } else { DownloadError::chunk(index, e) })
        });
    }

    let mut failures = vec![];
    while let Some(joined) = workers.join_next().await {
        let result = joined.unwrap_or_else(|e| Err(std::io::Error::other(e).into()));
        match result {
            Ok(index) => debug!(url = %session.url, index, "Chunk finished"),
            Err(e) if e.is_cancelled() => {}
            Err(e) => {
                error!(url = %session.url, error = %e, "Chunk failed, stopping remaining workers");
                workers_token.cancel();
                failures.push(e);
            }
        }
    }

    if session.token.is_cancelled() {
        return Err(DownloadError::Cancelled);
    }
    match failures.len() {
        0 => {}
        1 => return Err(failures.remove(0)),
        _ => return Err(DownloadError::Composite { errors: failures }),
    }

    {
        let mut record = session.record.lock().await;
        record.ranges.clear();
        record.completed = true;
        record.touch();
        store::save(&record).await?;
    }

    info!(url = %session.url, path = %file_path.display(), "Download completed");
    Ok(progress.snapshot().await)
}

/// Fetches what is left of range `index`, re-issuing the request from the latest
/// persisted offset after a transient failure.
async fn download_range(session: &Session, file_path: &Path, index: usize, progress: &Progress) -> Result<()> {
    retry(&session.retry, &session.token, "chunk download", |_| {
        fetch_remaining(session, file_path, index, progress)
    })
    .await
}

async fn fetch_remaining(session: &Session, file_path: &Path, index: usize, progress: &Progress) -> Result<()> {
    let range = {
        let record = session.record.lock().await;
        record
            .ranges
            .get(index)
            .copied()
            .ok_or_else(|| DownloadError::NotFound {
                url: format!("{} (chunk {index})", session.url),
            })?
    };
    if range.is_complete() {
        return Ok(());
    }

    let mut headers = HeaderMap::new();
    let value = HeaderValue::from_str(&range.header_value())
        .map_err(|e| DownloadError::network(e.to_string()))?;
    headers.insert(RANGE, value);

    let response = session.get(headers).await?;
    if response.status != StatusCode::PARTIAL_CONTENT {
        return Err(DownloadError::http_status(
            response.status,
            session.url.clone(),
            "chunk download",
        ));
    }

    let mut file = open_at(file_path, range.current_offset).await?;
    let mut body = response.body;
    let mut offset = range.current_offset;

    while offset <= range.end_offset {
        let Some(chunk) = session.next_chunk(&mut body).await else {
            break;
        };
        let chunk = chunk?;
        let take = (chunk.len() as u64).min(range.end_offset + 1 - offset) as usize;
        if take == 0 {
            continue;
        }

        session.throttle(take).await;
        file.write_all(&chunk[..take]).await?;
        offset += take as u64;

        {
            let mut record = session.record.lock().await;
            if let Some(stored) = record.ranges.get_mut(index) {
                stored.current_offset = offset;
            }
            record.touch();
            store::save(&record).await?;
        }
        progress.advance(take as u64).await;
    }
    file.flush().await?;

    if offset <= range.end_offset {
        return Err(DownloadError::network(format!(
            "chunk {index} stopped at byte {offset}, expected {}",
            range.end_offset + 1
        )));
    }
    Ok(())
}

async fn open_at(path: &Path, offset: u64) -> Result<tokio::fs::File> {
    let mut file = OpenOptions::new().write(true).open(path).await?;
    file.seek(SeekFrom::Start(offset)).await?;
    Ok(file)
}
