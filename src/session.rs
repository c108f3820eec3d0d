use bytes::Bytes;
use futures::StreamExt;
use reqwest::header::HeaderMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::{DownloadError, Result};
use crate::limit::ByteLimiter;
use crate::registry::SharedRecord;
use crate::retry::RetryPolicy;
use crate::status::DownloadStatus;
use crate::transport::{BodyStream, HttpResponse, Transport};

pub type StatusSender = mpsc::Sender<Result<DownloadStatus>>;

/// Everything one download's pipeline stages and chunk workers share.
#[derive(Clone)]
pub struct Session {
    pub url: String,
    pub transport: Arc<dyn Transport>,
    pub record: SharedRecord,
    pub retry: RetryPolicy,
    pub token: CancellationToken,
    pub limiter: Option<Arc<ByteLimiter>>,
    pub max_threads: usize,
    /// Longest wait for the next body piece before the read counts as failed.
    pub read_timeout: Duration,
    pub tx: StatusSender,
}

impl Session {
    pub fn with_token(&self, token: CancellationToken) -> Self {
        Self {
            token,
            ..self.clone()
        }
    }

    /// HEAD request that gives up as soon as the session is cancelled.
    pub async fn head(&self, headers: HeaderMap) -> Result<HttpResponse> {
        tokio::select! {
            _ = self.token.cancelled() => Err(DownloadError::Cancelled),
            response = self.transport.head(&self.url, headers) => response,
        }
    }

    /// GET request that gives up as soon as the session is cancelled.
    pub async fn get(&self, headers: HeaderMap) -> Result<HttpResponse> {
        tokio::select! {
            _ = self.token.cancelled() => Err(DownloadError::Cancelled),
            response = self.transport.get(&self.url, headers) => response,
        }
    }

    /// Next body piece. `None` once the body has ended.
    ///
    /// A server that goes quiet for longer than `read_timeout` yields a network error,
    /// which the retry wrapper treats like any other dropped connection.
    pub async fn next_chunk(&self, body: &mut BodyStream) -> Option<Result<Bytes>> {
        tokio::select! {
            _ = self.token.cancelled() => Some(Err(DownloadError::Cancelled)),
            next = tokio::time::timeout(self.read_timeout, body.next()) => match next {
                Ok(next) => next,
                Err(_) => Some(Err(DownloadError::network("read timed out"))),
            },
        }
    }

    pub async fn throttle(&self, len: usize) {
        if let Some(limiter) = &self.limiter {
            limiter.consume(len).await;
        }
    }

    pub fn progress(&self, total: Option<u64>, already: u64) -> Progress {
        Progress {
            total,
            downloaded: Mutex::new(already),
            tx: self.tx.clone(),
            token: self.token.clone(),
        }
    }
}

/// Aggregate byte counter. Updates and sends happen under one lock, so the
/// emitted series never goes backwards even with several writers.
pub struct Progress {
    total: Option<u64>,
    downloaded: Mutex<u64>,
    tx: StatusSender,
    token: CancellationToken,
}

impl Progress {
    fn status(&self, downloaded: u64) -> DownloadStatus {
        match self.total {
            Some(total) => DownloadStatus::new(total, downloaded),
            None => DownloadStatus::unknown_length(downloaded),
        }
    }

    pub async fn advance(&self, len: u64) {
        let mut downloaded = self.downloaded.lock().await;
        *downloaded += len;
        let status = self.status(*downloaded);
        self.send(status).await;
    }

    /// Re-sends the current total without changing it.
    pub async fn emit(&self) {
        let downloaded = self.downloaded.lock().await;
        let status = self.status(*downloaded);
        self.send(status).await;
    }

    pub async fn snapshot(&self) -> DownloadStatus {
        let downloaded = self.downloaded.lock().await;
        self.status(*downloaded)
    }

    async fn send(&self, status: DownloadStatus) {
        // A dropped receiver is fine; cancellation follows from the stream's drop guard.
        tokio::select! {
            _ = self.token.cancelled() => {}
            _ = self.tx.send(Ok(status)) => {}
        }
    }
}
