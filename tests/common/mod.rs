#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use rdl_engine::{DownloadEngine, DownloadError, EngineConfig, HttpResponse, Result, Transport};
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_RANGE, IF_MODIFIED_SINCE, LAST_MODIFIED, RANGE,
};
use reqwest::StatusCode;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const URL: &str = "http://mock.local/files/data.bin";
pub const LAST_MODIFIED_TAG: &str = "Wed, 21 Oct 2015 07:28:00 GMT";

#[derive(Debug, Clone, PartialEq)]
pub struct SeenRequest {
    pub method: &'static str,
    pub range: Option<String>,
    pub if_modified_since: Option<String>,
}

/// In-memory HTTP server for a single resource.
pub struct MockServer {
    pub content: Vec<u8>,
    pub last_modified: String,
    pub supports_range: bool,
    pub head_allowed: bool,
    /// Status returned for the plain existence check.
    pub url_status: StatusCode,
    /// Body piece size.
    pub piece: usize,
    /// Ranged bodies hang forever after this many pieces.
    pub stall_after: Option<usize>,
    /// Ranged GETs starting at these offsets answer 503.
    pub failing_starts: HashSet<u64>,
    fail_gets: AtomicUsize,
    requests: Mutex<Vec<SeenRequest>>,
}

pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

impl MockServer {
    pub fn new(len: usize) -> Self {
        Self {
            content: pattern(len),
            last_modified: LAST_MODIFIED_TAG.to_string(),
            supports_range: true,
            head_allowed: true,
            url_status: StatusCode::OK,
            piece: 100,
            stall_after: None,
            failing_starts: HashSet::new(),
            fail_gets: AtomicUsize::new(0),
            requests: Mutex::new(vec![]),
        }
    }

    /// The next `n` GET requests fail with a network error.
    pub fn fail_next_gets(&self, n: usize) {
        self.fail_gets.store(n, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.requests.lock().clone()
    }

    pub fn gets(&self) -> Vec<SeenRequest> {
        self.requests().into_iter().filter(|r| r.method == "GET").collect()
    }

    pub fn heads(&self) -> Vec<SeenRequest> {
        self.requests().into_iter().filter(|r| r.method == "HEAD").collect()
    }

    fn record(&self, method: &'static str, headers: &HeaderMap) {
        let text = |name: HeaderName| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);
        self.requests.lock().push(SeenRequest {
            method,
            range: text(RANGE),
            if_modified_since: text(IF_MODIFIED_SINCE),
        });
    }

    fn len(&self) -> u64 {
        self.content.len() as u64
    }

    fn parse_range(&self, value: &str) -> Option<(u64, u64)> {
        let spec = value.strip_prefix("bytes=")?;
        let (start, end) = spec.split_once('-')?;
        let start: u64 = start.parse().ok()?;
        let end = if end.is_empty() {
            self.len().checked_sub(1)?
        } else {
            end.parse::<u64>().ok()?.min(self.len().checked_sub(1)?)
        };
        (start <= end).then_some((start, end))
    }

    fn base_headers(&self, length: u64) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
        headers.insert(LAST_MODIFIED, HeaderValue::from_str(&self.last_modified).unwrap());
        headers
    }

    fn empty(&self, status: StatusCode, headers: HeaderMap) -> HttpResponse {
        HttpResponse {
            status,
            headers,
            body: futures::stream::empty().boxed(),
        }
    }

    fn body(&self, start: u64, end: u64, stall: bool) -> rdl_engine::transport::BodyStream {
        let pieces: Vec<Result<Bytes>> = self.content[start as usize..=end as usize]
            .chunks(self.piece)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        match self.stall_after.filter(|_| stall) {
            Some(n) => futures::stream::iter(pieces.into_iter().take(n))
                .chain(futures::stream::pending())
                .boxed(),
            None => futures::stream::iter(pieces).boxed(),
        }
    }

    fn ranged(&self, headers: &HeaderMap) -> Option<(u64, u64)> {
        let value = headers.get(RANGE)?.to_str().ok()?;
        if !self.supports_range {
            return None;
        }
        self.parse_range(value)
    }

    fn partial_headers(&self, start: u64, end: u64) -> HeaderMap {
        let mut headers = self.base_headers(end - start + 1);
        let value = format!("bytes {}-{}/{}", start, end, self.len());
        headers.insert(CONTENT_RANGE, HeaderValue::from_str(&value).unwrap());
        headers
    }
}

#[async_trait]
impl Transport for MockServer {
    async fn head(&self, _url: &str, headers: HeaderMap) -> Result<HttpResponse> {
        self.record("HEAD", &headers);
        if !self.head_allowed {
            return Ok(self.empty(StatusCode::METHOD_NOT_ALLOWED, HeaderMap::new()));
        }
        if !self.url_status.is_success() {
            return Ok(self.empty(self.url_status, HeaderMap::new()));
        }
        if let Some(since) = headers.get(IF_MODIFIED_SINCE) {
            if since.to_str().ok() == Some(self.last_modified.as_str()) {
                return Ok(self.empty(StatusCode::NOT_MODIFIED, HeaderMap::new()));
            }
            return Ok(self.empty(StatusCode::OK, self.base_headers(self.len())));
        }
        match self.ranged(&headers) {
            Some((start, end)) => Ok(self.empty(StatusCode::PARTIAL_CONTENT, self.partial_headers(start, end))),
            None => Ok(self.empty(StatusCode::OK, self.base_headers(self.len()))),
        }
    }

    async fn get(&self, _url: &str, headers: HeaderMap) -> Result<HttpResponse> {
        self.record("GET", &headers);
        let pending_failures = self.fail_gets.load(Ordering::SeqCst);
        if pending_failures > 0 {
            self.fail_gets.store(pending_failures - 1, Ordering::SeqCst);
            return Err(DownloadError::network("injected connection reset"));
        }
        if !self.url_status.is_success() {
            return Ok(self.empty(self.url_status, HeaderMap::new()));
        }
        if let Some(since) = headers.get(IF_MODIFIED_SINCE) {
            if since.to_str().ok() == Some(self.last_modified.as_str()) {
                return Ok(self.empty(StatusCode::NOT_MODIFIED, HeaderMap::new()));
            }
        }

        match self.ranged(&headers) {
            Some((start, _)) if self.failing_starts.contains(&start) => {
                Ok(self.empty(StatusCode::SERVICE_UNAVAILABLE, HeaderMap::new()))
            }
            Some((start, end)) => Ok(HttpResponse {
                status: StatusCode::PARTIAL_CONTENT,
                headers: self.partial_headers(start, end),
                body: self.body(start, end, true),
            }),
            None if self.content.is_empty() => Ok(self.empty(StatusCode::OK, self.base_headers(0))),
            None => Ok(HttpResponse {
                status: StatusCode::OK,
                headers: self.base_headers(self.len()),
                body: self.body(0, self.len() - 1, false),
            }),
        }
    }
}

/// Answers HEAD like the wrapped server; every GET hangs without a response.
pub struct UnansweredGets(pub Arc<MockServer>);

#[async_trait]
impl Transport for UnansweredGets {
    async fn head(&self, url: &str, headers: HeaderMap) -> Result<HttpResponse> {
        self.0.head(url, headers).await
    }

    async fn get(&self, _url: &str, headers: HeaderMap) -> Result<HttpResponse> {
        self.0.record("GET", &headers);
        futures::future::pending().await
    }
}

pub fn scratch_dir() -> PathBuf {
    std::env::temp_dir().join(format!("rdl-engine-test-{}", uuid::Uuid::new_v4()))
}

pub fn config(dir: &PathBuf, max_threads: usize, max_retry_count: u32) -> EngineConfig {
    EngineConfig {
        max_threads,
        max_retry_count,
        default_save_path: dir.clone(),
        retry_base_delay_ms: 0,
        retry_max_delay_ms: 0,
        ..EngineConfig::default()
    }
}

pub fn engine(server: &Arc<MockServer>, dir: &PathBuf, max_threads: usize) -> DownloadEngine {
    DownloadEngine::new(config(dir, max_threads, 3), server.clone())
}
