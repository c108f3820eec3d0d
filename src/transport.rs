use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, HeaderName, CONTENT_LENGTH, CONTENT_RANGE, LAST_MODIFIED};
use reqwest::{Client, StatusCode};

use crate::config::EngineConfig;
use crate::error::{DownloadError, Result};

pub type BodyStream = BoxStream<'static, Result<Bytes>>;

pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: BodyStream,
}

impl HttpResponse {
    fn header_str(&self, name: HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header_str(CONTENT_LENGTH)?.trim().parse().ok()
    }

    pub fn last_modified(&self) -> Option<String> {
        self.header_str(LAST_MODIFIED).map(str::to_string)
    }

    pub fn content_range(&self) -> Option<&str> {
        self.header_str(CONTENT_RANGE)
    }

    /// Total length from a `Content-Range: bytes a-b/total` header.
    pub fn content_range_total(&self) -> Option<u64> {
        self.content_range()?.rsplit('/').next()?.trim().parse().ok()
    }
}

impl std::fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// The wire client the engine drives. Implementations only execute requests;
/// status interpretation and retries stay in the engine.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn head(&self, url: &str, headers: HeaderMap) -> Result<HttpResponse>;

    async fn get(&self, url: &str, headers: HeaderMap) -> Result<HttpResponse>;
}

#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(config.connect_timeout())
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn into_response(response: reqwest::Response) -> HttpResponse {
        HttpResponse {
            status: response.status(),
            headers: response.headers().clone(),
            body: response.bytes_stream().map_err(DownloadError::from).boxed(),
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn head(&self, url: &str, headers: HeaderMap) -> Result<HttpResponse> {
        let response = self.client.head(url).headers(headers).send().await?;
        Ok(Self::into_response(response))
    }

    async fn get(&self, url: &str, headers: HeaderMap) -> Result<HttpResponse> {
        let response = self.client.get(url).headers(headers).send().await?;
        Ok(Self::into_response(response))
    }
}
