//! Classification requests. Each check writes what it learns into the session's record.

use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, IF_MODIFIED_SINCE, RANGE};
use reqwest::StatusCode;
use tracing::{debug, info};

use crate::error::{DownloadError, Result};
use crate::retry::retry;
use crate::session::Session;
use crate::transport::HttpResponse;

/// Range asked for when testing whether the server honours partial requests.
pub const TEST_RANGE_SUPPORT: &str = "bytes=0-";

fn is_transient(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// HEAD, repeated as a GET when the server refuses HEAD. The GET body is dropped unread.
async fn head_or_get(session: &Session, headers: HeaderMap) -> Result<HttpResponse> {
    let response = session.head(headers.clone()).await?;
    match response.status {
        StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED => {
            debug!(url = %session.url, "HEAD rejected, retrying as GET");
            let mut response = session.get(headers).await?;
            response.body = futures::stream::empty().boxed();
            Ok(response)
        }
        _ => Ok(response),
    }
}

/// Existence and length check. Client-side rejections fail at once with
/// [`DownloadError::IllegalUrl`]; server-side ones go through the retry budget.
pub async fn check_url(session: &Session) -> Result<()> {
    let response = retry(&session.retry, &session.token, "check url", |_| async move {
        let response = head_or_get(session, HeaderMap::new()).await?;
        if !response.status.is_success() {
            return Err(DownloadError::IllegalUrl {
                url: session.url.clone(),
                status: response.status,
            });
        }
        Ok(response)
    })
    .await?;

    let mut record = session.record.lock().await;
    record.content_length = response.content_length();
    record.last_modified = response.last_modified();
    debug!(
        url = %session.url,
        content_length = ?record.content_length,
        last_modified = ?record.last_modified,
        "Checked url"
    );
    Ok(())
}

pub async fn check_range(session: &Session) -> Result<()> {
    let response = retry(&session.retry, &session.token, "check range", |_| async move {
        let mut headers = HeaderMap::new();
        headers.insert(RANGE, HeaderValue::from_static(TEST_RANGE_SUPPORT));
        let response = head_or_get(session, headers).await?;
        if is_transient(response.status) {
            return Err(DownloadError::http_status(
                response.status,
                session.url.clone(),
                "check range",
            ));
        }
        Ok(response)
    })
    .await?;

    let honoured = response.status == StatusCode::PARTIAL_CONTENT
        || (response.status.is_success() && response.content_range().is_some());

    let mut record = session.record.lock().await;
    if record.content_length.is_none() {
        record.content_length = response.content_range_total();
    }
    record.supports_range = honoured && record.content_length.is_some_and(|len| len > 0);
    debug!(url = %session.url, supports_range = record.supports_range, "Checked range support");
    Ok(())
}

/// Conditional request against the tag stored by an earlier run.
///
/// Only `304 Not Modified` keeps the earlier state valid. Without a tag nothing is
/// sent and the resource counts as changed.
pub async fn check_server_file(session: &Session, last_modified: Option<&str>) -> Result<()> {
    let tag = last_modified.and_then(|tag| HeaderValue::from_str(tag).ok());
    let Some(tag) = tag else {
        session.record.lock().await.server_file_changed = true;
        debug!(url = %session.url, "No usable last-modified tag, treating as changed");
        return Ok(());
    };

    let status = retry(&session.retry, &session.token, "check server file", |_| {
        let tag = tag.clone();
        async move {
            let mut headers = HeaderMap::new();
            headers.insert(IF_MODIFIED_SINCE, tag);
            let response = head_or_get(session, headers).await?;
            if is_transient(response.status) {
                return Err(DownloadError::http_status(
                    response.status,
                    session.url.clone(),
                    "check server file",
                ));
            }
            Ok(response.status)
        }
    })
    .await?;

    let changed = status != StatusCode::NOT_MODIFIED;
    session.record.lock().await.server_file_changed = changed;
    if changed {
        info!(url = %session.url, %status, "Server file changed since last download");
    }
    Ok(())
}
