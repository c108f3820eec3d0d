use url::Url;

use crate::error::{DownloadError, Result};

/// Last path segment of the URL, or a generated name when the path has none.
pub fn get_filename_from_url(url_str: &str) -> Result<String> {
    let url = Url::parse(url_str).map_err(|e| DownloadError::InvalidUrl {
        input: url_str.to_string(),
        reason: e.to_string(),
    })?;

    if let Some(filename) = url.path_segments().and_then(|mut segments| segments.next_back()) {
        if !filename.is_empty() {
            return Ok(filename.to_string());
        }
    }

    Ok(format!("download_{}", uuid::Uuid::new_v4()))
}

pub fn sanitize_filename(filename: &str) -> String {
    filename.replace(|c: char| !c.is_alphanumeric() && c != '.' && c != '-' && c != '_', "_")
}

/// Caller-supplied name when given, otherwise one derived from the URL.
pub fn resolve_save_name(url: &str, save_name: &str) -> Result<String> {
    let name = save_name.trim();
    if name.is_empty() {
        let derived = get_filename_from_url(url)?;
        return Ok(sanitize_filename(&derived));
    }
    // The URL still has to parse even when the caller names the file.
    Url::parse(url).map_err(|e| DownloadError::InvalidUrl {
        input: url.to_string(),
        reason: e.to_string(),
    })?;
    Ok(sanitize_filename(name))
}
