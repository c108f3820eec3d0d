use reqwest::StatusCode;

pub type Result<T, E = DownloadError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("{url} is already downloading")]
    AlreadyDownloading { url: String },

    #[error("no active download for {url}")]
    NotFound { url: String },

    #[error("invalid URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("url is illegal: {url} answered HTTP {status}")]
    IllegalUrl { url: String, status: StatusCode },

    #[error("request failed with HTTP {status} during {operation} for {url}")]
    HttpStatus {
        status: StatusCode,
        url: String,
        operation: &'static str,
    },

    #[error("network error: {reason}")]
    Network { reason: String },

    #[error("chunk {index} failed: {source}")]
    Chunk {
        index: usize,
        #[source]
        source: Box<DownloadError>,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("record error: {source}")]
    Record {
        #[from]
        source: serde_json::Error,
    },

    #[error("{operation} failed after {attempts} attempts: {}", last_reason(.errors))]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
        errors: Vec<DownloadError>,
    },

    #[error("{} errors occurred: {}", .errors.len(), last_reason(.errors))]
    Composite { errors: Vec<DownloadError> },

    #[error("download cancelled")]
    Cancelled,
}

fn last_reason(errors: &[DownloadError]) -> String {
    errors
        .last()
        .map(|e| e.to_string())
        .unwrap_or_else(|| "no error recorded".to_string())
}

impl From<reqwest::Error> for DownloadError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network {
            reason: err.to_string(),
        }
    }
}

impl DownloadError {
    pub fn network(reason: impl Into<String>) -> Self {
        Self::Network {
            reason: reason.into(),
        }
    }

    pub fn http_status(status: StatusCode, url: impl Into<String>, operation: &'static str) -> Self {
        Self::HttpStatus {
            status,
            url: url.into(),
            operation,
        }
    }

    pub fn chunk(index: usize, source: DownloadError) -> Self {
        Self::Chunk {
            index,
            source: Box::new(source),
        }
    }

    /// Whether the retry wrapper may re-issue the call that produced this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::IllegalUrl { status, .. } | Self::HttpStatus { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::AlreadyDownloading { .. }
            | Self::NotFound { .. }
            | Self::InvalidUrl { .. }
            | Self::Chunk { .. }
            | Self::Io { .. }
            | Self::Record { .. }
            | Self::RetriesExhausted { .. }
            | Self::Composite { .. }
            | Self::Cancelled => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Unwraps composite and retry-exhausted failures into their leaves.
    pub fn flatten(&self) -> Vec<&DownloadError> {
        match self {
            Self::Composite { errors } | Self::RetriesExhausted { errors, .. } => {
                errors.iter().flat_map(|e| e.flatten()).collect()
            }
            Self::Chunk { source, .. } if source.is_composite() => source.flatten(),
            other => vec![other],
        }
    }

    fn is_composite(&self) -> bool {
        matches!(self, Self::Composite { .. } | Self::RetriesExhausted { .. })
    }
}
