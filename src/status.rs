/// Progress snapshot emitted by a running download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DownloadStatus {
    pub total_length: u64,
    pub downloaded_length: u64,
    /// The server did not announce a length, so `total_length` is not known.
    pub chunked: bool,
}

impl DownloadStatus {
    pub fn new(total_length: u64, downloaded_length: u64) -> Self {
        Self {
            total_length,
            downloaded_length,
            chunked: false,
        }
    }

    pub fn unknown_length(downloaded_length: u64) -> Self {
        Self {
            total_length: 0,
            downloaded_length,
            chunked: true,
        }
    }

    pub fn percent(&self) -> f64 {
        if self.chunked || self.total_length == 0 {
            return 0.0;
        }
        (self.downloaded_length as f64 / self.total_length as f64) * 100.0
    }

    pub fn is_complete(&self) -> bool {
        !self.chunked && self.downloaded_length == self.total_length
    }
}
