use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::range::{partition, DownloadRange};

/// Per-URL metadata for a download, persisted next to the output file.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TemporaryRecord {
    pub url: String,
    pub save_name: String,
    pub save_path: PathBuf,
    pub content_length: Option<u64>,
    pub last_modified: Option<String>,
    pub supports_range: bool,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub ranges: Vec<DownloadRange>,
    pub updated_at: DateTime<Utc>,

    #[serde(skip)]
    pub file_already_exists: bool,
    #[serde(skip)]
    pub server_file_changed: bool,
}

impl TemporaryRecord {
    pub fn new(url: impl Into<String>, save_name: impl Into<String>, save_path: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            save_name: save_name.into(),
            save_path: save_path.into(),
            content_length: None,
            last_modified: None,
            supports_range: false,
            completed: false,
            ranges: vec![],
            updated_at: Utc::now(),
            file_already_exists: false,
            server_file_changed: true,
        }
    }

    pub fn file_path(&self) -> PathBuf {
        self.save_path.join(&self.save_name)
    }

    pub fn record_path(&self) -> PathBuf {
        self.save_path.join(format!("{}.rdl.json", self.save_name))
    }

    pub fn downloaded(&self) -> u64 {
        crate::range::total_downloaded(&self.ranges)
    }

    /// Whether `stored` describes an unfinished chunked download that this run can pick up.
    ///
    /// `self` carries what the server reported just now, `file_len` the size of the
    /// destination file on disk.
    pub fn can_resume_from(&self, stored: &TemporaryRecord, max_threads: usize, file_len: u64) -> bool {
        let Some(length) = self.content_length else {
            return false;
        };
        if !self.supports_range || stored.completed || stored.url != self.url {
            return false;
        }
        if stored.content_length != Some(length) || file_len != length {
            return false;
        }

        let expected = partition(length, max_threads);
        expected.len() == stored.ranges.len()
            && expected
                .iter()
                .zip(&stored.ranges)
                .all(|(want, have)| want.same_bounds(have) && have.is_valid())
    }

    /// Whether `stored` marks a finished download of the resource the server describes now.
    pub fn matches_completed(&self, stored: &TemporaryRecord, file_len: u64) -> bool {
        match self.content_length {
            Some(length) => {
                stored.completed
                    && stored.url == self.url
                    && stored.content_length == Some(length)
                    && file_len == length
            }
            None => false,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checked(length: u64) -> TemporaryRecord {
        let mut record = TemporaryRecord::new("http://host/file.bin", "file.bin", "/tmp");
        record.content_length = Some(length);
        record.supports_range = true;
        record
    }

    #[test]
    fn resumes_matching_partition() {
        let current = checked(1000);
        let mut stored = checked(1000);
        stored.ranges = partition(1000, 2);
        stored.ranges[0].current_offset = 300;

        assert!(current.can_resume_from(&stored, 2, 1000));
    }

    #[test]
    fn rejects_resume_when_partition_differs() {
        let current = checked(1000);
        let mut stored = checked(1000);
        stored.ranges = partition(1000, 4);

        assert!(!current.can_resume_from(&stored, 2, 1000));
    }

    #[test]
    fn rejects_resume_when_length_changed() {
        let current = checked(1200);
        let mut stored = checked(1000);
        stored.ranges = partition(1000, 1);

        assert!(!current.can_resume_from(&stored, 1, 1000));
    }

    #[test]
    fn rejects_resume_with_truncated_file() {
        let current = checked(1000);
        let mut stored = checked(1000);
        stored.ranges = partition(1000, 1);

        assert!(!current.can_resume_from(&stored, 1, 10));
    }

    #[test]
    fn completed_record_matches_same_length() {
        let current = checked(1000);
        let mut stored = checked(1000);
        stored.completed = true;

        assert!(current.matches_completed(&stored, 1000));
        assert!(!current.matches_completed(&stored, 999));
    }
}
