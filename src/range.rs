use serde::{Deserialize, Serialize};

/// One worker's byte window within the whole resource. Offsets are inclusive.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadRange {
    pub index: usize,
    pub start_offset: u64,
    pub end_offset: u64,
    pub current_offset: u64,
}

impl DownloadRange {
    pub fn new(index: usize, start_offset: u64, end_offset: u64) -> Self {
        Self {
            index,
            start_offset,
            end_offset,
            current_offset: start_offset,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.current_offset > self.end_offset
    }

    pub fn is_valid(&self) -> bool {
        self.start_offset <= self.end_offset
            && self.start_offset <= self.current_offset
            && self.current_offset <= self.end_offset + 1
    }

    pub fn downloaded(&self) -> u64 {
        self.current_offset.saturating_sub(self.start_offset)
    }

    pub fn size(&self) -> u64 {
        self.end_offset - self.start_offset + 1
    }

    /// Value of the `Range` header for the bytes this range still needs.
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.current_offset, self.end_offset)
    }

    /// Same window, ignoring progress.
    pub fn same_bounds(&self, other: &DownloadRange) -> bool {
        self.index == other.index
            && self.start_offset == other.start_offset
            && self.end_offset == other.end_offset
    }
}

/// Splits `[0, content_length)` into `min(max_threads, content_length)` contiguous ranges.
///
/// Boundaries depend only on the two inputs, so a resumed download lines up with the
/// ranges persisted by an earlier run.
pub fn partition(content_length: u64, max_threads: usize) -> Vec<DownloadRange> {
    let count = (max_threads.max(1) as u64).min(content_length);
    if count == 0 {
        return vec![];
    }

    let part_size = content_length / count;
    (0..count)
        .map(|i| {
            let start = i * part_size;
            let end = if i == count - 1 {
                content_length - 1
            } else {
                (i + 1) * part_size - 1
            };
            DownloadRange::new(i as usize, start, end)
        })
        .collect()
}

pub fn total_downloaded(ranges: &[DownloadRange]) -> u64 {
    ranges.iter().map(DownloadRange::downloaded).sum()
}
