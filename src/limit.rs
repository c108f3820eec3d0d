use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use tracing::warn;

/// Engine-wide byte budget shared by every download and chunk worker.
pub struct ByteLimiter {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    burst: u32,
}

impl ByteLimiter {
    pub fn new(bytes_per_sec: NonZeroU32) -> Self {
        Self {
            limiter: RateLimiter::direct(Quota::per_second(bytes_per_sec)),
            burst: bytes_per_sec.get(),
        }
    }

    pub fn from_limit(bytes_per_sec: Option<u32>) -> Option<Self> {
        bytes_per_sec.and_then(NonZeroU32::new).map(Self::new)
    }

    /// Waits until `len` bytes may be written. Requests larger than one second of
    /// budget are taken in burst-sized slices.
    pub async fn consume(&self, len: usize) {
        let mut remaining = len as u64;
        while remaining > 0 {
            let slice = remaining.min(self.burst as u64) as u32;
            let Some(n) = NonZeroU32::new(slice) else {
                return;
            };
            if let Err(e) = self.limiter.until_n_ready(n).await {
                warn!(error = %e, "Rate limiter rejected request");
                return;
            }
            remaining -= slice as u64;
        }
    }
}
