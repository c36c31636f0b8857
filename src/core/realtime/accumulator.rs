//! Running duration of audio appended since the last commit or clear.

use parking_lot::Mutex;
use tracing::{debug, warn};

/// Shortest buffer the server accepts for a commit.
pub const MIN_COMMIT_DURATION_MS: u64 = 100;

/// Duration of `byte_len` bytes of PCM audio, rounded down to whole samples.
#[inline]
pub fn chunk_duration_ms(byte_len: usize, bytes_per_sample: u32, sample_rate: u32) -> u64 {
    if bytes_per_sample == 0 || sample_rate == 0 {
        return 0;
    }
    let samples = byte_len as u64 / u64::from(bytes_per_sample);
    samples * 1000 / u64::from(sample_rate)
}

/// Every read-modify-write of the counter happens under one lock, together
/// with the enqueue of the matching frame, so append, commit and clear
/// observe each other in a consistent order.
pub struct AudioAccumulator {
    duration_ms: Mutex<u64>,
    min_commit_ms: u64,
}

impl Default for AudioAccumulator {
    fn default() -> Self {
        Self::new(MIN_COMMIT_DURATION_MS)
    }
}

impl AudioAccumulator {
    pub fn new(min_commit_ms: u64) -> Self {
        Self {
            duration_ms: Mutex::new(0),
            min_commit_ms,
        }
    }

    pub fn min_commit_ms(&self) -> u64 {
        self.min_commit_ms
    }

    /// Run `enqueue` and add `duration_ms` to the total.
    pub fn append_with<T>(&self, duration_ms: u64, enqueue: impl FnOnce() -> T) -> T {
        let mut total = self.duration_ms.lock();
        let out = enqueue();
        *total = total.saturating_add(duration_ms);
        out
    }

    /// Run `enqueue` and reset the total, unless less than the minimum has
    /// accumulated. Returns whether the commit happened.
    pub fn commit_with(&self, enqueue: impl FnOnce()) -> bool {
        let mut total = self.duration_ms.lock();
        if *total < self.min_commit_ms {
            warn!(
                "Skipping buffer commit: insufficient audio duration ({} ms < {} ms)",
                *total, self.min_commit_ms
            );
            return false;
        }
        enqueue();
        debug!("Committing {} ms of audio", *total);
        *total = 0;
        true
    }

    /// Run `enqueue` and reset the total unconditionally.
    pub fn clear_with(&self, enqueue: impl FnOnce()) {
        let mut total = self.duration_ms.lock();
        enqueue();
        *total = 0;
    }

    pub fn reset(&self) {
        *self.duration_ms.lock() = 0;
    }

    /// Snapshot of the running total.
    pub fn current_ms(&self) -> u64 {
        *self.duration_ms.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_duration() {
        assert_eq!(chunk_duration_ms(4800, 2, 24000), 100);
        assert_eq!(chunk_duration_ms(800, 1, 8000), 100);
        assert_eq!(chunk_duration_ms(4801, 2, 24000), 100);
        assert_eq!(chunk_duration_ms(47, 2, 24000), 0);
        assert_eq!(chunk_duration_ms(4800, 0, 24000), 0);
        assert_eq!(chunk_duration_ms(4800, 2, 0), 0);
    }

    #[test]
    fn test_append_accumulates() {
        let acc = AudioAccumulator::default();
        let mut enqueued = 0;
        acc.append_with(40, || enqueued += 1);
        acc.append_with(40, || enqueued += 1);
        assert_eq!(acc.current_ms(), 80);
        assert_eq!(enqueued, 2);
    }

    #[test]
    fn test_commit_below_minimum_skips() {
        let acc = AudioAccumulator::default();
        acc.append_with(99, || ());
        let mut enqueued = false;
        assert!(!acc.commit_with(|| enqueued = true));
        assert!(!enqueued);
        assert_eq!(acc.current_ms(), 99);
    }

    #[test]
    fn test_commit_at_minimum_resets() {
        let acc = AudioAccumulator::default();
        acc.append_with(100, || ());
        let mut enqueued = 0;
        assert!(acc.commit_with(|| enqueued += 1));
        assert_eq!(enqueued, 1);
        assert_eq!(acc.current_ms(), 0);
    }

    #[test]
    fn test_clear_always_resets() {
        let acc = AudioAccumulator::default();
        let mut enqueued = 0;
        acc.clear_with(|| enqueued += 1);
        assert_eq!(acc.current_ms(), 0);

        acc.append_with(250, || ());
        acc.clear_with(|| enqueued += 1);
        assert_eq!(acc.current_ms(), 0);
        assert_eq!(enqueued, 2);
    }

    #[test]
    fn test_custom_minimum() {
        let acc = AudioAccumulator::new(200);
        acc.append_with(150, || ());
        assert!(!acc.commit_with(|| ()));
        acc.append_with(50, || ());
        assert!(acc.commit_with(|| ()));
    }
}
