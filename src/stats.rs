//! Shared statistics registry: monotonic counters, per-second rate rings,
//! and a prediction-error ring, all behind one mutex.
//!
//! Owned by the runtime root and handed to every stage as a shared
//! reference (`Arc<StatsRegistry>`) — never a process-global static.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

const BUCKET_SLOTS: usize = 60;
const ERROR_RING_SLOTS: usize = 1024;

#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    second: i64,
    count: u64,
}

#[derive(Debug, Clone, Copy, Default)]
struct ErrorSample {
    ts: i64,
    abs_err: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    Received,
    Processed,
    Represented,
}

struct Inner {
    received: u64,
    processed: u64,
    represented: u64,
    received_buckets: [Bucket; BUCKET_SLOTS],
    processed_buckets: [Bucket; BUCKET_SLOTS],
    represented_buckets: [Bucket; BUCKET_SLOTS],
    error_ring: [ErrorSample; ERROR_RING_SLOTS],
    error_head: usize,
    error_filled: usize,
}

impl Inner {
    fn buckets_mut(&mut self, which: Counter) -> &mut [Bucket; BUCKET_SLOTS] {
        match which {
            Counter::Received => &mut self.received_buckets,
            Counter::Processed => &mut self.processed_buckets,
            Counter::Represented => &mut self.represented_buckets,
        }
    }

    fn buckets(&self, which: Counter) -> &[Bucket; BUCKET_SLOTS] {
        match which {
            Counter::Received => &self.received_buckets,
            Counter::Processed => &self.processed_buckets,
            Counter::Represented => &self.represented_buckets,
        }
    }
}

/// Snapshot of the three monotonic counters at a single instant.
#[derive(Debug, Clone, Copy)]
pub struct CountsSnapshot {
    pub received: u64,
    pub processed: u64,
    pub represented: u64,
}

pub struct StatsRegistry {
    inner: Mutex<Inner>,
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

impl StatsRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                received: 0,
                processed: 0,
                represented: 0,
                received_buckets: [Bucket::default(); BUCKET_SLOTS],
                processed_buckets: [Bucket::default(); BUCKET_SLOTS],
                represented_buckets: [Bucket::default(); BUCKET_SLOTS],
                error_ring: [ErrorSample::default(); ERROR_RING_SLOTS],
                error_head: 0,
                error_filled: 0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Increment a counter by one and bump its current-second bucket.
    pub fn increment(&self, which: Counter) {
        let now = now_secs();
        let mut guard = self.lock();
        match which {
            Counter::Received => guard.received += 1,
            Counter::Processed => guard.processed += 1,
            Counter::Represented => guard.represented += 1,
        }
        let slot = (now.rem_euclid(BUCKET_SLOTS as i64)) as usize;
        let bucket = &mut guard.buckets_mut(which)[slot];
        if bucket.second != now {
            bucket.second = now;
            bucket.count = 0;
        }
        bucket.count += 1;
    }

    /// Record an absolute prediction error into the 1024-slot ring.
    pub fn record_error(&self, abs_err: f64) {
        let now = now_secs();
        let mut guard = self.lock();
        let head = guard.error_head;
        guard.error_ring[head] = ErrorSample { ts: now, abs_err };
        guard.error_head = (head + 1) % ERROR_RING_SLOTS;
        if guard.error_filled < ERROR_RING_SLOTS {
            guard.error_filled += 1;
        }
    }

    pub fn snapshot_counts(&self) -> CountsSnapshot {
        let guard = self.lock();
        CountsSnapshot {
            received: guard.received,
            processed: guard.processed,
            represented: guard.represented,
        }
    }

    /// Sum of bucket counts whose stored second lies in `(now - window, now]`.
    pub fn rate_window(&self, which: Counter, window_secs: i64) -> u64 {
        let now = now_secs();
        let guard = self.lock();
        guard
            .buckets(which)
            .iter()
            .filter(|b| b.second != 0 || b.count != 0)
            .filter(|b| now - b.second < window_secs && b.second <= now)
            .map(|b| b.count)
            .sum()
    }

    /// Arithmetic mean of `|err|` samples with `now - ts < window_secs`;
    /// NaN if no samples fall in the window.
    pub fn average_error_window(&self, window_secs: i64) -> f64 {
        let now = now_secs();
        let guard = self.lock();
        let mut sum = 0.0;
        let mut n = 0u64;
        for sample in guard.error_ring.iter().take(guard.error_filled) {
            if now - sample.ts < window_secs {
                sum += sample.abs_err;
                n += 1;
            }
        }
        if n == 0 {
            f64::NAN
        } else {
            sum / n as f64
        }
    }
}

impl Default for StatsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_monotonic_and_ordered() {
        let stats = StatsRegistry::new();
        stats.increment(Counter::Received);
        stats.increment(Counter::Received);
        stats.increment(Counter::Processed);
        let counts = stats.snapshot_counts();
        assert_eq!(counts.received, 2);
        assert_eq!(counts.processed, 1);
        assert_eq!(counts.represented, 0);
        assert!(counts.received >= counts.processed);
        assert!(counts.processed >= counts.represented);
    }

    #[test]
    fn rate_window_counts_recent_bucket() {
        let stats = StatsRegistry::new();
        for _ in 0..5 {
            stats.increment(Counter::Received);
        }
        assert_eq!(stats.rate_window(Counter::Received, 60), 5);
    }

    #[test]
    fn average_error_window_is_nan_with_no_samples() {
        let stats = StatsRegistry::new();
        assert!(stats.average_error_window(60).is_nan());
    }

    #[test]
    fn average_error_window_computes_mean() {
        let stats = StatsRegistry::new();
        stats.record_error(1.0);
        stats.record_error(3.0);
        let avg = stats.average_error_window(60);
        assert!((avg - 2.0).abs() < 1e-9);
    }
}
