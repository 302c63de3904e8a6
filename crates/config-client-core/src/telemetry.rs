//! Client statistics counters.
//!
//! The collector maintains monotonic counters for refresh and cache activity
//! plus a running total of successful-refresh durations. All values use
//! relaxed atomics; a [`ClientStatistics`] snapshot is a point-in-time view
//! suitable for exposing through metrics or logs.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Aggregated client counters.
#[derive(Debug, Default)]
pub struct StatsCollector {
    total_refreshes: AtomicU64,
    successful_refreshes: AtomicU64,
    failed_refreshes: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    refresh_time_total_ms: AtomicU64,
}

impl StatsCollector {
    /// Creates a collector with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the start of a refresh attempt.
    pub fn record_attempt(&self) {
        self.total_refreshes.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a successful refresh and its duration.
    pub fn record_success(&self, duration: Duration) {
        self.successful_refreshes.fetch_add(1, Ordering::Relaxed);
        self.refresh_time_total_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    /// Records a refresh that exhausted its retries.
    pub fn record_failure(&self) {
        self.failed_refreshes.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a read served from the in-memory snapshot.
    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a read that missed the in-memory snapshot.
    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Captures a point-in-time snapshot of the counters.
    pub fn snapshot(&self) -> ClientStatistics {
        let successful_refreshes = self.successful_refreshes.load(Ordering::Relaxed);
        let refresh_time_total_ms = self.refresh_time_total_ms.load(Ordering::Relaxed);
        let average_refresh_time_ms = if successful_refreshes == 0 {
            0.0
        } else {
            refresh_time_total_ms as f64 / successful_refreshes as f64
        };
        ClientStatistics {
            total_refreshes: self.total_refreshes.load(Ordering::Relaxed),
            successful_refreshes,
            failed_refreshes: self.failed_refreshes.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            average_refresh_time_ms,
        }
    }
}

/// Plain data representation of [`StatsCollector`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClientStatistics {
    /// Number of refresh attempts started.
    pub total_refreshes: u64,
    /// Number of refreshes that succeeded.
    pub successful_refreshes: u64,
    /// Number of refreshes that exhausted their retries.
    pub failed_refreshes: u64,
    /// Number of reads served from the in-memory snapshot.
    pub cache_hits: u64,
    /// Number of reads that missed the in-memory snapshot.
    pub cache_misses: u64,
    /// Arithmetic mean of successful-refresh durations in milliseconds.
    pub average_refresh_time_ms: f64,
}

impl fmt::Display for ClientStatistics {
    /// Formats the snapshot into a comma-separated list for logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total_refreshes={}, successful_refreshes={}, failed_refreshes={}, cache_hits={}, cache_misses={}, average_refresh_time_ms={:.1}",
            self.total_refreshes,
            self.successful_refreshes,
            self.failed_refreshes,
            self.cache_hits,
            self.cache_misses,
            self.average_refresh_time_ms
        )
    }
}
