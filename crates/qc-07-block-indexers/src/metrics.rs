//! Metrics and observer hooks for index operations
//!
//! Filter construction and storage report progress through an injectable
//! [`IndexObserver`] instead of writing to stderr. [`IndexMetrics`] is the
//! built-in counter implementation.
//!
//! ## Usage
//!
//! ```ignore
//! use qc_07_block_indexers::{FilterIndex, IndexMetrics};
//! use std::sync::Arc;
//!
//! let metrics = Arc::new(IndexMetrics::new());
//! let index = FilterIndex::new(db, config).with_observer(metrics.clone());
//!
//! // ... connect blocks ...
//! let snapshot = metrics.snapshot();
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::domain::BlockHash;

/// Trait for observing index activity
///
/// Implement this to forward index events to external metrics systems.
pub trait IndexObserver: Send + Sync {
    /// A filter was built for a block.
    fn on_filter_built(&self, block_hash: &BlockHash, elements: usize, bytes: usize, duration: Duration);

    /// A filter was written to the index bucket.
    fn on_filter_stored(&self, block_hash: &BlockHash, bytes: usize);

    /// A filter was removed on disconnect.
    fn on_filter_removed(&self, block_hash: &BlockHash);

    /// A lookup completed.
    fn on_lookup(&self, duration: Duration, found: bool);
}

/// No-op observer for when metrics are disabled
#[derive(Default)]
pub struct NoOpObserver;

impl IndexObserver for NoOpObserver {
    fn on_filter_built(&self, _: &BlockHash, _: usize, _: usize, _: Duration) {}
    fn on_filter_stored(&self, _: &BlockHash, _: usize) {}
    fn on_filter_removed(&self, _: &BlockHash) {}
    fn on_lookup(&self, _: Duration, _: bool) {}
}

/// Thread-safe counters for the filter index
#[derive(Default)]
pub struct IndexMetrics {
    /// Filters built
    pub filters_built: AtomicU64,
    /// Elements hashed into filters
    pub elements_indexed: AtomicU64,
    /// Filters written
    pub filters_stored: AtomicU64,
    /// Filters removed by disconnects
    pub filters_removed: AtomicU64,
    /// Bytes written
    pub bytes_stored: AtomicU64,
    /// Lookups performed
    pub lookups_performed: AtomicU64,
    /// Lookups that found no entry
    pub lookup_misses: AtomicU64,
    /// Cumulative build time in nanoseconds
    pub build_time_ns: AtomicU64,
}

impl IndexMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> IndexMetricsSnapshot {
        IndexMetricsSnapshot {
            filters_built: self.filters_built.load(Ordering::Relaxed),
            elements_indexed: self.elements_indexed.load(Ordering::Relaxed),
            filters_stored: self.filters_stored.load(Ordering::Relaxed),
            filters_removed: self.filters_removed.load(Ordering::Relaxed),
            bytes_stored: self.bytes_stored.load(Ordering::Relaxed),
            lookups_performed: self.lookups_performed.load(Ordering::Relaxed),
            lookup_misses: self.lookup_misses.load(Ordering::Relaxed),
            avg_build_ns: self.avg_build_time_ns(),
        }
    }

    /// Average build time in nanoseconds
    pub fn avg_build_time_ns(&self) -> u64 {
        let total = self.build_time_ns.load(Ordering::Relaxed);
        let count = self.filters_built.load(Ordering::Relaxed);
        if count > 0 {
            total / count
        } else {
            0
        }
    }

    /// Reset all counters
    pub fn reset(&self) {
        self.filters_built.store(0, Ordering::Relaxed);
        self.elements_indexed.store(0, Ordering::Relaxed);
        self.filters_stored.store(0, Ordering::Relaxed);
        self.filters_removed.store(0, Ordering::Relaxed);
        self.bytes_stored.store(0, Ordering::Relaxed);
        self.lookups_performed.store(0, Ordering::Relaxed);
        self.lookup_misses.store(0, Ordering::Relaxed);
        self.build_time_ns.store(0, Ordering::Relaxed);
    }
}

impl IndexObserver for IndexMetrics {
    fn on_filter_built(&self, _: &BlockHash, elements: usize, _: usize, duration: Duration) {
        self.filters_built.fetch_add(1, Ordering::Relaxed);
        self.elements_indexed.fetch_add(elements as u64, Ordering::Relaxed);
        self.build_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    fn on_filter_stored(&self, _: &BlockHash, bytes: usize) {
        self.filters_stored.fetch_add(1, Ordering::Relaxed);
        self.bytes_stored.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    fn on_filter_removed(&self, _: &BlockHash) {
        self.filters_removed.fetch_add(1, Ordering::Relaxed);
    }

    fn on_lookup(&self, _: Duration, found: bool) {
        self.lookups_performed.fetch_add(1, Ordering::Relaxed);
        if !found {
            self.lookup_misses.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Point-in-time metrics snapshot
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexMetricsSnapshot {
    pub filters_built: u64,
    pub elements_indexed: u64,
    pub filters_stored: u64,
    pub filters_removed: u64,
    pub bytes_stored: u64,
    pub lookups_performed: u64,
    pub lookup_misses: u64,
    pub avg_build_ns: u64,
}
