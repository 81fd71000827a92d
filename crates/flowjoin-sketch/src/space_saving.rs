//! Space-Saving top-k frequency estimation (Metwally et al.).
//!
//! The sketch keeps at most `k` counters. A tracked key is incremented; an
//! untracked key either takes a free counter or replaces the counter with the
//! smallest `(count, seq)`, inheriting `min_count + 1`. For a stream of length
//! `n` this guarantees, for every key and every backend:
//!
//! ```text
//! true(key) <= estimate(key) <= true(key) + error_bound <= true(key) + floor(n / k)
//! ```
//!
//! and any key with `true(key) > n / k` is still tracked at the end.

use flowjoin_error::{FlowJoinError, Result};
use tracing::debug;

use crate::counters::{Counter, CounterBackend, CounterUpdate, FrequencyCounters, SketchKey};
use crate::histogram::{Histogram, HistogramEntry};

/// Bounded-memory approximate frequency summary of one key stream.
#[derive(Debug)]
pub struct SpaceSaving<K: SketchKey> {
    capacity: usize,
    table: Box<dyn FrequencyCounters<K>>,
    observed: u64,
    next_seq: u64,
    evictions: u64,
    error_bound: u64,
}

impl<K: SketchKey> SpaceSaving<K> {
    /// Create an empty sketch with `capacity` counters.
    ///
    /// # Errors
    ///
    /// [`FlowJoinError::InvalidCapacity`] when `capacity` is zero.
    pub fn new(capacity: usize, backend: CounterBackend) -> Result<Self> {
        if capacity == 0 {
            return Err(FlowJoinError::InvalidCapacity { capacity });
        }
        Ok(Self {
            capacity,
            table: backend.new_table(capacity),
            observed: 0,
            next_seq: 0,
            evictions: 0,
            error_bound: 0,
        })
    }

    /// Create a sketch from a backend label such as `"heap"`.
    ///
    /// # Errors
    ///
    /// [`FlowJoinError::UnknownBackend`] for an unrecognized label, and
    /// [`FlowJoinError::InvalidCapacity`] when `capacity` is zero.
    pub fn with_backend_name(capacity: usize, backend: &str) -> Result<Self> {
        Self::new(capacity, backend.parse()?)
    }

    /// Consume one stream element.
    pub fn increment_or_add(&mut self, key: K) {
        self.observed += 1;
        let seq = self.next_seq;
        match self.table.increment_or_add(key, self.capacity, seq) {
            CounterUpdate::Incremented => {}
            CounterUpdate::Inserted => self.next_seq += 1,
            CounterUpdate::Replaced { evicted_count, .. } => {
                self.next_seq += 1;
                self.evictions += 1;
                self.error_bound = self.error_bound.max(evicted_count);
            }
        }
    }

    /// Consume every element of `stream` in arrival order.
    pub fn process<I>(&mut self, stream: I)
    where
        I: IntoIterator<Item = K>,
    {
        let before = self.observed;
        for key in stream {
            self.increment_or_add(key);
        }
        debug!(
            backend = %self.backend(),
            capacity = self.capacity,
            consumed = self.observed - before,
            tracked = self.size(),
            evictions = self.evictions,
            error_bound = self.error_bound,
            "space-saving stream processed"
        );
    }

    /// Snapshot of every tracked key, descending by count.
    ///
    /// Does not modify the sketch; repeated calls without intervening
    /// processing return identical histograms.
    #[must_use]
    pub fn get_heavy_hitters(&self) -> Histogram<K> {
        let mut counters = self.table.entries();
        counters.sort_unstable_by(|(_, a), (_, b)| b.count.cmp(&a.count).then(a.seq.cmp(&b.seq)));
        Histogram {
            backend: self.backend(),
            capacity: self.capacity,
            observed: self.observed,
            error_bound: self.error_bound,
            entries: counters
                .into_iter()
                .map(|(key, c)| HistogramEntry {
                    key,
                    count: c.count,
                    error: c.error,
                })
                .collect(),
        }
    }

    /// Freeze the sketch into its final histogram.
    #[must_use]
    pub fn into_histogram(self) -> Histogram<K> {
        self.get_heavy_hitters()
    }

    /// Current counter of `key`, if tracked.
    #[must_use]
    pub fn estimate(&self, key: &K) -> Option<Counter> {
        self.table.get(key)
    }

    /// Number of tracked keys; never exceeds [`capacity`](Self::capacity).
    #[must_use]
    pub fn size(&self) -> usize {
        self.table.size()
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn backend(&self) -> CounterBackend {
        self.table.backend()
    }

    /// Stream length consumed so far.
    #[must_use]
    pub const fn observed(&self) -> u64 {
        self.observed
    }

    /// Number of counters replaced so far.
    #[must_use]
    pub const fn evictions(&self) -> u64 {
        self.evictions
    }

    /// Largest count inherited by a replacing key so far.
    #[must_use]
    pub const fn error_bound(&self) -> u64 {
        self.error_bound
    }
}
