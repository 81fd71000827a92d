//! Counter tables backing the Space-Saving sketch.
//!
//! All three backends hold the same key → [`Counter`] mapping and differ only
//! in the auxiliary index used to find the eviction victim:
//!
//! | backend | increment tracked key | insert | evict minimum |
//! |---|---|---|---|
//! | [`HashOnlyCounters`] | O(1) | O(1) | O(k) full scan |
//! | [`HeapCounters`] | O(k) slot scan + O(log k) sift | O(log k) | O(log k) |
//! | [`SortedArrayCounters`] | O(k) remove + reinsert | O(k) | O(1) pop front |
//!
//! The heap keeps its asymmetry (fast eviction, slow in-place update); the
//! update-rate benchmark compares all three.
//!
//! # Tie-break
//!
//! Every backend orders counters by `(count, seq)`, where `seq` is the
//! sequence number the key received when it last entered the table. When
//! several counters share the minimum count, the oldest-inserted one is
//! evicted. The order is total, so all three backends evict the same key for
//! the same stream.

mod hash_only;
mod heap;
mod sorted_array;

use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

use flowjoin_error::FlowJoinError;
use serde::{Deserialize, Serialize};

pub use hash_only::HashOnlyCounters;
pub use heap::HeapCounters;
pub use sorted_array::SortedArrayCounters;

/// Bound satisfied by keys the sketch can track.
pub trait SketchKey: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

impl<T: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static> SketchKey for T {}

/// Selects the auxiliary index of the counter table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterBackend {
    /// Counters only; eviction scans every counter.
    #[default]
    HashOnly,
    /// Counters plus a binary min-heap over `(count, seq)`.
    Heap,
    /// Counters plus an array kept ascending by `(count, seq)`.
    SortedArray,
}

impl CounterBackend {
    /// All backends, in declaration order.
    pub const ALL: [Self; 3] = [Self::HashOnly, Self::Heap, Self::SortedArray];

    /// Stable label used in config files, logs, and bench ids.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HashOnly => "hash_only",
            Self::Heap => "heap",
            Self::SortedArray => "sorted_array",
        }
    }

    /// Allocate an empty counter table of this kind.
    #[must_use]
    pub fn new_table<K: SketchKey>(self, capacity: usize) -> Box<dyn FrequencyCounters<K>> {
        match self {
            Self::HashOnly => Box::new(HashOnlyCounters::with_capacity(capacity)),
            Self::Heap => Box::new(HeapCounters::with_capacity(capacity)),
            Self::SortedArray => Box::new(SortedArrayCounters::with_capacity(capacity)),
        }
    }
}

impl fmt::Display for CounterBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CounterBackend {
    type Err = FlowJoinError;

    /// Accepts the snake_case labels plus the spellings used by older
    /// experiment scripts (`hash_table_only`, `hash`, `sorted`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hash_only" | "hash_table_only" | "hash" => Ok(Self::HashOnly),
            "heap" | "min_heap" => Ok(Self::Heap),
            "sorted_array" | "sorted" => Ok(Self::SortedArray),
            _ => Err(FlowJoinError::unknown_backend(s)),
        }
    }
}

/// Approximate count of one tracked key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Counter {
    /// Estimated frequency; never below the true frequency.
    pub count: u64,
    /// Count inherited from the evicted predecessor. `count - error` is a
    /// lower bound on the true frequency.
    pub error: u64,
    /// Insertion sequence number, used for the oldest-first tie-break.
    pub seq: u64,
}

impl Counter {
    #[inline]
    #[must_use]
    pub const fn fresh(seq: u64) -> Self {
        Self {
            count: 1,
            error: 0,
            seq,
        }
    }

    /// Counter for a key that replaces an evicted one.
    #[inline]
    #[must_use]
    pub const fn inherited(evicted_count: u64, seq: u64) -> Self {
        Self {
            count: evicted_count + 1,
            error: evicted_count,
            seq,
        }
    }

    /// Ordering rank inside the eviction index.
    #[inline]
    #[must_use]
    pub const fn rank(&self) -> (u64, u64) {
        (self.count, self.seq)
    }
}

/// What one `increment_or_add` call did to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterUpdate<K> {
    /// The key was tracked; its count grew by one.
    Incremented,
    /// The key entered a table with free capacity.
    Inserted,
    /// The key replaced the minimum counter.
    Replaced { evicted: K, evicted_count: u64 },
}

/// Counter table capability shared by all backends.
///
/// Implementations only provide the primitive operations; the Space-Saving
/// update rule lives in the provided [`increment_or_add`] so every backend
/// applies it identically.
///
/// [`increment_or_add`]: FrequencyCounters::increment_or_add
pub trait FrequencyCounters<K: SketchKey>: fmt::Debug + Send + Sync {
    /// Which backend this table is.
    fn backend(&self) -> CounterBackend;

    /// Number of tracked keys.
    fn size(&self) -> usize;

    /// Counter of a tracked key.
    fn get(&self, key: &K) -> Option<Counter>;

    /// Add one to a tracked key and fix up the index. Returns `false` and
    /// leaves the table untouched when `key` is not tracked.
    fn increment(&mut self, key: &K) -> bool;

    /// Start tracking an untracked key.
    fn insert(&mut self, key: K, counter: Counter);

    /// Remove and return the counter with the smallest `(count, seq)`.
    fn evict_minimum(&mut self) -> Option<(K, Counter)>;

    /// Copy of every tracked `(key, counter)` pair, in no particular order.
    fn entries(&self) -> Vec<(K, Counter)>;

    /// Apply the Space-Saving update for one stream element.
    ///
    /// `seq` is assigned to the key if it enters the table.
    fn increment_or_add(&mut self, key: K, capacity: usize, seq: u64) -> CounterUpdate<K> {
        if self.increment(&key) {
            return CounterUpdate::Incremented;
        }
        if self.size() < capacity {
            self.insert(key, Counter::fresh(seq));
            return CounterUpdate::Inserted;
        }
        match self.evict_minimum() {
            Some((evicted, victim)) => {
                self.insert(key, Counter::inherited(victim.count, seq));
                CounterUpdate::Replaced {
                    evicted,
                    evicted_count: victim.count,
                }
            }
            // Only reachable with capacity 0, which construction rejects.
            None => CounterUpdate::Inserted,
        }
    }
}
