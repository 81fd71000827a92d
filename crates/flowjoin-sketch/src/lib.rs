//! Bounded-memory frequency estimation for join-key streams.
//!
//! [`SpaceSaving`] summarizes a key stream in `k` counters; [`Histogram`] is
//! its frozen output. The counter table behind the sketch is chosen at
//! construction through [`CounterBackend`], and each backend keeps its own
//! asymptotic profile so they can be benchmarked against each other.

pub mod counters;
pub mod histogram;
pub mod space_saving;

pub use counters::{
    Counter, CounterBackend, CounterUpdate, FrequencyCounters, HashOnlyCounters, HeapCounters,
    SketchKey, SortedArrayCounters,
};
pub use histogram::{Histogram, HistogramEntry, SkewThreshold};
pub use space_saving::SpaceSaving;
