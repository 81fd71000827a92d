//! Frozen Space-Saving output.
//!
//! A [`Histogram`] is an immutable snapshot of `(key, count, error)` triples,
//! descending by count. It carries the stream length and the global error
//! bound so callers always see how approximate the counts are:
//!
//! ```text
//! count - error <= true_frequency <= count
//! max(error)    <= error_bound    <= floor(observed / capacity)
//! ```

use std::fmt;

use flowjoin_error::{FlowJoinError, Result};
use serde::{Deserialize, Serialize};

use crate::counters::{CounterBackend, SketchKey};

/// One tracked key in a histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HistogramEntry<K> {
    pub key: K,
    /// Estimated frequency (upper bound on the true frequency).
    pub count: u64,
    /// Over-estimation inherited on eviction.
    pub error: u64,
}

impl<K> HistogramEntry<K> {
    /// Lower bound on the true frequency. Clamped at zero for entries whose
    /// error exceeds their count, which only a hand-edited histogram carries.
    #[inline]
    #[must_use]
    pub const fn guaranteed_count(&self) -> u64 {
        self.count.saturating_sub(self.error)
    }
}

/// Cutoff above which a key counts as heavy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkewThreshold {
    /// Heavy when `count >= n`.
    Count(u64),
    /// Heavy when `count / observed >= f`, with `0 < f <= 1`.
    Frequency(f64),
}

impl Default for SkewThreshold {
    fn default() -> Self {
        Self::Count(3)
    }
}

impl SkewThreshold {
    /// Reject thresholds that would classify every key (or none) as heavy.
    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::Count(0) => Err(FlowJoinError::InvalidThreshold {
                threshold: self.to_string(),
                reason: "count cutoff must be > 0",
            }),
            Self::Frequency(f) if !(f > 0.0 && f <= 1.0) => Err(FlowJoinError::InvalidThreshold {
                threshold: self.to_string(),
                reason: "frequency cutoff must lie in (0, 1]",
            }),
            Self::Count(_) | Self::Frequency(_) => Ok(()),
        }
    }

    /// Whether an entry of a histogram over `observed` keys passes the cutoff.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn admits(&self, count: u64, observed: u64) -> bool {
        match *self {
            Self::Count(min) => count >= min,
            Self::Frequency(f) => observed > 0 && count as f64 / observed as f64 >= f,
        }
    }
}

impl fmt::Display for SkewThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(n) => write!(f, "count>={n}"),
            Self::Frequency(x) => write!(f, "frequency>={x}"),
        }
    }
}

/// Immutable top-k snapshot, descending by count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Histogram<K> {
    pub(crate) backend: CounterBackend,
    pub(crate) capacity: usize,
    pub(crate) observed: u64,
    pub(crate) error_bound: u64,
    pub(crate) entries: Vec<HistogramEntry<K>>,
}

impl<K: SketchKey> Histogram<K> {
    /// Entries, descending by count; equal counts keep oldest-inserted first.
    #[must_use]
    pub fn entries(&self) -> &[HistogramEntry<K>] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Backend that produced the snapshot.
    #[must_use]
    pub const fn backend(&self) -> CounterBackend {
        self.backend
    }

    /// Capacity `k` of the producing sketch.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Length `n` of the stream consumed so far.
    #[must_use]
    pub const fn observed(&self) -> u64 {
        self.observed
    }

    /// Largest count any key inherited on eviction. Every estimate exceeds the
    /// true frequency by at most this much.
    #[must_use]
    pub const fn error_bound(&self) -> u64 {
        self.error_bound
    }

    /// Entry for `key`, if tracked.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&HistogramEntry<K>> {
        self.entries.iter().find(|e| e.key == *key)
    }

    /// Estimated relative frequency of `key`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn frequency(&self, key: &K) -> Option<f64> {
        if self.observed == 0 {
            return None;
        }
        self.get(key)
            .map(|e| e.count as f64 / self.observed as f64)
    }

    /// The `n` entries with the highest counts.
    #[must_use]
    pub fn top(&self, n: usize) -> &[HistogramEntry<K>] {
        &self.entries[..n.min(self.entries.len())]
    }

    /// Keys whose estimated count passes `threshold`, descending by count.
    pub fn heavy_keys(&self, threshold: SkewThreshold) -> impl Iterator<Item = K> + '_ {
        let observed = self.observed;
        self.entries
            .iter()
            .filter(move |e| threshold.admits(e.count, observed))
            .map(|e| e.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn histogram() -> Histogram<i64> {
        Histogram {
            backend: CounterBackend::HashOnly,
            capacity: 3,
            observed: 20,
            error_bound: 2,
            entries: vec![
                HistogramEntry { key: 1, count: 10, error: 0 },
                HistogramEntry { key: 3, count: 6, error: 2 },
                HistogramEntry { key: 2, count: 3, error: 2 },
            ],
        }
    }

    #[test]
    fn thresholds_validate_their_domain() {
        assert!(SkewThreshold::Count(1).validate().is_ok());
        assert!(SkewThreshold::Frequency(1.0).validate().is_ok());
        for bad in [
            SkewThreshold::Count(0),
            SkewThreshold::Frequency(0.0),
            SkewThreshold::Frequency(1.5),
            SkewThreshold::Frequency(f64::NAN),
        ] {
            let err = bad.validate().unwrap_err();
            assert!(err.is_config_error(), "{bad}");
        }
    }

    #[test]
    fn heavy_keys_by_count_and_frequency() {
        let h = histogram();
        let by_count: Vec<_> = h.heavy_keys(SkewThreshold::Count(6)).collect();
        assert_eq!(by_count, vec![1, 3]);
        let by_freq: Vec<_> = h.heavy_keys(SkewThreshold::Frequency(0.5)).collect();
        assert_eq!(by_freq, vec![1]);
        assert_eq!(h.heavy_keys(SkewThreshold::Count(11)).count(), 0);
    }

    #[test]
    fn lookup_and_bounds() {
        let h = histogram();
        assert_eq!(h.get(&3).map(HistogramEntry::guaranteed_count), Some(4));
        assert_eq!(h.frequency(&1), Some(0.5));
        assert_eq!(h.frequency(&99), None);
        assert_eq!(h.top(2).len(), 2);
        assert_eq!(h.top(10).len(), 3);
    }

    #[test]
    fn guaranteed_count_clamps_inconsistent_entries() {
        let entry: HistogramEntry<i64> =
            serde_json::from_str(r#"{"key": 7, "count": 1, "error": 5}"#).unwrap();
        assert_eq!(entry.guaranteed_count(), 0);
    }

    #[test]
    fn histogram_serializes_with_error_bound() {
        let json = serde_json::to_string(&histogram()).unwrap();
        assert!(json.contains("\"error_bound\":2"));
        assert!(json.contains("\"backend\":\"hash_only\""));
        let back: Histogram<i64> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, histogram());
    }
}
