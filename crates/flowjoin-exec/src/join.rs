//! Partition-local equi-join.
//!
//! Two-phase hash join per partition: index the build slice by key, then scan
//! the probe slice. Matches from all partitions are collected into a set, since
//! broadcast replicas can rediscover the same `(key, build, probe)` triple in
//! more than one partition.
//!
//! [`nested_loop_join`] is the unaligned reference: every build partition
//! against every probe partition. It is quadratic and exists only to check the
//! aligned join against.

use std::collections::BTreeSet;

use flowjoin_error::Result;
use flowjoin_types::{JoinKey, JoinRole, JoinRow, Partition, PartitionedRelation, Payload, Tuple};
use hashbrown::HashMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, debug_span};

// ── Build-Side Hash Table ──────────────────────────────────────────────────

/// Hash index over one build partition.
#[derive(Debug)]
pub struct JoinHashTable<'a, V> {
    /// Build tuples in insertion order.
    rows: Vec<&'a Tuple<V>>,
    /// Key to the index of the newest row with that key (head of the chain).
    head: HashMap<JoinKey, usize>,
    /// Parallel to `rows`: index of the next-older row with the same key.
    next: Vec<Option<usize>>,
}

impl<'a, V> JoinHashTable<'a, V> {
    /// Index every tuple of `build`.
    #[must_use]
    pub fn build(build: &'a [Tuple<V>]) -> Self {
        let mut rows = Vec::with_capacity(build.len());
        let mut head: HashMap<JoinKey, usize> = HashMap::with_capacity(build.len());
        let mut next = Vec::with_capacity(build.len());
        for tuple in build {
            let idx = rows.len();
            rows.push(tuple);
            next.push(head.insert(tuple.key, idx));
        }
        Self { rows, head, next }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct keys in the table.
    #[must_use]
    pub fn distinct_keys(&self) -> usize {
        self.head.len()
    }

    /// Build tuples with `key`, in build-side insertion order.
    #[must_use]
    pub fn matches(&self, key: JoinKey) -> Vec<&'a Tuple<V>> {
        let mut out = Vec::new();
        let mut current = self.head.get(&key).copied();
        while let Some(idx) = current {
            out.push(self.rows[idx]);
            current = self.next[idx];
        }
        // The chain runs newest to oldest.
        out.reverse();
        out
    }
}

// ── Statistics ─────────────────────────────────────────────────────────────

/// Work done joining one partition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionJoinStats {
    pub partition: usize,
    pub build_rows: usize,
    pub probe_rows: usize,
    /// Matches emitted before deduplication.
    pub matches: usize,
}

/// Work done by a whole join.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinStats {
    pub partitions: Vec<PartitionJoinStats>,
    /// Matches emitted by all partitions before deduplication.
    pub raw_matches: usize,
    /// Matches dropped because another partition already produced them.
    pub duplicates_collapsed: usize,
}

impl JoinStats {
    /// Largest per-partition build + probe row count.
    #[must_use]
    pub fn max_partition_load(&self) -> usize {
        self.partitions
            .iter()
            .map(|p| p.build_rows + p.probe_rows)
            .max()
            .unwrap_or(0)
    }
}

/// Deduplicated join result plus the work that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutput<V> {
    pub rows: BTreeSet<JoinRow<V>>,
    pub stats: JoinStats,
}

impl<V> JoinOutput<V> {
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ── Operators ──────────────────────────────────────────────────────────────

/// Join one build partition against one probe partition.
///
/// Rows are emitted in probe order; for one probe tuple, matching build tuples
/// keep their build-side order.
#[must_use]
pub fn hash_join_partition<V: Payload>(
    build: &[Tuple<V>],
    probe: &[Tuple<V>],
) -> Vec<JoinRow<V>> {
    let table = JoinHashTable::build(build);
    let mut out = Vec::new();
    for p in probe {
        for b in table.matches(p.key) {
            out.push(JoinRow::new(p.key, b.value.clone(), p.value.clone()));
        }
    }
    out
}

fn join_one<V: Payload>(
    build: &Partition<V>,
    probe: &Partition<V>,
) -> (Vec<JoinRow<V>>, PartitionJoinStats) {
    let rows = hash_join_partition(build.tuples(), probe.tuples());
    let stats = PartitionJoinStats {
        partition: build.id(),
        build_rows: build.len(),
        probe_rows: probe.len(),
        matches: rows.len(),
    };
    (rows, stats)
}

/// Join `build[p]` with `probe[p]` for every `p` and collect a set of rows.
///
/// Assumes the inputs are partition-aligned: every probe tuple's build
/// counterparts are in the same partition. With `parallel`, partitions are
/// joined on the rayon pool.
///
/// # Errors
///
/// Fails if the probe relation has a different partition count.
pub fn aligned_join<V: Payload>(
    build: &PartitionedRelation<V>,
    probe: &PartitionedRelation<V>,
    parallel: bool,
) -> Result<JoinOutput<V>> {
    probe.ensure_partition_count(JoinRole::Probe, build.partition_count())?;
    let _span =
        debug_span!("aligned_join", partitions = build.partition_count(), parallel).entered();

    let pairs: Vec<_> = build.partitions().iter().zip(probe.partitions()).collect();
    let per_partition: Vec<(Vec<JoinRow<V>>, PartitionJoinStats)> = if parallel {
        pairs.par_iter().map(|(b, p)| join_one(b, p)).collect()
    } else {
        pairs.iter().map(|(b, p)| join_one(b, p)).collect()
    };

    let mut rows = BTreeSet::new();
    let mut stats = JoinStats::default();
    for (emitted, partition_stats) in per_partition {
        stats.raw_matches += emitted.len();
        rows.extend(emitted);
        stats.partitions.push(partition_stats);
    }
    stats.duplicates_collapsed = stats.raw_matches - rows.len();
    debug!(
        raw_matches = stats.raw_matches,
        distinct = rows.len(),
        duplicates_collapsed = stats.duplicates_collapsed,
        "aligned join complete"
    );
    Ok(JoinOutput { rows, stats })
}

/// Every build partition against every probe partition, ignoring alignment.
///
/// Quadratic reference for the aligned join; never used on the hot path.
#[must_use]
pub fn nested_loop_join<V: Payload>(
    build: &PartitionedRelation<V>,
    probe: &PartitionedRelation<V>,
) -> BTreeSet<JoinRow<V>> {
    let mut rows = BTreeSet::new();
    for b in build.iter_tuples() {
        for p in probe.iter_tuples() {
            if b.key == p.key {
                rows.insert(JoinRow::new(b.key, b.value.clone(), p.value.clone()));
            }
        }
    }
    rows
}
