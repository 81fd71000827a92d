//! Adaptive redistribution.
//!
//! Three ways to make two relations partition-aligned before the local join:
//!
//! - [`selective_broadcast`]: inputs are already hash-aligned. Heavy build
//!   tuples are replicated into every partition; everything else stays put.
//! - [`hash_shuffle`]: inputs sit on arbitrary nodes. Every tuple of both
//!   sides moves to `key mod P`. This is the plain distributed hash join.
//! - [`flow_shuffle`]: inputs sit on arbitrary nodes. Cold tuples of both sides
//!   move to `key mod P`, heavy build tuples are broadcast to every node, and
//!   heavy probe tuples stay where they are.
//!
//! The probe side is never broadcast. A probe tuple with a heavy key meets
//! every build tuple of that key locally because those were replicated
//! everywhere; a probe tuple with a cold key meets its build counterparts at
//! `key mod P`, where hashing put both.

use std::collections::BTreeSet;
use std::num::NonZeroUsize;

use flowjoin_error::{FlowJoinError, Result};
use flowjoin_types::{
    JoinKey, JoinRole, Partition, PartitionId, PartitionedRelation, Payload, Tuple, partition_of,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, debug_span};

/// Replication performed by a broadcast step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastStats {
    /// Build tuples whose key is heavy, counted once each.
    pub heavy_build_tuples: usize,
    /// Extra copies appended to partitions other than the owner.
    pub replicas_added: usize,
}

/// Tuples that leave their source node during a shuffle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficStats {
    pub build_sent: usize,
    pub probe_sent: usize,
}

impl TrafficStats {
    #[must_use]
    pub const fn total(&self) -> usize {
        self.build_sent + self.probe_sent
    }
}

/// Partition-aligned relations ready for the local join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redistribution<V> {
    pub build: PartitionedRelation<V>,
    pub probe: PartitionedRelation<V>,
    pub broadcast: BroadcastStats,
    pub traffic: TrafficStats,
}

fn check_shapes<V>(
    build: &PartitionedRelation<V>,
    probe: &PartitionedRelation<V>,
) -> Result<NonZeroUsize> {
    let partitions = build.partition_count();
    let Some(modulus) = NonZeroUsize::new(partitions) else {
        return Err(FlowJoinError::InvalidPartitionCount { partitions });
    };
    probe.ensure_partition_count(JoinRole::Probe, partitions)?;
    Ok(modulus)
}

/// Replicate every heavy-keyed build tuple into every partition.
///
/// Partition `p` of the result holds its original build tuples, followed by
/// copies of the heavy build tuples of every other partition in partition-id
/// order. The probe relation is returned unchanged. With an empty `heavy` set
/// this is a no-op.
///
/// # Errors
///
/// Fails if the relations have zero or differing partition counts.
pub fn selective_broadcast<V: Payload>(
    build: PartitionedRelation<V>,
    probe: PartitionedRelation<V>,
    heavy: &BTreeSet<JoinKey>,
) -> Result<Redistribution<V>> {
    let partitions = check_shapes(&build, &probe)?.get();
    let _span =
        debug_span!("selective_broadcast", partitions, heavy_keys = heavy.len()).entered();

    if heavy.is_empty() {
        debug!("no heavy keys; build side left unchanged");
        return Ok(Redistribution {
            build,
            probe,
            broadcast: BroadcastStats::default(),
            traffic: TrafficStats::default(),
        });
    }

    let heavy_by_owner: Vec<Vec<Tuple<V>>> = build
        .partitions()
        .iter()
        .map(|p| {
            p.tuples()
                .iter()
                .filter(|t| heavy.contains(&t.key))
                .cloned()
                .collect()
        })
        .collect();
    let heavy_build_tuples: usize = heavy_by_owner.iter().map(Vec::len).sum();

    let mut replicas_added = 0;
    let mut out = Vec::with_capacity(partitions);
    for (id, partition) in build.into_partitions().into_iter().enumerate() {
        let mut tuples = partition.into_tuples();
        for (owner, replicas) in heavy_by_owner.iter().enumerate() {
            if owner != id {
                tuples.extend(replicas.iter().cloned());
                replicas_added += replicas.len();
            }
        }
        out.push(tuples);
    }

    let stats = BroadcastStats {
        heavy_build_tuples,
        replicas_added,
    };
    debug!(
        heavy_build_tuples = stats.heavy_build_tuples,
        replicas_added = stats.replicas_added,
        "heavy build tuples broadcast"
    );
    Ok(Redistribution {
        build: PartitionedRelation::from_partitions(out),
        probe,
        broadcast: stats,
        traffic: TrafficStats::default(),
    })
}

/// Where one tuple goes during a shuffle.
enum Route {
    To(PartitionId),
    Everywhere,
}

fn shuffle_side<V, F>(
    relation: PartitionedRelation<V>,
    partitions: NonZeroUsize,
    route: F,
) -> (PartitionedRelation<V>, usize, BroadcastStats)
where
    V: Payload,
    F: Fn(PartitionId, &Tuple<V>) -> Route,
{
    let mut out = PartitionedRelation::with_empty_partitions(partitions.get());
    let mut sent = 0;
    let mut broadcast = BroadcastStats::default();
    for (source, partition) in relation.into_partitions().into_iter().enumerate() {
        for tuple in partition.into_tuples() {
            match route(source, &tuple) {
                Route::To(target) => {
                    if target != source {
                        sent += 1;
                    }
                    out.push(target, tuple);
                }
                Route::Everywhere => {
                    broadcast.heavy_build_tuples += 1;
                    for target in (0..partitions.get()).filter(|&t| t != source) {
                        out.push(target, tuple.clone());
                        sent += 1;
                        broadcast.replicas_added += 1;
                    }
                    out.push(source, tuple);
                }
            }
        }
    }
    (out, sent, broadcast)
}

/// Route every tuple of both relations to `key mod P`.
///
/// # Errors
///
/// Fails if the relations have zero or differing partition counts.
pub fn hash_shuffle<V: Payload>(
    build: PartitionedRelation<V>,
    probe: PartitionedRelation<V>,
) -> Result<Redistribution<V>> {
    let partitions = check_shapes(&build, &probe)?;
    let _span = debug_span!("hash_shuffle", partitions = partitions.get()).entered();
    let by_key = |_: PartitionId, t: &Tuple<V>| Route::To(partition_of(t.key, partitions));
    let (build, build_sent, _) = shuffle_side(build, partitions, by_key);
    let (probe, probe_sent, _) = shuffle_side(probe, partitions, by_key);
    let traffic = TrafficStats {
        build_sent,
        probe_sent,
    };
    debug!(build_sent, probe_sent, "hash shuffle complete");
    Ok(Redistribution {
        build,
        probe,
        broadcast: BroadcastStats::default(),
        traffic,
    })
}

/// Skew-aware shuffle of node-local inputs.
///
/// Cold tuples of both sides go to `key mod P`. Heavy build tuples stay on
/// their node and are copied to every other node. Heavy probe tuples stay on
/// their node.
///
/// # Errors
///
/// Fails if the relations have zero or differing partition counts.
pub fn flow_shuffle<V: Payload>(
    build: PartitionedRelation<V>,
    probe: PartitionedRelation<V>,
    heavy: &BTreeSet<JoinKey>,
) -> Result<Redistribution<V>> {
    let partitions = check_shapes(&build, &probe)?;
    let _span = debug_span!("flow_shuffle", partitions = partitions.get(), heavy_keys = heavy.len()).entered();
    let (build, build_sent, broadcast) = shuffle_side(build, partitions, |_, t| {
        if heavy.contains(&t.key) {
            Route::Everywhere
        } else {
            Route::To(partition_of(t.key, partitions))
        }
    });
    let (probe, probe_sent, _) = shuffle_side(probe, partitions, |source, t| {
        if heavy.contains(&t.key) {
            Route::To(source)
        } else {
            Route::To(partition_of(t.key, partitions))
        }
    });
    let traffic = TrafficStats {
        build_sent,
        probe_sent,
    };
    debug!(
        build_sent,
        probe_sent,
        replicas_added = broadcast.replicas_added,
        "flow shuffle complete"
    );
    Ok(Redistribution {
        build,
        probe,
        broadcast,
        traffic,
    })
}

/// Number of tuples in `partition` carrying a key from `heavy`.
#[must_use]
pub fn heavy_tuple_count<V>(partition: &Partition<V>, heavy: &BTreeSet<JoinKey>) -> usize {
    partition.keys().filter(|k| heavy.contains(k)).count()
}
