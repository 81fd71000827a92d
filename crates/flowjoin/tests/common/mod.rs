//! Shared workload generators for integration tests and benches.

#![allow(dead_code)]

use std::num::NonZeroUsize;

use flowjoin::{JoinKey, PartitionedRelation, Tuple, partition_of};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Keys drawn from a Zipf distribution over `1..=distinct` with exponent `s`.
pub fn zipf_keys(len: usize, distinct: usize, s: f64, seed: u64) -> Vec<JoinKey> {
    let mut cdf = Vec::with_capacity(distinct);
    let mut acc = 0.0;
    for rank in 1..=distinct {
        acc += 1.0 / (rank as f64).powf(s);
        cdf.push(acc);
    }
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len)
        .map(|_| {
            let u = rng.gen_range(0.0..acc);
            let idx = cdf.partition_point(|&c| c < u);
            (idx.min(distinct - 1) + 1) as JoinKey
        })
        .collect()
}

/// Keys drawn uniformly from `0..distinct`.
pub fn uniform_keys(len: usize, distinct: JoinKey, seed: u64) -> Vec<JoinKey> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen_range(0..distinct)).collect()
}

/// Tuples whose payload is their position in `keys`.
pub fn tuples(keys: &[JoinKey]) -> Vec<Tuple<u64>> {
    keys.iter()
        .enumerate()
        .map(|(i, &k)| Tuple::new(k, i as u64))
        .collect()
}

/// Deal tuples round-robin over `partitions` nodes, ignoring their keys.
pub fn round_robin(tuples: Vec<Tuple<u64>>, partitions: usize) -> PartitionedRelation<u64> {
    let mut parts = vec![Vec::new(); partitions];
    for (i, t) in tuples.into_iter().enumerate() {
        parts[i % partitions].push(t);
    }
    PartitionedRelation::from_partitions(parts)
}

/// Hash-aligned relation from `(key, payload)` pairs.
pub fn aligned<V: Clone>(rows: &[(JoinKey, V)], partitions: usize) -> PartitionedRelation<V> {
    let modulus = NonZeroUsize::new(partitions).expect("partition count must be > 0");
    let mut parts = vec![Vec::new(); partitions];
    for (k, v) in rows {
        parts[partition_of(*k, modulus)].push(Tuple::new(*k, v.clone()));
    }
    PartitionedRelation::from_partitions(parts)
}

/// Install a test-writer `tracing` subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
