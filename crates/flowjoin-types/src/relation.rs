//! Partitions and partitioned relations.
//!
//! A partition is append-only: redistribution may add replicas of broadcast
//! tuples but never removes the tuples a partition was created with.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;

use flowjoin_error::{FlowJoinError, Result};
use serde::{Deserialize, Deserializer, Serialize};

use crate::{JoinKey, JoinRole, PartitionId, Tuple, partition_of};

/// Ordered sequence of tuples identified by a partition id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition<V> {
    id: PartitionId,
    tuples: Vec<Tuple<V>>,
}

impl<V> Partition<V> {
    #[must_use]
    pub const fn new(id: PartitionId, tuples: Vec<Tuple<V>>) -> Self {
        Self { id, tuples }
    }

    #[must_use]
    pub const fn empty(id: PartitionId) -> Self {
        Self {
            id,
            tuples: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub const fn id(&self) -> PartitionId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    #[must_use]
    pub fn tuples(&self) -> &[Tuple<V>] {
        &self.tuples
    }

    /// Key column of this partition in arrival order.
    pub fn keys(&self) -> impl Iterator<Item = JoinKey> + '_ {
        self.tuples.iter().map(|t| t.key)
    }

    /// Append a tuple. Partitions only ever grow.
    pub fn push(&mut self, tuple: Tuple<V>) {
        self.tuples.push(tuple);
    }

    #[must_use]
    pub fn into_tuples(self) -> Vec<Tuple<V>> {
        self.tuples
    }
}

/// A relation split into `P` partitions, indexed `0..P`.
///
/// The partition at position `i` always has id `i`; deserialization rejects
/// input that breaks this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionedRelation<V> {
    partitions: Vec<Partition<V>>,
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for PartitionedRelation<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Labelled<T> {
            partitions: Vec<Partition<T>>,
        }

        let Labelled { partitions } = Labelled::<V>::deserialize(deserializer)?;
        if let Some((position, partition)) =
            partitions.iter().enumerate().find(|(i, p)| p.id != *i)
        {
            return Err(serde::de::Error::custom(FlowJoinError::PartitionOutOfPlace {
                position,
                partition: partition.id,
            }));
        }
        Ok(Self { partitions })
    }
}

impl<V> PartitionedRelation<V> {
    /// Wrap per-partition tuple lists; list `i` becomes partition `i`.
    #[must_use]
    pub fn from_partitions(partitions: Vec<Vec<Tuple<V>>>) -> Self {
        Self {
            partitions: partitions
                .into_iter()
                .enumerate()
                .map(|(id, tuples)| Partition::new(id, tuples))
                .collect(),
        }
    }

    /// `count` empty partitions.
    #[must_use]
    pub fn with_empty_partitions(count: usize) -> Self {
        Self {
            partitions: (0..count).map(Partition::empty).collect(),
        }
    }

    /// Assemble a relation from `(partition_id, tuples)` pairs as delivered by
    /// a loader.
    ///
    /// Every id in `[0, expected)` must appear exactly once. A missing
    /// partition fails the whole load rather than silently becoming empty.
    pub fn from_indexed<I>(role: JoinRole, expected: usize, parts: I) -> Result<Self>
    where
        I: IntoIterator<Item = (PartitionId, Vec<Tuple<V>>)>,
    {
        if expected == 0 {
            return Err(FlowJoinError::InvalidPartitionCount {
                partitions: expected,
            });
        }
        let mut slots: BTreeMap<PartitionId, Vec<Tuple<V>>> = BTreeMap::new();
        for (id, tuples) in parts {
            if id >= expected {
                return Err(FlowJoinError::PartitionCountMismatch {
                    side: role.as_str(),
                    expected,
                    actual: id + 1,
                });
            }
            if slots.insert(id, tuples).is_some() {
                return Err(FlowJoinError::DuplicatePartition {
                    side: role.as_str(),
                    partition: id,
                });
            }
        }
        if let Some(missing) = (0..expected).find(|id| !slots.contains_key(id)) {
            return Err(FlowJoinError::MissingPartition {
                side: role.as_str(),
                partition: missing,
            });
        }
        Ok(Self::from_partitions(slots.into_values().collect()))
    }

    /// Number of partitions `P`.
    #[inline]
    #[must_use]
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    #[must_use]
    pub fn partitions(&self) -> &[Partition<V>] {
        &self.partitions
    }

    #[must_use]
    pub fn partition(&self, id: PartitionId) -> Option<&Partition<V>> {
        self.partitions.get(id)
    }

    pub(crate) fn partitions_mut(&mut self) -> &mut [Partition<V>] {
        &mut self.partitions
    }

    /// Append a tuple to partition `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` is out of range.
    pub fn push(&mut self, id: PartitionId, tuple: Tuple<V>) {
        self.partitions_mut()[id].push(tuple);
    }

    /// Total number of tuples across all partitions.
    #[must_use]
    pub fn total_tuples(&self) -> usize {
        self.partitions.iter().map(Partition::len).sum()
    }

    /// Every tuple, partition by partition.
    pub fn iter_tuples(&self) -> impl Iterator<Item = &Tuple<V>> + '_ {
        self.partitions.iter().flat_map(|p| p.tuples.iter())
    }

    /// Per-partition tuple counts.
    #[must_use]
    pub fn partition_sizes(&self) -> Vec<usize> {
        self.partitions.iter().map(Partition::len).collect()
    }

    /// Fail unless the relation has exactly `expected` partitions.
    pub fn ensure_partition_count(&self, role: JoinRole, expected: usize) -> Result<()> {
        if self.partitions.len() == expected {
            Ok(())
        } else {
            Err(FlowJoinError::PartitionCountMismatch {
                side: role.as_str(),
                expected,
                actual: self.partitions.len(),
            })
        }
    }

    /// Fail unless every tuple sits in partition `key mod P`, where a
    /// partition's number is its position in the relation.
    pub fn ensure_hash_aligned(&self, role: JoinRole) -> Result<()> {
        let Some(p) = NonZeroUsize::new(self.partitions.len()) else {
            return Ok(());
        };
        for (position, partition) in self.partitions.iter().enumerate() {
            for key in partition.keys() {
                let expected = partition_of(key, p);
                if expected != position {
                    return Err(FlowJoinError::MisplacedTuple {
                        side: role.as_str(),
                        partition: position,
                        key,
                        expected,
                    });
                }
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn into_partitions(self) -> Vec<Partition<V>> {
        self.partitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuples(keys: &[JoinKey]) -> Vec<Tuple<u32>> {
        keys.iter().map(|&k| Tuple::new(k, 0)).collect()
    }

    #[test]
    fn from_indexed_orders_by_id() {
        let rel = PartitionedRelation::from_indexed(
            JoinRole::Build,
            3,
            vec![(2, tuples(&[2])), (0, tuples(&[0, 3])), (1, tuples(&[]))],
        )
        .unwrap();
        assert_eq!(rel.partition_count(), 3);
        assert_eq!(rel.partition_sizes(), vec![2, 0, 1]);
        assert_eq!(rel.partition(2).unwrap().id(), 2);
    }

    #[test]
    fn from_indexed_rejects_missing_partition() {
        let err =
            PartitionedRelation::from_indexed(JoinRole::Probe, 3, vec![(0, tuples(&[0])), (2, tuples(&[2]))])
                .unwrap_err();
        assert_eq!(
            err,
            FlowJoinError::MissingPartition {
                side: "probe",
                partition: 1
            }
        );
        assert!(err.is_input_error());
    }

    #[test]
    fn from_indexed_rejects_duplicates_and_out_of_range() {
        let err = PartitionedRelation::from_indexed(
            JoinRole::Build,
            2,
            vec![(0, tuples(&[0])), (0, tuples(&[2]))],
        )
        .unwrap_err();
        assert!(matches!(err, FlowJoinError::DuplicatePartition { partition: 0, .. }));

        let err =
            PartitionedRelation::from_indexed(JoinRole::Build, 2, vec![(5, tuples(&[5]))]).unwrap_err();
        assert!(matches!(
            err,
            FlowJoinError::PartitionCountMismatch {
                expected: 2,
                actual: 6,
                ..
            }
        ));
    }

    #[test]
    fn hash_alignment_check_reports_first_misplaced_key() {
        let aligned = PartitionedRelation::from_partitions(vec![tuples(&[0, 2]), tuples(&[1, 3])]);
        assert!(aligned.ensure_hash_aligned(JoinRole::Build).is_ok());

        let misplaced = PartitionedRelation::from_partitions(vec![tuples(&[0, 3]), tuples(&[1])]);
        let err = misplaced.ensure_hash_aligned(JoinRole::Build).unwrap_err();
        assert_eq!(
            err,
            FlowJoinError::MisplacedTuple {
                side: "build",
                partition: 0,
                key: 3,
                expected: 1
            }
        );
    }

    #[test]
    fn deserialize_rejects_partition_out_of_place() {
        let json = r#"{"partitions": [
            {"id": 0, "tuples": [{"key": 0, "value": 1}]},
            {"id": 0, "tuples": [{"key": 2, "value": 2}]}
        ]}"#;
        let err = serde_json::from_str::<PartitionedRelation<u32>>(json).unwrap_err();
        assert!(err.to_string().contains("position 1"), "{err}");

        let json = r#"{"partitions": [
            {"id": 0, "tuples": [{"key": 0, "value": 1}, {"key": 2, "value": 2}]},
            {"id": 1, "tuples": []}
        ]}"#;
        let rel: PartitionedRelation<u32> = serde_json::from_str(json).unwrap();
        assert_eq!(rel.partition_sizes(), vec![2, 0]);
        assert!(rel.ensure_hash_aligned(JoinRole::Build).is_ok());
    }

    #[test]
    fn relation_round_trips_through_json() {
        let rel = PartitionedRelation::from_partitions(vec![tuples(&[0, 2]), tuples(&[1])]);
        let json = serde_json::to_string(&rel).unwrap();
        let back: PartitionedRelation<u32> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rel);
    }

    #[test]
    fn partition_is_append_only() {
        let mut rel = PartitionedRelation::<u32>::with_empty_partitions(2);
        rel.push(1, Tuple::new(7, 1));
        rel.push(1, Tuple::new(9, 2));
        assert_eq!(rel.total_tuples(), 2);
        let keys: Vec<_> = rel.partition(1).unwrap().keys().collect();
        assert_eq!(keys, vec![7, 9]);
        assert!(rel.ensure_partition_count(JoinRole::Probe, 3).is_err());
    }
}
