//! Core type definitions for Flow-Join.
//!
//! A relation is a sequence of [`Tuple`]s `(key, payload)`. Relations are
//! split into `P` [`Partition`]s; a [`PartitionedRelation`] keeps them indexed
//! by id in `[0, P)`. Joining two relations produces [`JoinRow`]s.

pub mod relation;

use std::fmt;
use std::hash::Hash;
use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

pub use relation::{Partition, PartitionedRelation};

/// Integer join key.
pub type JoinKey = i64;

/// Partition index in `[0, P)`.
pub type PartitionId = usize;

/// Bound satisfied by every opaque tuple payload.
///
/// Payloads must be comparable so join results can be collected into a set.
pub trait Payload: Clone + Eq + Hash + Ord + fmt::Debug + Send + Sync {}

impl<T: Clone + Eq + Hash + Ord + fmt::Debug + Send + Sync> Payload for T {}

/// Partition that owns `key` under `P = partitions`.
///
/// Negative keys are mapped with Euclidean remainder so every key lands in
/// `[0, partitions)`.
#[must_use]
#[inline]
pub fn partition_of(key: JoinKey, partitions: NonZeroUsize) -> PartitionId {
    let modulus = i128::try_from(partitions.get()).unwrap_or(i128::MAX);
    let slot = i128::from(key).rem_euclid(modulus);
    usize::try_from(slot).unwrap_or_default()
}

/// One row of a relation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tuple<V> {
    pub key: JoinKey,
    pub value: V,
}

impl<V> Tuple<V> {
    #[inline]
    #[must_use]
    pub const fn new(key: JoinKey, value: V) -> Self {
        Self { key, value }
    }
}

impl<V> From<(JoinKey, V)> for Tuple<V> {
    fn from((key, value): (JoinKey, V)) -> Self {
        Self { key, value }
    }
}

/// Which of the two caller-supplied relations a value refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationSide {
    #[default]
    Left,
    Right,
}

impl RelationSide {
    /// The other relation.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }

    /// Stable label used in logs and telemetry.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

/// Role a relation plays in the hash join.
///
/// The build side is indexed and, for heavy keys, broadcast. The probe side
/// is scanned and never leaves its partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinRole {
    Build,
    Probe,
}

impl JoinRole {
    /// Stable label used in logs, errors, and telemetry.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Probe => "probe",
        }
    }
}

impl fmt::Display for JoinRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One match of the equi-join: `(key, build_value, probe_value)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JoinRow<V> {
    pub key: JoinKey,
    pub build: V,
    pub probe: V,
}

impl<V> JoinRow<V> {
    #[inline]
    #[must_use]
    pub const fn new(key: JoinKey, build: V, probe: V) -> Self {
        Self { key, build, probe }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn p(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn partition_of_matches_key_mod_p() {
        assert_eq!(partition_of(0, p(4)), 0);
        assert_eq!(partition_of(5, p(4)), 1);
        assert_eq!(partition_of(7, p(1)), 0);
        assert_eq!(partition_of(i64::MAX, p(2)), 1);
    }

    #[test]
    fn partition_of_negative_keys_stay_in_range() {
        assert_eq!(partition_of(-1, p(4)), 3);
        assert_eq!(partition_of(-4, p(4)), 0);
        assert_eq!(partition_of(i64::MIN, p(3)), partition_of(i64::MIN % 3 + 3, p(3)));
    }

    #[test]
    fn relation_side_opposite_round_trips() {
        assert_eq!(RelationSide::Left.opposite(), RelationSide::Right);
        assert_eq!(RelationSide::Right.opposite().opposite(), RelationSide::Right);
        assert_eq!(RelationSide::default(), RelationSide::Left);
    }

    #[test]
    fn roles_serialize_snake_case() {
        let json = serde_json::to_string(&JoinRole::Build).unwrap();
        assert_eq!(json, "\"build\"");
        let side: RelationSide = serde_json::from_str("\"right\"").unwrap();
        assert_eq!(side, RelationSide::Right);
    }

    proptest! {
        #[test]
        fn prop_partition_of_is_deterministic_and_bounded(key in any::<i64>(), n in 1usize..64) {
            let slot = partition_of(key, p(n));
            prop_assert!(slot < n);
            prop_assert_eq!(slot, partition_of(key, p(n)));
            if key >= 0 {
                prop_assert_eq!(slot as i64, key % n as i64);
            }
        }
    }
}
