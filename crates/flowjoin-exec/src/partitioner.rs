//! Hash partitioner: tuple with key `k` lands in partition `k mod P`.

use std::num::NonZeroUsize;

use flowjoin_error::{FlowJoinError, Result};
use flowjoin_types::{PartitionedRelation, Tuple, partition_of};

/// Split `tuples` into `partitions` disjoint, hash-aligned partitions.
///
/// Arrival order is preserved inside each partition.
///
/// # Errors
///
/// [`FlowJoinError::InvalidPartitionCount`] when `partitions` is zero.
pub fn partition<V, I>(tuples: I, partitions: usize) -> Result<PartitionedRelation<V>>
where
    I: IntoIterator<Item = Tuple<V>>,
{
    let Some(modulus) = NonZeroUsize::new(partitions) else {
        return Err(FlowJoinError::InvalidPartitionCount { partitions });
    };
    let mut relation = PartitionedRelation::with_empty_partitions(partitions);
    for tuple in tuples {
        let slot = partition_of(tuple.key, modulus);
        relation.push(slot, tuple);
    }
    Ok(relation)
}
