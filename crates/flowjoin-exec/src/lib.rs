//! Flow-Join operators.
//!
//! Each pipeline phase is a free function over [`PartitionedRelation`]s so the
//! phases can be driven one at a time, sequentially or on the rayon pool:
//!
//! 1. [`partition`]: hash-partition raw tuples by `key mod P`.
//! 2. [`estimate_relation`]: one Space-Saving histogram per partition.
//! 3. [`HeavyHitterDetector`]: fold every histogram, then publish the
//!    global [`HeavyKeySet`] (the barrier).
//! 4. [`selective_broadcast`] / [`flow_shuffle`] / [`hash_shuffle`]: make the
//!    inputs partition-aligned.
//! 5. [`aligned_join`]: partition-local hash join with set semantics.
//!
//! [`PartitionedRelation`]: flowjoin_types::PartitionedRelation

pub mod detector;
pub mod estimate;
pub mod join;
pub mod partitioner;
pub mod redistribute;
pub mod telemetry;

pub use detector::{HeavyHitterDetector, HeavyKeySet, HeavyKeySource, detect_heavy_keys};
pub use estimate::{EstimationScope, EstimatorSettings, estimate_keys, estimate_relation};
pub use join::{
    JoinHashTable, JoinOutput, JoinStats, PartitionJoinStats, aligned_join, hash_join_partition,
    nested_loop_join,
};
pub use partitioner::partition;
pub use redistribute::{
    BroadcastStats, Redistribution, TrafficStats, flow_shuffle, hash_shuffle, heavy_tuple_count,
    selective_broadcast,
};
pub use telemetry::{
    FlowJoinEvent, FlowJoinObserver, NoOpObserver, ObserverRingBuffer, TracingObserver,
};
