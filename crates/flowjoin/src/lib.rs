//! Flow-Join: a skew-adaptive partitioned equi-join.
//!
//! Relations are hash-partitioned, each partition's key distribution is
//! summarized with a Space-Saving sketch, keys that are heavy anywhere are
//! collected into one global set, and only the build-side tuples carrying
//! those keys are broadcast to every partition before a partition-local hash
//! join runs.
//!
//! ```no_run
//! use flowjoin::{FlowJoin, FlowJoinConfig, NoOpObserver, Tuple};
//!
//! # fn main() -> flowjoin::Result<()> {
//! let join = FlowJoin::new(FlowJoinConfig::default().with_partitions(2))?;
//! let build = vec![Tuple::new(1, "A"), Tuple::new(1, "B"), Tuple::new(3, "F")];
//! let probe = vec![Tuple::new(1, "K"), Tuple::new(3, "N")];
//! let out = join.run_tuples(build, probe, &NoOpObserver)?;
//! assert_eq!(out.len(), 3);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod pipeline;

pub use config::{DEFAULT_CAPACITY, DEFAULT_PARTITIONS, FlowJoinConfig, InputLayout};
pub use pipeline::{FlowJoin, FlowJoinOutput};

pub use flowjoin_error::{FlowJoinError, Result};
pub use flowjoin_exec::{
    BroadcastStats, EstimationScope, EstimatorSettings, FlowJoinEvent, FlowJoinObserver,
    HeavyHitterDetector, HeavyKeySet, HeavyKeySource, JoinOutput, JoinStats, NoOpObserver,
    ObserverRingBuffer, PartitionJoinStats, Redistribution, TracingObserver, TrafficStats,
    aligned_join, detect_heavy_keys, estimate_keys, estimate_relation, flow_shuffle,
    hash_join_partition, hash_shuffle, nested_loop_join, partition, selective_broadcast,
};
pub use flowjoin_sketch::{
    CounterBackend, FrequencyCounters, Histogram, HistogramEntry, SkewThreshold, SpaceSaving,
};
pub use flowjoin_types::{
    JoinKey, JoinRole, JoinRow, Partition, PartitionId, PartitionedRelation, Payload,
    RelationSide, Tuple, partition_of,
};
