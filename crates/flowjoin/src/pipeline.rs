//! The Flow-Join pipeline.
//!
//! A run is stop-the-world: every phase finishes before the next starts.
//!
//! ```text
//! validate -> estimate (per partition) -> detect (barrier) -> redistribute -> join
//! ```
//!
//! Inputs are checked in full before estimation begins, so a missing or
//! misplaced partition fails the run without any phase having run.

use std::collections::BTreeSet;
use std::time::Instant;

use flowjoin_error::Result;
use flowjoin_exec::{
    BroadcastStats, FlowJoinEvent, FlowJoinObserver, HeavyHitterDetector, HeavyKeySet, JoinStats,
    Redistribution, TrafficStats, aligned_join, estimate_relation, flow_shuffle, hash_shuffle,
    partition, selective_broadcast,
};
use flowjoin_sketch::Histogram;
use flowjoin_types::{JoinKey, JoinRole, JoinRow, PartitionedRelation, Payload, RelationSide, Tuple};
use tracing::{debug_span, info, info_span};

use crate::config::{FlowJoinConfig, InputLayout};

/// Everything a run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowJoinOutput<V> {
    /// Deduplicated `(key, build_value, probe_value)` triples.
    pub rows: BTreeSet<JoinRow<V>>,
    /// Which relation acted as the build side.
    pub build_side: RelationSide,
    /// Build-side histograms, by slot.
    pub build_histograms: Vec<Histogram<JoinKey>>,
    /// Probe-side histograms, by slot.
    pub probe_histograms: Vec<Histogram<JoinKey>>,
    pub heavy_keys: HeavyKeySet,
    /// Keys whose build tuples were broadcast.
    pub broadcast_keys: BTreeSet<JoinKey>,
    pub broadcast: BroadcastStats,
    pub traffic: TrafficStats,
    pub join: JoinStats,
}

impl<V> FlowJoinOutput<V> {
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn elapsed_ns(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_nanos()).unwrap_or(u64::MAX)
}

/// Validated Flow-Join operator.
#[derive(Debug, Clone, Copy)]
pub struct FlowJoin {
    config: FlowJoinConfig,
}

impl FlowJoin {
    /// # Errors
    ///
    /// Any configuration error from [`FlowJoinConfig::validate`].
    pub fn new(config: FlowJoinConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub const fn config(&self) -> &FlowJoinConfig {
        &self.config
    }

    /// Hash-partition two unpartitioned relations and run the join.
    pub fn run_tuples<V, L, R>(
        &self,
        left: L,
        right: R,
        observer: &dyn FlowJoinObserver,
    ) -> Result<FlowJoinOutput<V>>
    where
        V: Payload,
        L: IntoIterator<Item = Tuple<V>>,
        R: IntoIterator<Item = Tuple<V>>,
    {
        let p = self.config.partitions;
        self.run(partition(left, p)?, partition(right, p)?, observer)
    }

    fn orient<V>(
        &self,
        left: PartitionedRelation<V>,
        right: PartitionedRelation<V>,
    ) -> Result<(PartitionedRelation<V>, PartitionedRelation<V>)> {
        let (build, probe) = match self.config.build_side {
            RelationSide::Left => (left, right),
            RelationSide::Right => (right, left),
        };
        let p = self.config.partitions;
        build.ensure_partition_count(JoinRole::Build, p)?;
        probe.ensure_partition_count(JoinRole::Probe, p)?;
        if self.config.input_layout == InputLayout::HashAligned {
            build.ensure_hash_aligned(JoinRole::Build)?;
            probe.ensure_hash_aligned(JoinRole::Probe)?;
        }
        Ok((build, probe))
    }

    /// Run the full pipeline over partitioned inputs.
    ///
    /// `left` and `right` are the caller's relations; which one is the build
    /// side comes from [`FlowJoinConfig::build_side`].
    ///
    /// # Errors
    ///
    /// Input errors if either relation does not have exactly `P` partitions,
    /// or, for [`InputLayout::HashAligned`], holds a tuple outside
    /// `key mod P`.
    pub fn run<V: Payload>(
        &self,
        left: PartitionedRelation<V>,
        right: PartitionedRelation<V>,
        observer: &dyn FlowJoinObserver,
    ) -> Result<FlowJoinOutput<V>> {
        let start = Instant::now();
        let config = &self.config;
        let _run = info_span!(
            "flow_join",
            partitions = config.partitions,
            capacity = config.capacity,
            backend = %config.backend,
            build_side = config.build_side.as_str()
        )
        .entered();

        let (build, probe) = self.orient(left, right)?;

        // Estimation.
        let settings = config.estimator_settings();
        let (build_histograms, probe_histograms) = {
            let _phase = debug_span!("estimate").entered();
            let b = estimate_relation(&build, &settings, config.estimation_scope, config.parallel)?;
            let p = estimate_relation(&probe, &settings, config.estimation_scope, config.parallel)?;
            (b, p)
        };
        for (role, histograms) in [
            (JoinRole::Build, &build_histograms),
            (JoinRole::Probe, &probe_histograms),
        ] {
            for (slot, h) in histograms.iter().enumerate() {
                observer.on_event(&FlowJoinEvent::PartitionEstimated {
                    role,
                    slot,
                    backend: h.backend(),
                    observed: h.observed(),
                    tracked: h.len(),
                    error_bound: h.error_bound(),
                    elapsed_ns: elapsed_ns(start),
                });
            }
        }

        // Detection barrier.
        let heavy_keys = {
            let _phase = debug_span!("detect").entered();
            let slots = config
                .estimation_scope
                .histograms_per_relation(config.partitions);
            let mut detector = HeavyHitterDetector::new(config.skew_threshold, slots)?;
            for (slot, h) in build_histograms.iter().enumerate() {
                detector.fold(JoinRole::Build, slot, h)?;
            }
            for (slot, h) in probe_histograms.iter().enumerate() {
                detector.fold(JoinRole::Probe, slot, h)?;
            }
            detector.publish()?
        };
        let broadcast_keys = heavy_keys.broadcast_keys(config.heavy_key_source);
        observer.on_event(&FlowJoinEvent::HeavyKeysPublished {
            build_heavy: heavy_keys.build().len(),
            probe_heavy: heavy_keys.probe().len(),
            broadcast_keys: broadcast_keys.len(),
            elapsed_ns: elapsed_ns(start),
        });

        // Redistribution.
        let build_before = build.partition_sizes();
        let Redistribution {
            build,
            probe,
            broadcast,
            traffic,
        } = match config.input_layout {
            InputLayout::HashAligned => selective_broadcast(build, probe, &broadcast_keys)?,
            InputLayout::NodeLocal => flow_shuffle(build, probe, &broadcast_keys)?,
        };
        for (id, (before, (b, p))) in build_before
            .iter()
            .zip(build.partitions().iter().zip(probe.partitions()))
            .enumerate()
        {
            observer.on_event(&FlowJoinEvent::PartitionRedistributed {
                partition: id,
                build_before: *before,
                build_after: b.len(),
                probe_after: p.len(),
                elapsed_ns: elapsed_ns(start),
            });
        }

        // Join.
        let joined = aligned_join(&build, &probe, config.parallel)?;
        for stats in &joined.stats.partitions {
            observer.on_event(&FlowJoinEvent::PartitionJoined {
                partition: stats.partition,
                build_rows: stats.build_rows,
                probe_rows: stats.probe_rows,
                matches: stats.matches,
                elapsed_ns: elapsed_ns(start),
            });
        }

        let total_ns = elapsed_ns(start);
        observer.on_event(&FlowJoinEvent::RunCompleted {
            result_rows: joined.rows.len(),
            duplicates_collapsed: joined.stats.duplicates_collapsed,
            build_sent: traffic.build_sent,
            probe_sent: traffic.probe_sent,
            elapsed_ns: total_ns,
        });
        info!(
            result_rows = joined.rows.len(),
            heavy_keys = broadcast_keys.len(),
            replicas_added = broadcast.replicas_added,
            max_partition_load = joined.stats.max_partition_load(),
            elapsed_ns = total_ns,
            "flow-join finished"
        );

        Ok(FlowJoinOutput {
            rows: joined.rows,
            build_side: config.build_side,
            build_histograms,
            probe_histograms,
            heavy_keys,
            broadcast_keys,
            broadcast,
            traffic,
            join: joined.stats,
        })
    }

    /// Plain distributed hash join of node-local inputs: both sides shuffled
    /// by key, no estimation, no broadcast. Used as the comparison point for
    /// [`run`](Self::run).
    pub fn run_hash_join<V: Payload>(
        &self,
        left: PartitionedRelation<V>,
        right: PartitionedRelation<V>,
    ) -> Result<FlowJoinOutput<V>> {
        let _run = info_span!("hash_join", partitions = self.config.partitions).entered();
        let (build, probe) = match self.config.build_side {
            RelationSide::Left => (left, right),
            RelationSide::Right => (right, left),
        };
        build.ensure_partition_count(JoinRole::Build, self.config.partitions)?;
        probe.ensure_partition_count(JoinRole::Probe, self.config.partitions)?;
        let shuffled = hash_shuffle(build, probe)?;
        let joined = aligned_join(&shuffled.build, &shuffled.probe, self.config.parallel)?;
        info!(
            result_rows = joined.rows.len(),
            tuples_sent = shuffled.traffic.total(),
            "hash join finished"
        );
        Ok(FlowJoinOutput {
            rows: joined.rows,
            build_side: self.config.build_side,
            build_histograms: Vec::new(),
            probe_histograms: Vec::new(),
            heavy_keys: HeavyKeySet::default(),
            broadcast_keys: BTreeSet::new(),
            broadcast: shuffled.broadcast,
            traffic: shuffled.traffic,
            join: joined.stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowjoin_exec::{NoOpObserver, ObserverRingBuffer};
    use flowjoin_sketch::SkewThreshold;

    fn rel(parts: Vec<Vec<(JoinKey, char)>>) -> PartitionedRelation<char> {
        PartitionedRelation::from_partitions(
            parts
                .into_iter()
                .map(|p| p.into_iter().map(Tuple::from).collect())
                .collect(),
        )
    }

    #[test]
    fn invalid_config_fails_at_construction() {
        let err = FlowJoin::new(FlowJoinConfig::default().with_capacity(0)).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn misaligned_input_fails_before_any_event() {
        let join = FlowJoin::new(FlowJoinConfig::default().with_partitions(2)).unwrap();
        let ring = ObserverRingBuffer::new(16);
        let left = rel(vec![vec![(1, 'a')], vec![]]);
        let right = rel(vec![vec![], vec![(1, 'b')]]);
        let err = join.run(left, right, &ring).unwrap_err();
        assert!(err.is_input_error());
        assert!(ring.is_empty());
    }

    #[test]
    fn missing_partition_fails_whole_run() {
        let join = FlowJoin::new(FlowJoinConfig::default().with_partitions(3)).unwrap();
        let left = rel(vec![vec![], vec![(1, 'a')]]);
        let right = rel(vec![vec![], vec![], vec![]]);
        let err = join.run(left, right, &NoOpObserver).unwrap_err();
        assert!(err.is_input_error(), "{err}");
    }

    #[test]
    fn right_build_side_swaps_roles() {
        let config = FlowJoinConfig::default()
            .with_partitions(2)
            .with_build_side(RelationSide::Right)
            .with_skew_threshold(SkewThreshold::Count(2));
        let join = FlowJoin::new(config).unwrap();
        let left = rel(vec![vec![(2, 'x')], vec![(1, 'p')]]);
        let right = rel(vec![vec![(2, 'y')], vec![(1, 'q'), (1, 'r')]]);
        let out = join.run(left, right, &NoOpObserver).unwrap();
        let rows: Vec<_> = out.rows.iter().cloned().collect();
        assert_eq!(
            rows,
            vec![
                JoinRow::new(1, 'q', 'p'),
                JoinRow::new(1, 'r', 'p'),
                JoinRow::new(2, 'y', 'x'),
            ]
        );
        assert!(out.heavy_keys.build().contains(&1));
        assert_eq!(out.build_side, RelationSide::Right);
    }

    #[test]
    fn observer_sees_every_phase_in_order() {
        let join = FlowJoin::new(FlowJoinConfig::default().with_partitions(2)).unwrap();
        let ring = ObserverRingBuffer::new(64);
        let left = rel(vec![vec![(0, 'a')], vec![(1, 'b')]]);
        let right = rel(vec![vec![(0, 'c')], vec![(1, 'd')]]);
        join.run(left, right, &ring).unwrap();
        let kinds: Vec<&str> = ring.drain().iter().map(FlowJoinEvent::kind_str).collect();
        assert_eq!(
            kinds,
            vec![
                "partition_estimated",
                "partition_estimated",
                "partition_estimated",
                "partition_estimated",
                "heavy_keys_published",
                "partition_redistributed",
                "partition_redistributed",
                "partition_joined",
                "partition_joined",
                "run_completed",
            ]
        );
        let events = ring.drain();
        assert!(events.windows(2).all(|w| w[0].elapsed_ns() <= w[1].elapsed_ns()));
    }
}
