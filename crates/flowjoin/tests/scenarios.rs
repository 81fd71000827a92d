//! End-to-end runs of the Flow-Join pipeline on small hand-checked inputs and
//! on generated skewed and uniform workloads.

mod common;

use std::collections::BTreeSet;

use flowjoin::{
    CounterBackend, FlowJoin, FlowJoinConfig, FlowJoinEvent, HeavyKeySource, InputLayout, JoinRow,
    NoOpObserver, ObserverRingBuffer, PartitionedRelation, SkewThreshold, SpaceSaving,
    TracingObserver, Tuple, nested_loop_join, selective_broadcast,
};

fn rows(triples: &[(i64, char, char)]) -> BTreeSet<JoinRow<char>> {
    triples
        .iter()
        .map(|&(k, b, p)| JoinRow::new(k, b, p))
        .collect()
}

#[test]
fn broadcast_of_heavy_key_finds_every_match() {
    let build = common::aligned(&[(1, 'A'), (1, 'B'), (3, 'F')], 2);
    let probe = common::aligned(&[(1, 'K'), (3, 'N')], 2);
    let heavy = BTreeSet::from([1]);

    let redistributed = selective_broadcast(build, probe, &heavy).unwrap();
    let out = flowjoin::aligned_join(&redistributed.build, &redistributed.probe, false).unwrap();
    assert_eq!(
        out.rows,
        rows(&[(1, 'A', 'K'), (1, 'B', 'K'), (3, 'F', 'N')])
    );
}

#[test]
fn pipeline_detects_heavy_key_and_joins() {
    common::init_tracing();
    let config = FlowJoinConfig::default()
        .with_partitions(2)
        .with_capacity(4)
        .with_skew_threshold(SkewThreshold::Count(2));
    let join = FlowJoin::new(config).unwrap();
    let build = vec![Tuple::new(1, 'A'), Tuple::new(1, 'B'), Tuple::new(3, 'F')];
    let probe = vec![Tuple::new(1, 'K'), Tuple::new(3, 'N')];
    let out = join.run_tuples(build, probe, &TracingObserver).unwrap();

    assert_eq!(
        out.rows,
        rows(&[(1, 'A', 'K'), (1, 'B', 'K'), (3, 'F', 'N')])
    );
    assert_eq!(out.broadcast_keys, BTreeSet::from([1]));
    assert_eq!(out.broadcast.heavy_build_tuples, 2);
    assert_eq!(out.broadcast.replicas_added, 2);
}

#[test]
fn key_one_retained_at_capacity_two_for_every_backend() {
    for backend in CounterBackend::ALL {
        let mut sketch = SpaceSaving::new(2, backend).unwrap();
        sketch.process([1_i64, 1, 1, 2, 3, 4]);
        let hist = sketch.get_heavy_hitters();
        let count = hist.get(&1).map(|e| e.count);
        assert!(count >= Some(3), "backend={backend} count={count:?}");
    }
}

#[test]
fn uniform_workload_has_no_heavy_keys_and_matches_baseline() {
    common::init_tracing();
    let p = 4;
    let build_keys: Vec<i64> = (0..2_000).collect();
    let probe_keys: Vec<i64> = (0..2_000).rev().step_by(3).collect();
    let build = common::aligned(
        &build_keys.iter().map(|&k| (k, k as u64)).collect::<Vec<_>>(),
        p,
    );
    let probe = common::aligned(
        &probe_keys.iter().map(|&k| (k, k as u64 * 10)).collect::<Vec<_>>(),
        p,
    );
    let baseline = nested_loop_join(&build, &probe);

    for backend in CounterBackend::ALL {
        let config = FlowJoinConfig::default()
            .with_partitions(p)
            .with_capacity(16)
            .with_backend(backend)
            .with_skew_threshold(SkewThreshold::Count(40));
        let ring = ObserverRingBuffer::new(64);
        let out = FlowJoin::new(config)
            .unwrap()
            .run(build.clone(), probe.clone(), &ring)
            .unwrap();

        assert!(out.heavy_keys.is_empty(), "backend={backend}");
        assert_eq!(out.broadcast.replicas_added, 0);
        // Redistribution left every build partition at its original size.
        for event in ring.drain() {
            if let FlowJoinEvent::PartitionRedistributed {
                build_before,
                build_after,
                ..
            } = event
            {
                assert_eq!(build_before, build_after);
            }
        }
        assert_eq!(out.rows, baseline, "backend={backend}");
        for h in &out.build_histograms {
            assert!(h.error_bound() <= h.observed() / 16);
        }
    }
}

#[test]
fn skewed_workload_matches_baseline_for_every_option() {
    let p = 4;
    let build_keys = common::zipf_keys(1_500, 200, 1.2, 7);
    let probe_keys = common::zipf_keys(1_500, 200, 1.2, 11);
    let build = common::aligned(
        &build_keys
            .iter()
            .enumerate()
            .map(|(i, &k)| (k, i as u64))
            .collect::<Vec<_>>(),
        p,
    );
    let probe = common::aligned(
        &probe_keys
            .iter()
            .enumerate()
            .map(|(i, &k)| (k, i as u64))
            .collect::<Vec<_>>(),
        p,
    );
    let baseline = nested_loop_join(&build, &probe);
    assert!(!baseline.is_empty());

    for source in [HeavyKeySource::Build, HeavyKeySource::Probe, HeavyKeySource::Both] {
        for parallel in [false, true] {
            let config = FlowJoinConfig::default()
                .with_partitions(p)
                .with_capacity(32)
                .with_skew_threshold(SkewThreshold::Frequency(0.01))
                .with_heavy_key_source(source)
                .with_parallel(parallel);
            let out = FlowJoin::new(config)
                .unwrap()
                .run(build.clone(), probe.clone(), &NoOpObserver)
                .unwrap();
            assert!(!out.broadcast_keys.is_empty(), "source={source:?}");
            assert_eq!(out.rows, baseline, "source={source:?} parallel={parallel}");
            assert!(out.join.duplicates_collapsed <= out.join.raw_matches);
        }
    }
}

#[test]
fn node_local_flow_join_matches_hash_join_with_less_traffic() {
    let p = 4;
    // Key 1 dominates the probe side and is rare on the build side.
    let mut build_keys = vec![1_i64; 8];
    build_keys.extend(common::uniform_keys(400, 500, 3));
    let mut probe_keys = vec![1_i64; 900];
    probe_keys.extend(common::uniform_keys(600, 500, 5));
    let build = common::round_robin(common::tuples(&build_keys), p);
    let probe = common::round_robin(common::tuples(&probe_keys), p);

    let config = FlowJoinConfig::default()
        .with_partitions(p)
        .with_input_layout(InputLayout::NodeLocal)
        .with_heavy_key_source(HeavyKeySource::Probe)
        .with_skew_threshold(SkewThreshold::Frequency(0.1));
    let join = FlowJoin::new(config).unwrap();
    let flow = join.run(build.clone(), probe.clone(), &NoOpObserver).unwrap();
    let hash = join.run_hash_join(build.clone(), probe.clone()).unwrap();

    assert_eq!(flow.rows, hash.rows);
    assert_eq!(flow.rows, nested_loop_join(&build, &probe));
    assert!(flow.broadcast_keys.contains(&1));
    assert!(
        flow.traffic.total() < hash.traffic.total(),
        "flow={:?} hash={:?}",
        flow.traffic,
        hash.traffic
    );
}

#[test]
fn node_local_input_is_rejected_when_layout_says_aligned() {
    let p = 2;
    let build = PartitionedRelation::from_partitions(vec![vec![Tuple::new(1, 0_u64)], vec![]]);
    let probe = PartitionedRelation::with_empty_partitions(p);
    let err = FlowJoin::new(FlowJoinConfig::default().with_partitions(p))
        .unwrap()
        .run(build, probe, &NoOpObserver)
        .unwrap_err();
    assert!(err.is_input_error());
}

#[test]
fn relations_loaded_from_json_are_checked_by_position() {
    let join = FlowJoin::new(FlowJoinConfig::default().with_partitions(2)).unwrap();
    let probe_json = r#"{"partitions": [
        {"id": 0, "tuples": [{"key": 0, "value": 9}, {"key": 2, "value": 8}]},
        {"id": 1, "tuples": []}
    ]}"#;

    let relabelled = r#"{"partitions": [
        {"id": 0, "tuples": [{"key": 0, "value": 1}]},
        {"id": 0, "tuples": [{"key": 2, "value": 2}]}
    ]}"#;
    assert!(serde_json::from_str::<PartitionedRelation<u32>>(relabelled).is_err());

    let misplaced = r#"{"partitions": [
        {"id": 0, "tuples": [{"key": 0, "value": 1}]},
        {"id": 1, "tuples": [{"key": 2, "value": 2}]}
    ]}"#;
    let build: PartitionedRelation<u32> = serde_json::from_str(misplaced).unwrap();
    let probe: PartitionedRelation<u32> = serde_json::from_str(probe_json).unwrap();
    let err = join.run(build, probe, &NoOpObserver).unwrap_err();
    assert!(err.is_input_error(), "{err}");

    let aligned = r#"{"partitions": [
        {"id": 0, "tuples": [{"key": 0, "value": 1}, {"key": 2, "value": 2}]},
        {"id": 1, "tuples": []}
    ]}"#;
    let build: PartitionedRelation<u32> = serde_json::from_str(aligned).unwrap();
    let probe: PartitionedRelation<u32> = serde_json::from_str(probe_json).unwrap();
    let out = join.run(build, probe, &NoOpObserver).unwrap();
    assert_eq!(
        out.rows,
        BTreeSet::from([JoinRow::new(0, 1, 9), JoinRow::new(2, 2, 8)])
    );
}
