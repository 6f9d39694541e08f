//! Properties every merge pass keeps.

mod common;

use std::collections::BTreeMap;

use blobclus_algorithms::predicates::{
    close_accepts, parallel_prolong_accepts, regular_accepts, CloseParams,
    ParallelProlongParams, RegularParams,
};
use blobclus_algorithms::{
    run_pass, DetectorParams, Grouping, NodeId, PipelineConfig, PointTree,
};
use blobclus_core::units::CM;
use blobclus_core::{Point, Vector};

use common::{blob_nodes, live_tree, Track};

/// A small event with a few candidate joints and a few isolated tracks.
fn mixed_event() -> PointTree {
    let diag = Vector::new(1.0, 1.0, 0.0);
    let a = Track::new(Point::origin(), diag, 40, 0);
    let b_start = a.at(430.0);
    let c_dir = Vector::new(1.0, 0.0, 1.0);
    let c = Track::new(Point::new(0.0, 0.0, 2000.0), c_dir, 50, 0);
    let d_start = c.at(550.0);
    live_tree(&[
        a,
        Track::new(b_start, diag, 40, 40),
        c,
        Track::new(d_start, c_dir, 30, 50),
        Track::new(Point::new(0.0, 3000.0, 0.0), Vector::new(0.0, 1.0, 0.0), 15, 0),
        Track::new(Point::new(0.0, 3000.0, 170.0), Vector::new(0.0, 1.0, 0.0), 3, 0),
    ])
}

fn membership(grouping: &Grouping) -> BTreeMap<NodeId, Vec<NodeId>> {
    grouping
        .cluster_nodes()
        .into_iter()
        .map(|c| (c, grouping.tree().children(c).unwrap().to_vec()))
        .collect()
}

#[test]
fn test_pass_without_candidates_changes_nothing() {
    let tracks: Vec<Track> = (0..4)
        .map(|i| {
            let offset = f64::from(i) * 5000.0;
            Track::new(Point::new(0.0, offset, 0.0), Vector::new(0.0, 0.0, 1.0), 20, 0)
        })
        .collect();
    let mut grouping = Grouping::new(live_tree(&tracks), DetectorParams::default()).unwrap();
    let config = PipelineConfig::default();

    for pass in config.schedule(grouping.len()) {
        let before = membership(&grouping);
        let lengths: Vec<f64> = before.keys().map(|&c| grouping.length(c)).collect();
        let report = run_pass(&mut grouping, &[], &pass).unwrap();
        assert_eq!(report.merged, 0, "{}", report.name);
        assert_eq!(membership(&grouping), before);
        let after: Vec<f64> = before.keys().map(|&c| grouping.length(c)).collect();
        assert_eq!(after, lengths);
    }
}

#[test]
fn test_cluster_count_never_increases() {
    let mut grouping = Grouping::new(mixed_event(), DetectorParams::default()).unwrap();
    let config = PipelineConfig::default();
    for pass in config.schedule(grouping.len()) {
        let report = run_pass(&mut grouping, &[], &pass).unwrap();
        assert!(report.clusters_after <= report.clusters_before, "{}", report.name);
        assert_eq!(report.clusters_after, grouping.len());
    }
}

#[test]
fn test_every_blob_in_exactly_one_cluster() {
    let tree = mixed_event();
    let all_blobs = blob_nodes(&tree);
    let mut grouping = Grouping::new(tree, DetectorParams::default()).unwrap();
    let config = PipelineConfig::default();
    for pass in config.schedule(grouping.len()) {
        run_pass(&mut grouping, &[], &pass).unwrap();
        let blobs = blob_nodes(grouping.tree());
        let mut unique = blobs.clone();
        unique.dedup();
        assert_eq!(unique.len(), blobs.len());
        assert_eq!(blobs, all_blobs);
    }
}

#[test]
fn test_unordered_predicates_are_symmetric() {
    let grouping = Grouping::new(mixed_event(), DetectorParams::default()).unwrap();
    let det = grouping.detector().clone();
    let clusters = grouping.clusters().unwrap();
    let regular = [
        RegularParams::new(60.0 * CM, false),
        RegularParams::new(30.0 * CM, true),
    ];
    let parallel = ParallelProlongParams::default();
    let close = CloseParams::default().with_length_cut(20.0 * CM);

    for (i, a) in clusters.iter().enumerate() {
        for b in &clusters[i + 1..] {
            for params in &regular {
                assert_eq!(
                    regular_accepts(a, b, params, &det),
                    regular_accepts(b, a, params, &det)
                );
            }
            assert_eq!(
                parallel_prolong_accepts(a, b, &parallel, &det),
                parallel_prolong_accepts(b, a, &parallel, &det)
            );
            assert_eq!(close_accepts(a, b, &close), close_accepts(b, a, &close));
        }
    }
}
