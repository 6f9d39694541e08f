#![allow(dead_code)]
//! Event builders shared by the integration tests.

use blobclus_algorithms::PointTree;
use blobclus_core::{live_blob_point_clouds, BlobBounds, NodeId, Point, PointClouds, Vector};

/// One cluster: `n` single-sample blobs along `dir`, 1 cm apart.
pub struct Track {
    pub start: Point,
    pub dir: Vector,
    pub n: usize,
    pub first_slice: i64,
}

impl Track {
    pub fn new(start: Point, dir: Vector, n: usize, first_slice: i64) -> Self {
        Self {
            start,
            dir: dir.normalize(),
            n,
            first_slice,
        }
    }

    /// Position `mm` millimetres along the track from its start.
    pub fn at(&self, mm: f64) -> Point {
        self.start + self.dir * mm
    }
}

/// Live tree with one root child per track.
pub fn live_tree(tracks: &[Track]) -> PointTree {
    let mut tree = PointTree::new();
    let root = tree.root();
    for track in tracks {
        let cluster = tree.insert_child(root, PointClouds::new()).unwrap();
        for k in 0..track.n {
            #[allow(clippy::cast_precision_loss, clippy::cast_possible_wrap)]
            let (kf, ki) = (k as f64, k as i64);
            let bounds = BlobBounds {
                charge: 100.0,
                slice_index_min: track.first_slice + ki,
                slice_index_max: track.first_slice + ki + 1,
                wire_index: [(ki, ki + 1); 3],
            };
            let sample = track.start + track.dir * (10.0 * kf);
            let pcs = live_blob_point_clouds(&bounds, &[sample]).unwrap();
            tree.insert_child(cluster, pcs).unwrap();
        }
    }
    tree
}

/// Blob nodes of every cluster, sorted, one entry per blob.
pub fn blob_nodes(tree: &PointTree) -> Vec<NodeId> {
    let mut blobs: Vec<NodeId> = tree
        .children(tree.root())
        .unwrap()
        .iter()
        .flat_map(|&c| tree.children(c).unwrap().to_vec())
        .collect();
    blobs.sort();
    blobs
}
