//! Tree builders shared by the unit tests.

use blobclus_core::{
    live_blob_point_clouds, BlobBounds, DetectorParams, Point, PointClouds, PointTree, Vector,
};

use crate::facade::Cluster;

/// Bounds of a test blob: one wire per plane, one slice.
pub(crate) fn bounds(slice: i64, wire: i64) -> BlobBounds {
    BlobBounds {
        charge: 100.0,
        slice_index_min: slice,
        slice_index_max: slice + 1,
        wire_index: [(wire, wire + 1); 3],
    }
}

/// `n` single-sample blobs at `start + k * step`, on consecutive slices.
pub(crate) fn line_blobs(start: Point, step: Vector, n: usize, first_slice: i64) -> Vec<(Point, i64)> {
    (0..n)
        .map(|k| {
            #[allow(clippy::cast_precision_loss, clippy::cast_possible_wrap)]
            let (kf, ki) = (k as f64, k as i64);
            (start + step * kf, first_slice + ki)
        })
        .collect()
}

/// Live tree with one root child per cluster and one leaf per blob.
pub(crate) fn cluster_tree(clusters: &[Vec<(Point, i64)>]) -> PointTree {
    let mut tree = PointTree::new();
    let root = tree.root();
    for blobs in clusters {
        let cluster = tree.insert_child(root, PointClouds::new()).unwrap();
        for (k, (p, slice)) in blobs.iter().enumerate() {
            #[allow(clippy::cast_possible_wrap)]
            let pcs = live_blob_point_clouds(&bounds(*slice, k as i64), &[*p]).unwrap();
            tree.insert_child(cluster, pcs).unwrap();
        }
    }
    tree
}

/// Facades over the top-level clusters, measured with default detector
/// constants.
pub(crate) fn facades(tree: &PointTree) -> Vec<Cluster<'_>> {
    let params = DetectorParams::default();
    tree.children(tree.root())
        .unwrap()
        .iter()
        .map(|&n| {
            let c = Cluster::new(tree, n).unwrap();
            let length = c.measure_length(&params);
            c.with_length(length)
        })
        .collect()
}
