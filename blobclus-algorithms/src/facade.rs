//! Cluster facade.
//!
//! A [`Cluster`] is a read view over one top-level node of the live (or
//! dead) tree. It parses the blob records below the node, holds the node's
//! `"3d"` scoped view and answers the geometric queries the merge predicates
//! are written in terms of.

#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]

use std::collections::{BTreeSet, HashMap};
use std::f64::consts::PI;
use std::sync::Arc;

use blobclus_core::blob::SCALAR_PC;
use blobclus_core::geom::angle_deg;
use blobclus_core::units::{CM, DEGREE};
use blobclus_core::{
    Blob, DetectorParams, NodeId, Point, PointTree, Result, Scope, ScopedView, Vector,
};

/// Upper bound on alternating nearest-point steps.
pub const MAX_CLOSEST_ITERATIONS: usize = 20;

/// Hough histogram bins in `cos(theta)`.
const HOUGH_COS_BINS: usize = 180;
/// Hough histogram bins in `phi`.
const HOUGH_PHI_BINS: usize = 360;

/// Result of the mutual nearest-point search between two clusters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosestApproach {
    /// Point of the first cluster.
    pub p1: Point,
    /// Point of the second cluster.
    pub p2: Point,
    /// Blob owning `p1`.
    pub blob1: NodeId,
    /// Blob owning `p2`.
    pub blob2: NodeId,
    /// `|p1 - p2|`.
    pub distance: f64,
}

impl ClosestApproach {
    /// The same approach seen from the other cluster.
    #[must_use]
    pub fn swapped(self) -> Self {
        Self {
            p1: self.p2,
            p2: self.p1,
            blob1: self.blob2,
            blob2: self.blob1,
            distance: self.distance,
        }
    }
}

/// Read view over one cluster subtree.
#[derive(Debug, Clone)]
pub struct Cluster<'a> {
    tree: &'a PointTree,
    node: NodeId,
    view: Arc<ScopedView>,
    blobs: Vec<Blob>,
    /// Hough weight of each node of `view`.
    weights: Vec<f64>,
    length: f64,
}

impl<'a> Cluster<'a> {
    /// Builds the facade for the subtree rooted at `node`.
    ///
    /// # Errors
    /// Fails if a blob node has a malformed `"scalar"` cloud or a `"3d"`
    /// cloud without coordinates.
    pub fn new(tree: &'a PointTree, node: NodeId) -> Result<Self> {
        let view = tree.scoped_view(node, &Scope::samples_3d())?;
        let mut blobs = Vec::new();
        for n in tree.descendants(node)?.into_iter().skip(1) {
            if tree.point_clouds(n)?.contains_key(SCALAR_PC) {
                blobs.push(Blob::from_node(tree, n)?);
            }
        }
        let index: HashMap<NodeId, &Blob> = blobs.iter().map(|b| (b.node, b)).collect();
        let weights = view
            .nodes()
            .iter()
            .map(|n| index.get(n).map_or(1.0, |b| hough_weight(b)))
            .collect();
        Ok(Self {
            tree,
            node,
            view,
            blobs,
            weights,
            length: 0.0,
        })
    }

    /// Attaches a cached length.
    #[must_use]
    pub fn with_length(mut self, length: f64) -> Self {
        self.length = length;
        self
    }

    /// Node identifying this cluster.
    #[must_use]
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Tree holding the cluster.
    #[must_use]
    pub fn tree(&self) -> &'a PointTree {
        self.tree
    }

    /// Blob records in tree order.
    #[must_use]
    pub fn blobs(&self) -> &[Blob] {
        &self.blobs
    }

    /// Cached length, see [`Cluster::measure_length`].
    #[must_use]
    pub fn length(&self) -> f64 {
        self.length
    }

    /// Number of sample points.
    #[must_use]
    pub fn npoints(&self) -> usize {
        self.view.npoints()
    }

    fn point(&self, i: usize) -> Point {
        let p = self.view.point(i);
        Point::new(p[0], p[1], p[2])
    }

    /// Nearest sample point to `target` and the blob owning it.
    #[must_use]
    pub fn closest_point(&self, target: &Point) -> Option<(Point, NodeId)> {
        let n = self.view.nearest(target.coords.as_slice())?;
        Some((self.point(n.index), self.view.node_of(n.index)?))
    }

    /// Mutual nearest points, alternating from `seed`.
    ///
    /// Stops when neither owning blob changes, or after
    /// [`MAX_CLOSEST_ITERATIONS`] steps, keeping the last pair.
    #[must_use]
    pub fn mutual_closest(&self, other: &Cluster<'_>, seed: &Point) -> Option<ClosestApproach> {
        self.mutual_closest_steps(other, seed).map(|(approach, _)| approach)
    }

    /// [`Self::mutual_closest`] with the number of steps taken.
    fn mutual_closest_steps(
        &self,
        other: &Cluster<'_>,
        seed: &Point,
    ) -> Option<(ClosestApproach, usize)> {
        let mut p1 = *seed;
        let mut last: Option<(ClosestApproach, usize)> = None;
        for step in 1..=MAX_CLOSEST_ITERATIONS {
            let (p2, blob2) = other.closest_point(&p1)?;
            let (q1, blob1) = self.closest_point(&p2)?;
            p1 = q1;
            let approach = ClosestApproach {
                p1,
                p2,
                blob1,
                blob2,
                distance: (p1 - p2).norm(),
            };
            let settled = last.is_some_and(|(a, _)| a.blob1 == blob1 && a.blob2 == blob2);
            last = Some((approach, step));
            if settled {
                break;
            }
        }
        last
    }

    /// Closest approach between two clusters.
    ///
    /// The search is seeded from the first and the last blob of the shorter
    /// cluster (the lower node on equal lengths) and the closer result is
    /// kept, so swapping the clusters swaps the points.
    #[must_use]
    pub fn closest_point_pair(&self, other: &Cluster<'_>) -> Option<ClosestApproach> {
        let self_seeds = self.length < other.length
            || (self.length == other.length && self.node <= other.node);
        if self_seeds {
            self.seeded_pair(other)
        } else {
            other.seeded_pair(self).map(ClosestApproach::swapped)
        }
    }

    fn seeded_pair(&self, other: &Cluster<'_>) -> Option<ClosestApproach> {
        let first = self.first_blob()?;
        let last = self.last_blob()?;
        let mut best = self.mutual_closest(other, &first.center);
        if last.node != first.node {
            if let Some(b) = self.mutual_closest(other, &last.center) {
                if best.is_none_or(|a| b.distance < a.distance) {
                    best = Some(b);
                }
            }
        }
        best
    }

    /// Unweighted mean of the points within `radius` of `near`, or `near`
    /// itself when there are none.
    #[must_use]
    pub fn average_position(&self, near: &Point, radius: f64) -> Point {
        let found = self.view.radius(near.coords.as_slice(), radius);
        if found.is_empty() {
            return *near;
        }
        let sum = found
            .iter()
            .fold(Vector::zeros(), |acc, n| acc + self.point(n.index).coords);
        Point::from(sum / found.len() as f64)
    }

    /// Number of points within `radius` of `near`.
    #[must_use]
    pub fn point_count(&self, near: &Point, radius: f64) -> usize {
        self.view.radius(near.coords.as_slice(), radius).len()
    }

    /// Hough-vote direction of the points within `radius` of `origin`.
    ///
    /// Each point votes for its direction seen from `origin`, weighted by
    /// its blob's charge per sample. Returns the unit vector of the winning
    /// bin, or the zero vector when nothing voted.
    #[must_use]
    pub fn direction(&self, origin: &Point, radius: f64) -> Vector {
        let mut hist = vec![0.0_f64; HOUGH_COS_BINS * HOUGH_PHI_BINS];
        let mut voted = false;
        for n in self.view.radius(origin.coords.as_slice(), radius) {
            let d = self.point(n.index) - origin;
            let r = d.norm();
            if r == 0.0 {
                continue;
            }
            let Some(w) = self
                .view
                .node_position(n.index)
                .and_then(|k| self.weights.get(k).copied())
            else {
                continue;
            };
            if w <= 0.0 {
                continue;
            }
            let cos_theta = (d.z / r).clamp(-1.0, 1.0);
            let phi = d.y.atan2(d.x);
            let ic = (((cos_theta + 1.0) / 2.0 * HOUGH_COS_BINS as f64) as usize)
                .min(HOUGH_COS_BINS - 1);
            let ip = (((phi + PI) / (2.0 * PI) * HOUGH_PHI_BINS as f64) as usize)
                .min(HOUGH_PHI_BINS - 1);
            hist[ic * HOUGH_PHI_BINS + ip] += w;
            voted = true;
        }
        if !voted {
            return Vector::zeros();
        }
        let mut best = 0;
        for (i, &v) in hist.iter().enumerate() {
            if v > hist[best] {
                best = i;
            }
        }
        let ic = best / HOUGH_PHI_BINS;
        let ip = best % HOUGH_PHI_BINS;
        let cos_theta = -1.0 + (ic as f64 + 0.5) * 2.0 / HOUGH_COS_BINS as f64;
        let phi = -PI + (ip as f64 + 0.5) * 2.0 * PI / HOUGH_PHI_BINS as f64;
        let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
        Vector::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta)
    }

    /// Sign-protected direction: the fit at `centre` over `radius`, flipped
    /// when it is more than 120 degrees away from the fit at `anchor` over
    /// `check_radius`.
    #[must_use]
    pub fn direction_estimate(
        &self,
        centre: &Point,
        anchor: &Point,
        radius: f64,
        check_radius: f64,
    ) -> Vector {
        let wide = self.direction(centre, radius);
        let check = self.direction(anchor, check_radius);
        match angle_deg(&wide, &check) {
            Some(a) if a > 120.0 => -wide,
            _ => wide,
        }
    }

    /// Track length from the wires and time slices the blobs cover.
    #[must_use]
    pub fn measure_length(&self, params: &DetectorParams) -> f64 {
        let mut wires: [BTreeSet<i64>; 3] = Default::default();
        let mut slices = BTreeSet::new();
        for blob in &self.blobs {
            slices.insert(blob.slice_index_min);
            for (set, &(lo, hi)) in wires.iter_mut().zip(blob.wire_index.iter()) {
                set.extend(lo..hi);
            }
        }
        let transverse: f64 = wires
            .iter()
            .zip(params.pitches.iter())
            .map(|(set, pitch)| (pitch * set.len() as f64).powi(2))
            .sum();
        let drift = (params.ts_width * slices.len() as f64).powi(2);
        (2.0 / 3.0 * transverse + drift).sqrt()
    }

    fn extreme_points(&self, axis: usize) -> Option<(Point, Point)> {
        if self.view.is_empty() {
            return None;
        }
        let (mut lo, mut hi) = (0, 0);
        for i in 1..self.npoints() {
            let v = self.view.point(i)[axis];
            if v < self.view.point(lo)[axis] {
                lo = i;
            }
            if v > self.view.point(hi)[axis] {
                hi = i;
            }
        }
        Some((self.point(lo), self.point(hi)))
    }

    /// Points with the largest and the smallest `y`.
    #[must_use]
    pub fn highest_lowest_points(&self) -> Option<(Point, Point)> {
        self.extreme_points(1).map(|(lo, hi)| (hi, lo))
    }

    /// Points with the smallest and the largest drift coordinate `x`.
    #[must_use]
    pub fn earliest_latest_points(&self) -> Option<(Point, Point)> {
        self.extreme_points(0)
    }

    /// Blob with the smallest starting slice.
    #[must_use]
    pub fn first_blob(&self) -> Option<&Blob> {
        self.blobs
            .iter()
            .reduce(|a, b| if b.slice_index_min < a.slice_index_min { b } else { a })
    }

    /// Blob with the largest starting slice.
    #[must_use]
    pub fn last_blob(&self) -> Option<&Blob> {
        self.blobs
            .iter()
            .reduce(|a, b| if b.slice_index_min > a.slice_index_min { b } else { a })
    }

    /// Marches from `origin` along `dir` looking for a cluster point close
    /// to the line.
    ///
    /// Steps of `step` up to `test_dis` are snapped to the nearest point; a
    /// snap counts when its offset is below `min(d * tan(angle_cut), dis_cut)`
    /// where `d` is the snapped point's distance from `origin`. Returns the
    /// best snapped point and its distance from `origin`, stopping early at
    /// an offset under 3 cm, or `(origin, 1e9)` when nothing counted.
    #[must_use]
    pub fn closest_point_along(
        &self,
        origin: &Point,
        dir: &Vector,
        test_dis: f64,
        step: f64,
        angle_cut_deg: f64,
        dis_cut: f64,
    ) -> (Point, f64) {
        let mut best = (*origin, 1e9);
        let norm = dir.norm();
        if norm == 0.0 || step <= 0.0 || !test_dis.is_finite() {
            return best;
        }
        let dir = dir / norm;
        let tan_cut = (angle_cut_deg * DEGREE).tan();
        let mut min_offset = f64::INFINITY;
        let steps = (test_dis / step) as usize + 1;
        for i in 0..steps {
            let probe = origin + dir * (i as f64 * step);
            let Some((snap, _)) = self.closest_point(&probe) else {
                break;
            };
            let offset = (snap - probe).norm();
            let from_origin = (snap - origin).norm();
            if offset < (from_origin * tan_cut).min(dis_cut) {
                if offset < min_offset {
                    min_offset = offset;
                    best = (snap, from_origin);
                }
                if offset < 3.0 * CM {
                    return (snap, from_origin);
                }
            }
        }
        best
    }

    /// Live blobs sharing a time slice with a dead blob of `dead` and
    /// overlapping it in every wire plane within `offset` wires.
    #[must_use]
    pub fn connected_blobs(&self, dead: &Cluster<'_>, offset: i64) -> Vec<NodeId> {
        self.blobs
            .iter()
            .filter(|live| dead.blobs.iter().any(|d| live.overlaps(d, offset)))
            .map(|b| b.node)
            .collect()
    }
}

/// Charge per sample; a blob without charge votes with unit charge.
fn hough_weight(blob: &Blob) -> f64 {
    let charge = if blob.charge == 0.0 { 1.0 } else { blob.charge };
    charge / blob.npoints.max(1) as f64
}
