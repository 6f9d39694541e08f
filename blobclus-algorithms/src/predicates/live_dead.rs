//! Bridging live clusters that touch the same dead region.

use std::collections::HashSet;

use blobclus_core::geom::is_angle_consistent;
use blobclus_core::units::CM;
use blobclus_core::{DetectorParams, Point, Result};

use super::{angle, degenerate, drift_deviation};
use crate::facade::{ClosestApproach, Cluster};
use crate::graph::ConnectivityGraph;
use crate::pass::{MergePass, PassContext, PassState};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Thresholds of the live-dead bridging pass.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LiveDeadParams {
    /// Wire tolerance when matching live blobs against dead blobs.
    pub overlap_offset: i64,
    /// Pairs farther apart than this are never merged.
    pub distance_cut: f64,
    /// Radius of the averaged anchor around each closest point.
    pub average_radius: f64,
    /// Radius of the direction fits.
    pub fit_radius: f64,
    /// Clusters up to this length use the short-fragment tables.
    pub short_length: f64,
}

impl Default for LiveDeadParams {
    fn default() -> Self {
        Self {
            overlap_offset: 2,
            distance_cut: 60.0 * CM,
            average_radius: 5.0 * CM,
            fit_radius: 30.0 * CM,
            short_length: 12.0 * CM,
        }
    }
}

impl LiveDeadParams {
    /// Sets `overlap_offset`.
    #[must_use]
    pub fn with_overlap_offset(mut self, offset: i64) -> Self {
        self.overlap_offset = offset;
        self
    }

    /// Sets `distance_cut`.
    #[must_use]
    pub fn with_distance_cut(mut self, cut: f64) -> Self {
        self.distance_cut = cut;
        self
    }
}

/// Decides whether two live clusters meeting at a dead region belong
/// together.
///
/// `approach` must be the closest approach from `c1` to `c2`. The decision
/// is unordered: passing the clusters swapped together with
/// [`ClosestApproach::swapped`] gives the same answer.
#[must_use]
pub fn live_dead_accepts(
    c1: &Cluster<'_>,
    c2: &Cluster<'_>,
    approach: &ClosestApproach,
    params: &LiveDeadParams,
    detector: &DetectorParams,
) -> bool {
    let dis = approach.distance;
    if dis >= params.distance_cut {
        return false;
    }
    let (l1, l2) = (c1.length(), c2.length());

    let centre1 = c1.average_position(&approach.p1, params.average_radius);
    let centre2 = c2.average_position(&approach.p2, params.average_radius);
    let dir1 = c1.direction_estimate(&centre1, &approach.p1, params.fit_radius, params.fit_radius);
    let dir3 = c2.direction_estimate(&centre2, &approach.p2, params.fit_radius, params.fit_radius);
    let dir2 = centre2 - centre1;
    if degenerate(&[&dir1, &dir2, &dir3]) {
        return false;
    }

    let ad1 = 180.0 - angle(&dir1, &dir2);
    let ad2 = 180.0 - angle(&dir3, &(-dir2));
    let ad3 = 180.0 - angle(&dir1, &dir3);

    let dev1 = drift_deviation(&dir1, detector);
    let dev2 = drift_deviation(&dir2, detector);
    let dev3 = drift_deviation(&dir3, detector);

    // Close and all perpendicular to drift.
    if dev1 < 5.0 && dev2 < 5.0 && dev3 < 5.0 && dis < 10.0 * CM {
        return true;
    }

    let para = dev2 < 7.5 && (dev1 < 7.5 || dev3 < 7.5) && dev1 + dev2 + dev3 < 25.0;
    if para {
        if is_angle_consistent(&dir1, &dir2, false, 15.0, detector, 3)
            && is_angle_consistent(&dir3, &dir2, true, 15.0, detector, 3)
        {
            return true;
        }
    } else {
        let const1 = is_angle_consistent(&dir1, &dir2, false, 10.0, detector, 2);
        let const2 = is_angle_consistent(&dir3, &dir2, true, 10.0, detector, 2);
        if const1 && const2 {
            return true;
        }
        if const1 && l2 < 6.0 * CM && l1 > 15.0 * CM {
            if is_angle_consistent(&dir1, &dir2, false, 5.0, detector, 3) {
                return true;
            }
        } else if const2
            && l1 < 6.0 * CM
            && l2 > 15.0 * CM
            && is_angle_consistent(&dir3, &dir2, true, 5.0, detector, 3)
        {
            return true;
        }
    }

    let touching = dis <= 3.0 * CM
        && (((ad1 <= 45.0 || ad2 <= 45.0) && ad3 < 60.0)
            || (para && (ad1 <= 90.0 || ad2 <= 90.0) && ad3 < 120.0));
    if touching {
        return true;
    }

    let short1 = l1 <= params.short_length;
    let short2 = l2 <= params.short_length;
    match (short1, short2) {
        (true, true) => {
            (dis <= 5.0 * CM && (ad1 <= 30.0 || ad2 <= 30.0) && ad3 < 45.0)
                || (dis <= 15.0 * CM && (ad1 <= 15.0 || ad2 <= 15.0) && ad3 < 20.0)
                || (dis <= 60.0 * CM && (ad1 < 5.0 || ad2 < 5.0) && ad3 < 10.0)
        }
        // Only the long side's direction is trusted.
        (false, true) => long_side_accepts(ad1, ad3, dis),
        (true, false) => long_side_accepts(ad2, ad3, dis),
        (false, false) => {
            (dis <= 5.0 * CM && (ad1 <= 30.0 || ad2 <= 30.0) && ad3 < 45.0)
                || (dis <= 15.0 * CM && (ad1 <= 20.0 || ad2 <= 20.0) && ad3 < 30.0)
                || ((ad1 < 10.0 || ad2 < 10.0) && dis <= 60.0 * CM && ad3 < 15.0)
        }
    }
}

fn long_side_accepts(ad_long: f64, ad3: f64, dis: f64) -> bool {
    (dis <= 5.0 * CM && ad_long <= 30.0 && ad3 < 60.0)
        || (dis <= 15.0 * CM && ad_long <= 20.0 && ad3 < 40.0)
        || (ad_long < 10.0 && dis <= 60.0 * CM && ad3 < 15.0)
}

/// Pass proposing every pair of live clusters that touch a common dead
/// cluster.
///
/// Every live cluster sharing a dead cluster with another one joins the
/// connected-to-dead set. Each unordered pair is tested once, seeded at
/// the first blob of the first cluster found touching the dead region.
#[derive(Debug, Clone, Default)]
pub struct LiveDeadPass {
    /// Thresholds.
    pub params: LiveDeadParams,
}

impl LiveDeadPass {
    /// Creates the pass.
    #[must_use]
    pub fn new(params: LiveDeadParams) -> Self {
        Self { params }
    }
}

impl MergePass for LiveDeadPass {
    fn name(&self) -> String {
        "live-dead".to_string()
    }

    fn connect(
        &self,
        ctx: &PassContext<'_, '_>,
        state: &mut PassState,
        graph: &mut ConnectivityGraph,
    ) -> Result<()> {
        let offset = self.params.overlap_offset;
        let mut tested: HashSet<(usize, usize)> = HashSet::new();

        for dead in ctx.dead {
            // (live index, centre of its first blob touching the dead cluster)
            let touching: Vec<(usize, Point)> = ctx
                .clusters
                .iter()
                .enumerate()
                .filter_map(|(i, live)| {
                    let first = *live.connected_blobs(dead, offset).first()?;
                    let blob = live.blobs().iter().find(|b| b.node == first)?;
                    Some((i, blob.center))
                })
                .collect();
            if touching.len() < 2 {
                continue;
            }

            for (k, &(i, seed)) in touching.iter().enumerate() {
                state.newly_connected_dead.push(ctx.clusters[i].node());
                for &(j, _) in &touching[k + 1..] {
                    if !tested.insert((i.min(j), i.max(j))) {
                        continue;
                    }
                    let (c1, c2) = (&ctx.clusters[i], &ctx.clusters[j]);
                    let Some((start, _)) = c1.closest_point(&seed) else {
                        continue;
                    };
                    let Some(approach) = c1.mutual_closest(c2, &start) else {
                        continue;
                    };
                    if live_dead_accepts(c1, c2, &approach, &self.params, ctx.detector) {
                        state.accept(graph, i, j);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{cluster_tree, facades, line_blobs};
    use blobclus_core::{dead_blob_point_clouds, BlobBounds, PointClouds, PointTree, Vector};

    fn pair(gap: f64) -> PointTree {
        let step = Vector::new(0.0, 10.0, 0.0);
        cluster_tree(&[
            line_blobs(Point::origin(), step, 10, 0),
            line_blobs(Point::new(0.0, 90.0 + gap, 0.0), step, 10, 0),
        ])
    }

    #[test]
    fn test_collinear_pair_across_gap() {
        let tree = pair(30.0);
        let cs = facades(&tree);
        let approach = cs[0].closest_point_pair(&cs[1]).unwrap();
        let params = LiveDeadParams::default();
        let det = DetectorParams::default();
        assert!(live_dead_accepts(&cs[0], &cs[1], &approach, &params, &det));
        assert!(live_dead_accepts(&cs[1], &cs[0], &approach.swapped(), &params, &det));
    }

    #[test]
    fn test_far_pair_rejected() {
        let tree = pair(2000.0);
        let cs = facades(&tree);
        let approach = cs[0].closest_point_pair(&cs[1]).unwrap();
        let params = LiveDeadParams::default();
        let det = DetectorParams::default();
        assert!(!live_dead_accepts(&cs[0], &cs[1], &approach, &params, &det));
        assert!(!live_dead_accepts(&cs[1], &cs[0], &approach.swapped(), &params, &det));
    }

    #[test]
    fn test_perpendicular_pair_symmetric() {
        let tree = cluster_tree(&[
            line_blobs(Point::origin(), Vector::new(0.0, 10.0, 0.0), 20, 0),
            line_blobs(Point::new(50.0, 220.0, 0.0), Vector::new(10.0, 0.0, 0.0), 20, 0),
        ]);
        let cs = facades(&tree);
        let approach = cs[0].closest_point_pair(&cs[1]).unwrap();
        let params = LiveDeadParams::default();
        let det = DetectorParams::default();
        assert_eq!(
            live_dead_accepts(&cs[0], &cs[1], &approach, &params, &det),
            live_dead_accepts(&cs[1], &cs[0], &approach.swapped(), &params, &det)
        );
    }

    #[test]
    fn test_pass_marks_and_connects() {
        let tree = pair(30.0);
        let cs = facades(&tree);

        let mut dead_tree = PointTree::new();
        let dead_root = dead_tree.root();
        let dead_node = dead_tree.insert_child(dead_root, PointClouds::new()).unwrap();
        let bounds = BlobBounds {
            charge: 0.0,
            slice_index_min: 9,
            slice_index_max: 10,
            wire_index: [(0, 100); 3],
        };
        let corners = [Point::new(0.0, 80.0, -5.0), Point::new(0.0, 130.0, 5.0)];
        dead_tree
            .insert_child(dead_node, dead_blob_point_clouds(&bounds, &corners).unwrap())
            .unwrap();
        let dead = vec![Cluster::new(&dead_tree, dead_node).unwrap()];

        let connected = HashSet::new();
        let det = DetectorParams::default();
        let ctx = PassContext {
            clusters: &cs,
            dead: &dead,
            detector: &det,
            connected_dead: &connected,
        };
        let mut state = PassState::default();
        let mut graph = ConnectivityGraph::new(cs.len());
        LiveDeadPass::default().connect(&ctx, &mut state, &mut graph).unwrap();

        assert_eq!(state.newly_connected_dead.len(), 2);
        assert_eq!(graph.merge_groups(), vec![vec![0, 1]]);
    }
}
