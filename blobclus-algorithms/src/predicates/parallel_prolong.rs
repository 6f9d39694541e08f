//! Dedicated pass for joints perpendicular to drift or along a wire plane.

use blobclus_core::geom::is_prolonged;
use blobclus_core::units::CM;
use blobclus_core::{DetectorParams, Result};

use super::{angle, degenerate, density_direction, drift_deviation};
use crate::facade::Cluster;
use crate::graph::ConnectivityGraph;
use crate::pass::{MergePass, PassContext, PassState};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Parameters of the parallel/prolonged pass.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ParallelProlongParams {
    /// Largest gap bridged.
    pub length_cut: f64,
    /// At least one cluster must be this long.
    pub min_length: f64,
    /// Below this length a cluster's own direction is not trusted.
    pub short_length: f64,
}

impl Default for ParallelProlongParams {
    fn default() -> Self {
        Self {
            length_cut: 35.0 * CM,
            min_length: 10.0 * CM,
            short_length: 12.0 * CM,
        }
    }
}

impl ParallelProlongParams {
    /// Sets `length_cut`.
    #[must_use]
    pub fn with_length_cut(mut self, cut: f64) -> Self {
        self.length_cut = cut;
        self
    }
}

/// Accepts joints that are poorly resolved by the readout.
///
/// Only joints perpendicular to drift (within 5 degrees) or along a wire
/// plane (within 7.5 degrees) are considered; both cluster directions must
/// then follow the joint. A short cluster only needs to not run across it.
/// Symmetric in its arguments.
#[must_use]
pub fn parallel_prolong_accepts(
    c1: &Cluster<'_>,
    c2: &Cluster<'_>,
    params: &ParallelProlongParams,
    detector: &DetectorParams,
) -> bool {
    let (l1, l2) = (c1.length(), c2.length());
    if l1 < params.min_length && l2 < params.min_length {
        return false;
    }
    let Some(approach) = c1.closest_point_pair(c2) else {
        return false;
    };
    if approach.distance >= params.length_cut {
        return false;
    }
    let dir2 = approach.p2 - approach.p1;
    if degenerate(&[&dir2]) {
        return false;
    }
    let para = drift_deviation(&dir2, detector) < 5.0;
    let prol = !para && is_prolonged(&dir2, detector, 7.5);
    if !(para || prol) {
        return false;
    }

    let dir1 = density_direction(c1, &approach.p1, prol, 15.0 * CM, 30, 60.0 * CM);
    let dir3 = density_direction(c2, &approach.p2, prol, 15.0 * CM, 30, 60.0 * CM);
    if degenerate(&[&dir1, &dir3]) {
        return false;
    }
    if para
        && (drift_deviation(&dir1, detector) >= 10.0 || drift_deviation(&dir3, detector) >= 10.0)
    {
        return false;
    }

    let tolerance = if para { 30.0 } else { 25.0 };
    let ad1 = 180.0 - angle(&dir1, &dir2);
    let ad2 = angle(&dir3, &dir2);
    let crossing = |a: f64| (a - 90.0).abs() <= 30.0;
    match (l1 < params.short_length, l2 < params.short_length) {
        (false, false) => ad1 < tolerance && ad2 < tolerance,
        (false, true) => ad1 < tolerance && !crossing(ad2),
        (true, false) => ad2 < tolerance && !crossing(ad1),
        (true, true) => false,
    }
}

/// Pass testing every unordered pair once.
#[derive(Debug, Clone, Default)]
pub struct ParallelProlongPass {
    /// Parameters.
    pub params: ParallelProlongParams,
}

impl ParallelProlongPass {
    /// Creates the pass.
    #[must_use]
    pub fn new(params: ParallelProlongParams) -> Self {
        Self { params }
    }
}

impl MergePass for ParallelProlongPass {
    fn name(&self) -> String {
        format!("parallel-prolong({:.1} cm)", self.params.length_cut / CM)
    }

    fn connect(
        &self,
        ctx: &PassContext<'_, '_>,
        state: &mut PassState,
        graph: &mut ConnectivityGraph,
    ) -> Result<()> {
        for (i, c1) in ctx.clusters.iter().enumerate() {
            for (j, c2) in ctx.clusters.iter().enumerate().skip(i + 1) {
                if parallel_prolong_accepts(c1, c2, &self.params, ctx.detector) {
                    state.accept(graph, i, j);
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
    use blobclus_core::{Point, Vector};

    #[test]
    fn test_track_across_wires_perpendicular_to_drift() {
        // Along z: perpendicular to drift, a parallel joint.
        let dir = Vector::new(0.0, 0.3, 1.0).normalize();
        let tree = cluster_tree(&[
            line_blobs(Point::origin(), dir * 10.0, 30, 0),
            line_blobs(Point::from(dir * 390.0), dir * 10.0, 30, 0),
        ]);
        let cs = facades(&tree);
        let params = ParallelProlongParams::default();
        let det = DetectorParams::default();
        assert!(parallel_prolong_accepts(&cs[0], &cs[1], &params, &det));
        assert!(parallel_prolong_accepts(&cs[1], &cs[0], &params, &det));
    }

    #[test]
    fn test_regular_joint_ignored() {
        let dir = Vector::new(1.0, 0.0, 1.0).normalize();
        let tree = cluster_tree(&[
            line_blobs(Point::origin(), dir * 10.0, 30, 0),
            line_blobs(Point::from(dir * 390.0), dir * 10.0, 30, 30),
        ]);
        let cs = facades(&tree);
        let params = ParallelProlongParams::default();
        let det = DetectorParams::default();
        assert!(!parallel_prolong_accepts(&cs[0], &cs[1], &params, &det));
    }
}
