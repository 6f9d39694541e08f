//! General-purpose merging of two clusters facing each other.

use blobclus_core::geom::{is_angle_consistent, is_prolonged};
use blobclus_core::units::CM;
use blobclus_core::{DetectorParams, Result};

use super::{angle, degenerate, density_direction, drift_deviation, spread_along};
use crate::facade::Cluster;
use crate::graph::ConnectivityGraph;
use crate::pass::{MergePass, PassContext, PassState};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Parameters of a regular pass.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RegularParams {
    /// Largest gap bridged.
    pub length_cut: f64,
    /// Also accept joints confirmed by sampling along the directions.
    pub extend: bool,
    /// Below this length a cluster counts as a short fragment.
    pub short_length: f64,
}

impl Default for RegularParams {
    fn default() -> Self {
        Self {
            length_cut: 60.0 * CM,
            extend: false,
            short_length: 20.0 * CM,
        }
    }
}

impl RegularParams {
    /// Parameters for `length_cut`, with or without extension.
    #[must_use]
    pub fn new(length_cut: f64, extend: bool) -> Self {
        Self {
            length_cut,
            extend,
            ..Self::default()
        }
    }

    /// Clusters shorter than this are not considered.
    #[must_use]
    pub fn min_length(&self) -> f64 {
        if self.extend {
            15.0 * CM
        } else {
            10.0 * CM
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Joint {
    Parallel,
    Prolonged,
    Regular,
}

/// `(max angle, max ad3)` at up to 3 cm, up to 15 cm and beyond.
type Tiers = [(f64, f64); 3];

impl Joint {
    fn tiers(self) -> Tiers {
        match self {
            Joint::Parallel => [(45.0, 60.0), (25.0, 35.0), (15.0, 25.0)],
            Joint::Prolonged => [(40.0, 50.0), (20.0, 30.0), (10.0, 20.0)],
            Joint::Regular => [(30.0, 45.0), (15.0, 25.0), (7.5, 15.0)],
        }
    }
}

fn tier(dis: f64) -> usize {
    if dis <= 3.0 * CM {
        0
    } else if dis <= 15.0 * CM {
        1
    } else {
        2
    }
}

/// Decides whether two clusters continue each other across a gap.
///
/// Symmetric in its arguments. The join is classified by the direction
/// between the averaged closest points; each class has its own angle
/// tiers, which tighten with distance. When one side is a short fragment
/// only the long side's direction is compared against the join.
#[must_use]
pub fn regular_accepts(
    c1: &Cluster<'_>,
    c2: &Cluster<'_>,
    params: &RegularParams,
    detector: &DetectorParams,
) -> bool {
    let (l1, l2) = (c1.length(), c2.length());
    let min_length = params.min_length();
    if l1 < min_length || l2 < min_length {
        return false;
    }
    let Some(approach) = c1.closest_point_pair(c2) else {
        return false;
    };
    let dis = approach.distance;
    let bridging =
        dis < 80.0 * CM && l1 + l2 > 50.0 * CM && l1 > 15.0 * CM && l2 > 15.0 * CM;
    if !(dis < params.length_cut || bridging) {
        return false;
    }

    let ave1 = c1.average_position(&approach.p1, 10.0 * CM);
    let ave2 = c2.average_position(&approach.p2, 10.0 * CM);
    let dir2 = ave2 - ave1;
    let dir1 = density_direction(c1, &ave1, true, 30.0 * CM, 50, 80.0 * CM);
    let dir3 = density_direction(c2, &ave2, true, 30.0 * CM, 50, 80.0 * CM);
    if degenerate(&[&dir1, &dir2, &dir3]) {
        return false;
    }

    let ad1 = 180.0 - angle(&dir1, &dir2);
    let ad2 = angle(&dir3, &dir2);
    let ad3 = 180.0 - angle(&dir1, &dir3);

    let dev2 = drift_deviation(&dir2, detector);
    let joint = if dev2 < 7.5 {
        Joint::Parallel
    } else if is_prolonged(&dir2, detector, 15.0) {
        Joint::Prolonged
    } else {
        Joint::Regular
    };
    let (max_angle, max_ad3) = joint.tiers()[tier(dis)];
    let (short1, short2) = (l1 < params.short_length, l2 < params.short_length);
    let accepted = match (short1, short2) {
        (false, true) => ad1 < max_angle && ad3 < max_ad3 + 15.0,
        (true, false) => ad2 < max_angle && ad3 < max_ad3 + 15.0,
        _ => ad1 < max_angle && ad2 < max_angle && ad3 < max_ad3,
    };
    if accepted {
        return true;
    }

    if dev2 > 7.5
        && is_angle_consistent(&dir1, &dir2, false, 10.0, detector, 2)
        && is_angle_consistent(&dir3, &dir2, true, 10.0, detector, 2)
    {
        return true;
    }

    if params.extend && dev2 > 7.5 {
        let ave_dis = dir2.norm();
        if angle(&dir2, &dir1) > 90.0 && spread_along(c2, &ave1, &dir1, ave_dis) > 2.5 * CM {
            return true;
        }
        if angle(&dir2, &dir3) < 90.0 && spread_along(c1, &ave2, &dir3, ave_dis) > 2.5 * CM {
            return true;
        }
    }
    false
}

/// Pass testing every unordered pair of clusters once.
#[derive(Debug, Clone, Default)]
pub struct RegularPass {
    /// Parameters.
    pub params: RegularParams,
}

impl RegularPass {
    /// Creates the pass.
    #[must_use]
    pub fn new(params: RegularParams) -> Self {
        Self { params }
    }
}

impl MergePass for RegularPass {
    fn name(&self) -> String {
        let mode = if self.params.extend { "extended" } else { "plain" };
        format!("regular-{mode}({:.1} cm)", self.params.length_cut / CM)
    }

    fn connect(
        &self,
        ctx: &PassContext<'_, '_>,
        state: &mut PassState,
        graph: &mut ConnectivityGraph,
    ) -> Result<()> {
        let min_length = self.params.min_length();
        for (i, c1) in ctx.clusters.iter().enumerate() {
            if c1.length() < min_length {
                continue;
            }
            for (j, c2) in ctx.clusters.iter().enumerate().skip(i + 1) {
                if c2.length() < min_length {
                    continue;
                }
                if regular_accepts(c1, c2, &self.params, ctx.detector) {
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
    use approx::assert_relative_eq;

    fn track(start: Point, dir: Vector, n: usize, first_slice: i64) -> Vec<(Point, i64)> {
        line_blobs(start, dir.normalize() * 10.0, n, first_slice)
    }

    #[test]
    fn test_min_length() {
        assert_relative_eq!(RegularParams::new(60.0 * CM, false).min_length(), 10.0 * CM);
        assert_relative_eq!(RegularParams::new(30.0 * CM, true).min_length(), 15.0 * CM);
    }

    #[test]
    fn test_collinear_tracks_merge_symmetrically() {
        let dir = Vector::new(1.0, 0.0, 1.0);
        let start2 = Point::from(dir.normalize() * 550.0);
        let tree = cluster_tree(&[
            track(Point::origin(), dir, 50, 0),
            track(start2, dir, 50, 50),
        ]);
        let cs = facades(&tree);
        let params = RegularParams::new(60.0 * CM, false);
        let det = DetectorParams::default();
        assert!(regular_accepts(&cs[0], &cs[1], &params, &det));
        assert!(regular_accepts(&cs[1], &cs[0], &params, &det));
    }

    #[test]
    fn test_crossing_tracks_rejected() {
        // Perpendicular tracks whose ends are 5 cm apart.
        let tree = cluster_tree(&[
            track(Point::origin(), Vector::new(1.0, 0.0, 0.0), 50, 0),
            track(Point::new(540.0, 0.0, 0.0), Vector::new(0.0, 0.0, 1.0), 50, 0),
        ]);
        let cs = facades(&tree);
        let params = RegularParams::new(60.0 * CM, false);
        let det = DetectorParams::default();
        let ab = regular_accepts(&cs[0], &cs[1], &params, &det);
        assert_eq!(ab, regular_accepts(&cs[1], &cs[0], &params, &det));
        assert!(!ab);
    }

    #[test]
    fn test_short_clusters_skipped() {
        let dir = Vector::new(1.0, 0.0, 1.0);
        let tree = cluster_tree(&[
            track(Point::origin(), dir, 10, 0),
            track(Point::from(dir.normalize() * 100.0), dir, 10, 10),
        ]);
        let cs = facades(&tree);
        assert!(cs[0].length() < 10.0 * CM);
        let params = RegularParams::new(60.0 * CM, false);
        assert!(!regular_accepts(&cs[0], &cs[1], &params, &DetectorParams::default()));
    }
}
