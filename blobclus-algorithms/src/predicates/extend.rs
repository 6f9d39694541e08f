//! Extension passes: a long cluster reaches out from its ends.
//!
//! Unlike the other families these predicates are asymmetric. The first
//! cluster must be long and supplies the anchor and direction, the second
//! one is searched along that direction.

use std::fmt;

use blobclus_core::geom::{
    is_angle_consistent, is_parallel, is_prolonged, prolong_angle, Plane,
};
use blobclus_core::units::CM;
use blobclus_core::{DetectorParams, Point, Result, Vector};

use super::{angle, degenerate, density_direction, drift_deviation, spread_along};
use crate::facade::Cluster;
use crate::graph::ConnectivityGraph;
use crate::pass::{MergePass, PassContext, PassState};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Which end geometry the extension follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ExtendFlavor {
    /// From the earliest and latest drift points along a wire direction.
    Prolong,
    /// From the highest and lowest points, perpendicular to drift.
    Parallel,
    /// From the farther apart pair of extreme points.
    Regular,
    /// From clusters touching a dead region.
    Dead,
}

impl fmt::Display for ExtendFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExtendFlavor::Prolong => "prolong",
            ExtendFlavor::Parallel => "parallel",
            ExtendFlavor::Regular => "regular",
            ExtendFlavor::Dead => "dead",
        };
        f.write_str(name)
    }
}

/// Parameters of one extension pass.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ExtendParams {
    /// End geometry followed.
    pub flavor: ExtendFlavor,
    /// Largest gap bridged.
    pub length_cut: f64,
    /// Round number; raises the minimum length of the reaching cluster.
    pub num_try: u32,
    /// Dead flavor: shorter candidates are skipped.
    pub length_2_cut: f64,
    /// Dead flavor: number of anchor choices tried.
    pub num_dead_try: u32,
}

impl Default for ExtendParams {
    fn default() -> Self {
        Self::new(ExtendFlavor::Regular, 15.0 * CM)
    }
}

impl ExtendParams {
    /// Parameters with the default round and dead settings.
    #[must_use]
    pub fn new(flavor: ExtendFlavor, length_cut: f64) -> Self {
        Self {
            flavor,
            length_cut,
            num_try: 0,
            length_2_cut: 3.0 * CM,
            num_dead_try: 3,
        }
    }

    /// Sets `num_try`.
    #[must_use]
    pub fn with_num_try(mut self, num_try: u32) -> Self {
        self.num_try = num_try;
        self
    }

    /// Sets `length_2_cut`.
    #[must_use]
    pub fn with_length_2_cut(mut self, cut: f64) -> Self {
        self.length_2_cut = cut;
        self
    }

    /// Sets `num_dead_try`.
    #[must_use]
    pub fn with_num_dead_try(mut self, tries: u32) -> Self {
        self.num_dead_try = tries;
        self
    }

    /// Minimum length of the reaching cluster.
    #[must_use]
    pub fn length_1_cut(&self) -> f64 {
        let base = match self.flavor {
            ExtendFlavor::Prolong => 20.0 * CM,
            _ => 40.0 * CM,
        };
        base + f64::from(self.num_try) * 10.0 * CM
    }
}

/// Prolonged extension from `anchor` along the cluster direction `dir`.
///
/// `dir` is the fit at the anchor and points into the reaching cluster.
/// Accepts when the target's nearest point lies on the line within 6 cm
/// and the target runs along the same line, or is a short stub crossing
/// it at a clear angle.
#[must_use]
pub fn prolong_accepts(
    target: &Cluster<'_>,
    anchor: &Point,
    dir: &Vector,
    length_cut: f64,
) -> bool {
    let Some((p2, _)) = target.closest_point(anchor) else {
        return false;
    };
    let towards = p2 - anchor;
    let dis = towards.norm();
    if dis >= length_cut || degenerate(&[dir]) {
        return false;
    }
    if dis > 0.0 {
        let ad = 180.0 - angle(&towards, dir);
        if !(ad < 3.0 || ad > 177.0 || dis * ad.to_radians().sin() < 6.0 * CM) {
            return false;
        }
    }
    let dir2 = target.direction(&p2, 60.0 * CM);
    if degenerate(&[&dir2]) {
        return false;
    }
    let a = angle(&dir2, dir);
    (target.length() < 10.0 * CM && (a - 90.0).abs() > 30.0) || 180.0 - a < 5.0 || a < 5.0
}

/// Parallel extension from `anchor`: the target must show a track along
/// `dir` beyond the gap.
#[must_use]
pub fn parallel_accepts(
    target: &Cluster<'_>,
    anchor: &Point,
    dir: &Vector,
    length_cut: f64,
) -> bool {
    let Some((p2, _)) = target.closest_point(anchor) else {
        return false;
    };
    let dis = (p2 - anchor).norm();
    if dis >= length_cut || degenerate(&[dir]) {
        return false;
    }
    spread_along(target, anchor, dir, dis) > 2.5 * CM
}

/// Regular extension of `c1` from its extreme point `from` towards `c2`.
#[must_use]
pub fn regular_extension_accepts(
    c1: &Cluster<'_>,
    c2: &Cluster<'_>,
    from: &Point,
    length_cut: f64,
    detector: &DetectorParams,
) -> bool {
    let (l1, l2) = (c1.length(), c2.length());
    let Some((p2, _)) = c2.closest_point(from) else {
        return false;
    };
    let dis1 = (from - p2).norm();
    let Some((p1, _)) = c1.closest_point(&p2) else {
        return false;
    };
    let dis = (p1 - p2).norm();

    // Two long tracks crossing near one end.
    if dis1 > 15.0 * CM && dis < 3.0 * CM && l1 > 80.0 * CM && l2 > 80.0 * CM {
        return false;
    }

    if dis < length_cut && (l2 >= 40.0 * CM || dis < 3.0 * CM) {
        let ave1 = c1.average_position(&p1, 5.0 * CM);
        let ave2 = c2.average_position(&p2, 5.0 * CM);
        let dir1 = density_direction(c1, &ave1, l1 < 120.0 * CM, 30.0 * CM, 50, 80.0 * CM);
        let dir3 = density_direction(c2, &ave2, l2 < 120.0 * CM, 30.0 * CM, 50, 80.0 * CM);
        let dir2 = ave2 - ave1;
        let ave_dis = dir2.norm();
        if degenerate(&[&dir1, &dir2, &dir3]) {
            return false;
        }
        if angle(&dir2, &dir1) > 90.0 && spread_along(c2, &ave1, &dir1, ave_dis) > 2.5 * CM {
            return true;
        }
        if angle(&dir2, &dir3) < 90.0 && spread_along(c1, &ave2, &dir3, ave_dis) > 2.5 * CM {
            return true;
        }
    } else if dis < 2.0 * length_cut && l2 < 40.0 * CM {
        let dir2 = p2 - p1;
        if degenerate(&[&dir2]) {
            return false;
        }
        let para = drift_deviation(&dir2, detector) < 5.0;
        let prol = !para
            && [Plane::U, Plane::V]
                .iter()
                .any(|&plane| prolong_angle(&dir2, plane, detector).is_some_and(|a| a < 7.5));
        if !(para || prol) {
            return false;
        }
        let dir1 = density_direction(c1, &p1, prol, 15.0 * CM, 30, 60.0 * CM);
        let dir3 = density_direction(c2, &p2, prol, 15.0 * CM, 30, 60.0 * CM);
        if degenerate(&[&dir1, &dir3]) {
            return false;
        }
        let angle4 = 180.0 - angle(&dir1, &dir2);
        let angle5 = angle(&dir2, &dir3);
        if para
            && drift_deviation(&dir3, detector) < 10.0
            && drift_deviation(&dir1, detector) < 10.0
        {
            if angle4 < 30.0
                && ((l2 < 12.0 * CM && (angle5 - 90.0).abs() > 30.0) || angle5 < 45.0)
            {
                return true;
            }
        } else if prol
            && angle4 < 25.0
            && ((l2 < 15.0 * CM && (angle5 - 90.0).abs() > 30.0) || angle5 < 25.0)
        {
            return true;
        }

        if drift_deviation(&dir2, detector) > 7.5
            && is_angle_consistent(&dir1, &dir2, false, 10.0, detector, 2)
        {
            if l2 < 8.0 * CM && is_angle_consistent(&dir1, &dir2, false, 5.0, detector, 2) {
                return true;
            }
            if is_angle_consistent(&dir3, &dir2, true, 10.0, detector, 2) {
                return true;
            }
        }
    }
    false
}

/// One anchor choice of the dead-region bridge.
#[derive(Clone, Copy)]
struct Anchors {
    ave1: Point,
    ave2: Point,
    dir1: Vector,
    dir3: Vector,
}

/// Dead-region bridge from `c1`, a cluster touching a dead region, to `c2`.
///
/// Up to `num_dead_try` anchor choices are tried: the averaged closest
/// points, then the point of `c2` found walking from `c1` along its
/// direction, then the mirror walk from `c2`.
#[must_use]
pub fn dead_bridge_accepts(
    c1: &Cluster<'_>,
    c2: &Cluster<'_>,
    length_cut: f64,
    num_dead_try: u32,
    detector: &DetectorParams,
) -> bool {
    let l2 = c2.length();
    let Some(approach) = c1.closest_point_pair(c2) else {
        return false;
    };
    let dis = approach.distance;
    if !(dis < length_cut || (l2 > 50.0 * CM && dis < 80.0 * CM)) {
        return false;
    }

    let ave1 = c1.average_position(&approach.p1, 5.0 * CM);
    let ave2 = c2.average_position(&approach.p2, 5.0 * CM);
    let radius = if num_dead_try == 1 { 20.0 * CM } else { 80.0 * CM };
    let first = Anchors {
        ave1,
        ave2,
        dir1: c1.direction(&ave1, radius),
        dir3: c2.direction(&ave2, radius),
    };
    let walkable = l2 >= 15.0 * CM && !(l2 > 150.0 * CM && dis < 15.0 * CM);

    for attempt in 0..num_dead_try.min(3) {
        let anchors = match attempt {
            0 => first,
            1 if walkable => {
                let Some(back) = unit(&(-first.dir1)) else {
                    continue;
                };
                let (q, d) = c2.closest_point_along(
                    &first.ave1,
                    &back,
                    2.0 * dis,
                    5.0 * CM,
                    15.0,
                    10.0 * CM,
                );
                if d >= 100.0 * CM {
                    continue;
                }
                let ave2 = c2.average_position(&q, 5.0 * CM);
                Anchors {
                    ave2,
                    dir3: c2.direction(&ave2, 80.0 * CM),
                    ..first
                }
            }
            2 if walkable => {
                let Some(back) = unit(&(-first.dir3)) else {
                    continue;
                };
                let (q, d) = c1.closest_point_along(
                    &first.ave2,
                    &back,
                    2.0 * dis,
                    5.0 * CM,
                    15.0,
                    10.0 * CM,
                );
                if d >= 100.0 * CM {
                    continue;
                }
                let ave1 = c1.average_position(&q, 5.0 * CM);
                Anchors {
                    ave1,
                    dir1: c1.direction(&ave1, 80.0 * CM),
                    ..first
                }
            }
            _ => continue,
        };
        if dead_anchor_accepts(c1, c2, &anchors, attempt, dis, detector) {
            return true;
        }
    }
    false
}

fn dead_anchor_accepts(
    c1: &Cluster<'_>,
    c2: &Cluster<'_>,
    anchors: &Anchors,
    attempt: u32,
    dis: f64,
    detector: &DetectorParams,
) -> bool {
    let l2 = c2.length();
    let Anchors { ave1, ave2, dir1, dir3 } = anchors;
    let dir2 = ave2 - ave1 + Vector::repeat(1e-9);
    let ave_dir = ave1 - ave2;
    if degenerate(&[dir1, dir3]) {
        return false;
    }
    let ave_dev = drift_deviation(&ave_dir, detector);

    if ave_dev > 7.5 && is_angle_consistent(dir1, &dir2, false, 10.0, detector, 2) {
        if l2 < 8.0 * CM && is_angle_consistent(dir1, &dir2, false, 5.0, detector, 2) {
            return true;
        }
        if l2 < 15.0 * CM && is_angle_consistent(dir1, &dir2, false, 7.5, detector, 2) {
            return true;
        }
        if is_angle_consistent(dir3, &dir2, true, 10.0, detector, 2) {
            return true;
        }
    }

    let angle1 = 180.0 - angle(dir1, &dir2);
    let angle2 = angle(dir3, &dir2);
    let angle3 = 180.0 - angle(dir1, dir3);

    if l2 <= 10.0 * CM {
        return angle1 < 15.0 && (angle2 < 60.0 || l2 < 5.0 * CM);
    }
    if (angle1 < 15.0 && angle2 < 15.0 && angle3 < 25.0)
        || (angle3 < 10.0 && angle1 + angle2 < 45.0 && dis < 5.0 * CM)
    {
        return true;
    }

    let ave_dis = ave_dir.norm();
    if ave_dev > 7.5 && ave_dis < 30.0 * CM {
        let spread = match attempt {
            1 => spread_along(c2, ave1, dir1, ave_dis),
            2 => spread_along(c1, ave2, dir3, ave_dis),
            _ => 0.0,
        };
        if spread > 2.5 * CM {
            return true;
        }
    }
    false
}

fn unit(v: &Vector) -> Option<Vector> {
    let n = v.norm();
    (n > 0.0 && n.is_finite()).then(|| v / n)
}

/// Extension pass of one flavor.
#[derive(Debug, Clone, Default)]
pub struct ExtendPass {
    /// Parameters.
    pub params: ExtendParams,
}

impl ExtendPass {
    /// Creates the pass.
    #[must_use]
    pub fn new(params: ExtendParams) -> Self {
        Self { params }
    }

    fn prolong(
        &self,
        ctx: &PassContext<'_, '_>,
        state: &mut PassState,
        graph: &mut ConnectivityGraph,
        i: usize,
    ) {
        let c1 = &ctx.clusters[i];
        let Some((early, late)) = c1.earliest_latest_points() else {
            return;
        };
        for anchor in [early, late] {
            let dir = c1.direction(&anchor, 60.0 * CM);
            if !is_prolonged(&dir, ctx.detector, 5.0) {
                continue;
            }
            for (j, c2) in ctx.clusters.iter().enumerate() {
                if j == i || state.used.contains(&j) {
                    continue;
                }
                if prolong_accepts(c2, &anchor, &dir, self.params.length_cut) {
                    state.accept(graph, i, j);
                    if c2.length() < 10.0 * CM {
                        state.used.insert(j);
                    }
                }
            }
        }
    }

    fn parallel(
        &self,
        ctx: &PassContext<'_, '_>,
        state: &mut PassState,
        graph: &mut ConnectivityGraph,
        i: usize,
    ) {
        let c1 = &ctx.clusters[i];
        let Some((high, low)) = c1.highest_lowest_points() else {
            return;
        };
        // The high end absorbs short fragments; the low end only connects.
        for (anchor, high_end) in [(high, true), (low, false)] {
            let anchor = c1.average_position(&anchor, 5.0 * CM);
            let dir = c1.direction(&anchor, 100.0 * CM);
            if !is_parallel(&dir, ctx.detector, 5.0) {
                continue;
            }
            for (j, c2) in ctx.clusters.iter().enumerate() {
                if j == i || (high_end && state.used.contains(&j)) {
                    continue;
                }
                if parallel_accepts(c2, &anchor, &dir, self.params.length_cut) {
                    state.accept(graph, i, j);
                    if high_end && c2.length() < 15.0 * CM {
                        state.used.insert(j);
                    }
                }
            }
        }
    }

    fn regular(
        &self,
        ctx: &PassContext<'_, '_>,
        state: &mut PassState,
        graph: &mut ConnectivityGraph,
        i: usize,
    ) {
        let c1 = &ctx.clusters[i];
        let (Some(hl), Some(el)) = (c1.highest_lowest_points(), c1.earliest_latest_points())
        else {
            return;
        };
        let (first, second) = if (hl.0 - hl.1).norm_squared() > (el.0 - el.1).norm_squared() {
            hl
        } else {
            el
        };
        let cut = self.params.length_cut;
        for (j, c2) in ctx.clusters.iter().enumerate() {
            if j == i || state.used.contains(&j) {
                continue;
            }
            if regular_extension_accepts(c1, c2, &first, cut, ctx.detector)
                || regular_extension_accepts(c1, c2, &second, cut, ctx.detector)
            {
                state.accept(graph, i, j);
                if c2.length() < 10.0 * CM {
                    state.used.insert(j);
                }
            }
        }
    }

    fn dead(
        &self,
        ctx: &PassContext<'_, '_>,
        state: &mut PassState,
        graph: &mut ConnectivityGraph,
        i: usize,
    ) {
        if !ctx.is_connected_dead(i) {
            return;
        }
        state.used.insert(i);
        let c1 = &ctx.clusters[i];
        for (j, c2) in ctx.clusters.iter().enumerate() {
            if c2.length() < self.params.length_2_cut || state.used.contains(&j) {
                continue;
            }
            let (cut, tries) = (self.params.length_cut, self.params.num_dead_try);
            if dead_bridge_accepts(c1, c2, cut, tries, ctx.detector) {
                state.accept(graph, i, j);
                if c2.length() < 10.0 * CM {
                    state.used.insert(j);
                }
            }
        }
    }
}

impl MergePass for ExtendPass {
    fn name(&self) -> String {
        format!(
            "extend-{}({:.1} cm, try {})",
            self.params.flavor,
            self.params.length_cut / CM,
            self.params.num_try
        )
    }

    fn connect(
        &self,
        ctx: &PassContext<'_, '_>,
        state: &mut PassState,
        graph: &mut ConnectivityGraph,
    ) -> Result<()> {
        let length_1_cut = self.params.length_1_cut();
        for i in 0..ctx.clusters.len() {
            if ctx.clusters[i].length() <= length_1_cut {
                continue;
            }
            match self.params.flavor {
                ExtendFlavor::Prolong => self.prolong(ctx, state, graph, i),
                ExtendFlavor::Parallel => self.parallel(ctx, state, graph, i),
                ExtendFlavor::Regular => self.regular(ctx, state, graph, i),
                ExtendFlavor::Dead => self.dead(ctx, state, graph, i),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{cluster_tree, facades, line_blobs};
    use blobclus_core::{NodeId, PointTree};
    use std::collections::HashSet;
    use approx::assert_relative_eq;

    fn connect(
        pass: &ExtendPass,
        cs: &[Cluster<'_>],
        connected: &HashSet<NodeId>,
    ) -> Vec<Vec<usize>> {
        let det = DetectorParams::default();
        let ctx = PassContext {
            clusters: cs,
            dead: &[],
            detector: &det,
            connected_dead: connected,
        };
        let mut state = PassState::default();
        let mut graph = ConnectivityGraph::new(cs.len());
        pass.connect(&ctx, &mut state, &mut graph).unwrap();
        graph.merge_groups()
    }

    /// Two 39 cm tracks in the drift/W-wire plane, `gap` apart.
    fn prolonged_pair(gap: f64) -> PointTree {
        let dir = Vector::new(1.0, 1.0, 0.0).normalize();
        cluster_tree(&[
            line_blobs(Point::origin(), dir * 10.0, 40, 0),
            line_blobs(Point::from(dir * (390.0 + gap)), dir * 10.0, 40, 40),
        ])
    }

    #[test]
    fn test_length_1_cut() {
        let p = ExtendParams::new(ExtendFlavor::Prolong, 150.0 * CM).with_num_try(2);
        assert_relative_eq!(p.length_1_cut(), 40.0 * CM);
        let p = ExtendParams::new(ExtendFlavor::Dead, 60.0 * CM);
        assert_relative_eq!(p.length_1_cut(), 40.0 * CM);
    }

    #[test]
    fn test_prolong_merges_close_track() {
        let tree = prolonged_pair(20.0);
        let cs = facades(&tree);
        assert!(cs[0].length() > 20.0 * CM);
        let pass = ExtendPass::new(ExtendParams::new(ExtendFlavor::Prolong, 150.0 * CM));
        assert_eq!(connect(&pass, &cs, &HashSet::new()), vec![vec![0, 1]]);
    }

    #[test]
    fn test_prolong_respects_cut() {
        let tree = prolonged_pair(2000.0);
        let cs = facades(&tree);
        let pass = ExtendPass::new(ExtendParams::new(ExtendFlavor::Prolong, 60.0 * CM));
        assert!(connect(&pass, &cs, &HashSet::new()).is_empty());
    }

    #[test]
    fn test_prolong_rejects_offset_track() {
        // Same direction but shifted 20 cm sideways.
        let dir = Vector::new(1.0, 1.0, 0.0).normalize();
        let tree = cluster_tree(&[
            line_blobs(Point::origin(), dir * 10.0, 40, 0),
            line_blobs(
                Point::from(dir * 410.0) + Vector::new(0.0, 0.0, 200.0),
                dir * 10.0,
                40,
                40,
            ),
        ]);
        let cs = facades(&tree);
        let (early, _) = cs[0].earliest_latest_points().unwrap();
        let fit = cs[0].direction(&early, 60.0 * CM);
        assert!(!prolong_accepts(&cs[1], &early, &fit, 150.0 * CM));
    }

    #[test]
    fn test_dead_flavor_requires_connected_dead() {
        let tree = prolonged_pair(20.0);
        let cs = facades(&tree);
        let pass = ExtendPass::new(ExtendParams::new(ExtendFlavor::Dead, 60.0 * CM));
        // 40 blobs give about 21 cm, below the 40 cm minimum either way.
        assert!(connect(&pass, &cs, &HashSet::new()).is_empty());
    }

    #[test]
    fn test_dead_bridge_collinear() {
        let dir = Vector::new(1.0, 1.0, 0.0).normalize();
        let tree = cluster_tree(&[
            line_blobs(Point::origin(), dir * 10.0, 90, 0),
            line_blobs(Point::from(dir * 1000.0), dir * 10.0, 90, 90),
        ]);
        let cs = facades(&tree);
        assert!(cs[0].length() > 40.0 * CM);
        let det = DetectorParams::default();
        assert!(dead_bridge_accepts(&cs[0], &cs[1], 60.0 * CM, 3, &det));

        let connected: HashSet<_> = [cs[0].node()].into_iter().collect();
        let pass = ExtendPass::new(ExtendParams::new(ExtendFlavor::Dead, 60.0 * CM));
        assert_eq!(connect(&pass, &cs, &connected), vec![vec![0, 1]]);
    }

    /// Two 100-blob tracks along `dir`, `gap` apart end to end, the second
    /// shifted by `offset`.
    fn track_pair(dir: Vector, gap: f64, offset: Vector) -> PointTree {
        let dir = dir.normalize();
        cluster_tree(&[
            line_blobs(Point::origin(), dir * 10.0, 100, 0),
            line_blobs(Point::from(dir * (990.0 + gap)) + offset, dir * 10.0, 100, 100),
        ])
    }

    #[test]
    fn test_parallel_extension_follows_track() {
        // Perpendicular to drift, 5 cm apart.
        let tree = track_pair(Vector::new(0.0, 1.0, 0.0), 50.0, Vector::zeros());
        let cs = facades(&tree);
        let params = ExtendParams::new(ExtendFlavor::Parallel, 30.0 * CM);
        assert!(cs[0].length() > params.length_1_cut());

        let (high, _) = cs[0].highest_lowest_points().unwrap();
        let anchor = cs[0].average_position(&high, 5.0 * CM);
        let dir = cs[0].direction(&anchor, 100.0 * CM);
        assert!(is_parallel(&dir, &DetectorParams::default(), 5.0));
        assert!(parallel_accepts(&cs[1], &anchor, &dir, 30.0 * CM));
        assert!(!parallel_accepts(&cs[1], &anchor, &dir, 5.0 * CM));

        let pass = ExtendPass::new(params);
        assert_eq!(connect(&pass, &cs, &HashSet::new()), vec![vec![0, 1]]);
    }

    #[test]
    fn test_parallel_extension_rejects_side_by_side() {
        // Same line but 10 cm off along z: nothing to sample beyond the gap.
        let tree = track_pair(Vector::new(0.0, 1.0, 0.0), 50.0, Vector::new(0.0, 0.0, 100.0));
        let cs = facades(&tree);
        let pass = ExtendPass::new(ExtendParams::new(ExtendFlavor::Parallel, 30.0 * CM));
        assert!(connect(&pass, &cs, &HashSet::new()).is_empty());
    }

    #[test]
    fn test_regular_extension_follows_track() {
        let dir = Vector::new(1.0, 1.0, 1.0);
        let tree = track_pair(dir, 50.0, Vector::zeros());
        let cs = facades(&tree);
        let params = ExtendParams::new(ExtendFlavor::Regular, 30.0 * CM);
        assert!(cs[0].length() > params.length_1_cut());

        let (_, late) = cs[0].earliest_latest_points().unwrap();
        let (early, _) = cs[1].earliest_latest_points().unwrap();
        let det = DetectorParams::default();
        assert!(regular_extension_accepts(&cs[0], &cs[1], &late, 30.0 * CM, &det));
        assert!(regular_extension_accepts(&cs[1], &cs[0], &early, 30.0 * CM, &det));
        assert!(!regular_extension_accepts(&cs[0], &cs[1], &late, 3.0 * CM, &det));

        let pass = ExtendPass::new(params);
        assert_eq!(connect(&pass, &cs, &HashSet::new()), vec![vec![0, 1]]);
    }

    #[test]
    fn test_regular_extension_rejects_offset_and_short() {
        let dir = Vector::new(1.0, 1.0, 1.0);
        let pass = ExtendPass::new(ExtendParams::new(ExtendFlavor::Regular, 30.0 * CM));

        // Parallel tracks 10 cm apart sideways.
        let side = Vector::new(1.0, -1.0, 0.0).normalize() * 100.0;
        let tree = track_pair(dir, 50.0, side);
        let cs = facades(&tree);
        assert!(connect(&pass, &cs, &HashSet::new()).is_empty());

        // 60 blobs measure about 32 cm, under the 40 cm minimum.
        let dir = dir.normalize();
        let tree = cluster_tree(&[
            line_blobs(Point::origin(), dir * 10.0, 60, 0),
            line_blobs(Point::from(dir * 640.0), dir * 10.0, 60, 60),
        ]);
        let cs = facades(&tree);
        assert!(cs[0].length() < 40.0 * CM);
        assert!(connect(&pass, &cs, &HashSet::new()).is_empty());
    }

    #[test]
    fn test_name_mentions_flavor() {
        let pass = ExtendPass::new(ExtendParams::new(ExtendFlavor::Parallel, 30.0 * CM));
        assert!(pass.name().starts_with("extend-parallel"));
    }
}
