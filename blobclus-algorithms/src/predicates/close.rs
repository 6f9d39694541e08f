//! Merging of clusters that practically touch.

use blobclus_core::units::CM;
use blobclus_core::Result;

use crate::facade::Cluster;
use crate::graph::ConnectivityGraph;
use crate::pass::{MergePass, PassContext, PassState};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Parameters of the close-distance pass.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CloseParams {
    /// Largest gap bridged.
    pub length_cut: f64,
    /// Clusters below this length are absorbed at most once.
    pub used_length: f64,
}

impl Default for CloseParams {
    fn default() -> Self {
        Self {
            length_cut: 1.2 * CM,
            used_length: 5.0 * CM,
        }
    }
}

impl CloseParams {
    /// Sets `length_cut`.
    #[must_use]
    pub fn with_length_cut(mut self, cut: f64) -> Self {
        self.length_cut = cut;
        self
    }
}

/// Accepts two clusters whose closest points nearly touch.
///
/// Nothing at or beyond the cut merges. Below it, under 0.5 cm any pair
/// merges and under 1 cm two short pairs merge. Otherwise the shorter cluster must have a good share of its points near
/// the contact, so a track merely grazing another one is left alone.
/// Symmetric in its arguments.
#[must_use]
pub fn close_accepts(c1: &Cluster<'_>, c2: &Cluster<'_>, params: &CloseParams) -> bool {
    let Some(approach) = c1.closest_point_pair(c2) else {
        return false;
    };
    let dis = approach.distance;
    if dis >= params.length_cut {
        return false;
    }
    let (l1, l2) = (c1.length(), c2.length());
    if dis < 0.5 * CM {
        return true;
    }
    let short = 12.0 * CM;
    if l1 < short && l2 < short {
        return dis < 1.0 * CM;
    }

    let (shorter, contact) = if (l1, c1.node()) < (l2, c2.node()) {
        (c1, approach.p1)
    } else {
        (c2, approach.p2)
    };
    let total = shorter.npoints();
    if total == 0 {
        return false;
    }
    #[allow(clippy::cast_precision_loss)]
    let fraction = shorter.point_count(&contact, 10.0 * CM) as f64 / total as f64;
    let required = if l1 > 25.0 * CM && l2 > 25.0 * CM { 0.25 } else { 0.5 };
    fraction > required
}

/// Pass testing every unordered pair once.
#[derive(Debug, Clone, Default)]
pub struct ClosePass {
    /// Parameters.
    pub params: CloseParams,
}

impl ClosePass {
    /// Creates the pass.
    #[must_use]
    pub fn new(params: CloseParams) -> Self {
        Self { params }
    }
}

impl MergePass for ClosePass {
    fn name(&self) -> String {
        format!("close({:.1} cm)", self.params.length_cut / CM)
    }

    fn connect(
        &self,
        ctx: &PassContext<'_, '_>,
        state: &mut PassState,
        graph: &mut ConnectivityGraph,
    ) -> Result<()> {
        for (i, c1) in ctx.clusters.iter().enumerate() {
            if state.used.contains(&i) {
                continue;
            }
            for (j, c2) in ctx.clusters.iter().enumerate().skip(i + 1) {
                if state.used.contains(&j) || !close_accepts(c1, c2, &self.params) {
                    continue;
                }
                state.accept(graph, i, j);
                for (k, c) in [(i, c1), (j, c2)] {
                    if c.length() < self.params.used_length {
                        state.used.insert(k);
                    }
                }
                if state.used.contains(&i) {
                    break;
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
    fn test_touching_pair() {
        let step = Vector::new(0.0, 10.0, 0.0);
        let tree = cluster_tree(&[
            line_blobs(Point::origin(), step, 5, 0),
            line_blobs(Point::new(4.0, 40.0, 0.0), step, 5, 0),
        ]);
        let cs = facades(&tree);
        let params = CloseParams::default();
        assert!(close_accepts(&cs[0], &cs[1], &params));
        assert!(close_accepts(&cs[1], &cs[0], &params));
    }

    #[test]
    fn test_short_pair_needs_one_cm() {
        let step = Vector::new(0.0, 10.0, 0.0);
        let tree = cluster_tree(&[
            line_blobs(Point::origin(), step, 5, 0),
            line_blobs(Point::new(0.0, 48.0, 0.0), step, 5, 0),
            line_blobs(Point::new(0.0, 99.0, 0.0), step, 5, 0),
        ]);
        let cs = facades(&tree);
        let params = CloseParams::default();
        // 1.1 cm apart: short clusters need less than 1 cm.
        assert!(!close_accepts(&cs[1], &cs[2], &params));
        assert!(close_accepts(&cs[0], &cs[1], &params));
    }

    #[test]
    fn test_cut_below_shortcuts_rejects() {
        let step = Vector::new(0.0, 10.0, 0.0);
        let tree = cluster_tree(&[
            line_blobs(Point::origin(), step, 5, 0),
            line_blobs(Point::new(0.0, 48.0, 0.0), step, 5, 0),
            line_blobs(Point::new(0.0, 92.0, 0.0), step, 5, 0),
        ]);
        let cs = facades(&tree);
        let default = CloseParams::default();
        // 8 mm and 4 mm gaps between short clusters.
        assert!(close_accepts(&cs[0], &cs[1], &default));
        assert!(close_accepts(&cs[1], &cs[2], &default));

        let tight = CloseParams::default().with_length_cut(0.3 * CM);
        assert!(!close_accepts(&cs[0], &cs[1], &tight));
        assert!(!close_accepts(&cs[1], &cs[0], &tight));
        assert!(!close_accepts(&cs[1], &cs[2], &tight));
    }

    #[test]
    fn test_used_short_fragment_absorbed_once() {
        let step = Vector::new(0.0, 10.0, 0.0);
        let tree = cluster_tree(&[
            line_blobs(Point::new(0.0, 0.0, 3.0), step, 1, 0),
            line_blobs(Point::origin(), step, 1, 0),
            line_blobs(Point::new(0.0, 0.0, -3.0), step, 1, 0),
        ]);
        let cs = facades(&tree);
        let det = blobclus_core::DetectorParams::default();
        let connected = std::collections::HashSet::new();
        let ctx = PassContext {
            clusters: &cs,
            dead: &[],
            detector: &det,
            connected_dead: &connected,
        };
        let mut state = PassState::default();
        let mut graph = ConnectivityGraph::new(cs.len());
        ClosePass::default().connect(&ctx, &mut state, &mut graph).unwrap();
        // 0 takes 1, then 0 is used itself and 1-2 is never tested.
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.merge_groups(), vec![vec![0, 1]]);
    }
}
