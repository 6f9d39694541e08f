//! One merge pass: evaluate a predicate family, then merge components.

use std::collections::{BTreeSet, HashSet};

use log::debug;

use blobclus_core::{DetectorParams, NodeId, Result};

use crate::facade::Cluster;
use crate::graph::ConnectivityGraph;
use crate::grouping::Grouping;

/// Read-only inputs of a pass.
#[derive(Debug, Clone, Copy)]
pub struct PassContext<'c, 't> {
    /// Live clusters in grouping order; graph vertices index into this.
    pub clusters: &'c [Cluster<'t>],
    /// Dead-region clusters.
    pub dead: &'c [Cluster<'t>],
    /// Detector constants.
    pub detector: &'c DetectorParams,
    /// Live clusters known to touch a dead region when the pass started.
    pub connected_dead: &'c HashSet<NodeId>,
}

impl PassContext<'_, '_> {
    /// Returns true if live cluster `i` touches a dead region.
    #[must_use]
    pub fn is_connected_dead(&self, i: usize) -> bool {
        self.connected_dead.contains(&self.clusters[i].node())
    }
}

/// Accumulators owned by a single pass.
#[derive(Debug, Default)]
pub struct PassState {
    /// Short clusters already absorbed in this pass; skipped as candidates.
    pub used: HashSet<usize>,
    /// Clusters that take part in at least one accepted pair.
    pub involved: BTreeSet<usize>,
    /// Live clusters found to touch a dead region during this pass.
    pub newly_connected_dead: Vec<NodeId>,
}

impl PassState {
    /// Records an accepted pair.
    pub fn accept(&mut self, graph: &mut ConnectivityGraph, a: usize, b: usize) {
        graph.add_edge(a, b);
        self.involved.insert(a);
        self.involved.insert(b);
    }
}

/// A predicate family together with its candidate loop.
pub trait MergePass {
    /// Label used in reports and logs.
    fn name(&self) -> String;

    /// Adds an edge for every accepted cluster pair.
    ///
    /// # Errors
    /// Implementations return an error only for malformed input.
    fn connect(
        &self,
        ctx: &PassContext<'_, '_>,
        state: &mut PassState,
        graph: &mut ConnectivityGraph,
    ) -> Result<()>;
}

/// Summary of one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PassReport {
    /// Pass label.
    pub name: String,
    /// Cluster count before the pass.
    pub clusters_before: usize,
    /// Cluster count after the pass.
    pub clusters_after: usize,
    /// Number of merged components.
    pub merged: usize,
}

/// Runs one pass over the grouping.
///
/// # Errors
/// Propagates malformed-tree errors; the grouping may then be partially
/// merged and should be discarded with the event.
pub fn run_pass(
    grouping: &mut Grouping,
    dead: &[Cluster<'_>],
    pass: &dyn MergePass,
) -> Result<PassReport> {
    let clusters_before = grouping.len();
    let mut state = PassState::default();
    let (mut graph, nodes) = {
        let clusters = grouping.clusters()?;
        let mut graph = ConnectivityGraph::new(clusters.len());
        let ctx = PassContext {
            clusters: &clusters,
            dead,
            detector: grouping.detector(),
            connected_dead: grouping.connected_dead(),
        };
        pass.connect(&ctx, &mut state, &mut graph)?;
        let nodes: Vec<NodeId> = clusters.iter().map(Cluster::node).collect();
        (graph, nodes)
    };

    for node in state.newly_connected_dead {
        grouping.mark_connected_dead(node);
    }
    let groups: Vec<Vec<NodeId>> = graph
        .merge_groups()
        .into_iter()
        .map(|g| g.into_iter().map(|v| nodes[v]).collect())
        .collect();
    let created = grouping.merge(&groups)?;

    let report = PassReport {
        name: pass.name(),
        clusters_before,
        clusters_after: grouping.len(),
        merged: created.len(),
    };
    debug!(
        "{}: {} -> {} clusters ({} edges, {} involved, {} merged)",
        report.name,
        report.clusters_before,
        report.clusters_after,
        graph.edge_count(),
        state.involved.len(),
        report.merged
    );
    Ok(report)
}
