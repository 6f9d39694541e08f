//! The set of live clusters of one event.

use std::collections::{HashMap, HashSet};

use log::{debug, warn};

use blobclus_core::{DetectorParams, NodeId, PointClouds, PointTree, Result};

use crate::facade::Cluster;

/// Top-level clusters of the live tree plus the bookkeeping the passes share.
///
/// Every child of the tree root is one cluster. The grouping caches each
/// cluster's length and remembers which clusters touch a dead region; both
/// are kept in step with the tree by [`Grouping::merge`].
#[derive(Debug)]
pub struct Grouping {
    tree: PointTree,
    detector: DetectorParams,
    lengths: HashMap<NodeId, f64>,
    connected_dead: HashSet<NodeId>,
}

impl Grouping {
    /// Takes ownership of a live tree and measures every cluster.
    ///
    /// # Errors
    /// Fails if a cluster subtree is malformed.
    pub fn new(tree: PointTree, detector: DetectorParams) -> Result<Self> {
        let mut grouping = Self {
            tree,
            detector,
            lengths: HashMap::new(),
            connected_dead: HashSet::new(),
        };
        for node in grouping.cluster_nodes() {
            let length = grouping.measure(node)?;
            grouping.lengths.insert(node, length);
        }
        Ok(grouping)
    }

    fn measure(&self, node: NodeId) -> Result<f64> {
        let cluster = Cluster::new(&self.tree, node)?;
        if cluster.blobs().is_empty() {
            warn!("cluster {node} holds no blobs");
        }
        Ok(cluster.measure_length(&self.detector))
    }

    /// The live tree.
    #[must_use]
    pub fn tree(&self) -> &PointTree {
        &self.tree
    }

    /// Releases the live tree.
    #[must_use]
    pub fn into_tree(self) -> PointTree {
        self.tree
    }

    /// Detector constants used for lengths and direction tests.
    #[must_use]
    pub fn detector(&self) -> &DetectorParams {
        &self.detector
    }

    /// Cluster nodes in tree order.
    #[must_use]
    pub fn cluster_nodes(&self) -> Vec<NodeId> {
        self.tree
            .children(self.tree.root())
            .map(<[NodeId]>::to_vec)
            .unwrap_or_default()
    }

    /// Number of clusters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree
            .children(self.tree.root())
            .map_or(0, <[NodeId]>::len)
    }

    /// Returns true if there are no clusters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached length of a cluster, 0 for unknown nodes.
    #[must_use]
    pub fn length(&self, node: NodeId) -> f64 {
        self.lengths.get(&node).copied().unwrap_or(0.0)
    }

    /// Returns true if the cluster is known to touch a dead region.
    #[must_use]
    pub fn is_connected_dead(&self, node: NodeId) -> bool {
        self.connected_dead.contains(&node)
    }

    /// Clusters known to touch a dead region.
    #[must_use]
    pub fn connected_dead(&self) -> &HashSet<NodeId> {
        &self.connected_dead
    }

    /// Records that a cluster touches a dead region.
    pub fn mark_connected_dead(&mut self, node: NodeId) {
        if self.lengths.contains_key(&node) {
            self.connected_dead.insert(node);
        }
    }

    /// Facades over all clusters, in tree order, with cached lengths.
    ///
    /// # Errors
    /// Fails if a cluster subtree is malformed.
    pub fn clusters(&self) -> Result<Vec<Cluster<'_>>> {
        self.cluster_nodes()
            .into_iter()
            .map(|node| Ok(Cluster::new(&self.tree, node)?.with_length(self.length(node))))
            .collect()
    }

    /// Replaces each group of clusters by one new cluster.
    ///
    /// The blobs of all members move, in member order, under a new cluster
    /// node appended to the root; the members are then removed. The new
    /// cluster is measured and inherits the dead-region flag of any member.
    /// Groups of fewer than two clusters are ignored. Returns the new nodes.
    ///
    /// # Errors
    /// Fails on stale member handles or if the merged cluster can not be
    /// measured.
    pub fn merge(&mut self, groups: &[Vec<NodeId>]) -> Result<Vec<NodeId>> {
        let root = self.tree.root();
        let mut created = Vec::new();
        for group in groups.iter().filter(|g| g.len() > 1) {
            let merged = self.tree.insert_child(root, PointClouds::new())?;
            let mut dead = false;
            for &member in group {
                let blobs = self.tree.children(member)?.to_vec();
                for blob in blobs {
                    self.tree.reparent(blob, merged)?;
                }
                self.tree.remove(member)?;
                self.lengths.remove(&member);
                dead |= self.connected_dead.remove(&member);
            }
            let length = self.measure(merged)?;
            self.lengths.insert(merged, length);
            if dead {
                self.connected_dead.insert(merged);
            }
            debug!("merged {} clusters into {merged} ({length:.1} mm)", group.len());
            created.push(merged);
        }
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{cluster_tree, line_blobs};
    use blobclus_core::{Point, Vector};

    fn three_clusters() -> PointTree {
        cluster_tree(&[
            line_blobs(Point::origin(), Vector::new(0.0, 0.0, 10.0), 3, 0),
            line_blobs(Point::new(0.0, 100.0, 0.0), Vector::new(0.0, 0.0, 10.0), 2, 0),
            line_blobs(Point::new(0.0, 200.0, 0.0), Vector::new(0.0, 0.0, 10.0), 4, 0),
        ])
    }

    #[test]
    fn test_lengths_cached_on_construction() {
        let grouping = Grouping::new(three_clusters(), DetectorParams::default()).unwrap();
        assert_eq!(grouping.len(), 3);
        for cluster in grouping.clusters().unwrap() {
            assert!(cluster.length() > 0.0);
            assert_eq!(cluster.length(), grouping.length(cluster.node()));
        }
    }

    #[test]
    fn test_merge_moves_blobs_and_flags() {
        let mut grouping = Grouping::new(three_clusters(), DetectorParams::default()).unwrap();
        let nodes = grouping.cluster_nodes();
        let blobs_before: usize = grouping.clusters().unwrap().iter().map(|c| c.blobs().len()).sum();
        grouping.mark_connected_dead(nodes[1]);

        let created = grouping.merge(&[vec![nodes[0], nodes[1]], vec![nodes[2]]]).unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(grouping.len(), 2);
        assert_eq!(grouping.cluster_nodes(), vec![nodes[2], created[0]]);
        assert!(grouping.is_connected_dead(created[0]));
        assert!(!grouping.is_connected_dead(nodes[1]));
        assert_eq!(grouping.length(nodes[0]), 0.0);

        let clusters = grouping.clusters().unwrap();
        let blobs_after: usize = clusters.iter().map(|c| c.blobs().len()).sum();
        assert_eq!(blobs_before, blobs_after);
        assert_eq!(clusters[1].blobs().len(), 5);
        assert_eq!(clusters[1].npoints(), 5);
        assert!(grouping.length(created[0]) > 0.0);
    }
}
