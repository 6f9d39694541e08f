//! Serializable form of the live and dead trees of one event.

use serde::{Deserialize, Serialize};

use blobclus_core::{NodeId, PointClouds, PointTree};

use crate::Result;

/// Name of the samples cloud counted by [`TreeSummary::points`].
const SAMPLES_PC: &str = "3d";

/// One tree node with its local point clouds and its children, in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    #[serde(default)]
    pub point_clouds: PointClouds,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeRecord>,
}

impl NodeRecord {
    /// Copies the whole tree below its root.
    ///
    /// # Errors
    /// Fails only on a stale node handle inside the tree.
    pub fn from_tree(tree: &PointTree) -> Result<Self> {
        Self::from_node(tree, tree.root())
    }

    fn from_node(tree: &PointTree, id: NodeId) -> Result<Self> {
        let children = tree
            .children(id)?
            .iter()
            .map(|&child| Self::from_node(tree, child))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            point_clouds: tree.point_clouds(id)?.clone(),
            children,
        })
    }

    /// Rebuilds a tree, children in record order.
    ///
    /// # Errors
    /// Fails if a node can not be inserted.
    pub fn into_tree(self) -> Result<PointTree> {
        let mut tree = PointTree::with_root(self.point_clouds);
        let root = tree.root();
        let mut stack: Vec<(NodeId, NodeRecord)> = self
            .children
            .into_iter()
            .rev()
            .map(|child| (root, child))
            .collect();
        while let Some((parent, record)) = stack.pop() {
            let id = tree.insert_child(parent, record.point_clouds)?;
            stack.extend(record.children.into_iter().rev().map(|child| (id, child)));
        }
        Ok(tree)
    }

    /// Cluster, blob and sample counts, reading the root's children as
    /// clusters and their children as blobs.
    #[must_use]
    pub fn summary(&self) -> TreeSummary {
        let blobs = self.children.iter().flat_map(|c| &c.children);
        let (blob_count, points) = blobs.fold((0, 0), |(n, p), blob| {
            let samples = blob.point_clouds.get(SAMPLES_PC).map_or(0, |ds| ds.len());
            (n + 1, p + samples)
        });
        TreeSummary {
            clusters: self.children.len(),
            blobs: blob_count,
            points,
        }
    }
}

/// Counts of one tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TreeSummary {
    pub clusters: usize,
    pub blobs: usize,
    pub points: usize,
}

/// Output locations of an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Datapaths {
    pub live: String,
    pub dead: String,
}

impl Datapaths {
    /// Expands `pattern` for `ident` and appends `/live` and `/dead`.
    #[must_use]
    pub fn new(pattern: &str, ident: i64) -> Self {
        let base = format_datapath(pattern, ident);
        Self {
            live: format!("{base}/live"),
            dead: format!("{base}/dead"),
        }
    }
}

/// Live and dead trees of one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub ident: i64,
    pub live: NodeRecord,
    #[serde(default)]
    pub dead: NodeRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datapaths: Option<Datapaths>,
}

impl EventRecord {
    /// Snapshots both trees.
    ///
    /// # Errors
    /// Fails only on a stale node handle inside a tree.
    pub fn new(ident: i64, live: &PointTree, dead: &PointTree) -> Result<Self> {
        Ok(Self {
            ident,
            live: NodeRecord::from_tree(live)?,
            dead: NodeRecord::from_tree(dead)?,
            datapaths: None,
        })
    }

    /// Tags the record with its output locations.
    #[must_use]
    pub fn with_datapaths(mut self, datapaths: Datapaths) -> Self {
        self.datapaths = Some(datapaths);
        self
    }

    /// Rebuilds `(live, dead)`.
    ///
    /// # Errors
    /// Fails if a tree can not be rebuilt.
    pub fn into_trees(self) -> Result<(PointTree, PointTree)> {
        Ok((self.live.into_tree()?, self.dead.into_tree()?))
    }
}

/// Replaces every `%d` in `pattern` with the event ident.
#[must_use]
pub fn format_datapath(pattern: &str, ident: i64) -> String {
    pattern.replace("%d", &ident.to_string())
}
