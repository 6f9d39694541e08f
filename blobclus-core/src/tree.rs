//! Hierarchical point store.
//!
//! A [`PointTree`] is an arena of nodes. Each node owns zero or more named
//! point clouds and an ordered list of children. Nodes are addressed by
//! [`NodeId`] handles that carry a generation counter, so a handle to a
//! removed node is detected instead of silently aliasing a reused slot.
//!
//! Every node caches [`ScopedView`]s keyed by [`Scope`]. A view is the union
//! of one named point cloud over the nodes reached by a depth-bounded
//! pre-order descent, with a k-d index over the scope's coordinate columns.
//! Inserting a node extends the cached views that reach it in place;
//! removing or moving a node drops every cached view that reached it, and the
//! next access rebuilds from scratch.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use log::{trace, warn};

use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::kd::{KdIndex, Neighbor};

/// The named point clouds local to one node.
pub type PointClouds = BTreeMap<String, Dataset>;

/// Generation-checked handle to a tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    /// Arena slot of the node.
    #[must_use]
    pub fn index(self) -> usize {
        self.index as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// Key of one cached spatial index.
///
/// `depth` bounds the descent: 0 is unbounded, 1 is the node alone and `n`
/// reaches `n - 1` levels below the node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scope {
    pub pcname: String,
    pub coords: Vec<String>,
    pub depth: usize,
}

impl Scope {
    pub fn new<S: Into<String>>(
        pcname: impl Into<String>,
        coords: impl IntoIterator<Item = S>,
        depth: usize,
    ) -> Self {
        Self {
            pcname: pcname.into(),
            coords: coords.into_iter().map(Into::into).collect(),
            depth,
        }
    }

    /// The scope used for clustering: all `"3d"` samples below a node.
    #[must_use]
    pub fn samples_3d() -> Self {
        Self::new("3d", ["x", "y", "z"], 0)
    }

    /// Returns true if a node `level` levels below the scope's node is
    /// reached by the descent.
    #[must_use]
    pub fn reaches(&self, level: usize) -> bool {
        self.depth == 0 || level < self.depth
    }
}

/// Cached union of one point cloud over a subtree, with a k-d index.
#[derive(Debug, Clone)]
pub struct ScopedView {
    scope: Scope,
    nodes: Vec<NodeId>,
    /// Index of the first point of each contributing node.
    offsets: Vec<usize>,
    index: KdIndex,
}

impl ScopedView {
    fn empty(scope: Scope) -> Self {
        let dim = scope.coords.len();
        Self {
            scope,
            nodes: Vec::new(),
            offsets: Vec::new(),
            index: KdIndex::new(dim),
        }
    }

    fn append(&mut self, node: NodeId, pcs: &PointClouds) -> Result<()> {
        let Some(ds) = pcs.get(&self.scope.pcname) else {
            return Ok(());
        };
        let mut columns = Vec::with_capacity(self.scope.coords.len());
        for name in &self.scope.coords {
            let column = ds.floats(name).map_err(|err| match err {
                Error::MissingColumn { column, .. } => Error::MissingColumn {
                    pcname: self.scope.pcname.clone(),
                    column,
                },
                other => other,
            })?;
            columns.push(column);
        }
        self.offsets.push(self.index.len());
        self.nodes.push(node);
        self.index.append_columns(&columns);
        Ok(())
    }

    #[must_use]
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Contributing nodes, in the order their points were added.
    #[must_use]
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Total number of points.
    #[must_use]
    pub fn npoints(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Coordinates of point `i`.
    ///
    /// # Panics
    /// Panics if `i` is out of range.
    #[must_use]
    pub fn point(&self, i: usize) -> &[f64] {
        self.index.point(i)
    }

    /// Position in [`nodes`](Self::nodes) of the node that contributed point `i`.
    #[must_use]
    pub fn node_position(&self, i: usize) -> Option<usize> {
        if i >= self.npoints() {
            return None;
        }
        self.offsets
            .partition_point(|&start| start <= i)
            .checked_sub(1)
    }

    /// Node that contributed point `i`.
    #[must_use]
    pub fn node_of(&self, i: usize) -> Option<NodeId> {
        self.node_position(i).map(|k| self.nodes[k])
    }

    /// Point index range contributed by the `k`-th node.
    #[must_use]
    pub fn node_range(&self, k: usize) -> std::ops::Range<usize> {
        let start = self.offsets[k];
        let end = self.offsets.get(k + 1).copied().unwrap_or(self.npoints());
        start..end
    }

    #[must_use]
    pub fn kd(&self) -> &KdIndex {
        &self.index
    }

    #[must_use]
    pub fn nearest(&self, query: &[f64]) -> Option<Neighbor> {
        self.index.nearest(query)
    }

    #[must_use]
    pub fn knn(&self, query: &[f64], k: usize) -> Vec<Neighbor> {
        self.index.knn(query, k)
    }

    #[must_use]
    pub fn radius(&self, query: &[f64], radius: f64) -> Vec<Neighbor> {
        self.index.radius(query, radius)
    }
}

#[derive(Debug, Default)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    point_clouds: PointClouds,
    views: RefCell<HashMap<Scope, Arc<ScopedView>>>,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Arena-backed n-ary tree of point clouds.
#[derive(Debug)]
pub struct PointTree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: NodeId,
}

impl Default for PointTree {
    fn default() -> Self {
        Self::new()
    }
}

impl PointTree {
    /// Creates a tree holding only an empty root.
    #[must_use]
    pub fn new() -> Self {
        Self::with_root(PointClouds::new())
    }

    /// Creates a tree whose root carries the given point clouds.
    #[must_use]
    pub fn with_root(point_clouds: PointClouds) -> Self {
        let root = Node {
            point_clouds,
            ..Node::default()
        };
        Self {
            slots: vec![Slot {
                generation: 0,
                node: Some(root),
            }],
            free: Vec::new(),
            root: NodeId {
                index: 0,
                generation: 0,
            },
        }
    }

    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of live nodes, root included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// A tree always holds its root.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Returns true if the handle refers to a live node.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_ok()
    }

    fn node(&self, id: NodeId) -> Result<&Node> {
        self.slots
            .get(id.index())
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
            .ok_or_else(|| Error::StaleNode(id.to_string()))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
            .ok_or_else(|| Error::StaleNode(id.to_string()))
    }

    /// Parent of a node, `None` for the root.
    ///
    /// # Errors
    /// Returns [`Error::StaleNode`] for a removed node.
    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>> {
        Ok(self.node(id)?.parent)
    }

    /// Children of a node in insertion order.
    ///
    /// # Errors
    /// Returns [`Error::StaleNode`] for a removed node.
    pub fn children(&self, id: NodeId) -> Result<&[NodeId]> {
        Ok(&self.node(id)?.children)
    }

    /// Point clouds local to a node.
    ///
    /// # Errors
    /// Returns [`Error::StaleNode`] for a removed node.
    pub fn point_clouds(&self, id: NodeId) -> Result<&PointClouds> {
        Ok(&self.node(id)?.point_clouds)
    }

    /// One named point cloud local to a node.
    ///
    /// # Errors
    /// Returns [`Error::MissingPointCloud`] if the node has no such cloud.
    pub fn point_cloud(&self, id: NodeId, name: &str) -> Result<&Dataset> {
        self.node(id)?
            .point_clouds
            .get(name)
            .ok_or_else(|| Error::MissingPointCloud(name.to_string()))
    }

    /// All nodes of the subtree rooted at `id`, in pre-order.
    ///
    /// # Errors
    /// Returns [`Error::StaleNode`] for a removed node.
    pub fn descendants(&self, id: NodeId) -> Result<Vec<NodeId>> {
        self.descend(id, 0)
    }

    /// Pre-order descent limited by a scope depth (0 = unbounded).
    fn descend(&self, id: NodeId, depth: usize) -> Result<Vec<NodeId>> {
        let mut out = Vec::new();
        let mut stack = vec![(id, 0_usize)];
        while let Some((cur, level)) = stack.pop() {
            let node = self.node(cur)?;
            out.push(cur);
            if depth == 0 || level + 1 < depth {
                for &child in node.children.iter().rev() {
                    stack.push((child, level + 1));
                }
            }
        }
        Ok(out)
    }

    /// Ancestors of `id` with their distance from it, nearest first.
    fn ancestors(&self, id: NodeId) -> Result<Vec<(NodeId, usize)>> {
        let mut out = Vec::new();
        let mut cur = self.node(id)?.parent;
        let mut level = 1;
        while let Some(p) = cur {
            out.push((p, level));
            cur = self.node(p)?.parent;
            level += 1;
        }
        Ok(out)
    }

    /// Creates a new last child of `parent`.
    ///
    /// Cached views that reach the new node are extended in place. A view
    /// that can not take the node (missing coordinate column) is dropped so
    /// the error surfaces on its next access.
    ///
    /// # Errors
    /// Returns [`Error::StaleNode`] if `parent` was removed.
    pub fn insert_child(&mut self, parent: NodeId, point_clouds: PointClouds) -> Result<NodeId> {
        self.node(parent)?;
        let node = Node {
            parent: Some(parent),
            point_clouds,
            ..Node::default()
        };
        let id = if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            NodeId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = u32::try_from(self.slots.len())
                .map_err(|_| Error::Config("point tree exceeds u32 nodes".to_string()))?;
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            NodeId {
                index,
                generation: 0,
            }
        };
        self.node_mut(parent)?.children.push(id);
        self.notify_added(id)?;
        Ok(id)
    }

    /// Extends ancestor views with the subtree at `id`.
    fn notify_added(&self, id: NodeId) -> Result<()> {
        for (ancestor, level) in self.ancestors(id)? {
            let scopes: Vec<Scope> = self
                .node(ancestor)?
                .views
                .borrow()
                .keys()
                .filter(|s| s.reaches(level))
                .cloned()
                .collect();
            for scope in scopes {
                let remaining = if scope.depth == 0 { 0 } else { scope.depth - level };
                let added = self.descend(id, remaining)?;
                let mut views = self.node(ancestor)?.views.borrow_mut();
                let Some(view) = views.get_mut(&scope) else {
                    continue;
                };
                let view = Arc::make_mut(view);
                let mut ok = true;
                for &n in &added {
                    if view.append(n, &self.node(n)?.point_clouds).is_err() {
                        ok = false;
                        break;
                    }
                }
                if !ok {
                    warn!("dropping view {scope:?} at {ancestor}: new node can not be indexed");
                    views.remove(&scope);
                }
            }
        }
        Ok(())
    }

    /// Drops ancestor views that reach `id`.
    fn invalidate_above(&self, id: NodeId) -> Result<()> {
        for (ancestor, level) in self.ancestors(id)? {
            let node = self.node(ancestor)?;
            node.views.borrow_mut().retain(|scope, _| !scope.reaches(level));
        }
        Ok(())
    }

    /// Detaches and destroys the subtree rooted at `id`.
    ///
    /// # Errors
    /// Returns [`Error::RootRemoval`] for the root and [`Error::StaleNode`]
    /// for a removed node.
    pub fn remove(&mut self, id: NodeId) -> Result<()> {
        if id == self.root {
            return Err(Error::RootRemoval);
        }
        self.invalidate_above(id)?;
        let subtree = self.descendants(id)?;
        if let Some(parent) = self.node(id)?.parent {
            self.node_mut(parent)?.children.retain(|&c| c != id);
        }
        for n in subtree {
            let slot = &mut self.slots[n.index()];
            slot.node = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(n.index);
        }
        Ok(())
    }

    /// Moves the subtree at `id` to become the last child of `new_parent`.
    ///
    /// Views that reached `id` from its old position are dropped; views that
    /// reach it from the new position are extended.
    ///
    /// # Errors
    /// Returns an error for the root, stale handles, or a move into the
    /// node's own subtree.
    pub fn reparent(&mut self, id: NodeId, new_parent: NodeId) -> Result<()> {
        if id == self.root {
            return Err(Error::RootRemoval);
        }
        self.node(new_parent)?;
        if new_parent == id || self.ancestors(new_parent)?.iter().any(|(a, _)| *a == id) {
            return Err(Error::CyclicMove(id.to_string()));
        }
        self.invalidate_above(id)?;
        if let Some(parent) = self.node(id)?.parent {
            self.node_mut(parent)?.children.retain(|&c| c != id);
        }
        self.node_mut(id)?.parent = Some(new_parent);
        self.node_mut(new_parent)?.children.push(id);
        self.notify_added(id)
    }

    /// Returns the cached view for `scope` at `id`, building it if needed.
    ///
    /// # Errors
    /// Returns [`Error::MissingColumn`] if a reached node holds the scope's
    /// point cloud without one of its coordinate columns.
    pub fn scoped_view(&self, id: NodeId, scope: &Scope) -> Result<Arc<ScopedView>> {
        let node = self.node(id)?;
        if let Some(view) = node.views.borrow().get(scope) {
            return Ok(Arc::clone(view));
        }
        let mut view = ScopedView::empty(scope.clone());
        for n in self.descend(id, scope.depth)? {
            view.append(n, &self.node(n)?.point_clouds)?;
        }
        trace!(
            "built view {:?} at {id}: {} nodes, {} points",
            scope.pcname,
            view.nodes.len(),
            view.npoints()
        );
        let view = Arc::new(view);
        node.views
            .borrow_mut()
            .insert(scope.clone(), Arc::clone(&view));
        Ok(view)
    }

    /// Returns true if a view for `scope` is cached at `id`.
    #[must_use]
    pub fn has_cached_view(&self, id: NodeId, scope: &Scope) -> bool {
        self.node(id)
            .map(|n| n.views.borrow().contains_key(scope))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Array;

    fn samples(xs: &[f64]) -> PointClouds {
        let n = xs.len();
        let ds = Dataset::from_columns([
            ("x", Array::from(xs.to_vec())),
            ("y", Array::from(vec![0.0; n])),
            ("z", Array::from(vec![0.0; n])),
        ])
        .unwrap();
        PointClouds::from([("3d".to_string(), ds)])
    }

    #[test]
    fn test_insert_and_navigate() {
        let mut tree = PointTree::new();
        let root = tree.root();
        let a = tree.insert_child(root, PointClouds::new()).unwrap();
        let b = tree.insert_child(a, samples(&[1.0])).unwrap();
        let c = tree.insert_child(root, samples(&[2.0])).unwrap();

        assert_eq!(tree.len(), 4);
        assert_eq!(tree.children(root).unwrap(), &[a, c]);
        assert_eq!(tree.parent(b).unwrap(), Some(a));
        assert_eq!(tree.descendants(root).unwrap(), vec![root, a, b, c]);
        assert!(matches!(
            tree.point_cloud(a, "3d"),
            Err(Error::MissingPointCloud(_))
        ));
    }

    #[test]
    fn test_scope_depth() {
        let mut tree = PointTree::new();
        let root = tree.root();
        let a = tree.insert_child(root, samples(&[1.0])).unwrap();
        tree.insert_child(a, samples(&[2.0, 3.0])).unwrap();

        let all = tree.scoped_view(root, &Scope::new("3d", ["x", "y", "z"], 0)).unwrap();
        assert_eq!(all.npoints(), 3);
        let two = tree.scoped_view(root, &Scope::new("3d", ["x", "y", "z"], 2)).unwrap();
        assert_eq!(two.npoints(), 1);
        let alone = tree.scoped_view(a, &Scope::new("3d", ["x", "y", "z"], 1)).unwrap();
        assert_eq!(alone.npoints(), 1);
    }

    #[test]
    fn test_view_extends_incrementally() {
        let mut tree = PointTree::new();
        let root = tree.root();
        let a = tree.insert_child(root, samples(&[1.0, 2.0])).unwrap();
        let scope = Scope::samples_3d();

        let before = tree.scoped_view(root, &scope).unwrap();
        assert_eq!(before.npoints(), 2);
        drop(before);

        let b = tree.insert_child(root, samples(&[5.0])).unwrap();
        assert!(tree.has_cached_view(root, &scope));
        let after = tree.scoped_view(root, &scope).unwrap();
        assert_eq!(after.npoints(), 3);
        assert_eq!(after.nodes(), &[a, b]);
        assert_eq!(after.node_of(2), Some(b));
        let near = after.nearest(&[4.9, 0.0, 0.0]).unwrap();
        assert_eq!(near.index, 2);
    }

    #[test]
    fn test_remove_invalidates_view() {
        let mut tree = PointTree::new();
        let root = tree.root();
        let a = tree.insert_child(root, samples(&[1.0, 2.0])).unwrap();
        let b = tree.insert_child(a, samples(&[3.0])).unwrap();
        tree.insert_child(root, samples(&[4.0])).unwrap();
        let scope = Scope::samples_3d();

        let old = tree.scoped_view(root, &scope).unwrap();
        assert_eq!(old.npoints(), 4);
        tree.remove(b).unwrap();
        assert!(!tree.has_cached_view(root, &scope));

        let fresh = tree.scoped_view(root, &scope).unwrap();
        assert!(!Arc::ptr_eq(&old, &fresh));
        assert_eq!(fresh.npoints(), 3);
        assert!(!tree.contains(b));
        assert!(matches!(tree.children(b), Err(Error::StaleNode(_))));
    }

    #[test]
    fn test_slot_reuse_keeps_stale_handles_stale() {
        let mut tree = PointTree::new();
        let root = tree.root();
        let a = tree.insert_child(root, samples(&[1.0])).unwrap();
        tree.remove(a).unwrap();
        let b = tree.insert_child(root, samples(&[2.0])).unwrap();
        assert_eq!(a.index(), b.index());
        assert_ne!(a, b);
        assert!(!tree.contains(a));
        assert!(tree.contains(b));
    }

    #[test]
    fn test_reparent_moves_points() {
        let mut tree = PointTree::new();
        let root = tree.root();
        let g1 = tree.insert_child(root, PointClouds::new()).unwrap();
        let g2 = tree.insert_child(root, PointClouds::new()).unwrap();
        let leaf = tree.insert_child(g1, samples(&[1.0, 2.0])).unwrap();
        tree.insert_child(g2, samples(&[3.0])).unwrap();
        let scope = Scope::samples_3d();

        assert_eq!(tree.scoped_view(g1, &scope).unwrap().npoints(), 2);
        assert_eq!(tree.scoped_view(g2, &scope).unwrap().npoints(), 1);

        tree.reparent(leaf, g2).unwrap();
        assert!(!tree.has_cached_view(g1, &scope));
        assert_eq!(tree.scoped_view(g1, &scope).unwrap().npoints(), 0);
        assert_eq!(tree.scoped_view(g2, &scope).unwrap().npoints(), 3);
        assert_eq!(tree.scoped_view(root, &scope).unwrap().npoints(), 3);

        assert!(matches!(tree.reparent(g2, leaf), Err(Error::CyclicMove(_))));
        assert!(matches!(tree.remove(root), Err(Error::RootRemoval)));
    }

    #[test]
    fn test_missing_coordinate_column_is_an_error() {
        let mut tree = PointTree::new();
        let root = tree.root();
        let ds = Dataset::from_columns([("x", Array::from(vec![1.0]))]).unwrap();
        tree.insert_child(root, PointClouds::from([("3d".to_string(), ds)]))
            .unwrap();
        let err = tree.scoped_view(root, &Scope::samples_3d()).unwrap_err();
        assert_eq!(
            err,
            Error::MissingColumn {
                pcname: "3d".to_string(),
                column: "y".to_string()
            }
        );
    }
}
