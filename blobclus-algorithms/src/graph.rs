//! Cluster connectivity graph.
//!
//! Uses a union-find data structure so that the components of the graph are
//! available as soon as the last accepted pair has been added.

/// Union-Find data structure for connected component detection.
#[derive(Debug, Clone)]
struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, x: usize, y: usize) -> bool {
        let px = self.find(x);
        let py = self.find(y);

        if px == py {
            return false;
        }

        match self.rank[px].cmp(&self.rank[py]) {
            std::cmp::Ordering::Less => self.parent[px] = py,
            std::cmp::Ordering::Greater => self.parent[py] = px,
            std::cmp::Ordering::Equal => {
                self.parent[py] = px;
                self.rank[px] += 1;
            }
        }
        true
    }
}

/// Undirected graph over the clusters of one pass.
///
/// Vertices are cluster positions in the grouping's order; an edge is an
/// accepted merge pair.
#[derive(Debug, Clone)]
pub struct ConnectivityGraph {
    uf: UnionFind,
    edges: usize,
}

impl ConnectivityGraph {
    /// Creates a graph with `n` isolated vertices.
    #[must_use]
    pub fn new(n: usize) -> Self {
        Self {
            uf: UnionFind::new(n),
            edges: 0,
        }
    }

    /// Number of vertices.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.uf.parent.len()
    }

    /// Number of edges added, self loops and repeats included.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges
    }

    /// Connects two vertices. Out of range vertices are ignored.
    pub fn add_edge(&mut self, a: usize, b: usize) {
        let n = self.vertex_count();
        if a >= n || b >= n {
            return;
        }
        self.edges += 1;
        self.uf.union(a, b);
    }

    /// All connected components.
    ///
    /// Members are ascending and components are ordered by their smallest
    /// member, so the result does not depend on the order edges were added.
    #[must_use]
    pub fn components(&mut self) -> Vec<Vec<usize>> {
        let n = self.vertex_count();
        let mut slot_of_root: Vec<Option<usize>> = vec![None; n];
        let mut components: Vec<Vec<usize>> = Vec::new();
        for v in 0..n {
            let root = self.uf.find(v);
            match slot_of_root[root] {
                Some(slot) => components[slot].push(v),
                None => {
                    slot_of_root[root] = Some(components.len());
                    components.push(vec![v]);
                }
            }
        }
        components
    }

    /// Components with more than one vertex.
    #[must_use]
    pub fn merge_groups(&mut self) -> Vec<Vec<usize>> {
        self.components()
            .into_iter()
            .filter(|c| c.len() > 1)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_components() {
        let mut graph = ConnectivityGraph::new(6);
        graph.add_edge(4, 1);
        graph.add_edge(1, 3);
        graph.add_edge(5, 2);

        assert_eq!(graph.edge_count(), 3);
        assert_eq!(
            graph.components(),
            vec![vec![0], vec![1, 3, 4], vec![2, 5]]
        );
        assert_eq!(graph.merge_groups(), vec![vec![1, 3, 4], vec![2, 5]]);
    }

    #[test]
    fn test_graph_edge_order_irrelevant() {
        let mut a = ConnectivityGraph::new(5);
        let mut b = ConnectivityGraph::new(5);
        for (x, y) in [(0, 2), (2, 4), (1, 3)] {
            a.add_edge(x, y);
        }
        for (x, y) in [(3, 1), (4, 2), (2, 0)] {
            b.add_edge(x, y);
        }
        assert_eq!(a.components(), b.components());
    }

    #[test]
    fn test_graph_no_edges() {
        let mut graph = ConnectivityGraph::new(3);
        graph.add_edge(1, 1);
        graph.add_edge(0, 7);
        assert!(graph.merge_groups().is_empty());
        assert_eq!(graph.components().len(), 3);
    }
}
