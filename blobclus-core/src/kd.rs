//! Dynamic k-d index for nearest-neighbour queries.
//!
//! Points are kept in one flat coordinate buffer. The index is a forest of
//! static, implicitly balanced k-d trees ("blocks") over contiguous ranges of
//! that buffer. Appending points builds a new block and merges blocks of
//! similar size, so incremental growth costs amortised `O(log² n)` per point
//! while queries stay `O(log² n + k)`.
//!
//! Query results are squared distances. Ties are broken by the lower point
//! index so that results do not depend on the block layout.

use std::cmp::Ordering;

/// Dynamic k-d index over points of fixed dimension.
#[derive(Debug, Clone, Default)]
pub struct KdIndex {
    dim: usize,
    coords: Vec<f64>,
    blocks: Vec<Block>,
}

/// One static k-d tree over `[start, start + perm.len())`.
///
/// `perm` is the implicit tree: the median of a slice is the split node, the
/// halves on either side are its subtrees.
#[derive(Debug, Clone)]
struct Block {
    start: usize,
    perm: Vec<usize>,
}

/// A neighbour returned by a query: point index and squared distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub index: usize,
    pub dist2: f64,
}

impl Neighbor {
    fn cmp_key(&self, other: &Self) -> Ordering {
        self.dist2
            .total_cmp(&other.dist2)
            .then(self.index.cmp(&other.index))
    }
}

impl KdIndex {
    /// Creates an empty index for points of dimension `dim`.
    #[must_use]
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            coords: Vec::new(),
            blocks: Vec::new(),
        }
    }

    /// Builds an index from columns of equal length, one per dimension.
    #[must_use]
    pub fn from_columns(columns: &[&[f64]]) -> Self {
        let mut index = Self::new(columns.len());
        index.append_columns(columns);
        index
    }

    /// Point dimension.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of indexed points.
    #[must_use]
    pub fn len(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.coords.len() / self.dim
        }
    }

    /// Returns true if no points are indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Coordinates of point `index`.
    ///
    /// # Panics
    /// Panics if `index` is out of range.
    #[must_use]
    pub fn point(&self, index: usize) -> &[f64] {
        &self.coords[index * self.dim..(index + 1) * self.dim]
    }

    /// Appends points given as columns (one slice per dimension).
    ///
    /// Columns shorter than the first one truncate the batch.
    pub fn append_columns(&mut self, columns: &[&[f64]]) {
        if self.dim == 0 || columns.len() != self.dim {
            return;
        }
        let n = columns.iter().map(|c| c.len()).min().unwrap_or(0);
        if n == 0 {
            return;
        }
        let start = self.len();
        self.coords.reserve(n * self.dim);
        for i in 0..n {
            for column in columns {
                self.coords.push(column[i]);
            }
        }
        self.push_block(start, n);
    }

    fn push_block(&mut self, start: usize, n: usize) {
        let mut start = start;
        let mut n = n;
        // Merge with trailing blocks that are not larger than the new one.
        while let Some(last) = self.blocks.last() {
            if last.perm.len() > n {
                break;
            }
            start = last.start;
            n += last.perm.len();
            self.blocks.pop();
        }
        let mut perm: Vec<usize> = (start..start + n).collect();
        build(&self.coords, self.dim, &mut perm, 0);
        self.blocks.push(Block { start, perm });
    }

    /// Nearest indexed point to `query`, or `None` if the index is empty.
    #[must_use]
    pub fn nearest(&self, query: &[f64]) -> Option<Neighbor> {
        self.knn(query, 1).into_iter().next()
    }

    /// The `k` nearest points, closest first.
    #[must_use]
    pub fn knn(&self, query: &[f64], k: usize) -> Vec<Neighbor> {
        if k == 0 || query.len() != self.dim {
            return Vec::new();
        }
        let mut best: Vec<Neighbor> = Vec::with_capacity(k + 1);
        for block in &self.blocks {
            self.search_knn(&block.perm, 0, query, k, &mut best);
        }
        best
    }

    /// All points within `radius` of `query` (inclusive), closest first.
    #[must_use]
    pub fn radius(&self, query: &[f64], radius: f64) -> Vec<Neighbor> {
        if query.len() != self.dim || radius < 0.0 || radius.is_nan() {
            return Vec::new();
        }
        let r2 = radius * radius;
        let mut found = Vec::new();
        for block in &self.blocks {
            self.search_radius(&block.perm, 0, query, r2, &mut found);
        }
        found.sort_by(Neighbor::cmp_key);
        found
    }

    fn dist2(&self, index: usize, query: &[f64]) -> f64 {
        self.point(index)
            .iter()
            .zip(query)
            .map(|(a, b)| (a - b) * (a - b))
            .sum()
    }

    fn search_knn(
        &self,
        perm: &[usize],
        depth: usize,
        query: &[f64],
        k: usize,
        best: &mut Vec<Neighbor>,
    ) {
        if perm.is_empty() {
            return;
        }
        let mid = perm.len() / 2;
        let index = perm[mid];
        let candidate = Neighbor {
            index,
            dist2: self.dist2(index, query),
        };
        let pos = best
            .binary_search_by(|probe| probe.cmp_key(&candidate))
            .unwrap_or_else(|e| e);
        if pos < k {
            best.insert(pos, candidate);
            best.truncate(k);
        }

        let axis = depth % self.dim;
        let diff = query[axis] - self.point(index)[axis];
        let (near, far) = if diff < 0.0 {
            (&perm[..mid], &perm[mid + 1..])
        } else {
            (&perm[mid + 1..], &perm[..mid])
        };
        self.search_knn(near, depth + 1, query, k, best);
        let worst = if best.len() < k {
            f64::INFINITY
        } else {
            best[best.len() - 1].dist2
        };
        if diff * diff <= worst {
            self.search_knn(far, depth + 1, query, k, best);
        }
    }

    fn search_radius(
        &self,
        perm: &[usize],
        depth: usize,
        query: &[f64],
        r2: f64,
        found: &mut Vec<Neighbor>,
    ) {
        if perm.is_empty() {
            return;
        }
        let mid = perm.len() / 2;
        let index = perm[mid];
        let dist2 = self.dist2(index, query);
        if dist2 <= r2 {
            found.push(Neighbor { index, dist2 });
        }
        let axis = depth % self.dim;
        let diff = query[axis] - self.point(index)[axis];
        if diff <= 0.0 || diff * diff <= r2 {
            self.search_radius(&perm[..mid], depth + 1, query, r2, found);
        }
        if diff >= 0.0 || diff * diff <= r2 {
            self.search_radius(&perm[mid + 1..], depth + 1, query, r2, found);
        }
    }
}

fn build(coords: &[f64], dim: usize, perm: &mut [usize], depth: usize) {
    if perm.len() <= 1 {
        return;
    }
    let axis = depth % dim;
    let mid = perm.len() / 2;
    perm.select_nth_unstable_by(mid, |&a, &b| {
        coords[a * dim + axis].total_cmp(&coords[b * dim + axis])
    });
    let (left, rest) = perm.split_at_mut(mid);
    build(coords, dim, left, depth + 1);
    build(coords, dim, &mut rest[1..], depth + 1);
}
