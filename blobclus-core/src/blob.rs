//! Blob records and the point clouds that carry them.
//!
//! A blob is one time slice's charge deposit, bounded by a strip of wires in
//! each plane. In the point store a blob is a leaf node:
//!
//! - live blob: `"3d"` samples (`x`, `y`, `z`) plus a one-row `"scalar"` cloud
//! - dead blob: a one-row `"scalar"` cloud plus `"corner"` positions
//!
//! The `"scalar"` columns are `charge`, `center_x/y/z`, `npoints`,
//! `slice_index_min/max` and `u/v/w_wire_index_min/max`.

use crate::dataset::{Array, Dataset};
use crate::error::{Error, Result};
use crate::geom::Point;
use crate::tree::{NodeId, PointClouds, PointTree};

/// Name of the per-blob summary cloud.
pub const SCALAR_PC: &str = "scalar";
/// Name of the blob sample cloud.
pub const SAMPLES_PC: &str = "3d";
/// Name of the dead blob corner cloud.
pub const CORNER_PC: &str = "corner";

const WIRE_MIN: [&str; 3] = ["u_wire_index_min", "v_wire_index_min", "w_wire_index_min"];
const WIRE_MAX: [&str; 3] = ["u_wire_index_max", "v_wire_index_max", "w_wire_index_max"];

/// Slice span and wire strips of a blob, in detector indices.
///
/// Wire ranges are half open: `(first, last + 1)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlobBounds {
    pub charge: f64,
    pub slice_index_min: i64,
    pub slice_index_max: i64,
    pub wire_index: [(i64, i64); 3],
}

/// A blob as read back from its leaf node.
#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    pub node: NodeId,
    pub charge: f64,
    pub center: Point,
    pub npoints: i64,
    pub slice_index_min: i64,
    pub slice_index_max: i64,
    pub wire_index: [(i64, i64); 3],
}

impl Blob {
    /// Reads the `"scalar"` cloud of a blob node.
    ///
    /// # Errors
    /// Returns an error if the node has no `"scalar"` cloud, the cloud is
    /// empty, or a column is missing or mistyped.
    pub fn from_node(tree: &PointTree, node: NodeId) -> Result<Self> {
        let ds = tree.point_cloud(node, SCALAR_PC)?;
        if ds.is_empty() {
            return Err(Error::EmptyPointCloud(SCALAR_PC.to_string()));
        }
        let float = |name: &str| -> Result<f64> {
            ds.floats(name)
                .map(|v| v[0])
                .map_err(|e| with_pcname(e, SCALAR_PC))
        };
        let int = |name: &str| -> Result<i64> {
            ds.ints(name)
                .map(|v| v[0])
                .map_err(|e| with_pcname(e, SCALAR_PC))
        };
        let mut wire_index = [(0, 0); 3];
        for (p, range) in wire_index.iter_mut().enumerate() {
            *range = (int(WIRE_MIN[p])?, int(WIRE_MAX[p])?);
        }
        Ok(Self {
            node,
            charge: float("charge")?,
            center: Point::new(float("center_x")?, float("center_y")?, float("center_z")?),
            npoints: int("npoints")?,
            slice_index_min: int("slice_index_min")?,
            slice_index_max: int("slice_index_max")?,
            wire_index,
        })
    }

    /// Returns true if the two blobs share a time slice and their wire
    /// strips overlap in every plane, widened by `offset` wires.
    #[must_use]
    pub fn overlaps(&self, other: &Blob, offset: i64) -> bool {
        if self.slice_index_min != other.slice_index_min {
            return false;
        }
        self.wire_index
            .iter()
            .zip(other.wire_index.iter())
            .all(|(&(amin, amax), &(bmin, bmax))| {
                amin <= bmax - 1 + offset && bmin <= amax - 1 + offset
            })
    }
}

fn with_pcname(err: Error, pcname: &str) -> Error {
    match err {
        Error::MissingColumn { column, .. } => Error::MissingColumn {
            pcname: pcname.to_string(),
            column,
        },
        other => other,
    }
}

fn scalar_dataset(bounds: &BlobBounds, center: &Point, npoints: usize) -> Result<Dataset> {
    let npoints = i64::try_from(npoints).map_err(|_| Error::Config("too many samples".into()))?;
    let mut ds = Dataset::from_columns([
        ("charge", Array::from(vec![bounds.charge])),
        ("center_x", Array::from(vec![center.x])),
        ("center_y", Array::from(vec![center.y])),
        ("center_z", Array::from(vec![center.z])),
        ("npoints", Array::from(vec![npoints])),
        ("slice_index_min", Array::from(vec![bounds.slice_index_min])),
        ("slice_index_max", Array::from(vec![bounds.slice_index_max])),
    ])?;
    for p in 0..3 {
        ds.add(WIRE_MIN[p], Array::from(vec![bounds.wire_index[p].0]))?;
        ds.add(WIRE_MAX[p], Array::from(vec![bounds.wire_index[p].1]))?;
    }
    Ok(ds)
}

fn xyz_dataset(points: &[Point]) -> Result<Dataset> {
    Dataset::from_columns([
        ("x", Array::from(points.iter().map(|p| p.x).collect::<Vec<_>>())),
        ("y", Array::from(points.iter().map(|p| p.y).collect::<Vec<_>>())),
        ("z", Array::from(points.iter().map(|p| p.z).collect::<Vec<_>>())),
    ])
}

/// Point clouds of a live blob leaf from its sampled positions.
///
/// The blob center is the mean of the samples.
///
/// # Errors
/// Returns [`Error::EmptyPointCloud`] when `samples` is empty.
pub fn live_blob_point_clouds(bounds: &BlobBounds, samples: &[Point]) -> Result<PointClouds> {
    if samples.is_empty() {
        return Err(Error::EmptyPointCloud(SAMPLES_PC.to_string()));
    }
    #[allow(clippy::cast_precision_loss)]
    let n = samples.len() as f64;
    let sum = samples
        .iter()
        .fold(nalgebra::Vector3::zeros(), |acc, p| acc + p.coords);
    let center = Point::from(sum / n);
    let mut pcs = PointClouds::new();
    pcs.insert(
        SCALAR_PC.to_string(),
        scalar_dataset(bounds, &center, samples.len())?,
    );
    pcs.insert(SAMPLES_PC.to_string(), xyz_dataset(samples)?);
    Ok(pcs)
}

/// Point clouds of a dead blob leaf from its corner positions.
///
/// # Errors
/// Returns an error only if the columns can not be assembled.
pub fn dead_blob_point_clouds(bounds: &BlobBounds, corners: &[Point]) -> Result<PointClouds> {
    let mut pcs = PointClouds::new();
    pcs.insert(
        SCALAR_PC.to_string(),
        scalar_dataset(bounds, &Point::origin(), 0)?,
    );
    pcs.insert(CORNER_PC.to_string(), xyz_dataset(corners)?);
    Ok(pcs)
}
