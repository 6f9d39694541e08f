//! blobclus-core: point-cloud tree and blob records for blob clustering.
//!
//! This crate provides the hierarchical point store with cached, scoped k-d
//! views, the columnar point-cloud type, blob records and detector geometry
//! shared by the clustering passes.
//!

pub mod blob;
pub mod dataset;
pub mod error;
pub mod geom;
pub mod kd;
pub mod tree;
pub mod units;

pub use blob::{dead_blob_point_clouds, live_blob_point_clouds, Blob, BlobBounds};
pub use dataset::{Array, Dataset};
pub use error::{Error, Result};
pub use geom::{DetectorParams, Plane, Point, Vector};
pub use kd::{KdIndex, Neighbor};
pub use tree::{NodeId, PointClouds, PointTree, Scope, ScopedView};
