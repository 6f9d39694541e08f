//! blobclus-algorithms: multi-pass merging of blob clusters.
//!
//! This crate turns the top-level clusters of a live point-cloud tree into
//! larger clusters, one track or shower each:
//! - **Facade** - geometric queries over one cluster subtree
//! - **Predicates** - live-dead, extend, regular, parallel/prolonged and close
//! - **Graph** - union-find connectivity of accepted pairs
//! - **Pipeline** - the fixed pass schedule run per event
//!
#![warn(missing_docs)]

pub mod facade;
mod graph;
mod grouping;
mod pass;
pub mod pipeline;
pub mod predicates;

#[cfg(test)]
mod test_support;

pub use facade::{ClosestApproach, Cluster};
pub use graph::ConnectivityGraph;
pub use grouping::Grouping;
pub use pass::{run_pass, MergePass, PassContext, PassReport, PassState};
pub use pipeline::{
    dead_clusters, run_clustering, run_clustering_batch, EventReport, Pass, PipelineConfig,
    RoundParams,
};
pub use predicates::{ExtendFlavor, ExtendParams};

// Re-export the core types every caller needs
pub use blobclus_core::{DetectorParams, NodeId, PointTree};
