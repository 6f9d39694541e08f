//! Error types for blobclus-core.

use thiserror::Error;

/// Result type alias for blobclus operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for blobclus operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A node does not carry a point cloud that the operation requires.
    #[error("node has no point cloud named \"{0}\"")]
    MissingPointCloud(String),

    /// A point cloud lacks a required column.
    #[error("point cloud \"{pcname}\" has no column \"{column}\"")]
    MissingColumn { pcname: String, column: String },

    /// A column exists but holds the wrong element type.
    #[error("column \"{column}\" holds {found} elements, expected {expected}")]
    ColumnType {
        column: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Columns of one point cloud must share a length.
    #[error("column \"{column}\" has length {found}, point cloud has length {expected}")]
    ColumnLength {
        column: String,
        expected: usize,
        found: usize,
    },

    /// A point cloud that must hold samples is empty.
    #[error("empty point cloud: {0}")]
    EmptyPointCloud(String),

    /// The node handle refers to a removed node.
    #[error("stale node handle {0}")]
    StaleNode(String),

    /// The tree root can not be removed or re-parented.
    #[error("the root node can not be detached")]
    RootRemoval,

    /// A node can not be moved below itself.
    #[error("node {0} can not be moved into its own subtree")]
    CyclicMove(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn missing_column(pcname: &str, column: &str) -> Self {
        Self::MissingColumn {
            pcname: pcname.to_string(),
            column: column.to_string(),
        }
    }
}
