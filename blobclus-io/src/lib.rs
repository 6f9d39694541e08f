//! blobclus-io: event files for blobclus.
//!
//! This crate reads and writes the live and dead point-cloud trees of each
//! event. Input files are memory-mapped via memmap2 and decoded as a stream
//! of JSON records; output is written as JSON lines.
//!

mod error;
mod reader;
mod record;
mod writer;

pub use error::{Error, Result};
pub use reader::EventFileReader;
pub use record::{format_datapath, Datapaths, EventRecord, NodeRecord, TreeSummary};
pub use writer::{EventFileWriter, DEFAULT_OUTPATH};
