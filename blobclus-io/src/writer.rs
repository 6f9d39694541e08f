//! JSON-lines event writer.

use crate::{Datapaths, EventRecord, Result};
use blobclus_core::PointTree;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Default output datapath pattern; `%d` is the event ident.
pub const DEFAULT_OUTPATH: &str = "pointtrees/%d";

/// Writer of clustered events, one JSON record per line.
///
/// Each record carries the datapaths formed from the output pattern, so a
/// downstream converter knows where to place the live and dead trees.
pub struct EventFileWriter {
    writer: BufWriter<File>,
    outpath: String,
    written: usize,
}

impl EventFileWriter {
    /// Creates a new file writer using [`DEFAULT_OUTPATH`].
    ///
    /// # Errors
    /// Returns an error if the file can not be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            outpath: DEFAULT_OUTPATH.to_string(),
            written: 0,
        })
    }

    /// Sets the datapath pattern.
    #[must_use]
    pub fn with_outpath(mut self, outpath: impl Into<String>) -> Self {
        self.outpath = outpath.into();
        self
    }

    /// Writes the trees of one event.
    ///
    /// # Errors
    /// Returns an error if a tree can not be snapshotted or the write fails.
    pub fn write_event(&mut self, ident: i64, live: &PointTree, dead: &PointTree) -> Result<()> {
        let record = EventRecord::new(ident, live, dead)?;
        self.write_record(record)
    }

    /// Writes a record, replacing its datapaths with this writer's.
    ///
    /// # Errors
    /// Returns an error if encoding or the write fails.
    pub fn write_record(&mut self, record: EventRecord) -> Result<()> {
        let datapaths = Datapaths::new(&self.outpath, record.ident);
        let record = record.with_datapaths(datapaths);
        serde_json::to_writer(&mut self.writer, &record)?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    /// Number of records written so far.
    #[must_use]
    pub fn written(&self) -> usize {
        self.written
    }

    /// Flushes the writer.
    ///
    /// # Errors
    /// Returns an error if the flush fails.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_one_line_per_event() {
        let file = NamedTempFile::new().unwrap();
        let mut writer = EventFileWriter::create(file.path())
            .unwrap()
            .with_outpath("clus/%d");

        let tree = PointTree::new();
        writer.write_event(1, &tree, &tree).unwrap();
        writer.write_event(2, &tree, &tree).unwrap();
        writer.flush().unwrap();
        assert_eq!(writer.written(), 2);

        let content = std::fs::read_to_string(file.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"clus/1/live\""));
        assert!(lines[1].contains("\"clus/2/dead\""));
    }
}
