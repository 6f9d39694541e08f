//! Memory-mapped event file reader.
//!
//! An event file is a sequence of JSON [`EventRecord`]s, separated by
//! whitespace (one per line when written by [`crate::EventFileWriter`]).

use crate::{Error, EventRecord, Result};
use log::debug;
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};

/// A memory-mapped event file.
///
/// Uses memmap2 so that large files are decoded straight from the page
/// cache without being copied into a buffer first.
pub struct EventFileReader {
    mmap: Option<Mmap>,
    path: PathBuf,
}

impl EventFileReader {
    /// Opens a file for memory-mapped reading.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        let mmap = if file.metadata()?.len() == 0 {
            None
        } else {
            // SAFETY: The file is opened read-only and we assume it is not modified concurrently.
            // This is the standard safety contract for memory mapping.
            #[allow(unsafe_code)]
            let mmap = unsafe { Mmap::map(&file)? };
            Some(mmap)
        };
        debug!(
            "mapped {} ({} bytes)",
            path.as_ref().display(),
            mmap.as_ref().map_or(0, |m| m.len())
        );
        Ok(Self {
            mmap,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Returns the file contents as a byte slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or_default()
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Returns true if the file is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Path the reader was opened with.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Decodes the records one at a time, in file order.
    ///
    /// Decoding stops being meaningful after the first error; callers
    /// normally stop there.
    pub fn events(&self) -> impl Iterator<Item = Result<EventRecord>> + '_ {
        serde_json::Deserializer::from_slice(self.as_bytes())
            .into_iter::<EventRecord>()
            .map(|record| record.map_err(Error::from))
    }

    /// Decodes every record.
    ///
    /// # Errors
    /// Returns the first decoding error, tagged with the file path.
    pub fn read_all(&self) -> Result<Vec<EventRecord>> {
        self.events()
            .enumerate()
            .map(|(i, record)| {
                record.map_err(|err| {
                    Error::InvalidFormat(format!(
                        "record {i} of {}: {err}",
                        self.path.display()
                    ))
                })
            })
            .collect()
    }
}
