//! Columnar point clouds.
//!
//! A [`Dataset`] stores a point cloud as named, same-length columns
//! (structure of arrays) rather than as a list of point structs. Blob
//! samples, per-blob scalar summaries and dead-region corners all share this
//! representation.

use std::collections::BTreeMap;

use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One column of a point cloud.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "dtype", content = "data"))]
pub enum Array {
    /// Floating point column (coordinates, charge).
    #[cfg_attr(feature = "serde", serde(rename = "f8"))]
    Float(Vec<f64>),
    /// Integer column (slice and wire indices, counts).
    #[cfg_attr(feature = "serde", serde(rename = "i8"))]
    Int(Vec<i64>),
}

impl Array {
    /// Number of elements in the column.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Float(v) => v.len(),
            Self::Int(v) => v.len(),
        }
    }

    /// Returns true if the column holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element type name, used in error messages.
    #[must_use]
    pub fn dtype(&self) -> &'static str {
        match self {
            Self::Float(_) => "float",
            Self::Int(_) => "int",
        }
    }

    /// Float view of the column, if it holds floats.
    #[must_use]
    pub fn as_floats(&self) -> Option<&[f64]> {
        match self {
            Self::Float(v) => Some(v),
            Self::Int(_) => None,
        }
    }

    /// Integer view of the column, if it holds integers.
    #[must_use]
    pub fn as_ints(&self) -> Option<&[i64]> {
        match self {
            Self::Int(v) => Some(v),
            Self::Float(_) => None,
        }
    }

    fn extend(&mut self, other: &Array) -> bool {
        match (self, other) {
            (Self::Float(a), Self::Float(b)) => a.extend_from_slice(b),
            (Self::Int(a), Self::Int(b)) => a.extend_from_slice(b),
            _ => return false,
        }
        true
    }
}

impl From<Vec<f64>> for Array {
    fn from(v: Vec<f64>) -> Self {
        Self::Float(v)
    }
}

impl From<Vec<i64>> for Array {
    fn from(v: Vec<i64>) -> Self {
        Self::Int(v)
    }
}

/// A point cloud: named columns that all share one length.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Dataset {
    arrays: BTreeMap<String, Array>,
}

impl Dataset {
    /// Creates an empty point cloud.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a point cloud from columns, checking the shared length.
    ///
    /// # Errors
    /// Returns [`Error::ColumnLength`] if the columns disagree in length.
    pub fn from_columns<I, S>(columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Array)>,
        S: Into<String>,
    {
        let mut ds = Self::new();
        for (name, array) in columns {
            ds.add(name, array)?;
        }
        Ok(ds)
    }

    /// Number of points (the common column length).
    #[must_use]
    pub fn len(&self) -> usize {
        self.arrays.values().next().map_or(0, Array::len)
    }

    /// Returns true if the point cloud has no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Column names in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.arrays.keys().map(String::as_str)
    }

    /// Returns true if a column with this name exists.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.arrays.contains_key(name)
    }

    /// Looks up a column.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Array> {
        self.arrays.get(name)
    }

    /// Adds or replaces a column.
    ///
    /// # Errors
    /// Returns [`Error::ColumnLength`] if the column length differs from the
    /// other columns.
    pub fn add(&mut self, name: impl Into<String>, array: Array) -> Result<()> {
        let name = name.into();
        let others = self.arrays.iter().find(|(key, _)| **key != name);
        if let Some((_, existing)) = others {
            if existing.len() != array.len() {
                return Err(Error::ColumnLength {
                    column: name,
                    expected: existing.len(),
                    found: array.len(),
                });
            }
        }
        self.arrays.insert(name, array);
        Ok(())
    }

    /// Float column by name.
    ///
    /// # Errors
    /// Returns an error if the column is missing or is not a float column.
    pub fn floats(&self, name: &str) -> Result<&[f64]> {
        let array = self
            .arrays
            .get(name)
            .ok_or_else(|| Error::missing_column("", name))?;
        array.as_floats().ok_or_else(|| Error::ColumnType {
            column: name.to_string(),
            expected: "float",
            found: array.dtype(),
        })
    }

    /// Integer column by name.
    ///
    /// # Errors
    /// Returns an error if the column is missing or is not an integer column.
    pub fn ints(&self, name: &str) -> Result<&[i64]> {
        let array = self
            .arrays
            .get(name)
            .ok_or_else(|| Error::missing_column("", name))?;
        array.as_ints().ok_or_else(|| Error::ColumnType {
            column: name.to_string(),
            expected: "int",
            found: array.dtype(),
        })
    }

    /// Appends the rows of another point cloud with the same columns.
    ///
    /// # Errors
    /// Returns an error if the column sets or element types differ.
    pub fn append(&mut self, other: &Dataset) -> Result<()> {
        if self.arrays.is_empty() {
            self.arrays.clone_from(&other.arrays);
            return Ok(());
        }
        for name in self.arrays.keys() {
            if !other.arrays.contains_key(name) {
                return Err(Error::missing_column("", name));
            }
        }
        for (name, array) in &mut self.arrays {
            let incoming = &other.arrays[name];
            if !array.extend(incoming) {
                return Err(Error::ColumnType {
                    column: name.clone(),
                    expected: array.dtype(),
                    found: incoming.dtype(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(feature = "serde")]
impl<'de> Deserialize<'de> for Dataset {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let arrays = BTreeMap::<String, Array>::deserialize(deserializer)?;
        Dataset::from_columns(arrays).map_err(serde::de::Error::custom)
    }
}
