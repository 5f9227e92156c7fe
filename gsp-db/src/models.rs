//! Labeled-array model persisted to and loaded from dataset files.
//!
//! All structs derive `Serialize` so the CLI can print them as JSON.

use gsp_core::site::SiteCoordinates;
use serde::Serialize;
use std::collections::BTreeMap;

/// Name of the data variable in every GSP dataset.
pub const POWER_VARIABLE: &str = "power";

/// Name of the site dimension in multi-site datasets.
pub const SITE_DIMENSION: &str = "gsp_id";

/// One named axis and its labels.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Dimension {
    pub name: String,
    pub labels: Vec<String>,
}

impl Dimension {
    pub fn new(name: impl Into<String>, labels: Vec<String>) -> Self {
        Dimension {
            name: name.into(),
            labels,
        }
    }

    pub fn size(&self) -> usize {
        self.labels.len()
    }
}

/// An n-dimensional array of nullable values with labeled axes.
///
/// `values` is flattened row-major over `dims`, so for a (time, gsp_id)
/// array the value at `(t, s)` lives at `t * sites + s`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LabeledArray {
    pub name: String,
    pub dims: Vec<Dimension>,
    pub values: Vec<Option<f64>>,
    pub attrs: BTreeMap<String, String>,
    pub site_coordinates: BTreeMap<String, SiteCoordinates>,
}

impl LabeledArray {
    pub fn shape(&self) -> Vec<usize> {
        self.dims.iter().map(Dimension::size).collect()
    }

    pub fn dim(&self, name: &str) -> Option<&Dimension> {
        self.dims.iter().find(|d| d.name == name)
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    /// Value at one position per dimension, or `None` when out of range or missing.
    pub fn get(&self, index: &[usize]) -> Option<f64> {
        if index.len() != self.dims.len() {
            return None;
        }
        let mut flat = 0;
        for (i, dim) in index.iter().zip(&self.dims) {
            if *i >= dim.size() {
                return None;
            }
            flat = flat * dim.size() + i;
        }
        self.values.get(flat).copied().flatten()
    }

    pub fn summary(&self) -> ArraySummary {
        ArraySummary {
            variable: self.name.clone(),
            dims: self
                .dims
                .iter()
                .map(|d| DimensionSummary {
                    name: d.name.clone(),
                    size: d.size(),
                    first: d.labels.first().cloned(),
                    last: d.labels.last().cloned(),
                })
                .collect(),
            attrs: self.attrs.clone(),
            present_values: self.values.iter().filter(|v| v.is_some()).count(),
            missing_values: self.values.iter().filter(|v| v.is_none()).count(),
            sites_with_coordinates: self.site_coordinates.len(),
        }
    }
}

/// Shape and metadata of an array, without its values.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ArraySummary {
    pub variable: String,
    pub dims: Vec<DimensionSummary>,
    pub attrs: BTreeMap<String, String>,
    pub present_values: usize,
    pub missing_values: usize,
    pub sites_with_coordinates: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DimensionSummary {
    pub name: String,
    pub size: usize,
    pub first: Option<String>,
    pub last: Option<String>,
}

/// What `persist` did with the destination.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum PersistOutcome {
    /// The destination did not exist and now holds the dataset.
    Written,
    /// The destination already existed and was left untouched.
    Skipped,
}
