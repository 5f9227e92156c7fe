use crate::error::DatasetError;
use crate::grid::CanonicalGrid;
use chrono::NaiveDateTime;
use serde::Serialize;

/// One row of a raw export. `value` is `None` where the cell was not numeric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RawReading {
    pub timestamp: NaiveDateTime,
    pub value: Option<f64>,
}

impl RawReading {
    pub fn new(timestamp: NaiveDateTime, value: Option<f64>) -> Self {
        RawReading { timestamp, value }
    }

    pub fn is_negative(&self) -> bool {
        matches!(self.value, Some(v) if v < 0.0)
    }
}

/// Readings for one site in ingestion order.
///
/// Timestamps may repeat and need not be evenly spaced until the series has
/// been through duplicate resolution and interpolation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteSeries {
    pub site_id: String,
    pub readings: Vec<RawReading>,
}

impl SiteSeries {
    pub fn new(site_id: impl Into<String>, readings: Vec<RawReading>) -> Self {
        SiteSeries {
            site_id: site_id.into(),
            readings,
        }
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Earliest timestamp carrying a value.
    pub fn first_valid(&self) -> Option<NaiveDateTime> {
        self.readings
            .iter()
            .filter(|r| r.value.is_some())
            .map(|r| r.timestamp)
            .min()
    }

    /// Latest timestamp carrying a value.
    pub fn last_valid(&self) -> Option<NaiveDateTime> {
        self.readings
            .iter()
            .filter(|r| r.value.is_some())
            .map(|r| r.timestamp)
            .max()
    }

    pub fn negative_timestamps(&self) -> Vec<NaiveDateTime> {
        self.readings
            .iter()
            .filter(|r| r.is_negative())
            .map(|r| r.timestamp)
            .collect()
    }

    pub fn is_strictly_increasing(&self) -> bool {
        self.readings
            .windows(2)
            .all(|pair| pair[0].timestamp < pair[1].timestamp)
    }
}

/// A site series indexed exactly by its canonical grid.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSiteSeries {
    site_id: String,
    grid: CanonicalGrid,
    values: Vec<Option<f64>>,
}

impl NormalizedSiteSeries {
    pub fn new(
        site_id: impl Into<String>,
        grid: CanonicalGrid,
        values: Vec<Option<f64>>,
    ) -> Result<Self, DatasetError> {
        let site_id = site_id.into();
        if values.len() != grid.len() {
            return Err(DatasetError::LengthMismatch {
                column: site_id,
                expected: grid.len(),
                found: values.len(),
            });
        }
        Ok(NormalizedSiteSeries {
            site_id,
            grid,
            values,
        })
    }

    /// Sample `f` at every grid timestamp. The values always line up with
    /// the grid.
    pub fn sample<F>(site_id: impl Into<String>, grid: CanonicalGrid, f: F) -> Self
    where
        F: FnMut(NaiveDateTime) -> Option<f64>,
    {
        NormalizedSiteSeries {
            site_id: site_id.into(),
            grid,
            values: grid.iter().map(f).collect(),
        }
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn grid(&self) -> &CanonicalGrid {
        &self.grid
    }

    pub fn values(&self) -> &[Option<f64>] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, ts: NaiveDateTime) -> Option<f64> {
        self.grid.index_of(ts).and_then(|i| self.values[i])
    }

    pub fn timestamps(&self) -> Vec<NaiveDateTime> {
        self.grid.timestamps()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDateTime, Option<f64>)> + '_ {
        self.grid.iter().zip(self.values.iter().copied())
    }

    pub fn into_values(self) -> Vec<Option<f64>> {
        self.values
    }
}
