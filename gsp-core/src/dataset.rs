use crate::error::DatasetError;
use crate::grid::Frequency;
use crate::series::NormalizedSiteSeries;
use chrono::NaiveDateTime;
use std::collections::HashSet;

/// A rectangular (timestamp, site) table with one column per site.
///
/// The timestamp axis is strictly increasing and site ids are unique;
/// [`MultiSiteDataset::try_new`] refuses anything else.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiSiteDataset {
    timestamps: Vec<NaiveDateTime>,
    sites: Vec<String>,
    columns: Vec<Vec<Option<f64>>>,
    frequency: Frequency,
}

impl MultiSiteDataset {
    pub fn try_new(
        timestamps: Vec<NaiveDateTime>,
        sites: Vec<String>,
        columns: Vec<Vec<Option<f64>>>,
        frequency: Frequency,
    ) -> Result<Self, DatasetError> {
        if let Some(pos) = timestamps.windows(2).position(|pair| pair[0] >= pair[1]) {
            return Err(DatasetError::UnsortedAxis(pos + 1));
        }
        if sites.len() != columns.len() {
            return Err(DatasetError::LengthMismatch {
                column: "sites".to_string(),
                expected: columns.len(),
                found: sites.len(),
            });
        }
        let mut seen = HashSet::new();
        for (site, column) in sites.iter().zip(&columns) {
            if !seen.insert(site.as_str()) {
                return Err(DatasetError::DuplicateColumn(site.clone()));
            }
            if column.len() != timestamps.len() {
                return Err(DatasetError::LengthMismatch {
                    column: site.clone(),
                    expected: timestamps.len(),
                    found: column.len(),
                });
            }
        }
        Ok(MultiSiteDataset {
            timestamps,
            sites,
            columns,
            frequency,
        })
    }

    pub fn empty(frequency: Frequency) -> Self {
        MultiSiteDataset {
            timestamps: Vec::new(),
            sites: Vec::new(),
            columns: Vec::new(),
            frequency,
        }
    }

    /// A one-column table holding a single normalized series.
    pub fn from_series(series: &NormalizedSiteSeries) -> Self {
        MultiSiteDataset {
            timestamps: series.timestamps(),
            sites: vec![series.site_id().to_string()],
            columns: vec![series.values().to_vec()],
            frequency: series.grid().step(),
        }
    }

    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    pub fn sites(&self) -> &[String] {
        &self.sites
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn column(&self, site_id: &str) -> Option<&[Option<f64>]> {
        self.sites
            .iter()
            .position(|s| s == site_id)
            .map(|i| self.columns[i].as_slice())
    }

    pub fn get(&self, ts: NaiveDateTime, site_id: &str) -> Option<f64> {
        let row = self.timestamps.binary_search(&ts).ok()?;
        self.column(site_id)?[row]
    }

    /// Values flattened time-major: `values[t * sites + s]`.
    pub fn to_row_major(&self) -> Vec<Option<f64>> {
        let mut flat = Vec::with_capacity(self.timestamps.len() * self.sites.len());
        for row in 0..self.timestamps.len() {
            flat.extend(self.columns.iter().map(|column| column[row]));
        }
        flat
    }

    pub fn value_count(&self) -> usize {
        self.columns
            .iter()
            .map(|column| column.iter().filter(|v| v.is_some()).count())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2022, 5, 1)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_rejects_unsorted_axis() {
        let result = MultiSiteDataset::try_new(
            vec![at(1), at(0)],
            vec!["a".to_string()],
            vec![vec![None, None]],
            Frequency::default(),
        );
        assert_eq!(result, Err(DatasetError::UnsortedAxis(1)));
    }

    #[test]
    fn test_rejects_duplicate_site() {
        let result = MultiSiteDataset::try_new(
            vec![at(0)],
            vec!["a".to_string(), "a".to_string()],
            vec![vec![Some(1.0)], vec![Some(2.0)]],
            Frequency::default(),
        );
        assert_eq!(result, Err(DatasetError::DuplicateColumn("a".to_string())));
    }

    #[test]
    fn test_row_major_layout() {
        let dataset = MultiSiteDataset::try_new(
            vec![at(0), at(1)],
            vec!["a".to_string(), "b".to_string()],
            vec![vec![Some(1.0), Some(2.0)], vec![None, Some(4.0)]],
            Frequency::default(),
        )
        .unwrap();
        assert_eq!(
            dataset.to_row_major(),
            vec![Some(1.0), None, Some(2.0), Some(4.0)]
        );
        assert_eq!(dataset.get(at(1), "b"), Some(4.0));
        assert_eq!(dataset.get(at(0), "b"), None);
        assert_eq!(dataset.value_count(), 3);
    }
}
