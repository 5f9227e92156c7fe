//! Labeled-array packaging and write-once persistence for GSP datasets.
//!
//! A [`DatasetBuilder`] wraps a [`MultiSiteDataset`] (or a single
//! [`NormalizedSiteSeries`]) into a [`LabeledArray`] with a time dimension,
//! a `gsp_id` dimension for multi-site tables, a `power` data variable and
//! descriptive attributes. [`DatasetBuilder::persist`] writes it to a SQLite
//! file only if nothing exists at the destination yet.
//!
//! # Usage
//!
//! ```no_run
//! use gsp_core::config::PipelineConfig;
//! use gsp_core::dataset::MultiSiteDataset;
//! use gsp_db::{DatasetBuilder, PersistOutcome};
//! use std::path::Path;
//!
//! let config = PipelineConfig::default();
//! let dataset = MultiSiteDataset::empty(config.frequency);
//! let builder = DatasetBuilder::new(&config);
//! let array = builder.build_multi(&dataset);
//! let outcome = builder.persist(&array, Path::new("gsp.sqlite")).unwrap();
//! assert!(matches!(outcome, PersistOutcome::Written | PersistOutcome::Skipped));
//! ```
//!
//! # Tables
//!
//! See [`schema::create_schema`] for the on-disk layout.

pub mod error;
pub mod models;
pub mod reader;
pub mod schema;
pub mod writer;

pub use error::PersistenceError;
pub use models::{LabeledArray, PersistOutcome};
pub use reader::read_dataset;

use gsp_core::config::{PipelineConfig, TimeBasis, Timezone};
use gsp_core::dataset::MultiSiteDataset;
use gsp_core::grid::Frequency;
use gsp_core::series::NormalizedSiteSeries;
use gsp_core::site::{CoordinateLookup, NoCoordinates, SiteCoordinates};
use gsp_utils::dates::format_timestamp;
use models::{Dimension, POWER_VARIABLE, SITE_DIMENSION};
use std::collections::BTreeMap;
use std::path::Path;

/// Builds labeled arrays from aligned tables and persists them.
pub struct DatasetBuilder<'a> {
    description: String,
    time_basis: TimeBasis,
    timezone: Timezone,
    lookup: &'a dyn CoordinateLookup,
}

impl<'a> DatasetBuilder<'a> {
    pub fn new(config: &PipelineConfig) -> Self {
        DatasetBuilder {
            description: config.description.clone(),
            time_basis: config.time_basis,
            timezone: config.timezone,
            lookup: &NoCoordinates,
        }
    }

    pub fn with_lookup(mut self, lookup: &'a dyn CoordinateLookup) -> Self {
        self.lookup = lookup;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// A (time, gsp_id) array with one column per site.
    pub fn build_multi(&self, dataset: &MultiSiteDataset) -> LabeledArray {
        let time = self.time_dimension(dataset.timestamps().iter());
        let sites = Dimension::new(SITE_DIMENSION, dataset.sites().to_vec());
        LabeledArray {
            name: POWER_VARIABLE.to_string(),
            dims: vec![time, sites],
            values: dataset.to_row_major(),
            attrs: self.attributes(dataset.frequency()),
            site_coordinates: self.coordinates(dataset.sites()),
        }
    }

    /// A one-dimensional time array for a single site. The site id is kept
    /// in the `gsp_id` attribute.
    pub fn build_single(&self, series: &NormalizedSiteSeries) -> LabeledArray {
        let timestamps = series.timestamps();
        let mut attrs = self.attributes(series.grid().step());
        attrs.insert(SITE_DIMENSION.to_string(), series.site_id().to_string());
        LabeledArray {
            name: POWER_VARIABLE.to_string(),
            dims: vec![self.time_dimension(timestamps.iter())],
            values: series.values().to_vec(),
            attrs,
            site_coordinates: self.coordinates(&[series.site_id().to_string()]),
        }
    }

    /// Write `array` to `dest` unless `dest` already exists.
    pub fn persist(
        &self,
        array: &LabeledArray,
        dest: &Path,
    ) -> Result<PersistOutcome, PersistenceError> {
        writer::persist(array, dest)
    }

    fn time_dimension<'t>(
        &self,
        timestamps: impl Iterator<Item = &'t chrono::NaiveDateTime>,
    ) -> Dimension {
        Dimension::new(
            self.time_basis.dimension_name(),
            timestamps.map(format_timestamp).collect(),
        )
    }

    fn attributes(&self, frequency: Frequency) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("description".to_string(), self.description.clone()),
            ("frequency".to_string(), frequency.to_string()),
            ("time_basis".to_string(), self.time_basis.to_string()),
            ("timezone".to_string(), self.timezone.name().to_string()),
        ])
    }

    fn coordinates(&self, sites: &[String]) -> BTreeMap<String, SiteCoordinates> {
        sites
            .iter()
            .filter_map(|site| self.lookup.lookup(site).map(|c| (site.clone(), c)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};
    use gsp_core::grid::CanonicalGrid;
    use sha3::{Digest, Sha3_384};
    use std::fs;
    use std::path::PathBuf;

    fn at(h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 10, 31)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("gsp-db-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn dataset() -> MultiSiteDataset {
        MultiSiteDataset::try_new(
            vec![at(0, 0), at(0, 10)],
            vec!["bolney".to_string(), "ninfield".to_string()],
            vec![vec![Some(1.0), Some(2.0)], vec![None, Some(4.5)]],
            Frequency::default(),
        )
        .unwrap()
    }

    fn fingerprint(path: &Path) -> Vec<u8> {
        let mut hasher = Sha3_384::new();
        hasher.update(fs::read(path).unwrap());
        hasher.finalize().to_vec()
    }

    #[test]
    fn builds_multi_site_array() {
        let config = PipelineConfig::default();
        let array = DatasetBuilder::new(&config).build_multi(&dataset());
        assert_eq!(array.name, "power");
        assert_eq!(array.dims[0].name, "time_local");
        assert_eq!(array.dims[0].labels, vec!["2021-10-31T00:00:00", "2021-10-31T00:10:00"]);
        assert_eq!(array.dims[1].name, "gsp_id");
        assert_eq!(array.get(&[1, 1]), Some(4.5));
        assert_eq!(array.get(&[0, 1]), None);
        assert_eq!(array.attr("description"), Some("Metered power generation (MW) of GSP's"));
        assert_eq!(array.attr("frequency"), Some("10min"));
        assert_eq!(array.attr("time_basis"), Some("local"));
        assert_eq!(array.attr("timezone"), Some("Europe/London"));
        assert!(array.site_coordinates.is_empty());
    }

    #[test]
    fn builds_single_site_array() {
        let config = PipelineConfig {
            time_basis: TimeBasis::Utc,
            ..PipelineConfig::default()
        };
        let grid = CanonicalGrid::from_parts(at(0, 0), Frequency::default(), 3);
        let series =
            NormalizedSiteSeries::new("bolney", grid, vec![Some(1.0), None, Some(3.0)]).unwrap();
        let array = DatasetBuilder::new(&config).build_single(&series);
        assert_eq!(array.shape(), vec![3]);
        assert_eq!(array.dims[0].name, "time_utc");
        assert_eq!(array.attr("gsp_id"), Some("bolney"));
        assert_eq!(array.get(&[2]), Some(3.0));
    }

    #[test]
    fn attaches_known_coordinates() {
        let config = PipelineConfig::default();
        let lookup =
            |site: &str| (site == "bolney").then(|| SiteCoordinates::new(50.99, -0.21));
        let array = DatasetBuilder::new(&config)
            .with_lookup(&lookup)
            .build_multi(&dataset());
        assert_eq!(array.site_coordinates.len(), 1);
        assert_eq!(
            array.site_coordinates.get("bolney"),
            Some(&SiteCoordinates::new(50.99, -0.21))
        );
    }

    #[test]
    fn persist_then_read_back() {
        let dir = scratch_dir("roundtrip");
        let dest = dir.join("gsp.sqlite");
        let config = PipelineConfig::default();
        let lookup = |_: &str| Some(SiteCoordinates::new(51.0, 0.5));
        let builder = DatasetBuilder::new(&config).with_lookup(&lookup);
        let array = builder.build_multi(&dataset());

        assert_eq!(builder.persist(&array, &dest).unwrap(), PersistOutcome::Written);
        let loaded = read_dataset(&dest).unwrap();
        assert_eq!(loaded, array);

        // no staging files left next to the destination
        let leftovers = fs::read_dir(&dir).unwrap().count();
        assert_eq!(leftovers, 1);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn persist_is_write_once() {
        let dir = scratch_dir("write-once");
        let dest = dir.join("gsp.sqlite");
        let config = PipelineConfig::default();
        let builder = DatasetBuilder::new(&config);

        let first = builder.build_multi(&dataset());
        assert_eq!(builder.persist(&first, &dest).unwrap(), PersistOutcome::Written);
        let before = fingerprint(&dest);

        let second = builder
            .with_description("something else")
            .build_multi(&MultiSiteDataset::empty(Frequency::default()));
        let builder = DatasetBuilder::new(&config);
        assert_eq!(builder.persist(&second, &dest).unwrap(), PersistOutcome::Skipped);
        assert_eq!(fingerprint(&dest), before);
        assert_eq!(read_dataset(&dest).unwrap(), first);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn persist_into_missing_directory_fails() {
        let config = PipelineConfig::default();
        let builder = DatasetBuilder::new(&config);
        let array = builder.build_multi(&dataset());
        let dest = std::env::temp_dir()
            .join(format!("gsp-db-missing-{}", std::process::id()))
            .join("nested")
            .join("gsp.sqlite");
        assert!(builder.persist(&array, &dest).is_err());
    }

    #[test]
    fn read_missing_file_fails() {
        assert!(read_dataset(Path::new("/definitely/not/here.sqlite")).is_err());
    }
}
