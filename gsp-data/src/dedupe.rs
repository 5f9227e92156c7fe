use chrono::{Datelike, NaiveDateTime};
use gsp_core::config::{DuplicatePolicy, PipelineConfig};
use gsp_core::diagnostic::DuplicateAnomaly;
use gsp_core::series::{RawReading, SiteSeries};
use std::collections::BTreeMap;

/// A series with one reading per timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct Deduplicated {
    /// Strictly increasing by timestamp
    pub series: SiteSeries,
    pub duplicates_removed: usize,
    /// Repeats outside the DST month, one entry per year
    pub anomalies: Vec<DuplicateAnomaly>,
}

/// Collapses repeated timestamps left behind by clock changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuplicateResolver {
    pub policy: DuplicatePolicy,
    pub dst_month: u32,
}

impl DuplicateResolver {
    pub fn new(policy: DuplicatePolicy, dst_month: u32) -> Self {
        DuplicateResolver { policy, dst_month }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        DuplicateResolver::new(config.duplicates, config.dst_month)
    }

    /// Sort by timestamp and keep one reading per timestamp.
    ///
    /// The sort is stable, so "first" and "last" refer to ingestion order.
    /// Anomaly classification is reporting only and never changes which
    /// reading is kept.
    pub fn resolve(&self, series: SiteSeries) -> Deduplicated {
        let SiteSeries {
            site_id,
            mut readings,
        } = series;
        readings.sort_by_key(|r| r.timestamp);

        let mut kept: Vec<RawReading> = Vec::with_capacity(readings.len());
        let mut repeated: BTreeMap<i32, Vec<NaiveDateTime>> = BTreeMap::new();
        let mut duplicates_removed = 0;

        for reading in readings {
            let repeat = kept
                .last()
                .is_some_and(|previous| previous.timestamp == reading.timestamp);
            if !repeat {
                kept.push(reading);
                continue;
            }

            duplicates_removed += 1;
            if reading.timestamp.month() != self.dst_month {
                let stamps = repeated.entry(reading.timestamp.year()).or_default();
                if stamps.last() != Some(&reading.timestamp) {
                    stamps.push(reading.timestamp);
                }
            }
            if self.policy == DuplicatePolicy::KeepLast {
                if let Some(previous) = kept.last_mut() {
                    *previous = reading;
                }
            }
        }

        let anomalies: Vec<DuplicateAnomaly> = repeated
            .into_iter()
            .map(|(year, timestamps)| DuplicateAnomaly {
                site_id: site_id.clone(),
                year,
                timestamps,
            })
            .collect();

        if duplicates_removed > 0 {
            log::debug!(
                "dedupe: {} removed {} duplicate readings, {} anomalous years",
                site_id,
                duplicates_removed,
                anomalies.len()
            );
        }

        Deduplicated {
            series: SiteSeries::new(site_id, kept),
            duplicates_removed,
            anomalies,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use gsp_core::config::{DEFAULT_DST_MONTH, DEFAULT_DUPLICATE_POLICY};

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    fn series(rows: &[(NaiveDateTime, f64)]) -> SiteSeries {
        SiteSeries::new(
            "s",
            rows.iter()
                .map(|(ts, v)| RawReading::new(*ts, Some(*v)))
                .collect(),
        )
    }

    fn default_resolver() -> DuplicateResolver {
        DuplicateResolver::new(DEFAULT_DUPLICATE_POLICY, DEFAULT_DST_MONTH)
    }

    #[test]
    fn test_clock_back_keeps_last_and_is_not_anomalous() {
        let dup = at(2021, 10, 31, 1, 30);
        let result = default_resolver().resolve(series(&[
            (at(2021, 10, 31, 1, 20), 4.0),
            (dup, 5.0),
            (dup, 8.0),
        ]));
        assert_eq!(result.duplicates_removed, 1);
        assert!(result.anomalies.is_empty());
        assert_eq!(result.series.readings.len(), 2);
        assert_eq!(result.series.readings[1].value, Some(8.0));
    }

    #[test]
    fn test_keep_first() {
        let dup = at(2021, 10, 31, 1, 30);
        let resolver = DuplicateResolver::new(DuplicatePolicy::KeepFirst, 10);
        let result = resolver.resolve(series(&[(dup, 5.0), (dup, 8.0)]));
        assert_eq!(result.series.readings[0].value, Some(5.0));
    }

    #[test]
    fn test_output_strictly_increasing() {
        let result = default_resolver().resolve(series(&[
            (at(2022, 1, 1, 0, 20), 3.0),
            (at(2022, 1, 1, 0, 0), 1.0),
            (at(2022, 1, 1, 0, 10), 2.0),
            (at(2022, 1, 1, 0, 0), 9.0),
        ]));
        assert!(result.series.is_strictly_increasing());
        assert_eq!(result.series.readings[0].value, Some(9.0));
    }

    #[test]
    fn test_anomalies_grouped_by_year() {
        let result = default_resolver().resolve(series(&[
            (at(2020, 6, 1, 0, 0), 1.0),
            (at(2020, 6, 1, 0, 0), 2.0),
            (at(2020, 7, 1, 0, 0), 1.0),
            (at(2020, 7, 1, 0, 0), 2.0),
            (at(2020, 7, 1, 0, 0), 3.0),
            (at(2021, 10, 31, 1, 0), 1.0),
            (at(2021, 10, 31, 1, 0), 2.0),
            (at(2022, 3, 27, 2, 0), 1.0),
            (at(2022, 3, 27, 2, 0), 2.0),
        ]));
        assert_eq!(result.duplicates_removed, 5);
        let years: Vec<i32> = result.anomalies.iter().map(|a| a.year).collect();
        assert_eq!(years, vec![2020, 2022]);
        assert_eq!(
            result.anomalies[0].timestamps,
            vec![at(2020, 6, 1, 0, 0), at(2020, 7, 1, 0, 0)]
        );
        // policy is unaffected by classification
        assert_eq!(result.series.readings[1].value, Some(3.0));
    }

    #[test]
    fn test_custom_dst_month() {
        let dup = at(2021, 3, 28, 1, 0);
        let result = DuplicateResolver::new(DuplicatePolicy::KeepLast, 3)
            .resolve(series(&[(dup, 1.0), (dup, 2.0)]));
        assert!(result.anomalies.is_empty());
    }
}
