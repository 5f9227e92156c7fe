//! Linear-in-time interpolation onto a fixed-frequency grid.
use chrono::NaiveDateTime;
use gsp_core::config::PipelineConfig;
use gsp_core::grid::{CanonicalGrid, Frequency};
use gsp_core::series::{NormalizedSiteSeries, SiteSeries};
use gsp_utils::frequency::floor_to_step;

/// Result of putting one site onto its grid.
#[derive(Debug, Clone, PartialEq)]
pub enum Interpolated {
    Series(NormalizedSiteSeries),
    /// Every grid point is missing; the site has nothing to contribute.
    NoData { site_id: String },
}

/// A single valid sample used as an interpolation anchor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataPoint {
    pub timestamp: NaiveDateTime,
    pub value: f64,
}

/// Linear interpolation between two samples at `ts`.
///
/// `ts` is expected to lie within `[start.timestamp, end.timestamp]`.
pub fn interpolate_pair(start: &DataPoint, end: &DataPoint, ts: NaiveDateTime) -> f64 {
    let span = (end.timestamp - start.timestamp).num_milliseconds();
    if span == 0 {
        return start.value;
    }
    let offset = (ts - start.timestamp).num_milliseconds();
    start.value + (end.value - start.value) * offset as f64 / span as f64
}

/// Value at `ts` from samples sorted by timestamp, or `None` outside the
/// first and last sample.
pub fn value_at(points: &[DataPoint], ts: NaiveDateTime) -> Option<f64> {
    match points.binary_search_by_key(&ts, |p| p.timestamp) {
        Ok(i) => Some(points[i].value),
        Err(0) => None,
        Err(i) if i == points.len() => None,
        Err(i) => Some(interpolate_pair(&points[i - 1], &points[i], ts)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeGridInterpolator {
    pub frequency: Frequency,
    /// Explicit grid bounds, already resolved to the run's time basis
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub drop_last: bool,
    pub snap_to_step: bool,
}

impl TimeGridInterpolator {
    pub fn new(frequency: Frequency) -> Self {
        TimeGridInterpolator {
            frequency,
            start: None,
            end: None,
            drop_last: false,
            snap_to_step: false,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        let (start, end) = config.window_bounds();
        TimeGridInterpolator {
            frequency: config.frequency,
            start,
            end,
            drop_last: config.drop_last_row,
            snap_to_step: config.snap_to_step,
        }
    }

    /// Grid for a series: explicit window bounds win, otherwise the first and
    /// last timestamps that carry a value.
    pub fn grid_for(&self, series: &SiteSeries) -> Option<CanonicalGrid> {
        let snap = |ts: NaiveDateTime| {
            if self.snap_to_step {
                floor_to_step(ts, self.frequency.step())
            } else {
                ts
            }
        };
        let start = match self.start {
            Some(start) => start,
            None => snap(series.first_valid()?),
        };
        let end = match self.end {
            Some(end) => end,
            None => snap(series.last_valid()?),
        };
        Some(CanonicalGrid::new(start, end, self.frequency, self.drop_last))
    }

    /// Put a deduplicated series onto its canonical grid.
    ///
    /// Missing values are treated as absent samples, so gaps are bridged by
    /// the nearest valid readings on either side. Grid points before the
    /// first or after the last valid reading stay missing.
    pub fn interpolate(&self, series: &SiteSeries) -> Interpolated {
        let no_data = || Interpolated::NoData {
            site_id: series.site_id.clone(),
        };

        let mut points: Vec<DataPoint> = series
            .readings
            .iter()
            .filter_map(|r| {
                r.value.map(|value| DataPoint {
                    timestamp: r.timestamp,
                    value,
                })
            })
            .collect();
        points.sort_by_key(|p| p.timestamp);
        points.dedup_by_key(|p| p.timestamp);

        let Some(grid) = self.grid_for(series) else {
            return no_data();
        };
        let normalized =
            NormalizedSiteSeries::sample(series.site_id.clone(), grid, |ts| value_at(&points, ts));
        if normalized.values().iter().all(Option::is_none) {
            log::debug!("interpolation: {} has no data on its grid", series.site_id);
            return no_data();
        }

        log::debug!(
            "interpolation: {} {} samples onto {} grid points",
            series.site_id,
            points.len(),
            grid.len()
        );
        Interpolated::Series(normalized)
    }
}
