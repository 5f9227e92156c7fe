use csv::{ByteRecord, ReaderBuilder, Trim};
use gsp_core::config::{PipelineConfig, TimeBasis, Timezone};
use gsp_core::error::{FormatError, IngestError, SiteError, SiteResult};
use gsp_core::series::{RawReading, SiteSeries};
use gsp_utils::dates::parse_timestamp;
use gsp_utils::error::TimestampError;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Longest stretch of missing cells filled from the last good value.
pub const REPAIR_LIMIT: usize = 2;

/// What happened while reading one file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Data rows read, header excluded
    pub rows: usize,
    /// Value cells that were not numbers
    pub coerced: usize,
    /// Missing cells filled by the repair pass
    pub repaired: usize,
}

/// Site id for a raw export: the file name without its extension.
pub fn site_id_from_path(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Reads two-column `timestamp,value` exports into a [`SiteSeries`].
#[derive(Debug, Clone, Copy)]
pub struct CsvIngestor {
    time_basis: TimeBasis,
    timezone: Timezone,
}

impl CsvIngestor {
    pub fn new(config: &PipelineConfig) -> Self {
        CsvIngestor {
            time_basis: config.time_basis,
            timezone: config.timezone,
        }
    }

    pub fn ingest_path(&self, path: &Path) -> SiteResult<(SiteSeries, IngestStats)> {
        let file = File::open(path).map_err(|source| IngestError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        self.ingest_reader(path, file)
    }

    /// Parse an export from any reader. `path` names the site and is quoted
    /// in errors; it is never opened.
    pub fn ingest_reader<R: Read>(
        &self,
        path: &Path,
        reader: R,
    ) -> SiteResult<(SiteSeries, IngestStats)> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(reader);
        let mut records = rdr.byte_records();

        let header = match records.next() {
            Some(result) => result.map_err(|source| csv_error(path, source))?,
            None => {
                return Err(IngestError::Empty {
                    path: path.to_path_buf(),
                }
                .into())
            }
        };
        check_width(path, &header)?;

        let mut timestamps = Vec::new();
        let mut values = Vec::new();
        let mut needs_repair = false;
        let mut stats = IngestStats::default();

        for result in records {
            let record = result.map_err(|source| csv_error(path, source))?;
            check_width(path, &record)?;

            let parsed = std::str::from_utf8(&record[0])
                .map_err(|_| TimestampError("timestamp is not valid UTF-8".to_string()))
                .and_then(parse_timestamp)
                .map_err(|source| FormatError::Timestamp {
                    path: path.to_path_buf(),
                    line: line_of(&record),
                    source,
                })?;
            timestamps.push(self.time_basis.resolve(parsed, self.timezone));

            // undecodable bytes count as a non-numeric token
            let cell = std::str::from_utf8(&record[1]).ok();
            let value = cell.and_then(parse_value);
            if value.is_none() {
                stats.coerced += 1;
                // an actual word in the column, not just a blank or NaN
                if cell.map_or(true, |c| !c.is_empty() && c.parse::<f64>().is_err()) {
                    needs_repair = true;
                }
            }
            values.push(value);
        }

        stats.rows = timestamps.len();
        if stats.rows == 0 {
            return Err(IngestError::Empty {
                path: path.to_path_buf(),
            }
            .into());
        }
        if needs_repair {
            stats.repaired = forward_fill(&mut values, REPAIR_LIMIT);
        }

        let site_id = site_id_from_path(path);
        log::debug!(
            "ingest: {} rows={} coerced={} repaired={}",
            site_id,
            stats.rows,
            stats.coerced,
            stats.repaired
        );

        let readings = timestamps
            .into_iter()
            .zip(values)
            .map(|(timestamp, value)| RawReading::new(timestamp, value))
            .collect();
        Ok((SiteSeries::new(site_id, readings), stats))
    }
}

/// A finite number, or `None` for anything else.
pub fn parse_value(cell: &str) -> Option<f64> {
    cell.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// Fill each run of missing values from the last value before it, at most
/// `limit` cells per run. Returns how many cells were filled.
pub fn forward_fill(values: &mut [Option<f64>], limit: usize) -> usize {
    let mut last = None;
    let mut run = 0;
    let mut filled = 0;
    for slot in values.iter_mut() {
        let current = *slot;
        match current {
            Some(value) => {
                last = Some(value);
                run = 0;
            }
            None => {
                run += 1;
                if run <= limit {
                    if let Some(value) = last {
                        *slot = Some(value);
                        filled += 1;
                    }
                }
            }
        }
    }
    filled
}

fn line_of(record: &ByteRecord) -> u64 {
    record.position().map(|pos| pos.line()).unwrap_or(0)
}

fn check_width(path: &Path, record: &ByteRecord) -> Result<(), SiteError> {
    if record.len() != 2 {
        return Err(FormatError::ColumnCount {
            path: path.to_path_buf(),
            line: line_of(record),
            found: record.len(),
        }
        .into());
    }
    Ok(())
}

fn csv_error(path: &Path, source: csv::Error) -> SiteError {
    FormatError::Csv {
        path: path.to_path_buf(),
        source,
    }
    .into()
}
