/// Error types for GSP power-meter processing
use chrono::NaiveDateTime;
use gsp_utils::error::TimestampError;
use std::path::PathBuf;
use thiserror::Error;

/// A raw export could not be read at all.
#[derive(Error, Debug)]
pub enum IngestError {
    /// The file could not be opened or read
    #[error("Failed to read {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file held no data rows
    #[error("No readings in {}", .path.display())]
    Empty { path: PathBuf },
}

/// A raw export was readable but broke the two-column contract.
#[derive(Error, Debug)]
pub enum FormatError {
    /// A header or row did not have exactly two fields
    #[error("{}: expected 2 columns, found {found} on line {line}", .path.display())]
    ColumnCount {
        path: PathBuf,
        line: u64,
        found: usize,
    },

    /// The timestamp cell could not be parsed
    #[error("{}: bad timestamp on line {line}: {source}", .path.display())]
    Timestamp {
        path: PathBuf,
        line: u64,
        #[source]
        source: TimestampError,
    },

    /// The CSV reader itself gave up
    #[error("{}: malformed CSV: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Everything that can knock one site out of a run.
///
/// A `SiteError` is never fatal to the batch; the pipeline records it and
/// carries on with the remaining sites.
#[derive(Error, Debug)]
pub enum SiteError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Format(#[from] FormatError),

    /// Negative readings found while the policy is `Report`
    #[error("Site {site_id} has {} negative readings", .offending.len())]
    NegativeValues {
        site_id: String,
        offending: Vec<NaiveDateTime>,
    },
}

impl SiteError {
    /// Short label used in run summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            SiteError::Ingest(_) => "IngestError",
            SiteError::Format(_) => "FormatError",
            SiteError::NegativeValues { .. } => "NegativeValues",
        }
    }
}

/// Invalid pipeline configuration, raised before any file is read.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid frequency: {0}")]
    InvalidFrequency(String),

    #[error("Window start {start} is after window end {end}")]
    InvalidWindow {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },

    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("DST month must be between 1 and 12, got {0}")]
    InvalidDstMonth(u32),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// A table or series whose shape breaks a structural invariant.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DatasetError {
    #[error("Column {column} has {found} values, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        found: usize,
    },

    #[error("Timestamp axis is not strictly increasing at position {0}")]
    UnsortedAxis(usize),

    #[error("Site {0} appears in more than one column")]
    DuplicateColumn(String),
}

/// Type alias for per-site results
pub type SiteResult<T> = std::result::Result<T, SiteError>;
