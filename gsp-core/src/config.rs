//! Run-wide pipeline configuration.
//!
//! A [`PipelineConfig`] is built once at startup, validated, and passed by
//! reference to every stage. Nothing in the pipeline reads configuration from
//! anywhere else.
use crate::error::ConfigError;
use crate::grid::Frequency;
use chrono::NaiveDateTime;
use chrono_tz::Tz;
use gsp_utils::dates::{format_timestamp, parse_timestamp, parse_timezone, ParsedTimestamp};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Resolution policy for readings that share a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    KeepFirst,
    KeepLast,
}

/// Later reading wins. At clock-back the second 01:xx reading is the
/// standard-time one.
pub const DEFAULT_DUPLICATE_POLICY: DuplicatePolicy = DuplicatePolicy::KeepLast;

impl Default for DuplicatePolicy {
    fn default() -> Self {
        DEFAULT_DUPLICATE_POLICY
    }
}

/// What to do with negative readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegativeValuePolicy {
    /// Leave the series alone and list the offending timestamps.
    Report,
    /// Null every negative value.
    #[default]
    Replace,
}

/// How naive timestamps are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeBasis {
    /// Wall-clock time as written in the file.
    #[default]
    Local,
    /// Instants in UTC, localized with the configured timezone.
    Utc,
}

impl TimeBasis {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeBasis::Local => "local",
            TimeBasis::Utc => "utc",
        }
    }

    /// Name of the time dimension in persisted datasets.
    pub fn dimension_name(&self) -> &'static str {
        match self {
            TimeBasis::Local => "time_local",
            TimeBasis::Utc => "time_utc",
        }
    }

    pub fn resolve(&self, parsed: ParsedTimestamp, tz: Timezone) -> NaiveDateTime {
        match self {
            TimeBasis::Local => parsed.wall_clock(),
            TimeBasis::Utc => parsed.to_utc(tz.tz()),
        }
    }
}

impl fmt::Display for TimeBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeBasis {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(TimeBasis::Local),
            "utc" => Ok(TimeBasis::Utc),
            other => Err(ConfigError::Parse(format!("unknown time basis '{}'", other))),
        }
    }
}

/// An IANA timezone, serialized by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timezone(Tz);

impl Timezone {
    pub fn new(tz: Tz) -> Self {
        Timezone(tz)
    }

    pub fn tz(&self) -> Tz {
        self.0
    }

    pub fn name(&self) -> &'static str {
        self.0.name()
    }
}

impl Default for Timezone {
    fn default() -> Self {
        Timezone(chrono_tz::Europe::London)
    }
}

impl FromStr for Timezone {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_timezone(s)
            .map(Timezone)
            .map_err(|_| ConfigError::UnknownTimezone(s.to_string()))
    }
}

impl TryFrom<String> for Timezone {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timezone> for String {
    fn from(value: Timezone) -> Self {
        value.name().to_string()
    }
}

/// A grid bound as written in the configuration or on the command line.
///
/// Bounds are kept unresolved until the time basis and timezone of the run
/// are known, so they are read the same way as file timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowBound(ParsedTimestamp);

impl WindowBound {
    pub fn new(parsed: ParsedTimestamp) -> Self {
        WindowBound(parsed)
    }

    pub fn parsed(&self) -> ParsedTimestamp {
        self.0
    }

    pub fn resolve(&self, basis: TimeBasis, tz: Timezone) -> NaiveDateTime {
        basis.resolve(self.0, tz)
    }
}

impl From<NaiveDateTime> for WindowBound {
    fn from(naive: NaiveDateTime) -> Self {
        WindowBound(ParsedTimestamp::Naive(naive))
    }
}

impl FromStr for WindowBound {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_timestamp(s)
            .map(WindowBound)
            .map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

impl fmt::Display for WindowBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            ParsedTimestamp::Naive(naive) => f.write_str(&format_timestamp(&naive)),
            ParsedTimestamp::Offset(dt) => f.write_str(&dt.to_rfc3339()),
        }
    }
}

impl Serialize for WindowBound {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// Bounds arrive either as TOML datetime literals or as strings in any
// layout the ingestor accepts.
impl<'de> Deserialize<'de> for WindowBound {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = match toml::Value::deserialize(deserializer)? {
            toml::Value::String(s) => s,
            toml::Value::Datetime(dt) => dt.to_string(),
            other => {
                return Err(serde::de::Error::custom(format!(
                    "expected a timestamp, found {}",
                    other.type_str()
                )))
            }
        };
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Optional explicit bounds of the canonical grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Window {
    pub start: Option<WindowBound>,
    pub end: Option<WindowBound>,
}

impl Window {
    pub fn new(start: Option<WindowBound>, end: Option<WindowBound>) -> Self {
        Window { start, end }
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Both bounds as timestamps in `basis`.
    pub fn resolve(
        &self,
        basis: TimeBasis,
        tz: Timezone,
    ) -> (Option<NaiveDateTime>, Option<NaiveDateTime>) {
        (
            self.start.map(|b| b.resolve(basis, tz)),
            self.end.map(|b| b.resolve(basis, tz)),
        )
    }
}

/// Everything one pipeline run needs to know.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub frequency: Frequency,
    pub window: Window,
    pub timezone: Timezone,
    pub time_basis: TimeBasis,
    pub negative_values: NegativeValuePolicy,
    pub duplicates: DuplicatePolicy,
    pub drop_last_row: bool,
    pub snap_to_step: bool,
    pub dst_month: u32,
    pub description: String,
    /// Worker threads for per-site processing; 0 lets rayon decide.
    pub workers: usize,
}

pub const DEFAULT_DST_MONTH: u32 = 10;
pub const DEFAULT_DESCRIPTION: &str = "Metered power generation (MW) of GSP's";

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            frequency: Frequency::default(),
            window: Window::default(),
            timezone: Timezone::default(),
            time_basis: TimeBasis::default(),
            negative_values: NegativeValuePolicy::default(),
            duplicates: DEFAULT_DUPLICATE_POLICY,
            drop_last_row: false,
            snap_to_step: false,
            dst_month: DEFAULT_DST_MONTH,
            description: DEFAULT_DESCRIPTION.to_string(),
            workers: 0,
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))?;
        log::debug!("config: loaded {}", path.display());
        Self::from_toml_str(&contents)
    }

    /// Window bounds resolved with this run's time basis and timezone.
    pub fn window_bounds(&self) -> (Option<NaiveDateTime>, Option<NaiveDateTime>) {
        self.window.resolve(self.time_basis, self.timezone)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let (Some(start), Some(end)) = self.window_bounds() {
            if start > end {
                return Err(ConfigError::InvalidWindow { start, end });
            }
        }
        if !(1..=12).contains(&self.dst_month) {
            return Err(ConfigError::InvalidDstMonth(self.dst_month));
        }
        Ok(())
    }
}
