use crate::error::ConfigError;
use chrono::{NaiveDateTime, TimeDelta};
use gsp_utils::frequency::{format_frequency, parse_frequency};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::mem::replace;
use std::str::FromStr;

/// Default sampling step of the canonical grid: ten minutes.
pub const DEFAULT_FREQUENCY_MINUTES: i64 = 10;

/// A strictly positive sampling step in whole milliseconds.
///
/// Serialized as a compact string such as `"10min"` so it reads naturally in
/// TOML configuration and dataset attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Frequency(TimeDelta);

impl Frequency {
    pub fn new(step: TimeDelta) -> Result<Self, ConfigError> {
        if step <= TimeDelta::zero() {
            return Err(ConfigError::InvalidFrequency(format!(
                "step must be positive, got {}s",
                step.num_seconds()
            )));
        }
        let millis = step.num_milliseconds();
        if millis < 1 || TimeDelta::try_milliseconds(millis) != Some(step) {
            return Err(ConfigError::InvalidFrequency(format!(
                "step must be a whole number of milliseconds, got {}ns",
                step.num_nanoseconds().unwrap_or(i64::MAX)
            )));
        }
        Ok(Frequency(step))
    }

    pub fn from_minutes(minutes: i64) -> Result<Self, ConfigError> {
        let step = TimeDelta::try_minutes(minutes)
            .ok_or_else(|| ConfigError::InvalidFrequency(format!("{} minutes", minutes)))?;
        Frequency::new(step)
    }

    pub fn step(&self) -> TimeDelta {
        self.0
    }

    /// Step length in milliseconds, the unit grid arithmetic is done in.
    pub fn as_millis(&self) -> i64 {
        self.0.num_milliseconds()
    }
}

impl Default for Frequency {
    fn default() -> Self {
        Frequency(TimeDelta::minutes(DEFAULT_FREQUENCY_MINUTES))
    }
}

impl FromStr for Frequency {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let step = parse_frequency(s).map_err(|e| ConfigError::InvalidFrequency(e.0))?;
        Frequency::new(step)
    }
}

impl TryFrom<String> for Frequency {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Frequency> for String {
    fn from(value: Frequency) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_frequency(self.0))
    }
}

/// A fixed-step timestamp sequence starting at `start`.
///
/// The grid never stores its timestamps; position `i` is `start + i * step`.
/// That makes "strictly increasing with constant step" hold by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanonicalGrid {
    start: NaiveDateTime,
    step: Frequency,
    len: usize,
}

impl CanonicalGrid {
    /// Enumerate `start..=end` by `step`, dropping the final point when
    /// `drop_last` is set. An `end` before `start` gives an empty grid.
    pub fn new(start: NaiveDateTime, end: NaiveDateTime, step: Frequency, drop_last: bool) -> Self {
        let span = (end - start).num_milliseconds();
        let mut len = if span < 0 {
            0
        } else {
            (span / step.as_millis()) as usize + 1
        };
        if drop_last && len > 0 {
            len -= 1;
        }
        CanonicalGrid { start, step, len }
    }

    pub fn from_parts(start: NaiveDateTime, step: Frequency, len: usize) -> Self {
        CanonicalGrid { start, step, len }
    }

    pub fn step(&self) -> Frequency {
        self.step
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn start(&self) -> Option<NaiveDateTime> {
        self.timestamp(0)
    }

    pub fn end(&self) -> Option<NaiveDateTime> {
        self.len.checked_sub(1).and_then(|last| self.timestamp(last))
    }

    pub fn timestamp(&self, index: usize) -> Option<NaiveDateTime> {
        if index >= self.len {
            return None;
        }
        let offset = TimeDelta::try_milliseconds(self.step.as_millis().checked_mul(index as i64)?)?;
        self.start.checked_add_signed(offset)
    }

    /// Position of `ts` on the grid, if it sits exactly on a grid point.
    pub fn index_of(&self, ts: NaiveDateTime) -> Option<usize> {
        let offset = (ts - self.start).num_milliseconds();
        if offset < 0 || offset % self.step.as_millis() != 0 {
            return None;
        }
        let index = (offset / self.step.as_millis()) as usize;
        (index < self.len).then_some(index)
    }

    pub fn iter(&self) -> GridRange {
        GridRange {
            next: self.start,
            remaining: self.len,
            step: self.step.step(),
        }
    }

    pub fn timestamps(&self) -> Vec<NaiveDateTime> {
        self.iter().collect()
    }
}

impl<'a> IntoIterator for &'a CanonicalGrid {
    type Item = NaiveDateTime;
    type IntoIter = GridRange;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// An iterator that yields each grid timestamp in order.
#[derive(Clone, Eq, PartialEq, Copy, Debug)]
pub struct GridRange {
    next: NaiveDateTime,
    remaining: usize,
    step: TimeDelta,
}

impl Iterator for GridRange {
    type Item = NaiveDateTime;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let following = self.next + self.step;
        Some(replace(&mut self.next, following))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for GridRange {}

/// The constant step of an index, if it has one.
///
/// Returns `None` for indices with fewer than two points or uneven spacing.
pub fn infer_step(index: &[NaiveDateTime]) -> Option<TimeDelta> {
    let mut deltas = index.windows(2).map(|pair| pair[1] - pair[0]);
    let first = deltas.next()?;
    deltas.all(|delta| delta == first).then_some(first)
}
