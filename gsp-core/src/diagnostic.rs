use crate::grid::Frequency;
use chrono::NaiveDateTime;
use gsp_utils::dates::format_timestamp;
use serde::Serialize;
use std::fmt;

/// Duplicate timestamps found outside the daylight-saving month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateAnomaly {
    pub site_id: String,
    pub year: i32,
    pub timestamps: Vec<NaiveDateTime>,
}

/// Non-blocking findings collected over a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind")]
pub enum Diagnostic {
    FrequencyMismatch {
        site_id: String,
        expected: Frequency,
        found: Frequency,
    },
    DuplicateAnomaly(DuplicateAnomaly),
    /// The site contributed no data in the window and was left out.
    AlignmentGapWarning { site_id: String },
    /// A second series reused a site id already in the table.
    DuplicateSite { site_id: String },
}

impl Diagnostic {
    pub fn site_id(&self) -> &str {
        match self {
            Diagnostic::FrequencyMismatch { site_id, .. } => site_id,
            Diagnostic::DuplicateAnomaly(anomaly) => &anomaly.site_id,
            Diagnostic::AlignmentGapWarning { site_id } => site_id,
            Diagnostic::DuplicateSite { site_id } => site_id,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::FrequencyMismatch {
                site_id,
                expected,
                found,
            } => write!(
                f,
                "{}: grid step {} does not match configured {}",
                site_id, found, expected
            ),
            Diagnostic::DuplicateAnomaly(anomaly) => {
                let stamps: Vec<String> = anomaly.timestamps.iter().map(format_timestamp).collect();
                write!(
                    f,
                    "{}: duplicate timestamps outside the DST month in {}: {}",
                    anomaly.site_id,
                    anomaly.year,
                    stamps.join(", ")
                )
            }
            Diagnostic::AlignmentGapWarning { site_id } => {
                write!(f, "{}: no data in the window, site left out", site_id)
            }
            Diagnostic::DuplicateSite { site_id } => {
                write!(f, "{}: site already present, later series skipped", site_id)
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.0.push(diagnostic);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.0.iter()
    }

    pub fn for_site<'a>(&'a self, site_id: &'a str) -> impl Iterator<Item = &'a Diagnostic> + 'a {
        self.0.iter().filter(move |d| d.site_id() == site_id)
    }

    pub fn duplicate_anomalies(&self) -> impl Iterator<Item = &DuplicateAnomaly> {
        self.0.iter().filter_map(|d| match d {
            Diagnostic::DuplicateAnomaly(anomaly) => Some(anomaly),
            _ => None,
        })
    }

    /// Emit every diagnostic through the `log` facade.
    pub fn log(&self) {
        for diagnostic in &self.0 {
            match diagnostic {
                Diagnostic::AlignmentGapWarning { .. } => log::info!("{}", diagnostic),
                _ => log::warn!("{}", diagnostic),
            }
        }
    }
}

impl Extend<Diagnostic> for Diagnostics {
    fn extend<T: IntoIterator<Item = Diagnostic>>(&mut self, iter: T) {
        self.0.extend(iter);
    }
}

impl FromIterator<Diagnostic> for Diagnostics {
    fn from_iter<T: IntoIterator<Item = Diagnostic>>(iter: T) -> Self {
        Diagnostics(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
