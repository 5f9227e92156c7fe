use chrono::NaiveDateTime;
use gsp_core::config::NegativeValuePolicy;
use gsp_core::series::SiteSeries;

/// Result of the negative-value scan.
#[derive(Debug, Clone, PartialEq)]
pub enum Sanitized {
    /// No negative readings.
    Unchanged(SiteSeries),
    /// Negatives found under `Report`; the series is untouched.
    Reported {
        series: SiteSeries,
        offending: Vec<NaiveDateTime>,
    },
    /// Negatives found under `Replace`; each one is now missing.
    Replaced {
        series: SiteSeries,
        replaced: Vec<NaiveDateTime>,
    },
}

impl Sanitized {
    pub fn series(&self) -> &SiteSeries {
        match self {
            Sanitized::Unchanged(series)
            | Sanitized::Reported { series, .. }
            | Sanitized::Replaced { series, .. } => series,
        }
    }

    pub fn into_series(self) -> SiteSeries {
        match self {
            Sanitized::Unchanged(series)
            | Sanitized::Reported { series, .. }
            | Sanitized::Replaced { series, .. } => series,
        }
    }

    /// Timestamps that held a negative value before sanitizing.
    pub fn negatives(&self) -> &[NaiveDateTime] {
        match self {
            Sanitized::Unchanged(_) => &[],
            Sanitized::Reported { offending, .. } => offending,
            Sanitized::Replaced { replaced, .. } => replaced,
        }
    }
}

/// Scan the whole series once for negative readings and apply `policy`.
///
/// Rows are never dropped; under `Replace` only the value is cleared.
pub fn sanitize(mut series: SiteSeries, policy: NegativeValuePolicy) -> Sanitized {
    let negatives = series.negative_timestamps();
    if negatives.is_empty() {
        return Sanitized::Unchanged(series);
    }

    match policy {
        NegativeValuePolicy::Report => {
            log::debug!(
                "sanitize: {} has {} negative readings",
                series.site_id,
                negatives.len()
            );
            Sanitized::Reported {
                series,
                offending: negatives,
            }
        }
        NegativeValuePolicy::Replace => {
            for reading in series.readings.iter_mut().filter(|r| r.is_negative()) {
                reading.value = None;
            }
            log::debug!(
                "sanitize: {} cleared {} negative readings",
                series.site_id,
                negatives.len()
            );
            Sanitized::Replaced {
                series,
                replaced: negatives,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use gsp_core::series::RawReading;

    fn at(mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2022, 2, 1)
            .unwrap()
            .and_hms_opt(0, mi, 0)
            .unwrap()
    }

    fn series(values: &[Option<f64>]) -> SiteSeries {
        SiteSeries::new(
            "s",
            values
                .iter()
                .enumerate()
                .map(|(i, v)| RawReading::new(at(i as u32 * 10), *v))
                .collect(),
        )
    }

    #[test]
    fn test_unchanged_without_negatives() {
        let input = series(&[Some(0.0), None, Some(3.0)]);
        assert_eq!(
            sanitize(input.clone(), NegativeValuePolicy::Replace),
            Sanitized::Unchanged(input)
        );
    }

    #[test]
    fn test_report_keeps_values() {
        let input = series(&[Some(1.0), Some(-2.0), Some(-0.5)]);
        let result = sanitize(input.clone(), NegativeValuePolicy::Report);
        assert_eq!(result.negatives(), &[at(10), at(20)]);
        assert_eq!(result.series(), &input);
    }

    #[test]
    fn test_replace_nulls_each_negative() {
        let input = series(&[Some(5.0), Some(-3.0), Some(7.0), Some(-1.0)]);
        let result = sanitize(input, NegativeValuePolicy::Replace);
        assert!(matches!(result, Sanitized::Replaced { .. }));
        assert_eq!(result.negatives().len(), 2);

        let out = result.into_series();
        assert_eq!(out.len(), 4);
        let values: Vec<_> = out.readings.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![Some(5.0), None, Some(7.0), None]);
        assert!(out.negative_timestamps().is_empty());
    }
}
