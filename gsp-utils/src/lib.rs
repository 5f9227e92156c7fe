//! Shared utility functions for GSP crates.

/// Timestamp parsing, formatting and timezone localization
pub mod dates {
    use crate::error::TimestampError;
    use chrono::{
        DateTime, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, Offset, TimeDelta, TimeZone,
    };
    use chrono_tz::Tz;

    /// Layout used when writing timestamps into datasets and logs.
    pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

    /// Offset-carrying layouts tried after RFC 3339.
    const OFFSET_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S%.f%:z",
        "%Y-%m-%d %H:%M:%S%.f%z",
        "%Y-%m-%dT%H:%M:%S%.f%:z",
        "%Y-%m-%d %H:%M%:z",
        "%Y-%m-%dT%H:%M%:z",
    ];

    /// Naive layouts seen in dashboard exports.
    const NAIVE_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
        "%d/%m/%Y %H:%M:%S",
        "%d/%m/%Y %H:%M",
    ];

    /// A timestamp as written in a raw export, with or without a UTC offset.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum ParsedTimestamp {
        Naive(NaiveDateTime),
        Offset(DateTime<FixedOffset>),
    }

    impl ParsedTimestamp {
        /// The wall-clock reading, dropping any offset.
        pub fn wall_clock(&self) -> NaiveDateTime {
            match self {
                ParsedTimestamp::Naive(naive) => *naive,
                ParsedTimestamp::Offset(dt) => dt.naive_local(),
            }
        }

        /// The UTC instant. Naive readings are localized in `tz` first.
        pub fn to_utc(&self, tz: Tz) -> NaiveDateTime {
            match self {
                ParsedTimestamp::Naive(naive) => localize_to_utc(*naive, tz),
                ParsedTimestamp::Offset(dt) => dt.naive_utc(),
            }
        }
    }

    /// Parse a timestamp cell from a raw export.
    ///
    /// Accepts RFC 3339, `YYYY-MM-DD HH:MM[:SS[.f]]` (space or `T`, optional
    /// numeric offset), `DD/MM/YYYY HH:MM[:SS]` and bare `YYYY-MM-DD` dates.
    pub fn parse_timestamp(s: &str) -> Result<ParsedTimestamp, TimestampError> {
        let s = s.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(ParsedTimestamp::Offset(dt));
        }
        for fmt in OFFSET_FORMATS {
            if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
                return Ok(ParsedTimestamp::Offset(dt));
            }
        }
        for fmt in NAIVE_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
                return Ok(ParsedTimestamp::Naive(naive));
            }
        }
        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
                return Ok(ParsedTimestamp::Naive(midnight));
            }
        }
        Err(TimestampError(format!("unrecognised timestamp '{}'", s)))
    }

    /// Format a timestamp with [`TIMESTAMP_FORMAT`].
    pub fn format_timestamp(ts: &NaiveDateTime) -> String {
        ts.format(TIMESTAMP_FORMAT).to_string()
    }

    /// Resolve an IANA timezone name such as `Europe/London`.
    pub fn parse_timezone(name: &str) -> Result<Tz, TimestampError> {
        name.trim()
            .parse::<Tz>()
            .map_err(|e| TimestampError(format!("unknown timezone '{}': {}", name, e)))
    }

    /// Localize a naive wall-clock reading in `tz` and return the UTC instant.
    ///
    /// The repeated hour at clock-back resolves to the later (standard time)
    /// offset, so both readings of that hour land on the same instant.
    /// Readings inside the clock-forward gap are moved past the gap.
    pub fn localize_to_utc(naive: NaiveDateTime, tz: Tz) -> NaiveDateTime {
        match tz.from_local_datetime(&naive) {
            LocalResult::Single(dt) => dt.naive_utc(),
            LocalResult::Ambiguous(_, later) => later.naive_utc(),
            LocalResult::None => {
                // offset in force before the gap opened
                let offset_secs = tz
                    .offset_from_local_datetime(&(naive - TimeDelta::days(1)))
                    .earliest()
                    .map(|offset| offset.fix().local_minus_utc())
                    .unwrap_or(0);
                naive - TimeDelta::seconds(i64::from(offset_secs))
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use chrono::NaiveDate;

        fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
            NaiveDate::from_ymd_opt(y, mo, d)
                .unwrap()
                .and_hms_opt(h, mi, 0)
                .unwrap()
        }

        #[test]
        fn test_parse_naive_layouts() {
            let expected = at(2021, 10, 31, 1, 30);
            for s in [
                "2021-10-31 01:30:00",
                "2021-10-31T01:30:00",
                "2021-10-31 01:30",
                "31/10/2021 01:30",
                "31/10/2021 01:30:00",
                " 2021-10-31 01:30:00.000 ",
            ] {
                let parsed = parse_timestamp(s).unwrap();
                assert_eq!(parsed, ParsedTimestamp::Naive(expected), "layout {}", s);
            }
        }

        #[test]
        fn test_parse_offset_layouts() {
            let parsed = parse_timestamp("2021-10-31T01:30:00+01:00").unwrap();
            assert!(matches!(parsed, ParsedTimestamp::Offset(_)));
            assert_eq!(parsed.wall_clock(), at(2021, 10, 31, 1, 30));
            assert_eq!(parsed.to_utc(chrono_tz::UTC), at(2021, 10, 31, 0, 30));

            let zulu = parse_timestamp("2022-06-01T12:00:00Z").unwrap();
            assert_eq!(zulu.to_utc(chrono_tz::Europe::London), at(2022, 6, 1, 12, 0));

            let spaced = parse_timestamp("2022-06-01 12:00:00+0100").unwrap();
            assert_eq!(spaced.to_utc(chrono_tz::UTC), at(2022, 6, 1, 11, 0));
        }

        #[test]
        fn test_parse_date_only() {
            let parsed = parse_timestamp("2017-11-25").unwrap();
            assert_eq!(parsed.wall_clock(), at(2017, 11, 25, 0, 0));
        }

        #[test]
        fn test_parse_rejects_garbage() {
            assert!(parse_timestamp("not a date").is_err());
            assert!(parse_timestamp("").is_err());
        }

        #[test]
        fn test_localize_summer_and_winter() {
            let london = chrono_tz::Europe::London;
            assert_eq!(localize_to_utc(at(2022, 7, 1, 12, 0), london), at(2022, 7, 1, 11, 0));
            assert_eq!(localize_to_utc(at(2022, 1, 1, 12, 0), london), at(2022, 1, 1, 12, 0));
        }

        #[test]
        fn test_localize_clock_back_takes_standard_offset() {
            let london = chrono_tz::Europe::London;
            // 01:30 happens twice on 2021-10-31; the GMT reading is kept
            assert_eq!(
                localize_to_utc(at(2021, 10, 31, 1, 30), london),
                at(2021, 10, 31, 1, 30)
            );
        }

        #[test]
        fn test_localize_clock_forward_gap() {
            let london = chrono_tz::Europe::London;
            // 01:30 does not exist on 2021-03-28
            assert_eq!(
                localize_to_utc(at(2021, 3, 28, 1, 30), london),
                at(2021, 3, 28, 1, 30)
            );
        }

        #[test]
        fn test_parse_timezone() {
            assert_eq!(parse_timezone("Europe/London").unwrap(), chrono_tz::Europe::London);
            assert!(parse_timezone("Mars/Olympus").is_err());
        }

        #[test]
        fn test_format_timestamp() {
            assert_eq!(format_timestamp(&at(2021, 10, 31, 1, 30)), "2021-10-31T01:30:00");
        }
    }
}

/// Sampling frequency helpers
pub mod frequency {
    use crate::error::TimestampError;
    use chrono::{DateTime, NaiveDateTime, TimeDelta};

    /// Parse a pandas-style frequency such as `10min`, `10Min`, `5T`, `1h`,
    /// `30s` or `1d`. A bare number is read as minutes.
    pub fn parse_frequency(s: &str) -> Result<TimeDelta, TimestampError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(TimestampError("empty frequency".to_string()));
        }
        let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        let (digits, unit) = s.split_at(split);
        let count: i64 = if digits.is_empty() {
            1
        } else {
            digits
                .parse()
                .map_err(|_| TimestampError(format!("invalid frequency '{}'", s)))?
        };
        if count <= 0 {
            return Err(TimestampError(format!("frequency must be positive: '{}'", s)));
        }
        let step = match unit.trim().to_ascii_lowercase().as_str() {
            "" | "min" | "mins" | "minute" | "minutes" | "t" | "m" => TimeDelta::try_minutes(count),
            "h" | "hr" | "hour" | "hours" => TimeDelta::try_hours(count),
            "s" | "sec" | "secs" | "second" | "seconds" => TimeDelta::try_seconds(count),
            "d" | "day" | "days" => TimeDelta::try_days(count),
            other => {
                return Err(TimestampError(format!(
                    "unknown frequency unit '{}' in '{}'",
                    other, s
                )))
            }
        };
        step.ok_or_else(|| TimestampError(format!("frequency out of range: '{}'", s)))
    }

    /// Render a step in the most compact unit that divides it.
    pub fn format_frequency(step: TimeDelta) -> String {
        let secs = step.num_seconds();
        if secs != 0 && secs % 86_400 == 0 {
            format!("{}d", secs / 86_400)
        } else if secs != 0 && secs % 3_600 == 0 {
            format!("{}h", secs / 3_600)
        } else if secs != 0 && secs % 60 == 0 {
            format!("{}min", secs / 60)
        } else {
            format!("{}s", secs)
        }
    }

    /// Floor a timestamp onto a multiple of `step` counted from the Unix epoch.
    ///
    /// Steps shorter than one second leave the timestamp untouched.
    pub fn floor_to_step(ts: NaiveDateTime, step: TimeDelta) -> NaiveDateTime {
        let step_secs = step.num_seconds();
        if step_secs <= 0 {
            return ts;
        }
        let secs = ts.and_utc().timestamp();
        let floored = secs.div_euclid(step_secs) * step_secs;
        DateTime::from_timestamp(floored, 0)
            .map(|dt| dt.naive_utc())
            .unwrap_or(ts)
    }

}

/// Error types
pub mod error {
    use std::fmt;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct TimestampError(pub String);

    impl fmt::Display for TimestampError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "Timestamp error: {}", self.0)
        }
    }

    impl std::error::Error for TimestampError {}
}
