//! Time-range predicates for filtering merged event streams.
//!
//! A [`DateRange`] is a closed interval over UTC timestamps. [`DateRanges`]
//! is a union: a time is included when any member range includes it. Both
//! parse from the option grammar `min..max`, where each bound is a date or a
//! date-time and a bare date expands to the whole day.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from parsing range filters.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RangeParseError {
    /// The filter string was empty.
    #[error("empty range filter")]
    Empty,

    /// A bound could not be parsed as a date or date-time.
    #[error("unparseable time bound: {value}")]
    BadBound { value: String },

    /// The filter did not split into the expected bounds.
    #[error("expected `min..max` or a single day, got: {value}")]
    BadShape { value: String },
}

/// Parses a UTC timestamp from the formats accepted in range filters.
///
/// Accepts `YYYY-MM-DD HH:MM:SS[.fff]`, `YYYY-MM-DDTHH:MM:SS[.fff]`,
/// `YYYY-MM-DD HH:MM`, and bare dates (taken as midnight).
pub fn parse_time_utc(value: &str) -> Result<DateTime<Utc>, RangeParseError> {
    let value = value.trim();
    const FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    for format in FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }
    Err(RangeParseError::BadBound {
        value: value.to_string(),
    })
}

/// A closed interval over UTC timestamps. Both ends are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub min: DateTime<Utc>,
    pub max: DateTime<Utc>,
}

impl DateRange {
    /// Creates a range from two bounds, swapping them if given in reverse.
    #[must_use]
    pub fn new(min: DateTime<Utc>, max: DateTime<Utc>) -> Self {
        if min > max {
            Self { min: max, max: min }
        } else {
            Self { min, max }
        }
    }

    /// Covers one whole day, from midnight to the last millisecond.
    #[must_use]
    pub fn day(start: DateTime<Utc>) -> Self {
        Self::new(start, start + Duration::days(1) - Duration::milliseconds(1))
    }

    /// True when `time` lies within the closed interval.
    #[must_use]
    pub fn includes(&self, time: DateTime<Utc>) -> bool {
        time >= self.min && time <= self.max
    }

    /// Parses `min..max` or a single day.
    pub fn from_spec(spec: &str) -> Result<Self, RangeParseError> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(RangeParseError::Empty);
        }
        if let Some((lo, hi)) = spec.split_once("..") {
            return Ok(Self::new(parse_time_utc(lo)?, parse_time_utc(hi)?));
        }
        if let Some((lo, hi)) = spec.split_once(',') {
            return Ok(Self::new(parse_time_utc(lo)?, parse_time_utc(hi)?));
        }
        // A single bound means the whole day (or instant) it names.
        let start = parse_time_utc(spec)?;
        Ok(Self::day(start))
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}..{}",
            self.min.format("%Y-%m-%d %H:%M:%S"),
            self.max.format("%Y-%m-%d %H:%M:%S")
        )
    }
}

/// A union of [`DateRange`]s with any-member-contains semantics.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DateRanges(Vec<DateRange>);

impl DateRanges {
    #[must_use]
    pub fn new(ranges: Vec<DateRange>) -> Self {
        Self(ranges)
    }

    /// True when any member range includes `time`.
    #[must_use]
    pub fn includes(&self, time: DateTime<Utc>) -> bool {
        self.0.iter().any(|range| range.includes(time))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn ranges(&self) -> &[DateRange] {
        &self.0
    }

    /// Parses a `;`-separated union of range filters.
    pub fn from_spec(spec: &str) -> Result<Self, RangeParseError> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(RangeParseError::Empty);
        }
        spec.split(';')
            .map(DateRange::from_spec)
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

impl From<DateRange> for DateRanges {
    fn from(range: DateRange) -> Self {
        Self(vec![range])
    }
}

impl std::str::FromStr for DateRanges {
    type Err = RangeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_spec(s)
    }
}
