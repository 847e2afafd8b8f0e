//! Typed telemetry events and the per-record construction rules.
//!
//! A capture file stores each event type as a flat values array sliced into
//! fixed-width records. One [`Event`] is built per record: the `timeoffset`
//! column (milliseconds since the source start) becomes the absolute time and
//! is dropped from the field list, locale decimal commas are normalized,
//! cell ids are unwrapped modulo 65536, and GPS records parse their own fix.
//! Repairs never abort parsing; they tally [`ErrorTag`]s instead.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::Point;
use crate::types::{DeviceId, EventId};

/// Cell ids above this wrap threshold are reduced modulo it. Handsets report
/// 16-bit cell ids with higher-order routing bits folded in.
pub const CELL_ID_WRAP: i64 = 256 * 256;

/// Canonical event kinds observed in capture files.
///
/// Unknown type names are preserved as [`EventKind::Other`] and still parse
/// when the file carries their header metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    Gps,
    Service,
    Signal,
    Call,
    Sms,
    Mms,
    Data,
    Browser,
    Neighbor,
    Apps,
    Power,
    Other(Arc<str>),
}

impl EventKind {
    /// Resolves a type name once at construction; never fails.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "gps" => Self::Gps,
            "service" => Self::Service,
            "signal" => Self::Signal,
            "call" => Self::Call,
            "sms" => Self::Sms,
            "mms" => Self::Mms,
            "data" => Self::Data,
            "browser" => Self::Browser,
            "neighbor" => Self::Neighbor,
            "apps" => Self::Apps,
            "batteryState" | "power" => Self::Power,
            other => Self::Other(Arc::from(other)),
        }
    }

    /// The canonical type name as it appears in capture files.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Gps => "gps",
            Self::Service => "service",
            Self::Signal => "signal",
            Self::Call => "call",
            Self::Sms => "sms",
            Self::Mms => "mms",
            Self::Data => "data",
            Self::Browser => "browser",
            Self::Neighbor => "neighbor",
            Self::Apps => "apps",
            Self::Power => "batteryState",
            Self::Other(name) => name,
        }
    }

    /// GPS events are the only ones carrying a fix of their own.
    #[must_use]
    pub const fn is_gps(&self) -> bool {
        matches!(self, Self::Gps)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for EventKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_name(s))
    }
}

impl Serialize for EventKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from_name(&s))
    }
}

/// One field value as carried by a record: numbers stay numeric, everything
/// else is text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    /// Converts a raw JSON value, normalizing locale decimal commas in text.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Number(n) => {
                n.as_f64().map_or_else(|| Self::Text(n.to_string()), Self::Number)
            }
            serde_json::Value::String(s) => Self::Text(normalize_decimal_comma(s)),
            serde_json::Value::Bool(b) => Self::Text(b.to_string()),
            serde_json::Value::Null => Self::Text(String::new()),
            other => Self::Text(other.to_string()),
        }
    }

    /// Numeric view: numbers directly, text via parse.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }

    #[must_use]
    #[expect(clippy::cast_possible_truncation, reason = "capture values fit in i64")]
    pub fn as_i64(&self) -> Option<i64> {
        self.as_f64().map(|n| n as i64)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Number(_) => false,
            Self::Text(s) => s.is_empty(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Rewrites `12,5` to `12.5`. Only pure comma-decimal numbers are touched;
/// anything else passes through unchanged.
fn normalize_decimal_comma(s: &str) -> String {
    let mut parts = s.splitn(2, ',');
    let (Some(whole), Some(frac)) = (parts.next(), parts.next()) else {
        return s.to_string();
    };
    let whole_ok = !whole.is_empty()
        && whole
            .strip_prefix(['+', '-'])
            .unwrap_or(whole)
            .chars()
            .all(|c| c.is_ascii_digit())
        && whole.strip_prefix(['+', '-']).is_none_or(|rest| !rest.is_empty());
    let frac_ok = !frac.is_empty() && frac.chars().all(|c| c.is_ascii_digit());
    if whole_ok && frac_ok {
        format!("{whole}.{frac}")
    } else {
        s.to_string()
    }
}

/// One telemetry event. Immutable once constructed; locations assigned later
/// by correlation live in side tables keyed by [`EventId`], never here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier within the run.
    pub id: EventId,
    /// The event type, resolved once at construction.
    pub kind: EventKind,
    /// The device that recorded this event.
    pub device: DeviceId,
    /// Absolute time: source start plus the record's (repaired) offset.
    pub time: DateTime<Utc>,
    /// Remaining columns in header order. `timeoffset` is consumed.
    pub fields: Vec<(String, FieldValue)>,
    /// The event's own fix. Set only for GPS records with parseable
    /// coordinates.
    pub location: Option<Point>,
}

impl Event {
    /// Field lookup by exact name, falling back to the name with the
    /// `<type>.` prefix stripped (combined exports prefix columns by type).
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        let exact = self.fields.iter().find(|(name, _)| name == key);
        if exact.is_some() {
            return exact.map(|(_, value)| value);
        }
        let prefix = format!("{}.", self.kind.name());
        let stripped = key.strip_prefix(prefix.as_str())?;
        self.fields
            .iter()
            .find(|(name, _)| name == stripped)
            .map(|(_, value)| value)
    }

    /// Millisecond-precision time key; lexicographic order over these keys is
    /// chronological order.
    #[must_use]
    pub fn time_key(&self) -> String {
        self.time.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
    }

    /// The cross-source merge key: time key plus type name as tiebreaker.
    #[must_use]
    pub fn merge_key(&self) -> String {
        format!("{} {}", self.time_key(), self.kind.name())
    }

    /// Signed gap in seconds from `other` to `self`.
    #[must_use]
    #[expect(clippy::cast_precision_loss, reason = "millisecond gaps fit f64 exactly")]
    pub fn gap_seconds(&self, other: &Self) -> f64 {
        (self.time - other.time).num_milliseconds() as f64 / 1000.0
    }
}

/// The raw and repaired offsets of the previously built record, threaded
/// through construction so duplicate runs keep advancing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetState {
    pub raw_ms: i64,
    pub repaired_ms: i64,
}

/// Builds one event from a record slice.
///
/// Returns `None` (with a tag) when the record is unusable: a missing or
/// non-numeric `timeoffset` column. Other anomalies are repaired in place and
/// tagged.
#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    reason = "offsets and cell ids are small millisecond/16-bit integers"
)]
pub(crate) fn build_event(
    id: EventId,
    kind: &EventKind,
    device: &DeviceId,
    start: DateTime<Utc>,
    header: &[String],
    record: &[serde_json::Value],
    previous: Option<OffsetState>,
    counts: &mut ErrorCounts,
) -> Option<(Event, OffsetState)> {
    let mut offset_ms: Option<i64> = None;
    let mut fields = Vec::with_capacity(header.len().saturating_sub(1));

    for (name, raw) in header.iter().zip(record) {
        if name == "timeoffset" {
            let value = FieldValue::from_json(raw);
            match value.as_f64() {
                Some(ms) if ms.is_finite() => offset_ms = Some(ms.round() as i64),
                _ => {
                    counts.record(ErrorTag::BadNumericField);
                    return None;
                }
            }
            continue;
        }
        let mut value = FieldValue::from_json(raw);
        if name == "cell_id" || name.ends_with(".cell_id") {
            if let Some(ci) = value.as_i64() {
                if ci > CELL_ID_WRAP {
                    value = FieldValue::Number((ci % CELL_ID_WRAP) as f64);
                }
            }
        }
        fields.push((name.clone(), value));
    }

    let Some(raw_ms) = offset_ms else {
        counts.record(ErrorTag::BadNumericField);
        return None;
    };

    if raw_ms < 0 {
        counts.record(ErrorTag::NegativeOffset);
    }

    let repaired_ms = match previous {
        Some(prev) if prev.raw_ms == raw_ms => {
            counts.record(ErrorTag::DuplicateOffset);
            prev.repaired_ms + 1
        }
        _ => raw_ms,
    };

    let time = start + Duration::milliseconds(repaired_ms);
    let location = if kind.is_gps() {
        parse_own_fix(&fields).or_else(|| {
            counts.record(ErrorTag::BadNumericField);
            None
        })
    } else {
        None
    };

    let event = Event {
        id,
        kind: kind.clone(),
        device: device.clone(),
        time,
        fields,
        location,
    };
    Some((
        event,
        OffsetState {
            raw_ms,
            repaired_ms,
        },
    ))
}

fn parse_own_fix(fields: &[(String, FieldValue)]) -> Option<Point> {
    let coordinate = |key: &str| {
        fields
            .iter()
            .find(|(name, _)| name == key || name.ends_with(&format!(".{key}")))
            .and_then(|(_, value)| value.as_f64())
    };
    Some(Point::new(coordinate("latitude")?, coordinate("longitude")?))
}

// ========== Error tags ==========

/// What kind of trouble a tag reports. The taxonomy from coarse to fine:
/// categories group tags for the end-of-run report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    StructuralMismatch,
    DataCorruption,
    TemporalAnomaly,
    SourceRejected,
    CorrelationMiss,
}

impl ErrorCategory {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::StructuralMismatch => "structural_mismatch",
            Self::DataCorruption => "data_corruption",
            Self::TemporalAnomaly => "temporal_anomaly",
            Self::SourceRejected => "source_rejected",
            Self::CorrelationMiss => "correlation_miss",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A recoverable anomaly observed while parsing or merging. Tags are tallied,
/// never raised; no anomaly in this engine aborts a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorTag {
    /// An event block declared records but carried no data.
    EmptyData,
    /// A field that must be numeric did not parse; the record was skipped.
    BadNumericField,
    /// Two consecutive records in one type shared a raw offset; the second
    /// was nudged forward one millisecond.
    DuplicateOffset,
    /// A record's offset predates its source's start.
    NegativeOffset,
    /// Declared record count did not reconcile with the payload length.
    CountMismatch,
    /// No header reconciled; the event type was dropped for that file.
    HeaderDropped,
    /// A source's start time fell outside the acceptance bounds.
    SourceRejected,
    /// Two sources produced the same merge key; the later write won.
    MergeCollision,
    /// The locator found no usable fix within the window.
    CorrelationMiss,
}

impl ErrorTag {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::EmptyData => "empty_data",
            Self::BadNumericField => "bad_numeric_field",
            Self::DuplicateOffset => "duplicate_offset",
            Self::NegativeOffset => "negative_offset",
            Self::CountMismatch => "count_mismatch",
            Self::HeaderDropped => "header_dropped",
            Self::SourceRejected => "source_rejected",
            Self::MergeCollision => "merge_collision",
            Self::CorrelationMiss => "correlation_miss",
        }
    }

    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::CountMismatch | Self::HeaderDropped => ErrorCategory::StructuralMismatch,
            Self::EmptyData | Self::BadNumericField => ErrorCategory::DataCorruption,
            Self::DuplicateOffset | Self::NegativeOffset | Self::MergeCollision => {
                ErrorCategory::TemporalAnomaly
            }
            Self::SourceRejected => ErrorCategory::SourceRejected,
            Self::CorrelationMiss => ErrorCategory::CorrelationMiss,
        }
    }
}

impl fmt::Display for ErrorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tag histogram. Accumulates per source and merges upward into datasets for
/// the end-of-run report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCounts(HashMap<ErrorTag, u64>);

impl ErrorCounts {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, tag: ErrorTag) {
        *self.0.entry(tag).or_insert(0) += 1;
    }

    pub fn record_n(&mut self, tag: ErrorTag, n: u64) {
        if n > 0 {
            *self.0.entry(tag).or_insert(0) += n;
        }
    }

    #[must_use]
    pub fn count(&self, tag: ErrorTag) -> u64 {
        self.0.get(&tag).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.values().all(|&n| n == 0)
    }

    /// Folds another histogram into this one.
    pub fn merge(&mut self, other: &Self) {
        for (tag, n) in &other.0 {
            *self.0.entry(*tag).or_insert(0) += n;
        }
    }

    /// Tags with nonzero counts, sorted for stable reporting.
    #[must_use]
    pub fn entries(&self) -> Vec<(ErrorTag, u64)> {
        let mut entries: Vec<_> = self
            .0
            .iter()
            .filter(|&(_, &n)| n > 0)
            .map(|(tag, &n)| (*tag, n))
            .collect();
        entries.sort_unstable();
        entries
    }
}
