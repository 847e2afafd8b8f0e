//! Capture document decoding.
//!
//! One capture file is one JSON document: subscriber metadata, a list of
//! per-type header declarations, and per-type event blocks carrying a
//! declared record count plus a flat values array. This module only decodes
//! the container; slicing values into events is the source parser's job.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, de};
use serde_json::Value;
use thiserror::Error;

use crate::types::SECONDS_PER_DAY;

/// Buffer size for `BufReader` (64KB, capture files run to megabytes).
const BUFFER_SIZE: usize = 64 * 1024;

/// Epoch values above this are milliseconds, below it seconds. Capture
/// filenames embed either unit depending on client version.
const HUNDRED_YEARS_SECONDS: i64 = 100 * 365 * SECONDS_PER_DAY;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The top-level capture document.
#[derive(Debug, Clone, Deserialize)]
pub struct CaptureDocument {
    pub capture: RawCapture,
}

/// The decoded container, before any event construction.
#[derive(Debug, Clone, Deserialize)]
pub struct RawCapture {
    /// Arbitrary subscriber/device metadata. Known keys include `imei`,
    /// `imsi`, `Platform`, `Model`, `OS`, `start`, and `version`, but
    /// clients add operator-specific extras freely.
    #[serde(default)]
    pub subscriber: serde_json::Map<String, Value>,

    /// Header declarations: a list of single-key objects, type name to
    /// column list.
    #[serde(rename = "events-metadata", default)]
    events_metadata: Vec<HashMap<String, Vec<String>>>,

    /// Event blocks in file order.
    #[serde(default)]
    pub events: Vec<RawBlock>,
}

impl RawCapture {
    /// Flattens the single-key header declarations into one map.
    #[must_use]
    pub fn headers_by_type(&self) -> HashMap<String, Vec<String>> {
        self.events_metadata
            .iter()
            .flat_map(|entry| entry.iter().map(|(k, v)| (k.clone(), v.clone())))
            .collect()
    }

    /// A subscriber metadata value rendered as text, when present.
    #[must_use]
    pub fn subscriber_text(&self, key: &str) -> Option<String> {
        self.subscriber.get(key).map(value_text)
    }
}

/// Renders a metadata value the way it would appear in an export cell.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// One event block: `{"<type>": <declared count>, "values": [...]}`.
///
/// The type name is whichever key is not `values`; the declared count is
/// that key's value, leniently parsed (older clients wrote it as a string).
#[derive(Debug, Clone, PartialEq)]
pub struct RawBlock {
    pub type_name: String,
    pub declared_count: usize,
    pub values: Vec<Value>,
}

impl<'de> Deserialize<'de> for RawBlock {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let map = serde_json::Map::deserialize(deserializer)?;
        let mut type_name: Option<String> = None;
        let mut declared_count = 0usize;
        let mut values = Vec::new();
        for (key, value) in map {
            if key == "values" {
                values = serde_json::from_value(value).map_err(de::Error::custom)?;
            } else if type_name.is_none() {
                declared_count = lenient_count(&value);
                type_name = Some(key);
            }
        }
        let type_name =
            type_name.ok_or_else(|| de::Error::custom("event block carries no type name"))?;
        Ok(Self {
            type_name,
            declared_count,
            values,
        })
    }
}

fn lenient_count(value: &Value) -> usize {
    match value {
        Value::Number(n) => usize::try_from(n.as_u64().unwrap_or(0)).unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// Reads and decodes one capture file.
pub fn read_capture(path: &Path) -> Result<CaptureDocument, CaptureError> {
    let file = File::open(path)?;
    let reader = BufReader::with_capacity(BUFFER_SIZE, file);
    Ok(serde_json::from_reader(reader)?)
}

// ========== Start timestamp parsing ==========

/// Timezone abbreviations and names clients have been seen writing into
/// `start`, with their numeric offsets. Chrono parses offsets, not names.
const NAMED_ZONES: [(&str, &str); 16] = [
    ("UTC", "+0000"),
    ("GMT", "+0000"),
    ("WET", "+0000"),
    ("BST", "+0100"),
    ("CET", "+0100"),
    ("CEST", "+0200"),
    ("EET", "+0200"),
    ("EEST", "+0300"),
    ("EST", "-0500"),
    ("EDT", "-0400"),
    ("CST", "-0600"),
    ("CDT", "-0500"),
    ("MST", "-0700"),
    ("MDT", "-0600"),
    ("PST", "-0800"),
    ("PDT", "-0700"),
];

const NAMED_IANA_ZONES: [(&str, &str); 2] = [("Asia/Bangkok", "+0700"), ("Europe/Stockholm", "+0100")];

/// Parses a capture `start` timestamp.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[.fff]` with an optional trailing
/// named timezone, numeric offset, or `GMT±H` suffix. A bare timestamp is
/// taken as UTC. Returns `None` when nothing fits; the caller treats the
/// source as invalid rather than failing the batch.
#[must_use]
pub fn parse_start(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(time) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(time.with_timezone(&Utc));
    }

    let rewritten = rewrite_zone_suffix(trimmed);
    for format in ["%Y-%m-%d %H:%M:%S%.f %z", "%Y-%m-%d %H:%M:%S %z"] {
        if let Ok(time) = DateTime::parse_from_str(&rewritten, format) {
            return Some(time.with_timezone(&Utc));
        }
    }
    for format in [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(naive.and_utc());
        }
    }
    None
}

/// Rewrites a trailing timezone name or `GMT±H` to a numeric offset.
fn rewrite_zone_suffix(value: &str) -> String {
    for (name, offset) in NAMED_IANA_ZONES {
        if let Some(prefix) = value.strip_suffix(name) {
            return format!("{}{offset}", prefix.trim_end());
        }
    }
    for (name, offset) in NAMED_ZONES {
        if let Some(prefix) = value.strip_suffix(name) {
            // `GMT+7` carries its own offset; handled below, not here.
            let rest = prefix.trim_end();
            if rest.ends_with(|c: char| c.is_ascii_digit() || c == ':') || rest.is_empty() {
                return format!("{rest} {offset}");
            }
        }
    }
    // `GMT+7` / `UTC-3:30` style suffixes.
    for marker in ["GMT", "UTC"] {
        if let Some(pos) = value.rfind(marker) {
            let (head, tail) = value.split_at(pos);
            let tail = &tail[marker.len()..];
            if let Some(offset) = parse_hour_offset(tail) {
                return format!("{} {offset}", head.trim_end());
            }
        }
    }
    value.to_string()
}

/// Parses `+7`, `-3`, `+07:30` into a `±HHMM` offset string.
fn parse_hour_offset(tail: &str) -> Option<String> {
    let tail = tail.trim();
    let sign = match tail.chars().next()? {
        '+' => '+',
        '-' => '-',
        _ => return None,
    };
    let body = &tail[1..];
    let (hours, minutes) = match body.split_once(':') {
        Some((h, m)) => (h.parse::<u32>().ok()?, m.parse::<u32>().ok()?),
        None => (body.parse::<u32>().ok()?, 0),
    };
    if hours > 14 || minutes > 59 {
        return None;
    }
    Some(format!("{sign}{hours:02}{minutes:02}"))
}

/// Recovers a timestamp from a capture filename of the form
/// `<device>_<epoch>.<ext>`. Epochs above the hundred-years threshold are in
/// milliseconds, otherwise seconds.
#[must_use]
pub fn time_from_file_name(name: &str) -> Option<DateTime<Utc>> {
    let stem = Path::new(name.trim_matches('"'))
        .file_stem()?
        .to_str()?;
    let epoch_part = stem.rsplit('_').next()?;
    let epoch: i64 = epoch_part.parse().ok()?;
    let (seconds, millis) = if epoch > HUNDRED_YEARS_SECONDS {
        (epoch / 1000, epoch % 1000)
    } else {
        (epoch, 0)
    };
    let nanos = u32::try_from(millis).ok()? * 1_000_000;
    DateTime::from_timestamp(seconds, nanos)
}
