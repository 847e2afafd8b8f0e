//! Header resolution for event blocks.
//!
//! Capture files declare, per event type, a header (column list) and a record
//! count; the payload must slice evenly into `header.len() * count` values.
//! Devices in the field disagree with that contract often enough that
//! resolution runs a chain of recovery strategies before giving up:
//!
//! 1. the file's own metadata header (or the built-in table when absent),
//! 2. the doubled-record-count correction for the one type known to double
//!    its declared count,
//! 3. a search through alternate headers from older client versions, gated
//!    by a numeric plausibility check on the time-offset column.
//!
//! Resolution is pure; the caller tallies error tags from the outcome.

use serde_json::Value;
use tracing::debug;

use crate::event::EventKind;

/// Records sampled for the time-offset plausibility check.
const SAMPLE_RECORDS: usize = 10;

/// Built-in headers for capture client versions that omit metadata.
pub(crate) fn known_header(kind: &EventKind) -> Option<&'static [&'static str]> {
    let header: &[&str] = match kind {
        EventKind::Gps => &[
            "timeoffset",
            "latitude",
            "longitude",
            "altitude",
            "accuracy",
            "direction",
            "speed",
        ],
        EventKind::Service => &["timeoffset", "mcc", "mnc", "lac", "cell_id"],
        EventKind::Signal => &["timeoffset", "strength", "rxqual"],
        EventKind::Call => &["timeoffset", "status", "number"],
        EventKind::Sms => &["timeoffset", "status", "number"],
        EventKind::Mms => &["timeoffset", "status", "action", "size"],
        EventKind::Data => &["timeoffset", "rxbytes", "txbytes"],
        EventKind::Browser => &["timeoffset", "url", "error"],
        EventKind::Neighbor => &["timeoffset", "cell_id", "lac", "rssi"],
        EventKind::Apps => &["timeoffset", "package", "state"],
        EventKind::Power => &["timeoffset", "state", "charge"],
        EventKind::Other(_) => return None,
    };
    Some(header)
}

/// Alternate headers shipped by older client versions, tried in order.
pub(crate) fn alternate_headers(kind: &EventKind) -> &'static [&'static [&'static str]] {
    match kind {
        EventKind::Gps => &[
            &[
                "timeoffset",
                "latitude",
                "longitude",
                "altitude",
                "accuracy",
                "direction",
                "speed",
                "battery",
            ],
            &["timeoffset", "latitude", "longitude"],
        ],
        EventKind::Service => &[
            &["timeoffset", "plmn", "cell_id", "lac"],
            &["timeoffset", "mcc", "mnc", "lac", "cell_id", "roaming"],
        ],
        EventKind::Signal => &[&["timeoffset", "strength"]],
        EventKind::Call => &[&["timeoffset", "status", "number", "duration"]],
        EventKind::Data => &[
            &["timeoffset", "rxbytes", "txbytes", "rxpackets", "txpackets"],
            &["timeoffset", "traffic"],
        ],
        _ => &[],
    }
}

/// A successfully resolved header for one event block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResolvedHeader {
    /// Column names, in record order.
    pub columns: Vec<String>,
    /// Record count to slice, after any correction.
    pub count: usize,
    /// Name of the recovery strategy that reconciled the block, when the
    /// declared shape did not.
    pub recovered_by: Option<&'static str>,
}

/// The shape mismatch handed to recovery strategies.
#[derive(Debug)]
pub(crate) struct HeaderProblem<'a> {
    pub kind: &'a EventKind,
    pub declared: &'a [String],
    pub declared_count: usize,
    pub values: &'a [Value],
}

/// One recovery strategy. Strategies are tried in a fixed order and must not
/// have side effects; each is testable on its own.
pub(crate) trait HeaderRecovery {
    fn name(&self) -> &'static str;
    fn attempt(&self, problem: &HeaderProblem<'_>) -> Option<ResolvedHeader>;
}

/// One client release doubled the declared count of its bulk `data` blocks.
/// Halving reconciles exactly; no other type gets this correction.
struct DoubledCount;

impl HeaderRecovery for DoubledCount {
    fn name(&self) -> &'static str {
        "doubled_count"
    }

    fn attempt(&self, problem: &HeaderProblem<'_>) -> Option<ResolvedHeader> {
        if *problem.kind != EventKind::Data || problem.declared.is_empty() {
            return None;
        }
        let halved = problem.declared_count / 2;
        if problem.declared_count % 2 == 0
            && halved > 0
            && problem.declared.len() * halved == problem.values.len()
        {
            Some(ResolvedHeader {
                columns: problem.declared.to_vec(),
                count: halved,
                recovered_by: Some(self.name()),
            })
        } else {
            None
        }
    }
}

/// Tries alternate headers whose width reconciles with the declared count,
/// accepting the first whose time-offset column looks numeric over a sample
/// of records.
struct AlternateSearch;

impl HeaderRecovery for AlternateSearch {
    fn name(&self) -> &'static str {
        "alternate_header"
    }

    fn attempt(&self, problem: &HeaderProblem<'_>) -> Option<ResolvedHeader> {
        for alt in alternate_headers(problem.kind) {
            if alt.len() * problem.declared_count != problem.values.len() {
                continue;
            }
            if !offsets_look_numeric(problem.values, alt.len(), problem.declared_count) {
                continue;
            }
            return Some(ResolvedHeader {
                columns: alt.iter().map(ToString::to_string).collect(),
                count: problem.declared_count,
                recovered_by: Some(self.name()),
            });
        }
        None
    }
}

/// True when the first column of the leading sample records parses as a
/// number. A header of the right width zipped against the wrong columns
/// almost always puts text here.
fn offsets_look_numeric(values: &[Value], width: usize, count: usize) -> bool {
    if width == 0 {
        return false;
    }
    (0..count.min(SAMPLE_RECORDS)).all(|record| {
        values.get(record * width).is_some_and(|value| match value {
            Value::Number(_) => true,
            Value::String(s) => s.trim().replace(',', ".").parse::<f64>().is_ok(),
            _ => false,
        })
    })
}

static STRATEGIES: [&(dyn HeaderRecovery + Sync); 2] = [&DoubledCount, &AlternateSearch];

/// Resolves the header for one event block.
///
/// Returns `None` when no header reconciles; the caller drops the type for
/// this file and tags it. A `Some` with `recovered_by` set means the declared
/// shape was wrong but a strategy repaired it.
pub(crate) fn resolve_header(
    kind: &EventKind,
    metadata_header: Option<&[String]>,
    declared_count: usize,
    values: &[Value],
) -> Option<ResolvedHeader> {
    let owned_known: Vec<String>;
    let declared: &[String] = match metadata_header {
        Some(header) => header,
        None => {
            owned_known = known_header(kind)?
                .iter()
                .map(ToString::to_string)
                .collect();
            &owned_known
        }
    };

    if !declared.is_empty() && declared.len() * declared_count == values.len() {
        return Some(ResolvedHeader {
            columns: declared.to_vec(),
            count: declared_count,
            recovered_by: None,
        });
    }

    let problem = HeaderProblem {
        kind,
        declared,
        declared_count,
        values,
    };
    for strategy in STRATEGIES {
        if let Some(resolved) = strategy.attempt(&problem) {
            debug!(
                kind = %kind,
                strategy = resolved.recovered_by.unwrap_or("declared"),
                count = resolved.count,
                "header recovered"
            );
            return Some(resolved);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(columns: &[&str]) -> Vec<String> {
        columns.iter().map(ToString::to_string).collect()
    }

    fn numeric_values(width: usize, count: usize) -> Vec<Value> {
        (0..width * count).map(Value::from).collect()
    }

    #[test]
    fn declared_shape_passes_straight_through() {
        let header = strings(&["timeoffset", "status", "number"]);
        let values = numeric_values(3, 4);
        let resolved =
            resolve_header(&EventKind::Call, Some(&header), 4, &values).expect("reconciles");
        assert_eq!(resolved.columns, header);
        assert_eq!(resolved.count, 4);
        assert!(resolved.recovered_by.is_none());
    }

    #[test]
    fn known_table_backs_missing_metadata() {
        let width = known_header(&EventKind::Signal).unwrap().len();
        let values = numeric_values(width, 2);
        let resolved = resolve_header(&EventKind::Signal, None, 2, &values).expect("reconciles");
        assert_eq!(resolved.columns[0], "timeoffset");
        assert_eq!(resolved.count, 2);
    }

    #[test]
    fn unknown_kind_without_metadata_is_dropped() {
        let kind = EventKind::from_name("roundtrip");
        let values = numeric_values(2, 2);
        assert!(resolve_header(&kind, None, 2, &values).is_none());
    }

    #[test]
    fn doubled_count_is_halved_for_data_kind() {
        let header = strings(&["timeoffset", "rxbytes", "txbytes"]);
        // Declared 8 records, payload holds 4.
        let values = numeric_values(3, 4);
        let resolved =
            resolve_header(&EventKind::Data, Some(&header), 8, &values).expect("recovers");
        assert_eq!(resolved.count, 4);
        assert_eq!(resolved.recovered_by, Some("doubled_count"));
    }

    #[test]
    fn doubled_count_does_not_apply_to_other_kinds() {
        let header = strings(&["timeoffset", "status", "number"]);
        let values = numeric_values(3, 4);
        // Call has an alternate of width 4, which cannot reconcile 12 values
        // against count 8 either, so resolution fails outright.
        assert!(resolve_header(&EventKind::Call, Some(&header), 8, &values).is_none());
    }

    #[test]
    fn alternate_header_matches_by_width() {
        let header = strings(&["timeoffset", "status", "number"]);
        // Payload is 4 columns wide: the older call header with duration.
        let values = numeric_values(4, 3);
        let resolved =
            resolve_header(&EventKind::Call, Some(&header), 3, &values).expect("recovers");
        assert_eq!(resolved.columns.len(), 4);
        assert_eq!(resolved.columns[3], "duration");
        assert_eq!(resolved.recovered_by, Some("alternate_header"));
    }

    #[test]
    fn alternate_header_rejects_text_offsets() {
        let header = strings(&["timeoffset", "status", "number"]);
        let mut values = numeric_values(4, 3);
        values[0] = Value::from("not a number");
        assert!(resolve_header(&EventKind::Call, Some(&header), 3, &values).is_none());
    }

    #[test]
    fn alternate_header_accepts_comma_decimal_offsets() {
        let problem_values: Vec<Value> = vec![
            Value::from("1000,5"),
            Value::from("up"),
            Value::from("1001,5"),
            Value::from("down"),
        ];
        let resolved = AlternateSearch.attempt(&HeaderProblem {
            kind: &EventKind::Data,
            declared: &strings(&["timeoffset", "rxbytes", "txbytes"]),
            declared_count: 2,
            values: &problem_values,
        });
        assert_eq!(
            resolved.expect("width 2 alternate").columns,
            strings(&["timeoffset", "traffic"])
        );
    }

    #[test]
    fn irreconcilable_shape_is_dropped() {
        let header = strings(&["timeoffset", "strength"]);
        let values = numeric_values(2, 3);
        // Declared 5 records over a 6-value payload: nothing fits.
        assert!(resolve_header(&EventKind::Signal, Some(&header), 5, &values).is_none());
    }
}
