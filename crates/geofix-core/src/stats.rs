//! Per-field value histograms over a dataset, with the diversity gates the
//! charting side uses to decide what is worth drawing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::event::FieldValue;

/// Gates deciding when a field is too diverse to chart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsThresholds {
    /// Distinct-value ceiling.
    pub max_categories: usize,
    /// Percentage ceiling for `100 * distinct / total`.
    pub max_diversity: f64,
}

impl Default for StatsThresholds {
    fn default() -> Self {
        Self {
            max_categories: 500,
            max_diversity: 40.0,
        }
    }
}

/// Histogram and numeric flag for one `(type, field)` pair.
///
/// Blank values (no word character) are never counted. The numeric flag
/// holds while every counted value round-trips through an integer or float
/// parse; with no samples it stays set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldStats {
    histogram: BTreeMap<String, u64>,
    total: u64,
    non_numeric: bool,
}

impl FieldStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: &FieldValue) {
        let text = value.to_string();
        if !has_word_character(&text) {
            return;
        }
        if !is_numeric_text(&text) {
            self.non_numeric = true;
        }
        *self.histogram.entry(text).or_insert(0) += 1;
        self.total += 1;
    }

    #[must_use]
    pub fn distinct(&self) -> usize {
        self.histogram.len()
    }

    #[must_use]
    pub const fn total(&self) -> u64 {
        self.total
    }

    /// `100 * distinct / total`; zero when nothing was counted.
    #[must_use]
    #[expect(clippy::cast_precision_loss, reason = "histogram sizes are small")]
    pub fn diversity(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        100.0 * self.distinct() as f64 / self.total as f64
    }

    #[must_use]
    pub fn is_diverse(&self, thresholds: &StatsThresholds) -> bool {
        self.distinct() > thresholds.max_categories || self.diversity() > thresholds.max_diversity
    }

    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        !self.non_numeric
    }

    #[must_use]
    pub const fn histogram(&self) -> &BTreeMap<String, u64> {
        &self.histogram
    }

    /// Histogram entries ordered by numeric value where values parse, then
    /// lexically. Chart axes expect `-110` before `-71` before `-9`.
    #[must_use]
    pub fn entries(&self) -> Vec<(&str, u64)> {
        let mut entries: Vec<(&str, u64)> = self
            .histogram
            .iter()
            .map(|(value, count)| (value.as_str(), *count))
            .collect();
        entries.sort_by(|a, b| {
            let left = a.0.parse::<f64>().unwrap_or(0.0);
            let right = b.0.parse::<f64>().unwrap_or(0.0);
            left.total_cmp(&right).then_with(|| a.0.cmp(b.0))
        });
        entries
    }
}

/// Histograms for every `(type name, field name)` pair in the merged
/// stream.
#[must_use]
pub fn collect_stats(dataset: &Dataset) -> BTreeMap<(String, String), FieldStats> {
    let mut stats: BTreeMap<(String, String), FieldStats> = BTreeMap::new();
    for event in dataset.sorted() {
        for (name, value) in &event.fields {
            stats
                .entry((event.kind.name().to_string(), name.clone()))
                .or_default()
                .add(value);
        }
    }
    stats
}

fn has_word_character(text: &str) -> bool {
    text.chars().any(|c| c.is_alphanumeric() || c == '_')
}

/// Round-trip check: the text is numeric when parsing and re-printing it
/// reproduces the original.
fn is_numeric_text(text: &str) -> bool {
    let integer = text
        .parse::<i64>()
        .is_ok_and(|value| value.to_string() == text);
    let float = || {
        text.parse::<f64>()
            .is_ok_and(|value| value.to_string() == text)
    };
    integer || float()
}
