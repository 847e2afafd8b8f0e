//! CSV-ready rows: base columns, correlation-enriched identity columns,
//! and per-type field columns. The caller joins values with its delimiter
//! and writes; no quoting or escaping happens here.

use std::collections::{BTreeMap, HashMap};

use crate::dataset::{Dataset, RECENT_WINDOW_SECONDS};
use crate::event::{Event, EventKind};
use crate::geo::Point;
use crate::types::EventId;

/// Columns every export carries, in order.
pub const BASE_HEADERS: [&str; 4] = ["Time", "Event", "Latitude", "Longitude"];

/// Identity and correlation columns added by extended mode.
pub const EXTENDED_HEADERS: [&str; 11] = [
    "Subscriber", "MCC", "MNC", "LAC", "CI", "LAC-CI", "RSSI", "Platform", "Model", "OS",
    "Operator",
];

/// Export shape knobs.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Adds [`EXTENDED_HEADERS`] resolved per row.
    pub extended: bool,
    /// One output per event type. Field columns keep their bare names;
    /// shared-file exports prefix them with the type instead.
    pub separate: bool,
    /// Event type names to include. Empty means all.
    pub kinds: Vec<String>,
    /// Backward window for the per-row `recent` lookups.
    pub window_seconds: f64,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            extended: false,
            separate: false,
            kinds: Vec::new(),
            window_seconds: RECENT_WINDOW_SECONDS,
        }
    }
}

/// One produced row plus the type it belongs to, so separate-mode callers
/// can route it to the right output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRow {
    pub kind: String,
    pub values: Vec<String>,
}

/// Builds header and data rows for one dataset.
///
/// Locations come from the supplied side table first, then the event's own
/// fix. The device column appears when extended columns are on or the
/// dataset combines devices.
#[derive(Debug)]
pub struct Exporter<'a> {
    dataset: &'a Dataset,
    located: &'a HashMap<EventId, Point>,
    options: ExportOptions,
    include_device: bool,
    kinds: Vec<String>,
    columns_by_kind: BTreeMap<String, Vec<String>>,
    combined_columns: Vec<String>,
    subscriber: Option<String>,
}

impl<'a> Exporter<'a> {
    #[must_use]
    pub fn new(
        dataset: &'a Dataset,
        located: &'a HashMap<EventId, Point>,
        options: ExportOptions,
    ) -> Self {
        let kinds: Vec<String> = if options.kinds.is_empty() {
            dataset.kind_names()
        } else {
            dataset
                .kind_names()
                .into_iter()
                .filter(|name| options.kinds.iter().any(|k| k == name))
                .collect()
        };

        let mut columns_by_kind = BTreeMap::new();
        for name in &kinds {
            let kind = EventKind::from_name(name);
            let columns: Vec<String> = dataset
                .sorted_of(&kind)
                .first()
                .map(|event| {
                    event
                        .fields
                        .iter()
                        .map(|(field, _)| {
                            if options.separate {
                                field.clone()
                            } else {
                                format!("{name}.{field}")
                            }
                        })
                        .collect()
                })
                .unwrap_or_default();
            columns_by_kind.insert(name.clone(), columns);
        }
        let mut combined_columns: Vec<String> =
            columns_by_kind.values().flatten().cloned().collect();
        combined_columns.sort_unstable();

        let include_device = options.extended || dataset.device().is_none();
        let subscriber = dataset
            .subscriber_ids()
            .first()
            .map(|id| id.as_str().to_string());
        Self {
            dataset,
            located,
            options,
            include_device,
            kinds,
            columns_by_kind,
            combined_columns,
            subscriber,
        }
    }

    /// Event type names this export covers, sorted.
    #[must_use]
    pub fn kinds(&self) -> &[String] {
        &self.kinds
    }

    /// The header row: for `Some(kind)` the per-type shape, for `None` the
    /// shared-file shape with every type's prefixed columns.
    #[must_use]
    pub fn header(&self, kind: Option<&str>) -> Vec<String> {
        let mut header: Vec<String> = BASE_HEADERS.iter().map(ToString::to_string).collect();
        if self.include_device {
            header.push("Device".to_string());
        }
        if self.options.extended {
            header.extend(EXTENDED_HEADERS.iter().map(ToString::to_string));
        }
        match kind {
            Some(kind) => {
                if let Some(columns) = self.columns_by_kind.get(kind) {
                    header.extend(columns.iter().cloned());
                }
            }
            None => header.extend(self.combined_columns.iter().cloned()),
        }
        header
    }

    /// Every included event as a row, in merged stream order.
    #[must_use]
    pub fn rows(&self) -> Vec<ExportRow> {
        self.dataset
            .sorted()
            .iter()
            .filter(|event| self.kinds.iter().any(|name| name == event.kind.name()))
            .map(|event| self.row(event))
            .collect()
    }

    fn row(&self, event: &Event) -> ExportRow {
        let name = event.kind.name().to_string();
        let mut values = self.base_values(event);
        if self.options.extended {
            values.extend(self.extended_values(event));
        }
        let columns = if self.options.separate {
            self.columns_by_kind.get(&name).map_or(&[][..], Vec::as_slice)
        } else {
            &self.combined_columns
        };
        for column in columns {
            values.push(
                event
                    .field(column)
                    .map(ToString::to_string)
                    .unwrap_or_default(),
            );
        }
        ExportRow { kind: name, values }
    }

    fn base_values(&self, event: &Event) -> Vec<String> {
        let location = self
            .located
            .get(&event.id)
            .copied()
            .or(event.location);
        let (latitude, longitude) = location.map_or_else(
            || (String::new(), String::new()),
            |point| (point.latitude.to_string(), point.longitude.to_string()),
        );
        let mut values = vec![
            event.time_key(),
            event.kind.name().to_string(),
            latitude,
            longitude,
        ];
        if self.include_device {
            values.push(event.device.as_str().to_string());
        }
        values
    }

    fn extended_values(&self, event: &Event) -> Vec<String> {
        EXTENDED_HEADERS
            .iter()
            .map(|header| match *header {
                "Subscriber" => self.subscriber.clone().unwrap_or_default(),
                "RSSI" => self.recent_text(event, "signal.strength"),
                "LAC" => self.recent_text(event, "service.lac"),
                "CI" => self.recent_text(event, "service.cell_id"),
                "LAC-CI" => format!(
                    "{}-{}",
                    self.recent_text(event, "service.lac"),
                    self.recent_text(event, "service.cell_id")
                ),
                "MCC" => self.metadata_or_recent(event, "MCC", "service.mcc"),
                "MNC" => self.metadata_or_recent(event, "MNC", "service.mnc"),
                "Operator" => self.metadata_text("carrierName"),
                other => self.metadata_text(other),
            })
            .collect()
    }

    fn recent_text(&self, event: &Event, key: &str) -> String {
        self.dataset
            .recent(event, key, self.options.window_seconds)
            .map(|value| value.to_string())
            .unwrap_or_default()
    }

    fn metadata_text(&self, key: &str) -> String {
        self.dataset.metadata(key).unwrap_or_default().to_string()
    }

    fn metadata_or_recent(&self, event: &Event, metadata_key: &str, recent_key: &str) -> String {
        self.dataset.metadata(metadata_key).map_or_else(
            || self.recent_text(event, recent_key),
            ToString::to_string,
        )
    }
}
