//! One decoded capture file: identity, validity, and its parsed events.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::event::{ErrorCounts, ErrorTag, Event, EventKind, OffsetState, build_event};
use crate::headers::{known_header, resolve_header};
use crate::reader::{self, CaptureError, RawCapture};
use crate::types::{DeviceId, EventId, SourceId, SubscriberId};

/// Sources whose start year falls outside this span are corrupt beyond use,
/// regardless of configuration. Device clocks have been seen at both ends.
const SANE_YEARS: std::ops::RangeInclusive<i32> = 1970..=2040;

/// The narrower "good data" window a start time must land in for the source
/// to join a dataset. Configurable, unlike the sane bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptBounds {
    pub min_start: DateTime<Utc>,
    pub max_start: DateTime<Utc>,
}

impl Default for AcceptBounds {
    fn default() -> Self {
        Self {
            min_start: Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap(),
            max_start: Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
        }
    }
}

impl AcceptBounds {
    #[must_use]
    pub fn includes(&self, start: DateTime<Utc>) -> bool {
        start >= self.min_start && start <= self.max_start
    }
}

/// One capture file after parsing. Immutable once constructed; datasets
/// share its events by reference count.
#[derive(Debug)]
pub struct Source {
    id: SourceId,
    name: String,
    device: DeviceId,
    start: Option<DateTime<Utc>>,
    version: Option<String>,
    metadata: HashMap<String, String>,
    events: HashMap<EventKind, Vec<Arc<Event>>>,
    first: Option<Arc<Event>>,
    last: Option<Arc<Event>>,
    event_count: usize,
    counts: ErrorCounts,
}

impl Source {
    /// Reads and parses one capture file.
    pub fn read(id: SourceId, path: &Path) -> Result<Self, CaptureError> {
        let document = reader::read_capture(path)?;
        let name = path.display().to_string();
        Ok(Self::from_capture(id, &document.capture, &name))
    }

    /// Parses an already-decoded capture.
    ///
    /// Never fails: anomalies tally [`ErrorTag`]s, and a source whose start
    /// time is missing or unreadable simply parses to zero events and fails
    /// [`Self::is_valid`].
    #[must_use]
    pub fn from_capture(id: SourceId, capture: &RawCapture, name: &str) -> Self {
        let metadata: HashMap<String, String> = capture
            .subscriber
            .keys()
            .filter_map(|key| {
                capture
                    .subscriber_text(key)
                    .map(|value| (key.clone(), value))
            })
            .collect();

        let device = metadata
            .get("imei")
            .and_then(|imei| DeviceId::new(imei.clone()).ok())
            .unwrap_or_else(DeviceId::unknown);
        let version = metadata.get("version").cloned();
        let start = metadata.get("start").and_then(|raw| reader::parse_start(raw));

        let mut source = Self {
            id,
            name: name.to_string(),
            device,
            start,
            version,
            metadata,
            events: HashMap::new(),
            first: None,
            last: None,
            event_count: 0,
            counts: ErrorCounts::new(),
        };
        if let Some(start) = source.start {
            source.build_events(capture, start);
        }
        source
    }

    fn build_events(&mut self, capture: &RawCapture, start: DateTime<Utc>) {
        let headers = capture.headers_by_type();
        let mut sequence: u32 = 0;

        for block in &capture.events {
            let kind = EventKind::from_name(&block.type_name);

            if block.declared_count > 0 && block.values.is_empty() {
                self.counts.record(ErrorTag::EmptyData);
                warn!(source = %self.name, kind = %kind, "event block declared records but carried none");
                continue;
            }

            let metadata_header = headers.get(&block.type_name).map(Vec::as_slice);
            let Some(resolved) = resolve_header(
                &kind,
                metadata_header,
                block.declared_count,
                &block.values,
            ) else {
                // A count mismatch only exists when some header was on hand.
                if metadata_header.is_some() || known_header(&kind).is_some() {
                    self.counts.record(ErrorTag::CountMismatch);
                }
                self.counts.record(ErrorTag::HeaderDropped);
                warn!(
                    source = %self.name,
                    kind = %kind,
                    declared = block.declared_count,
                    values = block.values.len(),
                    "no header reconciles; dropping event type for this file"
                );
                continue;
            };
            if resolved.recovered_by.is_some() {
                self.counts.record(ErrorTag::CountMismatch);
            }

            let width = resolved.columns.len();
            let mut list: Vec<Arc<Event>> = Vec::with_capacity(resolved.count);
            let mut previous: Option<OffsetState> = None;
            for record in block.values.chunks_exact(width).take(resolved.count) {
                let event_id = EventId::new(self.id, sequence);
                sequence += 1;
                let Some((event, state)) = build_event(
                    event_id,
                    &kind,
                    &self.device,
                    start,
                    &resolved.columns,
                    record,
                    previous,
                    &mut self.counts,
                ) else {
                    continue;
                };
                previous = Some(state);
                let event = Arc::new(event);
                if self.first.as_ref().is_none_or(|f| event.time < f.time) {
                    self.first = Some(Arc::clone(&event));
                }
                if self.last.as_ref().is_none_or(|l| event.time > l.time) {
                    self.last = Some(Arc::clone(&event));
                }
                list.push(event);
            }
            self.event_count += list.len();
            self.events.entry(kind).or_default().extend(list);
        }
    }

    #[must_use]
    pub const fn id(&self) -> SourceId {
        self.id
    }

    /// Diagnostic name, usually the file path.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn device(&self) -> &DeviceId {
        &self.device
    }

    #[must_use]
    pub const fn start(&self) -> Option<DateTime<Utc>> {
        self.start
    }

    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Metadata lookup by exact key, falling back to the lowercased key.
    #[must_use]
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .or_else(|| self.metadata.get(&key.to_lowercase()))
            .map(String::as_str)
    }

    #[must_use]
    pub fn subscriber(&self) -> Option<SubscriberId> {
        self.metadata("imsi")
            .and_then(|imsi| SubscriberId::new(imsi).ok())
    }

    #[must_use]
    pub fn platform(&self) -> Option<&str> {
        self.metadata("Platform")
    }

    #[must_use]
    pub fn model(&self) -> Option<&str> {
        self.metadata("Model")
    }

    #[must_use]
    pub fn os_version(&self) -> Option<&str> {
        self.metadata("OS")
    }

    /// True when the start time exists, is sane, and lands in the acceptance
    /// window. Gates inclusion into any dataset.
    #[must_use]
    pub fn is_valid(&self, accept: &AcceptBounds) -> bool {
        self.start
            .is_some_and(|start| SANE_YEARS.contains(&start.year()) && accept.includes(start))
    }

    #[must_use]
    pub const fn events_by_kind(&self) -> &HashMap<EventKind, Vec<Arc<Event>>> {
        &self.events
    }

    #[must_use]
    pub fn events_of(&self, kind: &EventKind) -> &[Arc<Event>] {
        self.events.get(kind).map_or(&[], Vec::as_slice)
    }

    /// Event type names present in this file, sorted.
    #[must_use]
    pub fn kind_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.events.keys().map(|k| k.name().to_string()).collect();
        names.sort_unstable();
        names
    }

    /// Total events built across all types.
    #[must_use]
    pub const fn event_count(&self) -> usize {
        self.event_count
    }

    /// Earliest event by time.
    #[must_use]
    pub const fn first(&self) -> Option<&Arc<Event>> {
        self.first.as_ref()
    }

    /// Latest event by time.
    #[must_use]
    pub const fn last(&self) -> Option<&Arc<Event>> {
        self.last.as_ref()
    }

    #[must_use]
    pub const fn error_counts(&self) -> &ErrorCounts {
        &self.counts
    }
}
