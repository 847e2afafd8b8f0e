//! Cross-source merge into one sorted event stream, plus the backward
//! "most recent value" and nearest-fix correlation queries over it.

use std::cell::{OnceCell, RefCell};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::event::{ErrorCounts, ErrorTag, Event, EventKind, FieldValue};
use crate::geo::{LocationFilter, Point};
use crate::range::DateRanges;
use crate::reader::CaptureError;
use crate::source::{AcceptBounds, Source};
use crate::types::{DeviceId, EventId, SourceId, SubscriberId};

/// Default backward window for [`Dataset::recent`], in seconds.
pub const RECENT_WINDOW_SECONDS: f64 = 86_400.0;

/// Default window for [`Dataset::locate_events`], in seconds.
pub const LOCATE_WINDOW_SECONDS: f64 = 60.0;

/// What one dataset groups by: a single device, or everything combined.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DatasetKey {
    Device(DeviceId),
    Combined,
}

impl fmt::Display for DatasetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device(device) => write!(f, "{device}"),
            Self::Combined => write!(f, "all"),
        }
    }
}

/// Knobs applied to every dataset built in one batch.
#[derive(Debug, Clone, Default)]
pub struct DatasetOptions {
    /// Keep only events whose time falls in one of these ranges. `None`
    /// means unrestricted.
    pub time_range: Option<DateRanges>,
    /// Spatial gate applied to GPS events at merge time. Non-GPS events are
    /// never location-filtered here.
    pub location: LocationFilter,
    /// Start-time bounds a source must satisfy to join any dataset.
    pub accept: AcceptBounds,
    /// Merge every device under one [`DatasetKey::Combined`] dataset.
    pub combine_all: bool,
}

/// The lazily built merge product: events in key order plus a position
/// index for backward scans.
#[derive(Debug)]
struct SortedView {
    events: Vec<Arc<Event>>,
    index: HashMap<EventId, usize>,
    collisions: u64,
}

/// Merged, filtered, sorted view over one or more [`Source`]s.
///
/// Queries build their caches lazily behind interior mutability, so the
/// dataset is deliberately not `Sync`; independent datasets can still move
/// to worker threads.
#[derive(Debug)]
pub struct Dataset {
    key: DatasetKey,
    sources: Vec<Source>,
    time_range: Option<DateRanges>,
    location: LocationFilter,
    view: OnceCell<SortedView>,
    kinds: RefCell<HashMap<EventKind, Arc<[Arc<Event>]>>>,
    memo: RefCell<HashMap<(EventId, String), Option<FieldValue>>>,
}

impl Dataset {
    #[must_use]
    pub fn new(key: DatasetKey) -> Self {
        Self {
            key,
            sources: Vec::new(),
            time_range: None,
            location: LocationFilter::Everywhere,
            view: OnceCell::new(),
            kinds: RefCell::new(HashMap::new()),
            memo: RefCell::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_options(key: DatasetKey, options: &DatasetOptions) -> Self {
        let mut dataset = Self::new(key);
        dataset.time_range = options.time_range.clone();
        dataset.location = options.location.clone();
        dataset
    }

    /// Appends a source and invalidates every cached view.
    pub fn add(&mut self, source: Source) {
        self.sources.push(source);
        self.invalidate();
    }

    pub fn set_time_range(&mut self, range: Option<DateRanges>) {
        self.time_range = range;
        self.invalidate();
    }

    pub fn set_location(&mut self, location: LocationFilter) {
        self.location = location;
        self.invalidate();
    }

    fn invalidate(&mut self) {
        self.view.take();
        self.kinds.get_mut().clear();
        self.memo.get_mut().clear();
    }

    #[must_use]
    pub const fn key(&self) -> &DatasetKey {
        &self.key
    }

    #[must_use]
    pub const fn device(&self) -> Option<&DeviceId> {
        match &self.key {
            DatasetKey::Device(device) => Some(device),
            DatasetKey::Combined => None,
        }
    }

    #[must_use]
    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    #[must_use]
    pub fn file_count(&self) -> usize {
        self.sources.len()
    }

    /// The merged stream, sorted by millisecond time key plus type name.
    #[must_use]
    pub fn sorted(&self) -> &[Arc<Event>] {
        &self.view().events
    }

    /// Position of an event in [`Self::sorted`], if it survived filtering
    /// and merge collisions.
    #[must_use]
    pub fn index_of(&self, id: EventId) -> Option<usize> {
        self.view().index.get(&id).copied()
    }

    /// The merged stream narrowed to one kind, cached per kind.
    #[must_use]
    pub fn sorted_of(&self, kind: &EventKind) -> Arc<[Arc<Event>]> {
        if let Some(cached) = self.kinds.borrow().get(kind) {
            return Arc::clone(cached);
        }
        let filtered: Arc<[Arc<Event>]> = self
            .view()
            .events
            .iter()
            .filter(|event| &event.kind == kind)
            .cloned()
            .collect();
        self.kinds
            .borrow_mut()
            .insert(kind.clone(), Arc::clone(&filtered));
        filtered
    }

    /// Distinct event type names in the merged stream, sorted.
    #[must_use]
    pub fn kind_names(&self) -> Vec<String> {
        let names: BTreeSet<&str> = self
            .view()
            .events
            .iter()
            .map(|event| event.kind.name())
            .collect();
        names.into_iter().map(ToString::to_string).collect()
    }

    #[must_use]
    pub fn event_count(&self) -> usize {
        self.view().events.len()
    }

    #[must_use]
    pub fn first(&self) -> Option<&Arc<Event>> {
        self.view().events.first()
    }

    #[must_use]
    pub fn last(&self) -> Option<&Arc<Event>> {
        self.view().events.last()
    }

    /// Latest value of `key` (`"<type>.<field>"`) at or before `event`, for
    /// the same device, looking back at most `window_seconds` (a window of
    /// zero or less means unlimited). Memoized per `(event, key)`.
    #[must_use]
    pub fn recent(&self, event: &Event, key: &str, window_seconds: f64) -> Option<FieldValue> {
        let memo_key = (event.id, key.to_string());
        if let Some(cached) = self.memo.borrow().get(&memo_key) {
            return cached.clone();
        }
        let value = self.recent_uncached(event, key, window_seconds);
        self.memo.borrow_mut().insert(memo_key, value.clone());
        value
    }

    fn recent_uncached(&self, event: &Event, key: &str, window_seconds: f64) -> Option<FieldValue> {
        let kind_name = key.split_once('.').map(|(kind, _)| kind)?;
        let view = self.view();
        let position = view.index.get(&event.id).copied()?;
        for candidate in view.events[..position].iter().rev() {
            let gap = event.gap_seconds(candidate);
            if window_seconds > 0.0 && gap > window_seconds {
                break;
            }
            if candidate.device != event.device {
                continue;
            }
            if candidate.kind.name() == kind_name {
                return candidate.field(key).cloned();
            }
        }
        None
    }

    /// Pairs every non-GPS event with the most recently seen fix of its own
    /// device, subject to the window (zero or less means unlimited). One
    /// forward pass; GPS events themselves are never entries in the result.
    #[must_use]
    pub fn locate_events(&self, window_seconds: f64) -> HashMap<EventId, Point> {
        let mut last_fix: HashMap<DeviceId, Arc<Event>> = HashMap::new();
        let mut located = HashMap::new();
        for event in self.sorted() {
            if event.kind.is_gps() {
                if event.location.is_some() {
                    last_fix.insert(event.device.clone(), Arc::clone(event));
                }
                continue;
            }
            let Some(fix) = last_fix.get(&event.device) else {
                continue;
            };
            let gap = event.gap_seconds(fix);
            if window_seconds <= 0.0 || gap < window_seconds {
                if let Some(point) = fix.location {
                    located.insert(event.id, point);
                }
            }
        }
        located
    }

    /// First non-empty metadata value across member sources, with each
    /// source's exact-then-lowercase key fallback.
    #[must_use]
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.sources
            .iter()
            .find_map(|source| source.metadata(key).filter(|value| !value.is_empty()))
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

    /// Subscriber identities seen across member sources, heaviest first
    /// (by the event count of the sources reporting them).
    #[must_use]
    pub fn subscriber_ids(&self) -> Vec<SubscriberId> {
        let mut weights: HashMap<SubscriberId, usize> = HashMap::new();
        for source in &self.sources {
            if let Some(id) = source.subscriber() {
                *weights.entry(id).or_insert(0) += source.event_count();
            }
        }
        let mut ranked: Vec<(SubscriberId, usize)> = weights.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.into_iter().map(|(id, _)| id).collect()
    }

    /// Member sources' tallies plus this dataset's own merge-collision count.
    #[must_use]
    pub fn error_counts(&self) -> ErrorCounts {
        let mut total = ErrorCounts::new();
        for source in &self.sources {
            total.merge(source.error_counts());
        }
        total.record_n(ErrorTag::MergeCollision, self.view().collisions);
        total
    }

    fn view(&self) -> &SortedView {
        self.view.get_or_init(|| self.build_view())
    }

    fn build_view(&self) -> SortedView {
        let mut merged: BTreeMap<String, Arc<Event>> = BTreeMap::new();
        let mut collisions: u64 = 0;
        for source in &self.sources {
            for events in source.events_by_kind().values() {
                for event in events {
                    if !self.admits(event) {
                        continue;
                    }
                    let key = event.merge_key();
                    if let Some(previous) = merged.insert(key.clone(), Arc::clone(event)) {
                        collisions += 1;
                        debug!(
                            key = %key,
                            dropped = %previous.id,
                            "merge key collision; keeping the later source"
                        );
                    }
                }
            }
        }
        let events: Vec<Arc<Event>> = merged.into_values().collect();
        let index = events
            .iter()
            .enumerate()
            .map(|(position, event)| (event.id, position))
            .collect();
        SortedView {
            events,
            index,
            collisions,
        }
    }

    fn admits(&self, event: &Event) -> bool {
        if let Some(ranges) = &self.time_range {
            if !ranges.includes(event.time) {
                return false;
            }
        }
        if event.kind.is_gps() && !matches!(self.location, LocationFilter::Everywhere) {
            return event
                .location
                .as_ref()
                .is_some_and(|point| self.location.includes(point));
        }
        true
    }
}

/// One batch run's datasets plus the tags for sources that joined none.
#[derive(Debug)]
pub struct Batch {
    pub datasets: Vec<Dataset>,
    pub skipped: ErrorCounts,
}

impl Batch {
    /// Every dataset's tallies merged with the batch-level skips.
    #[must_use]
    pub fn error_counts(&self) -> ErrorCounts {
        let mut total = self.skipped.clone();
        for dataset in &self.datasets {
            total.merge(&dataset.error_counts());
        }
        total
    }
}

/// Parses every path (in parallel), drops sources outside the acceptance
/// bounds with a warning, and groups the rest by device identity or under
/// one combined key.
///
/// An unreadable or unparseable file fails the whole batch; every other
/// anomaly is a tally, never an error.
pub fn make_datasets(paths: &[PathBuf], options: &DatasetOptions) -> Result<Batch, CaptureError> {
    let sources = paths
        .par_iter()
        .enumerate()
        .map(|(index, path)| {
            let id = SourceId(u32::try_from(index).unwrap_or(u32::MAX));
            Source::read(id, path)
        })
        .collect::<Result<Vec<_>, CaptureError>>()?;

    let mut skipped = ErrorCounts::new();
    let mut by_key: BTreeMap<DatasetKey, Dataset> = BTreeMap::new();
    for source in sources {
        if !source.is_valid(&options.accept) {
            warn!(
                source = %source.name(),
                start = ?source.start(),
                "rejecting source outside accepted start bounds"
            );
            skipped.record(ErrorTag::SourceRejected);
            continue;
        }
        let key = if options.combine_all {
            DatasetKey::Combined
        } else {
            DatasetKey::Device(source.device().clone())
        };
        by_key
            .entry(key.clone())
            .or_insert_with(|| Dataset::with_options(key, options))
            .add(source);
    }
    Ok(Batch {
        datasets: by_key.into_values().collect(),
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::DateRange;
    use crate::reader::{CaptureDocument, RawCapture};
    use serde_json::json;

    fn capture_from(value: serde_json::Value) -> RawCapture {
        serde_json::from_value::<CaptureDocument>(value)
            .expect("fixture deserializes")
            .capture
    }

    fn source_from(id: u32, value: serde_json::Value) -> Source {
        Source::from_capture(SourceId(id), &capture_from(value), "fixture.json")
    }

    fn gps_and_call_sources() -> (Source, Source) {
        let gps = source_from(
            0,
            json!({
                "capture": {
                    "subscriber": {
                        "imei": "352093052662768",
                        "imsi": "240080000000001",
                        "start": "2013-01-13 13:13:00 UTC"
                    },
                    "events-metadata": [{"gps": ["timeoffset", "latitude", "longitude"]}],
                    "events": [
                        {"gps": 2, "values": [0, 10.0, 20.0, 30000, 10.001, 20.001]}
                    ]
                }
            }),
        );
        let call = source_from(
            1,
            json!({
                "capture": {
                    "subscriber": {
                        "imei": "352093052662768",
                        "imsi": "240080000000001",
                        "Platform": "Android",
                        "start": "2013-01-13 13:13:00 UTC"
                    },
                    "events-metadata": [{"call": ["timeoffset", "status", "number"]}],
                    "events": [
                        {"call": 1, "values": [15000, "MT call", "5551234"]}
                    ]
                }
            }),
        );
        (gps, call)
    }

    fn device_dataset() -> Dataset {
        let (gps, call) = gps_and_call_sources();
        let device = gps.device().clone();
        let mut dataset = Dataset::new(DatasetKey::Device(device));
        dataset.add(gps);
        dataset.add(call);
        dataset
    }

    // ========== Merge and sort ==========

    #[test]
    fn sorted_merges_across_sources_in_time_order() {
        let dataset = device_dataset();
        let kinds: Vec<&str> = dataset
            .sorted()
            .iter()
            .map(|event| event.kind.name())
            .collect();
        assert_eq!(kinds, vec!["gps", "call", "gps"]);
        assert_eq!(dataset.event_count(), 3);
        assert_eq!(dataset.file_count(), 2);
        assert_eq!(dataset.kind_names(), vec!["call", "gps"]);
        assert_eq!(dataset.first().unwrap().kind, EventKind::Gps);
        assert_eq!(dataset.last().unwrap().kind, EventKind::Gps);
        for pair in dataset.sorted().windows(2) {
            assert!(pair[0].merge_key() < pair[1].merge_key());
        }
    }

    #[test]
    fn adding_identical_events_twice_only_collides() {
        let fixture = json!({
            "capture": {
                "subscriber": {"imei": "1", "start": "2013-01-13 13:13:00"},
                "events-metadata": [{"signal": ["timeoffset", "strength"]}],
                "events": [{"signal": 2, "values": [1000, -71, 2000, -72]}]
            }
        });
        let mut dataset = Dataset::new(DatasetKey::Combined);
        dataset.add(source_from(0, fixture.clone()));
        let baseline: Vec<EventId> = dataset.sorted().iter().map(|e| e.id).collect();

        dataset.add(source_from(0, fixture));
        let merged: Vec<EventId> = dataset.sorted().iter().map(|e| e.id).collect();
        assert_eq!(merged, baseline);
        assert_eq!(dataset.error_counts().count(ErrorTag::MergeCollision), 2);
    }

    #[test]
    fn filters_gate_time_for_all_and_location_for_gps_only() {
        let mut dataset = device_dataset();
        dataset.set_time_range(Some(
            DateRange::from_spec("2013-01-13").unwrap().into(),
        ));
        assert_eq!(dataset.event_count(), 3);
        dataset.set_time_range(Some(
            DateRange::from_spec("2014-06-01").unwrap().into(),
        ));
        assert_eq!(dataset.event_count(), 0);
        dataset.set_time_range(None);

        // A box far from every fix drops the GPS events but not the call.
        dataset.set_location(
            LocationFilter::from_spec("50.0,60.0,51.0,61.0").expect("flat box"),
        );
        let kinds: Vec<&str> = dataset
            .sorted()
            .iter()
            .map(|event| event.kind.name())
            .collect();
        assert_eq!(kinds, vec!["call"]);
    }

    // ========== recent() ==========

    #[test]
    fn recent_walks_back_to_same_device_value() {
        let mut dataset = device_dataset();
        dataset.add(source_from(
            2,
            json!({
                "capture": {
                    "subscriber": {"imei": "352093052662768", "start": "2013-01-13 13:13:00"},
                    "events-metadata": [{"signal": ["timeoffset", "strength"]}],
                    "events": [{"signal": 1, "values": [1000, -71]}]
                }
            }),
        ));
        let call = Arc::clone(
            dataset
                .sorted()
                .iter()
                .find(|event| event.kind == EventKind::Call)
                .unwrap(),
        );
        let strength = dataset.recent(&call, "signal.strength", RECENT_WINDOW_SECONDS);
        assert_eq!(strength.and_then(|v| v.as_f64()), Some(-71.0));
        // Memoized path returns the same answer.
        let again = dataset.recent(&call, "signal.strength", RECENT_WINDOW_SECONDS);
        assert_eq!(again.and_then(|v| v.as_f64()), Some(-71.0));
        // No service event exists anywhere behind the call.
        assert_eq!(dataset.recent(&call, "service.lac", RECENT_WINDOW_SECONDS), None);
    }

    #[test]
    fn recent_stops_at_the_window_and_skips_other_devices() {
        let mut dataset = Dataset::new(DatasetKey::Combined);
        dataset.add(source_from(
            0,
            json!({
                "capture": {
                    "subscriber": {"imei": "device-a", "start": "2013-01-13 13:13:00"},
                    "events-metadata": [
                        {"signal": ["timeoffset", "strength"]},
                        {"call": ["timeoffset", "status"]}
                    ],
                    "events": [
                        {"signal": 1, "values": [0, -71]},
                        {"call": 1, "values": [15000, "MT call"]}
                    ]
                }
            }),
        ));
        dataset.add(source_from(
            1,
            json!({
                "capture": {
                    "subscriber": {"imei": "device-b", "start": "2013-01-13 13:13:00"},
                    "events-metadata": [{"signal": ["timeoffset", "strength"]}],
                    "events": [{"signal": 1, "values": [14000, "-99"]}]
                }
            }),
        ));
        let call = Arc::clone(
            dataset
                .sorted()
                .iter()
                .find(|event| event.kind == EventKind::Call)
                .unwrap(),
        );
        // Device B's signal sits nearer in time but belongs to another device.
        let strength = dataset.recent(&call, "signal.strength", RECENT_WINDOW_SECONDS);
        assert_eq!(strength.and_then(|v| v.as_f64()), Some(-71.0));
        // A 10-second window ends the scan before device A's signal at -15s.
        assert_eq!(dataset.recent(&call, "signal.strength", 10.0), None);
        // Keys without a type prefix resolve to nothing.
        assert_eq!(dataset.recent(&call, "strength", RECENT_WINDOW_SECONDS), None);
    }

    // ========== locate_events ==========

    #[test]
    fn locate_events_assigns_nearest_prior_fix() {
        let dataset = device_dataset();
        let call = dataset
            .sorted()
            .iter()
            .find(|event| event.kind == EventKind::Call)
            .unwrap()
            .id;
        let located = dataset.locate_events(LOCATE_WINDOW_SECONDS);
        let point = located.get(&call).expect("call gains the prior fix");
        assert!((point.latitude - 10.0).abs() < f64::EPSILON);
        assert!((point.longitude - 20.0).abs() < f64::EPSILON);

        // A 10-second window excludes the fix 15 seconds back.
        assert!(dataset.locate_events(10.0).is_empty());
        // Zero means unlimited.
        assert_eq!(dataset.locate_events(0.0).len(), 1);
        // GPS events never appear in the table.
        for event in dataset.sorted() {
            if event.kind.is_gps() {
                assert!(!located.contains_key(&event.id));
            }
        }
    }

    #[test]
    fn locate_events_never_borrows_another_devices_fix() {
        let mut dataset = Dataset::new(DatasetKey::Combined);
        let (gps, _) = gps_and_call_sources();
        dataset.add(gps);
        dataset.add(source_from(
            1,
            json!({
                "capture": {
                    "subscriber": {"imei": "other-device", "start": "2013-01-13 13:13:00"},
                    "events-metadata": [{"call": ["timeoffset", "status"]}],
                    "events": [{"call": 1, "values": [15000, "MT call"]}]
                }
            }),
        ));
        assert!(dataset.locate_events(LOCATE_WINDOW_SECONDS).is_empty());
    }

    // ========== Identity surface ==========

    #[test]
    fn identity_comes_from_first_source_that_knows() {
        let dataset = device_dataset();
        assert_eq!(dataset.platform(), Some("Android"));
        assert_eq!(dataset.model(), None);
        assert_eq!(
            dataset.device().map(DeviceId::as_str),
            Some("352093052662768")
        );
    }

    #[test]
    fn subscriber_ids_rank_by_event_weight() {
        let mut dataset = Dataset::new(DatasetKey::Combined);
        dataset.add(source_from(
            0,
            json!({
                "capture": {
                    "subscriber": {"imei": "1", "imsi": "111", "start": "2013-01-13 13:13:00"},
                    "events-metadata": [{"signal": ["timeoffset", "strength"]}],
                    "events": [{"signal": 3, "values": [1000, -70, 2000, -71, 3000, -72]}]
                }
            }),
        ));
        dataset.add(source_from(
            1,
            json!({
                "capture": {
                    "subscriber": {"imei": "1", "imsi": "222", "start": "2013-01-14 13:13:00"},
                    "events-metadata": [{"signal": ["timeoffset", "strength"]}],
                    "events": [{"signal": 1, "values": [1000, -80]}]
                }
            }),
        ));
        let ids: Vec<String> = dataset
            .subscriber_ids()
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(ids, vec!["111", "222"]);
    }

    // ========== sorted_of cache ==========

    #[test]
    fn sorted_of_narrows_and_caches_per_kind() {
        let dataset = device_dataset();
        let gps = dataset.sorted_of(&EventKind::Gps);
        assert_eq!(gps.len(), 2);
        assert!(gps.iter().all(|event| event.kind.is_gps()));
        let again = dataset.sorted_of(&EventKind::Gps);
        assert!(Arc::ptr_eq(&gps, &again));
        assert!(dataset.sorted_of(&EventKind::Sms).is_empty());
    }

    // ========== make_datasets ==========

    fn write_capture(dir: &tempfile::TempDir, name: &str, value: &serde_json::Value) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, serde_json::to_vec(value).unwrap()).unwrap();
        path
    }

    #[test]
    fn make_datasets_groups_by_device_and_skips_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let first = json!({
            "capture": {
                "subscriber": {"imei": "aaa", "start": "2013-01-13 13:13:00"},
                "events-metadata": [{"signal": ["timeoffset", "strength"]}],
                "events": [{"signal": 1, "values": [1000, -71]}]
            }
        });
        let second = json!({
            "capture": {
                "subscriber": {"imei": "bbb", "start": "2013-02-01 08:00:00"},
                "events-metadata": [{"signal": ["timeoffset", "strength"]}],
                "events": [{"signal": 1, "values": [1000, -72]}]
            }
        });
        let stale = json!({
            "capture": {
                "subscriber": {"imei": "ccc", "start": "1969-12-31 23:59:59"},
                "events": []
            }
        });
        let paths = vec![
            write_capture(&dir, "a_1358082780000.json", &first),
            write_capture(&dir, "b_1359705600000.json", &second),
            write_capture(&dir, "c_0.json", &stale),
        ];

        let batch = make_datasets(&paths, &DatasetOptions::default()).unwrap();
        assert_eq!(batch.datasets.len(), 2);
        let keys: Vec<String> = batch.datasets.iter().map(|d| d.key().to_string()).collect();
        assert_eq!(keys, vec!["aaa", "bbb"]);
        assert_eq!(batch.skipped.count(ErrorTag::SourceRejected), 1);
        assert_eq!(batch.error_counts().count(ErrorTag::SourceRejected), 1);

        let combined = make_datasets(
            &paths,
            &DatasetOptions {
                combine_all: true,
                ..DatasetOptions::default()
            },
        )
        .unwrap();
        assert_eq!(combined.datasets.len(), 1);
        assert_eq!(combined.datasets[0].key(), &DatasetKey::Combined);
        assert_eq!(combined.datasets[0].file_count(), 2);
        assert_eq!(combined.datasets[0].event_count(), 2);
    }

    #[test]
    fn make_datasets_fails_on_unreadable_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, b"{\"capture\": ").unwrap();
        let result = make_datasets(&[path], &DatasetOptions::default());
        assert!(matches!(result, Err(CaptureError::Json(_))));
    }
}
