//! Location assignment for non-GPS events from nearby fixes.
//!
//! A single forward pass over a sorted stream links every non-GPS event to
//! the fix before it and, once the following fix arrives, back-fills the
//! link to the fix after it. The chosen algorithm then turns those links
//! into a point, or the event lands in `failed`.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::dataset::LOCATE_WINDOW_SECONDS;
use crate::event::Event;
use crate::geo::Point;
use crate::types::{DeviceId, EventId};

/// How to turn previous/next fix links into one location.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LocatorAlgorithm {
    /// Only the previous fix counts.
    Before,
    /// Only the next fix counts.
    After,
    /// Whichever fix is nearer in time; on an exact tie, the previous one.
    #[default]
    Closest,
    /// Time-weighted average of both fixes, falling back to `Closest` when
    /// only one side exists.
    Interpolate,
}

impl LocatorAlgorithm {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Before => "before",
            Self::After => "after",
            Self::Closest => "closest",
            Self::Interpolate => "interpolate",
        }
    }

    fn pick(self, previous: Option<&FixLink>, next: Option<&FixLink>) -> Option<Point> {
        match self {
            Self::Before => previous.map(|link| link.point),
            Self::After => next.map(|link| link.point),
            Self::Closest => closest(previous, next),
            Self::Interpolate => match (previous, next) {
                (Some(before), Some(after)) => Some(interpolate(before, after)),
                _ => closest(previous, next),
            },
        }
    }
}

impl fmt::Display for LocatorAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LocatorAlgorithm {
    type Err = UnknownAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "before" | "-window" => Ok(Self::Before),
            "after" | "+window" => Ok(Self::After),
            "closest" => Ok(Self::Closest),
            "interpolate" | "interpolated" => Ok(Self::Interpolate),
            _ => Err(UnknownAlgorithm(s.to_string())),
        }
    }
}

/// Error type for unknown locator algorithm names.
#[derive(Debug, Clone)]
pub struct UnknownAlgorithm(String);

impl fmt::Display for UnknownAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown locator algorithm: {}", self.0)
    }
}

impl std::error::Error for UnknownAlgorithm {}

fn closest(previous: Option<&FixLink>, next: Option<&FixLink>) -> Option<Point> {
    match (previous, next) {
        (Some(before), Some(after)) => {
            if after.gap_seconds < before.gap_seconds {
                Some(after.point)
            } else {
                Some(before.point)
            }
        }
        (Some(before), None) => Some(before.point),
        (None, Some(after)) => Some(after.point),
        (None, None) => None,
    }
}

fn interpolate(previous: &FixLink, next: &FixLink) -> Point {
    let total = previous.gap_seconds + next.gap_seconds;
    if total <= 0.0 {
        return previous.point;
    }
    let weight_previous = next.gap_seconds / total;
    let weight_next = previous.gap_seconds / total;
    Point {
        latitude: previous
            .point
            .latitude
            .mul_add(weight_previous, next.point.latitude * weight_next),
        longitude: previous
            .point
            .longitude
            .mul_add(weight_previous, next.point.longitude * weight_next),
    }
}

/// A fix adjacent in time to an event awaiting location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixLink {
    pub point: Point,
    pub gap_seconds: f64,
}

/// A non-GPS event with the fix links gathered during the pass.
#[derive(Debug, Clone)]
struct Locatable {
    event: Arc<Event>,
    previous: Option<FixLink>,
    next: Option<FixLink>,
}

/// An event together with its assigned location.
#[derive(Debug, Clone)]
pub struct LocatedEvent {
    pub event: Arc<Event>,
    pub point: Point,
}

/// The observable split after a locate pass. GPS fixes appear in neither
/// list.
#[derive(Debug, Default)]
pub struct LocateOutcome {
    pub located: Vec<LocatedEvent>,
    pub failed: Vec<Arc<Event>>,
}

impl LocateOutcome {
    /// The located set as a side table keyed by event id.
    #[must_use]
    pub fn side_table(&self) -> HashMap<EventId, Point> {
        self.located
            .iter()
            .map(|entry| (entry.event.id, entry.point))
            .collect()
    }
}

/// Runs one algorithm over a sorted stream. Fixes only ever link events of
/// their own device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Locator {
    algorithm: LocatorAlgorithm,
    window_seconds: f64,
}

impl Default for Locator {
    fn default() -> Self {
        Self::new(LocatorAlgorithm::default(), LOCATE_WINDOW_SECONDS)
    }
}

impl Locator {
    #[must_use]
    pub const fn new(algorithm: LocatorAlgorithm, window_seconds: f64) -> Self {
        Self {
            algorithm,
            window_seconds,
        }
    }

    #[must_use]
    pub const fn algorithm(&self) -> LocatorAlgorithm {
        self.algorithm
    }

    #[must_use]
    pub const fn window_seconds(&self) -> f64 {
        self.window_seconds
    }

    /// A gap qualifies when it is strictly inside the window; a window of
    /// zero or less accepts any gap.
    fn within(&self, gap_seconds: f64) -> bool {
        self.window_seconds <= 0.0 || gap_seconds < self.window_seconds
    }

    /// Locates every non-GPS event in `events`, which must be sorted by
    /// time (as [`crate::dataset::Dataset::sorted`] yields).
    #[must_use]
    pub fn locate(&self, events: &[Arc<Event>]) -> LocateOutcome {
        let mut outcome = LocateOutcome::default();
        let mut last_fix: HashMap<DeviceId, Arc<Event>> = HashMap::new();
        let mut pending: HashMap<DeviceId, Vec<Locatable>> = HashMap::new();

        for event in events {
            if event.kind.is_gps() {
                let Some(point) = event.location else {
                    continue;
                };
                if let Some(waiting) = pending.get_mut(&event.device) {
                    for mut locatable in waiting.drain(..) {
                        let gap = event.gap_seconds(&locatable.event);
                        if self.within(gap) {
                            locatable.next = Some(FixLink {
                                point,
                                gap_seconds: gap,
                            });
                        }
                        self.resolve(locatable, &mut outcome);
                    }
                }
                last_fix.insert(event.device.clone(), Arc::clone(event));
                continue;
            }

            let previous = last_fix.get(&event.device).and_then(|fix| {
                let gap = event.gap_seconds(fix);
                let point = fix.location?;
                self.within(gap).then_some(FixLink {
                    point,
                    gap_seconds: gap,
                })
            });
            pending.entry(event.device.clone()).or_default().push(Locatable {
                event: Arc::clone(event),
                previous,
                next: None,
            });
        }

        for waiting in pending.into_values() {
            for locatable in waiting {
                self.resolve(locatable, &mut outcome);
            }
        }
        outcome
    }

    fn resolve(&self, locatable: Locatable, outcome: &mut LocateOutcome) {
        match self
            .algorithm
            .pick(locatable.previous.as_ref(), locatable.next.as_ref())
        {
            Some(point) => outcome.located.push(LocatedEvent {
                event: locatable.event,
                point,
            }),
            None => outcome.failed.push(locatable.event),
        }
    }
}
