//! Movement traces: splitting a sorted fix sequence on distance/time gaps,
//! with bounding-box geometry and pixel projection for rendering.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::Event;
use crate::geo::{Bounds, Point};
use crate::types::MILLIS_PER_DAY;

/// Bounding boxes below this span never trigger outlier trimming.
const OUTLIER_MIN_SIZE_DEGREES: f64 = 0.1;

/// Trim when the farthest point sits more than this multiple of the average
/// distance from the centroid; the shrunk box keeps points within
/// `max / OUTLIER_RATIO`.
const OUTLIER_RATIO: f64 = 3.0;

/// Gap limits that close one trace and open the next.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitThresholds {
    /// Planar degrees between consecutive fixes.
    pub max_gap_degrees: f64,
    /// Days between consecutive fixes.
    pub max_gap_days: f64,
}

impl Default for SplitThresholds {
    fn default() -> Self {
        Self {
            max_gap_degrees: 0.002,
            max_gap_days: 0.5,
        }
    }
}

/// One contiguous run of located fixes.
///
/// The rendered point list suppresses exact consecutive duplicates; bounds
/// and the centroid accumulator still count every pushed fix.
#[derive(Debug, Clone, Default)]
pub struct Trace {
    events: Vec<Arc<Event>>,
    bounds: Option<Bounds>,
    sum_latitude: f64,
    sum_longitude: f64,
    pushed: usize,
    last: Option<(Point, DateTime<Utc>)>,
}

impl Trace {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True when the gap from the last pushed fix to `point`/`time` crosses
    /// either threshold. An empty trace is never too far.
    #[must_use]
    #[expect(clippy::cast_precision_loss, reason = "millisecond gaps fit f64 exactly")]
    pub fn too_far(&self, point: &Point, time: DateTime<Utc>, thresholds: &SplitThresholds) -> bool {
        let Some((last_point, last_time)) = &self.last else {
            return false;
        };
        let day_gap = (time - *last_time).num_milliseconds() as f64 / MILLIS_PER_DAY as f64;
        last_point.distance(point) > thresholds.max_gap_degrees
            || day_gap >= thresholds.max_gap_days
    }

    /// Adds a fix. Events without a location are ignored.
    pub fn push(&mut self, event: &Arc<Event>) {
        let Some(point) = event.location else {
            return;
        };
        match &mut self.bounds {
            Some(bounds) => bounds.extend(point),
            None => self.bounds = Some(Bounds::from_point(point)),
        }
        self.sum_latitude += point.latitude;
        self.sum_longitude += point.longitude;
        self.pushed += 1;
        let co_located = self.last.is_some_and(|(last, _)| last == point);
        if !co_located {
            self.events.push(Arc::clone(event));
        }
        self.last = Some((point, event.time));
    }

    /// Rendered events, duplicates suppressed.
    #[must_use]
    pub fn events(&self) -> &[Arc<Event>] {
        &self.events
    }

    /// Rendered points in push order.
    pub fn points(&self) -> impl Iterator<Item = Point> + '_ {
        self.events.iter().filter_map(|event| event.location)
    }

    /// Rendered point count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Every push, including suppressed duplicates.
    #[must_use]
    pub const fn pushed_count(&self) -> usize {
        self.pushed
    }

    #[must_use]
    pub const fn bounds(&self) -> Option<&Bounds> {
        self.bounds.as_ref()
    }

    /// Mean of all pushed fixes.
    #[must_use]
    #[expect(clippy::cast_precision_loss, reason = "point counts are small")]
    pub fn centroid(&self) -> Option<Point> {
        if self.pushed == 0 {
            return None;
        }
        let n = self.pushed as f64;
        Some(Point::new(self.sum_latitude / n, self.sum_longitude / n))
    }

    #[must_use]
    pub fn first_time(&self) -> Option<DateTime<Utc>> {
        self.events.first().map(|event| event.time)
    }

    #[must_use]
    pub fn last_time(&self) -> Option<DateTime<Utc>> {
        self.last.map(|(_, time)| time)
    }

    /// Shrinks the bounding box away from far outliers.
    ///
    /// Applies only when the box spans more than [`OUTLIER_MIN_SIZE_DEGREES`]
    /// and the farthest point lies more than [`OUTLIER_RATIO`] times the
    /// average distance from the centroid. Points stay in the trace; only
    /// the box changes.
    #[expect(clippy::cast_precision_loss, reason = "point counts are small")]
    pub fn remove_outliers(&mut self) {
        let Some(bounds) = self.bounds else { return };
        let Some(centroid) = self.centroid() else { return };
        if bounds.size() <= OUTLIER_MIN_SIZE_DEGREES {
            return;
        }
        let distances: Vec<(Point, f64)> = self
            .points()
            .map(|point| (point, centroid.distance(&point)))
            .collect();
        if distances.is_empty() {
            return;
        }
        let max = distances.iter().map(|(_, d)| *d).fold(0.0_f64, f64::max);
        let average = distances.iter().map(|(_, d)| *d).sum::<f64>() / distances.len() as f64;
        if average <= 0.0 || max / average <= OUTLIER_RATIO {
            return;
        }
        let limit = max / OUTLIER_RATIO;
        let mut shrunk: Option<Bounds> = None;
        for (point, distance) in distances {
            if distance <= limit {
                match &mut shrunk {
                    Some(bounds) => bounds.extend(point),
                    None => shrunk = Some(Bounds::from_point(point)),
                }
            }
        }
        if shrunk.is_some() {
            self.bounds = shrunk;
        }
    }
}

/// Splits a sorted, located fix sequence into traces.
#[must_use]
pub fn assemble_traces(events: &[Arc<Event>], thresholds: &SplitThresholds) -> Vec<Trace> {
    let mut traces = Vec::new();
    let mut current = Trace::new();
    for event in events {
        let Some(point) = event.location else {
            continue;
        };
        if current.too_far(&point, event.time, thresholds) {
            traces.push(std::mem::take(&mut current));
        }
        current.push(event);
    }
    if !current.is_empty() {
        traces.push(current);
    }
    traces
}

/// Linear (non-geodesic) projection from geographic to pixel space.
///
/// One uniform scale serves both axes, so shapes keep their aspect ratio;
/// the shorter geographic span is centered inside the pixel square.
/// Pixel y grows downward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelProjection {
    min: Point,
    max_latitude: f64,
    scale: f64,
    offset_x: f64,
    offset_y: f64,
}

impl PixelProjection {
    /// Fits `bounds` into a `size` x `size` square inset by `padding`.
    #[must_use]
    pub fn fit(bounds: &Bounds, size: u32, padding: u32) -> Self {
        let available = f64::from(size.saturating_sub(padding.saturating_mul(2)));
        let span = bounds.size();
        let scale = if span > 0.0 { available / span } else { 0.0 };
        let pad = f64::from(padding);
        Self {
            min: bounds.min,
            max_latitude: bounds.max.latitude,
            scale,
            offset_x: pad + (available - bounds.width() * scale) / 2.0,
            offset_y: pad + (available - bounds.height() * scale) / 2.0,
        }
    }

    #[must_use]
    pub fn project(&self, point: &Point) -> (f64, f64) {
        let x = (point.longitude - self.min.longitude).mul_add(self.scale, self.offset_x);
        let y = (self.max_latitude - point.latitude).mul_add(self.scale, self.offset_y);
        (x, y)
    }
}

/// Bounds and centroid across member traces, without flattening their
/// point lists. Iteration yields members so a renderer can color each one.
#[derive(Debug, Clone, Default)]
pub struct MergedTrace {
    traces: Vec<Trace>,
    bounds: Option<Bounds>,
    sum_latitude: f64,
    sum_longitude: f64,
    pushed: usize,
}

impl MergedTrace {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, trace: Trace) {
        if let Some(member) = trace.bounds {
            match &mut self.bounds {
                Some(bounds) => {
                    bounds.extend(member.min);
                    bounds.extend(member.max);
                }
                None => self.bounds = Some(member),
            }
        }
        self.sum_latitude += trace.sum_latitude;
        self.sum_longitude += trace.sum_longitude;
        self.pushed += trace.pushed;
        self.traces.push(trace);
    }

    #[must_use]
    pub fn traces(&self) -> &[Trace] {
        &self.traces
    }

    /// Member trace count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.traces.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    #[must_use]
    pub const fn bounds(&self) -> Option<&Bounds> {
        self.bounds.as_ref()
    }

    /// Mean over every fix pushed into any member.
    #[must_use]
    #[expect(clippy::cast_precision_loss, reason = "point counts are small")]
    pub fn centroid(&self) -> Option<Point> {
        if self.pushed == 0 {
            return None;
        }
        let n = self.pushed as f64;
        Some(Point::new(self.sum_latitude / n, self.sum_longitude / n))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Trace> {
        self.traces.iter()
    }
}

impl<'a> IntoIterator for &'a MergedTrace {
    type Item = &'a Trace;
    type IntoIter = std::slice::Iter<'a, Trace>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl FromIterator<Trace> for MergedTrace {
    fn from_iter<I: IntoIterator<Item = Trace>>(iter: I) -> Self {
        let mut merged = Self::new();
        for trace in iter {
            merged.push(trace);
        }
        merged
    }
}
