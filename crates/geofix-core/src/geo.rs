//! Planar geometry: points, bounding boxes, and location filters.
//!
//! All distance math is Euclidean over degrees, a deliberate planar
//! approximation. It is only valid for regional-scale analysis and is kept
//! for output compatibility with the capture tooling this engine feeds.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Degrees per kilometre at the equator, using the 40000 km meridian
/// circumference convention.
pub const DEGREES_PER_KM: f64 = 360.0 / 40_000.0;

/// Errors from parsing location filters.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GeoParseError {
    /// The filter string was empty.
    #[error("empty location filter")]
    Empty,

    /// A coordinate could not be parsed as a number.
    #[error("unparseable coordinate: {value}")]
    BadNumber { value: String },

    /// The filter did not contain the expected number of coordinates.
    #[error("expected four coordinates or dist(km,lat,lon), got: {value}")]
    BadShape { value: String },
}

/// A geographic point in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub latitude: f64,
    pub longitude: f64,
}

impl Point {
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Planar Euclidean distance in degrees, not geodesic.
    #[must_use]
    pub fn distance(&self, other: &Self) -> f64 {
        let dlat = self.latitude - other.latitude;
        let dlon = self.longitude - other.longitude;
        dlat.hypot(dlon)
    }

    /// Shifts both components by `delta` degrees.
    #[must_use]
    pub fn offset(&self, delta: f64) -> Self {
        Self::new(self.latitude + delta, self.longitude + delta)
    }
}

/// Component-wise product order: a point compares less-or-equal only when
/// both its latitude and longitude do. Mixed comparisons have no ordering.
impl PartialOrd for Point {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        let lat = self.latitude.partial_cmp(&other.latitude)?;
        let lon = self.longitude.partial_cmp(&other.longitude)?;
        match (lat, lon) {
            (Ordering::Equal, Ordering::Equal) => Some(Ordering::Equal),
            (Ordering::Less | Ordering::Equal, Ordering::Less | Ordering::Equal) => {
                Some(Ordering::Less)
            }
            (Ordering::Greater | Ordering::Equal, Ordering::Greater | Ordering::Equal) => {
                Some(Ordering::Greater)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.latitude, self.longitude)
    }
}

/// A running bounding box over pushed points. Closed on all edges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Point,
    pub max: Point,
}

impl Bounds {
    /// Builds a box from two corners, normalizing component order.
    #[must_use]
    pub fn new(a: Point, b: Point) -> Self {
        Self {
            min: Point::new(a.latitude.min(b.latitude), a.longitude.min(b.longitude)),
            max: Point::new(a.latitude.max(b.latitude), a.longitude.max(b.longitude)),
        }
    }

    /// A degenerate box covering a single point.
    #[must_use]
    pub const fn from_point(point: Point) -> Self {
        Self {
            min: point,
            max: point,
        }
    }

    /// Grows the box to cover `point`.
    pub fn extend(&mut self, point: Point) {
        self.min.latitude = self.min.latitude.min(point.latitude);
        self.min.longitude = self.min.longitude.min(point.longitude);
        self.max.latitude = self.max.latitude.max(point.latitude);
        self.max.longitude = self.max.longitude.max(point.longitude);
    }

    #[must_use]
    pub fn contains(&self, point: &Point) -> bool {
        *point >= self.min && *point <= self.max
    }

    /// Longitude span in degrees.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.max.longitude - self.min.longitude
    }

    /// Latitude span in degrees.
    #[must_use]
    pub fn height(&self) -> f64 {
        self.max.latitude - self.min.latitude
    }

    /// The larger of the two spans; used as the box's size for thresholds.
    #[must_use]
    pub fn size(&self) -> f64 {
        self.width().max(self.height())
    }

    #[must_use]
    pub fn center(&self) -> Point {
        Point::new(
            f64::midpoint(self.min.latitude, self.max.latitude),
            f64::midpoint(self.min.longitude, self.max.longitude),
        )
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.min, self.max)
    }
}

/// A spatial inclusion predicate applied to GPS fixes at merge time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LocationFilter {
    /// Accepts every point.
    Everywhere,

    /// Accepts points inside a bounding box (closed edges).
    Within(Bounds),

    /// Accepts points within `radius_degrees` of `center`. The bounding box
    /// is a cheap pre-test; the exact distance decides.
    Near {
        center: Point,
        radius_degrees: f64,
        bounds: Bounds,
    },
}

impl LocationFilter {
    /// A circular region from a radius in kilometres.
    #[must_use]
    pub fn near(radius_km: f64, center: Point) -> Self {
        let radius_degrees = radius_km * DEGREES_PER_KM;
        Self::Near {
            center,
            radius_degrees,
            bounds: Bounds::new(center.offset(-radius_degrees), center.offset(radius_degrees)),
        }
    }

    #[must_use]
    pub fn includes(&self, point: &Point) -> bool {
        match self {
            Self::Everywhere => true,
            Self::Within(bounds) => bounds.contains(point),
            Self::Near {
                center,
                radius_degrees,
                bounds,
            } => bounds.contains(point) && center.distance(point) <= *radius_degrees,
        }
    }

    /// Parses a filter expression.
    ///
    /// Accepted forms: `*` or `everywhere`; `dist(km,lat,lon)`;
    /// `lat0..lat1,lon0..lon1`; `minlat,minlon,maxlat,maxlon`; the range
    /// forms optionally wrapped in `range[...]` or `range(...)`.
    pub fn from_spec(spec: &str) -> Result<Self, GeoParseError> {
        let trimmed = spec.trim();
        if trimmed.is_empty() {
            return Err(GeoParseError::Empty);
        }
        if trimmed == "*" || trimmed.eq_ignore_ascii_case("everywhere") {
            return Ok(Self::Everywhere);
        }

        let lower = trimmed.to_ascii_lowercase();
        if let Some(args) = lower
            .strip_prefix("dist(")
            .and_then(|rest| rest.strip_suffix(')'))
            .or_else(|| {
                lower
                    .strip_prefix("dist[")
                    .and_then(|rest| rest.strip_suffix(']'))
            })
        {
            let values = parse_floats(args)?;
            if values.len() != 3 {
                return Err(GeoParseError::BadShape {
                    value: trimmed.to_string(),
                });
            }
            return Ok(Self::near(values[0], Point::new(values[1], values[2])));
        }

        let ranged = lower.contains("..");
        let body = lower
            .strip_prefix("range[")
            .and_then(|rest| rest.strip_suffix(']'))
            .or_else(|| {
                lower
                    .strip_prefix("range(")
                    .and_then(|rest| rest.strip_suffix(')'))
            })
            .unwrap_or(&lower);
        let values = parse_floats(&body.replace("..", ":"))?;
        if values.len() != 4 {
            return Err(GeoParseError::BadShape {
                value: trimmed.to_string(),
            });
        }
        // `lat0..lat1,lon0..lon1` groups by axis; the flat form is
        // `minlat,minlon,maxlat,maxlon`.
        let (a, b) = if ranged {
            (
                Point::new(values[0], values[2]),
                Point::new(values[1], values[3]),
            )
        } else {
            (
                Point::new(values[0], values[1]),
                Point::new(values[2], values[3]),
            )
        };
        Ok(Self::Within(Bounds::new(a, b)))
    }
}

fn parse_floats(body: &str) -> Result<Vec<f64>, GeoParseError> {
    body.split([',', ';', ':'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<f64>().map_err(|_| GeoParseError::BadNumber {
                value: part.to_string(),
            })
        })
        .collect()
}

impl Default for LocationFilter {
    fn default() -> Self {
        Self::Everywhere
    }
}

impl fmt::Display for LocationFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Everywhere => write!(f, "*"),
            Self::Within(bounds) => write!(
                f,
                "{},{},{},{}",
                bounds.min.latitude, bounds.min.longitude, bounds.max.latitude, bounds.max.longitude
            ),
            Self::Near {
                center,
                radius_degrees,
                ..
            } => write!(
                f,
                "dist({},{},{})",
                radius_degrees / DEGREES_PER_KM,
                center.latitude,
                center.longitude
            ),
        }
    }
}

impl std::str::FromStr for LocationFilter {
    type Err = GeoParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_spec(s)
    }
}

impl TryFrom<String> for LocationFilter {
    type Error = GeoParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_spec(&value)
    }
}

impl From<LocationFilter> for String {
    fn from(filter: LocationFilter) -> Self {
        filter.to_string()
    }
}
