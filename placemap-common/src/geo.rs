//! Bounding box geometry for map viewports
//!
//! All values are in degrees. A box always satisfies `min_lat <= max_lat`
//! and `min_lng <= max_lng`; constructors normalize swapped edges.

use serde::{Deserialize, Serialize};

/// Default edge tolerance for [`BoundingBox::materially_different`] (about 10 m)
pub const DEFAULT_EPSILON_DEG: f64 = 0.0001;

/// Kilometres per degree of latitude
const KM_PER_DEG_LAT: f64 = 111.0;

/// Axis-aligned geographic rectangle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    /// Build a box from its edges, swapping any inverted pair
    pub fn new(min_lat: f64, max_lat: f64, min_lng: f64, max_lng: f64) -> Self {
        Self {
            min_lat: min_lat.min(max_lat),
            max_lat: min_lat.max(max_lat),
            min_lng: min_lng.min(max_lng),
            max_lng: min_lng.max(max_lng),
        }
    }

    /// Derive the visible region from a map viewport center and span.
    ///
    /// Each axis extends `delta / 2` either side of the center. Negative
    /// deltas are treated by magnitude.
    pub fn from_region(center_lat: f64, center_lng: f64, lat_delta: f64, lng_delta: f64) -> Self {
        let half_lat = lat_delta.abs() / 2.0;
        let half_lng = lng_delta.abs() / 2.0;
        Self {
            min_lat: center_lat - half_lat,
            max_lat: center_lat + half_lat,
            min_lng: center_lng - half_lng,
            max_lng: center_lng + half_lng,
        }
    }

    /// Box covering a circle of `radius_km` around a center point.
    ///
    /// The longitude span widens with latitude (1° lng ≈ 111 km · cos(lat)).
    pub fn around(center_lat: f64, center_lng: f64, radius_km: f64) -> Self {
        let radius_km = radius_km.abs();
        let lat_delta = radius_km / KM_PER_DEG_LAT;
        let cos_lat = center_lat.to_radians().cos().abs().max(f64::EPSILON);
        let lng_delta = (radius_km / (KM_PER_DEG_LAT * cos_lat)).min(180.0);
        Self::new(
            center_lat - lat_delta,
            center_lat + lat_delta,
            center_lng - lng_delta,
            center_lng + lng_delta,
        )
    }

    /// True if any edge moved by more than `epsilon` degrees
    pub fn materially_different(&self, other: &BoundingBox, epsilon: f64) -> bool {
        (self.min_lat - other.min_lat).abs() > epsilon
            || (self.max_lat - other.max_lat).abs() > epsilon
            || (self.min_lng - other.min_lng).abs() > epsilon
            || (self.max_lng - other.max_lng).abs() > epsilon
    }

    /// Inclusive point containment
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        latitude >= self.min_lat
            && latitude <= self.max_lat
            && longitude >= self.min_lng
            && longitude <= self.max_lng
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }

    pub fn lat_span(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    pub fn lng_span(&self) -> f64 {
        self.max_lng - self.min_lng
    }
}
