//! Coordinates and great-circle distance.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A WGS84 position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    /// Builds a coordinate without any checks. Out-of-range values pass through.
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Builds a coordinate that is safe to hand to [`distance_km`].
    ///
    /// Rejects non-finite values and anything outside [-90, 90] / [-180, 180].
    pub fn validated(latitude: f64, longitude: f64) -> Result<Self> {
        if !latitude.is_finite() || !longitude.is_finite() {
            bail!("coordinate ({latitude}, {longitude}) is not finite");
        }
        if !(-90.0..=90.0).contains(&latitude) {
            bail!("latitude {latitude} out of range [-90, 90]");
        }
        if !(-180.0..=180.0).contains(&longitude) {
            bail!("longitude {longitude} out of range [-180, 180]");
        }
        Ok(Self::new(latitude, longitude))
    }

    /// Re-checks an already built coordinate against the same rules as [`Coordinate::validated`].
    pub fn validate(self) -> Result<Self> {
        Self::validated(self.latitude, self.longitude)
    }

    /// Short "lat, lon" label used when a report has no explicit location name.
    pub fn short_label(&self) -> String {
        format!("{:.4}, {:.4}", self.latitude, self.longitude)
    }
}

/// Haversine distance between `a` and `b` in kilometers.
///
/// Symmetric, never negative, and exactly zero when `a == b`. Any finite input is
/// accepted, including out-of-range degrees. For NaN or infinite input the result
/// is unspecified (NaN propagates); callers must validate coordinates first, see
/// [`Coordinate::validated`].
pub fn distance_km(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let half_chord = (d_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    // Rounding can push antipodal pairs a hair above 1. `clamp` keeps NaN as NaN.
    let half_chord = half_chord.clamp(0.0, 1.0);
    let angle = 2.0 * half_chord.sqrt().atan2((1.0 - half_chord).sqrt());

    EARTH_RADIUS_KM * angle
}
