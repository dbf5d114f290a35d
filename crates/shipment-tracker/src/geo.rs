// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Coordinates and great-circle distance.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackingError};

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    #[must_use]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Reject non-finite values and anything outside [-90, 90] x [-180, 180].
    pub fn validate(&self) -> Result<()> {
        let lat_ok = self.lat.is_finite() && (-90.0..=90.0).contains(&self.lat);
        let lng_ok = self.lng.is_finite() && (-180.0..=180.0).contains(&self.lng);
        if lat_ok && lng_ok {
            Ok(())
        } else {
            Err(TrackingError::InvalidCoordinates {
                lat: self.lat,
                lng: self.lng,
            })
        }
    }

    /// Linear interpolation towards `other`; `t` is clamped to [0, 1].
    #[must_use]
    pub fn lerp(&self, other: &Self, t: f64) -> Self {
        let t = t.clamp(0.0, 1.0);
        if t >= 1.0 {
            return *other;
        }
        Self {
            lat: self.lat + (other.lat - self.lat) * t,
            lng: self.lng + (other.lng - self.lng) * t,
        }
    }
}

impl std::fmt::Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.5}, {:.5})", self.lat, self.lng)
    }
}

/// A named point such as an order's pickup yard or delivery address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl Location {
    #[must_use]
    pub fn new(lat: f64, lng: f64) -> Self {
        Self {
            lat,
            lng,
            address: None,
        }
    }

    #[must_use]
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    #[must_use]
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.lat, self.lng)
    }
}

impl From<Coordinates> for Location {
    fn from(c: Coordinates) -> Self {
        Self::new(c.lat, c.lng)
    }
}

/// Great-circle distance between two points in kilometers (haversine).
#[must_use]
pub fn distance_km(a: Coordinates, b: Coordinates) -> f64 {
    let lat1_rad = a.lat.to_radians();
    let lat2_rad = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    // Rounding can push h marginally outside [0, 1] for antipodal points.
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOUALA: Coordinates = Coordinates::new(4.0511, 9.7679);
    const BONABERI: Coordinates = Coordinates::new(4.1000, 9.8200);

    #[test]
    fn test_distance_to_self_is_zero() {
        assert!(distance_km(DOUALA, DOUALA).abs() < 1e-9);
    }

    #[test]
    fn test_distance_is_symmetric() {
        let ab = distance_km(DOUALA, BONABERI);
        let ba = distance_km(BONABERI, DOUALA);
        assert!((ab - ba).abs() < 1e-9);
        assert!(ab > 0.0);
    }

    #[test]
    fn test_known_distance() {
        // LAX to JFK is approximately 3,983 km
        let lax = Coordinates::new(33.9425, -118.4081);
        let jfk = Coordinates::new(40.6413, -73.7781);
        assert!((distance_km(lax, jfk) - 3983.0).abs() < 15.0);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        assert!(Coordinates::new(200.0, 9.7).validate().is_err());
        assert!(Coordinates::new(4.0, -181.0).validate().is_err());
        assert!(Coordinates::new(f64::NAN, 0.0).validate().is_err());
        assert!(DOUALA.validate().is_ok());
        assert!(Coordinates::new(-90.0, 180.0).validate().is_ok());
    }

    #[test]
    fn test_lerp_clamps() {
        assert_eq!(DOUALA.lerp(&BONABERI, 1.5), BONABERI);
        assert_eq!(DOUALA.lerp(&BONABERI, -1.0), DOUALA);
    }

    #[test]
    fn test_location_serializes_without_empty_address() {
        let json = serde_json::to_string(&Location::new(1.0, 2.0)).unwrap();
        assert_eq!(json, r#"{"lat":1.0,"lng":2.0}"#);
    }
}
