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

//! Offline routing fallback.
//!
//! Ignores roads entirely: the polyline is the straight segment between the
//! two points and the duration comes from an assumed average speed. Always
//! available, so it backs demos and tests when no routing service is reachable.

use super::{ProviderRoute, RoutingProvider};
use crate::error::Result;
use crate::geo::{distance_km, Coordinates};

/// Average driving speed assumed when estimating duration.
pub const DEFAULT_SPEED_KMH: f64 = 40.0;

const DEFAULT_SEGMENTS: u32 = 20;

#[derive(Debug, Clone)]
pub struct StraightLineProvider {
    /// Assumed average speed in km/h.
    pub speed_kmh: f64,
    /// Number of segments the line is split into.
    pub segments: u32,
}

impl Default for StraightLineProvider {
    fn default() -> Self {
        Self {
            speed_kmh: DEFAULT_SPEED_KMH,
            segments: DEFAULT_SEGMENTS,
        }
    }
}

impl StraightLineProvider {
    #[must_use]
    pub fn new(speed_kmh: f64) -> Self {
        Self {
            speed_kmh,
            ..Default::default()
        }
    }

    fn plan(&self, origin: Coordinates, destination: Coordinates) -> ProviderRoute {
        let segments = self.segments.max(1);
        let coordinates = (0..=segments)
            .map(|i| origin.lerp(&destination, f64::from(i) / f64::from(segments)))
            .collect();

        let km = distance_km(origin, destination);
        let duration_s = if self.speed_kmh > 0.0 {
            km / self.speed_kmh * 3600.0
        } else {
            0.0
        };

        ProviderRoute {
            coordinates,
            distance_m: km * 1000.0,
            duration_s,
        }
    }
}

impl RoutingProvider for StraightLineProvider {
    async fn route(&self, origin: Coordinates, destination: Coordinates) -> Result<ProviderRoute> {
        Ok(self.plan(origin, destination))
    }

    fn name(&self) -> &str {
        "straight-line"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_endpoints_and_duration() {
        let origin = Coordinates::new(4.0511, 9.7679);
        let destination = Coordinates::new(4.1000, 9.8200);
        let route = StraightLineProvider::default().plan(origin, destination);

        assert_eq!(route.coordinates.len(), 21);
        assert_eq!(route.coordinates[0], origin);
        assert_eq!(*route.coordinates.last().unwrap(), destination);

        let km = distance_km(origin, destination);
        assert!((route.distance_m - km * 1000.0).abs() < 1e-6);
        assert!((route.duration_s - km / 40.0 * 3600.0).abs() < 1e-6);
    }
}
