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

//! Routing provider selected at startup.

use shipment_tracker::route::ProviderRoute;
use shipment_tracker::{Coordinates, OsrmProvider, RoutingProvider, StraightLineProvider, TrackingError};

use crate::config::AppConfig;

/// Either a road router or the offline great-circle fallback.
#[derive(Debug, Clone)]
pub enum Router {
    Osrm(OsrmProvider),
    StraightLine(StraightLineProvider),
}

impl Router {
    /// Build the router described by `config`, or the straight-line one when `offline`.
    pub fn from_config(config: &AppConfig, offline: bool) -> Result<Self, TrackingError> {
        if offline {
            return Ok(Self::StraightLine(StraightLineProvider::new(config.fallback_speed_kmh)));
        }
        Ok(Self::Osrm(OsrmProvider::new(
            config.routing_url.as_str(),
            config.routing_profile.as_str(),
        )?))
    }
}

impl RoutingProvider for Router {
    async fn route(&self, origin: Coordinates, destination: Coordinates) -> Result<ProviderRoute, TrackingError> {
        match self {
            Self::Osrm(provider) => provider.route(origin, destination).await,
            Self::StraightLine(provider) => provider.route(origin, destination).await,
        }
    }

    fn name(&self) -> &str {
        match self {
            Self::Osrm(provider) => provider.name(),
            Self::StraightLine(provider) => provider.name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_offline_router_uses_fallback_speed() {
        let config = AppConfig {
            fallback_speed_kmh: 60.0,
            ..AppConfig::default()
        };
        let router = Router::from_config(&config, true).unwrap();
        assert_eq!(router.name(), "straight-line");

        let route = router
            .route(Coordinates::new(4.0511, 9.7679), Coordinates::new(4.1000, 9.8200))
            .await
            .unwrap();
        // 60 km/h: one second per 16.67 m.
        assert!((route.duration_s - route.distance_m / 1000.0 * 60.0).abs() < 1e-6);
    }
}
