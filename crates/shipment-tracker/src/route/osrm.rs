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

//! OSRM route service client.

use std::time::Duration;

use log::debug;
use serde::Deserialize;

use super::{ProviderRoute, RoutingProvider};
use crate::error::{Result, TrackingError};
use crate::geo::Coordinates;

/// Public OSRM demo server.
pub const DEFAULT_OSRM_URL: &str = "https://router.project-osrm.org";

const USER_AGENT: &str = concat!("shipment-tracker/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    distance: f64,
    duration: f64,
    geometry: OsrmGeometry,
}

#[derive(Debug, Deserialize)]
struct OsrmGeometry {
    /// GeoJSON order: `[lng, lat]`.
    coordinates: Vec<[f64; 2]>,
}

/// Routing provider backed by an OSRM `route` service.
#[derive(Debug, Clone)]
pub struct OsrmProvider {
    client: reqwest::Client,
    base_url: String,
    profile: String,
}

impl OsrmProvider {
    /// Create a provider for `base_url` using the given travel profile (e.g. `driving`).
    pub fn new(base_url: impl Into<String>, profile: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            profile: profile.into(),
        })
    }

    fn route_url(&self, origin: Coordinates, destination: Coordinates) -> String {
        format!(
            "{}/route/v1/{}/{},{};{},{}?overview=full&geometries=geojson",
            self.base_url, self.profile, origin.lng, origin.lat, destination.lng, destination.lat
        )
    }
}

impl RoutingProvider for OsrmProvider {
    async fn route(&self, origin: Coordinates, destination: Coordinates) -> Result<ProviderRoute> {
        let url = self.route_url(origin, destination);
        debug!("Requesting {}", url);

        // OSRM reports NoRoute with a 4xx status and a JSON body, so the body
        // is decoded regardless of status.
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        parse_response(&body).map_err(|e| match e {
            TrackingError::Network(msg) if !status.is_success() => {
                TrackingError::Network(format!("HTTP {status}: {msg}"))
            }
            other => other,
        })
    }

    fn name(&self) -> &str {
        "osrm"
    }
}

fn parse_response(body: &[u8]) -> Result<ProviderRoute> {
    let parsed: OsrmResponse = serde_json::from_slice(body)
        .map_err(|e| TrackingError::Network(format!("malformed OSRM response: {e}")))?;

    match parsed.code.as_str() {
        "Ok" => {}
        "NoRoute" | "NoSegment" | "NoMatch" => {
            return Err(TrackingError::RouteNotFound(
                parsed.message.unwrap_or(parsed.code),
            ));
        }
        _ => {
            return Err(TrackingError::Network(format!(
                "OSRM returned {}: {}",
                parsed.code,
                parsed.message.unwrap_or_default()
            )));
        }
    }

    let route = parsed
        .routes
        .into_iter()
        .next()
        .ok_or_else(|| TrackingError::RouteNotFound("no routes in response".to_string()))?;

    Ok(ProviderRoute {
        coordinates: route
            .geometry
            .coordinates
            .into_iter()
            .map(|[lng, lat]| Coordinates::new(lat, lng))
            .collect(),
        distance_m: route.distance,
        duration_s: route.duration,
    })
}
