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

//! Road route resolution.
//!
//! A [`RoutingProvider`] talks to the outside world and reports raw units
//! (meters, seconds). [`RouteResolver`] validates inputs before any request,
//! bounds each request with a timeout, converts units and normalizes the
//! polyline so callers always get at least two waypoints.

pub mod osrm;
pub mod straight_line;

use std::future::Future;
use std::time::Duration;

use log::{info, warn};

use crate::error::{Result, TrackingError};
use crate::geo::Coordinates;
use crate::shipment::ResolvedRoute;

pub use osrm::OsrmProvider;
pub use straight_line::StraightLineProvider;

/// Route as reported by a provider, in provider units.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRoute {
    /// Ordered polyline from origin to destination.
    pub coordinates: Vec<Coordinates>,
    /// Total distance in meters.
    pub distance_m: f64,
    /// Total duration in seconds.
    pub duration_s: f64,
}

/// A road-routing backend.
pub trait RoutingProvider: Send + Sync {
    /// Fetch a route between two validated points.
    ///
    /// Implementations return `RouteNotFound` when the provider answers but
    /// has no path, and `Network` for transport or decoding failures.
    fn route(
        &self,
        origin: Coordinates,
        destination: Coordinates,
    ) -> impl Future<Output = Result<ProviderRoute>> + Send;

    /// Provider name for logging.
    fn name(&self) -> &str;
}

/// Retry and timeout policy for route requests.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Upper bound on a single provider call.
    pub timeout: Duration,
    /// Total attempts made by [`RouteResolver::resolve_with_retry`].
    pub max_attempts: u32,
    /// Pause between retry attempts.
    pub retry_delay: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
        }
    }
}

/// Resolves origin/destination pairs into routes.
#[derive(Debug)]
pub struct RouteResolver<P> {
    provider: P,
    config: ResolverConfig,
}

impl<P: RoutingProvider> RouteResolver<P> {
    #[must_use]
    pub fn new(provider: P, config: ResolverConfig) -> Self {
        Self { provider, config }
    }

    #[must_use]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Single attempt. Invalid input fails before the provider is contacted.
    pub async fn resolve(&self, origin: Coordinates, destination: Coordinates) -> Result<ResolvedRoute> {
        origin.validate()?;
        destination.validate()?;

        let raw = tokio::time::timeout(self.config.timeout, self.provider.route(origin, destination))
            .await
            .map_err(|_elapsed| {
                TrackingError::Network(format!(
                    "{} did not answer within {:?}",
                    self.provider.name(),
                    self.config.timeout
                ))
            })??;

        let route = normalize(raw)?;
        info!(
            "Resolved route {} -> {} via {}: {} waypoints, {:.2} km, {:.1} min",
            origin,
            destination,
            self.provider.name(),
            route.waypoints.len(),
            route.distance_km,
            route.duration_min
        );
        Ok(route)
    }

    /// Like [`resolve`](Self::resolve) but retries transient failures.
    pub async fn resolve_with_retry(
        &self,
        origin: Coordinates,
        destination: Coordinates,
    ) -> Result<ResolvedRoute> {
        let attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.resolve(origin, destination).await {
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!(
                        "Route request failed (attempt {} of {}): {}",
                        attempt, attempts, e
                    );
                    attempt += 1;
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                result => return result,
            }
        }
    }
}

fn normalize(raw: ProviderRoute) -> Result<ResolvedRoute> {
    let mut waypoints = raw.coordinates;
    match waypoints.len() {
        0 => return Err(TrackingError::RouteNotFound("provider returned an empty route".to_string())),
        1 => waypoints.push(waypoints[0]),
        _ => {}
    }
    if !raw.distance_m.is_finite() || !raw.duration_s.is_finite() || raw.distance_m < 0.0 || raw.duration_s < 0.0 {
        return Err(TrackingError::Network(format!(
            "malformed route totals: {} m, {} s",
            raw.distance_m, raw.duration_s
        )));
    }

    Ok(ResolvedRoute {
        waypoints,
        distance_km: raw.distance_m / 1000.0,
        duration_min: raw.duration_s / 60.0,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Provider that replays scripted responses and counts calls.
    #[derive(Debug, Default)]
    pub(crate) struct ScriptedProvider {
        pub(crate) calls: AtomicUsize,
        pub(crate) responses: Mutex<Vec<Result<ProviderRoute>>>,
        pub(crate) stall: bool,
    }

    impl ScriptedProvider {
        pub(crate) fn with(responses: Vec<Result<ProviderRoute>>) -> Self {
            let mut responses = responses;
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                ..Default::default()
            }
        }
    }

    impl RoutingProvider for ScriptedProvider {
        async fn route(&self, _origin: Coordinates, _destination: Coordinates) -> Result<ProviderRoute> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.stall {
                std::future::pending::<()>().await;
            }
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(TrackingError::Network("script exhausted".to_string())))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    pub(crate) fn two_point_route() -> ProviderRoute {
        ProviderRoute {
            coordinates: vec![Coordinates::new(4.0511, 9.7679), Coordinates::new(4.1, 9.82)],
            distance_m: 8_250.0,
            duration_s: 900.0,
        }
    }

    fn quick_config() -> ResolverConfig {
        ResolverConfig {
            timeout: Duration::from_secs(5),
            max_attempts: 3,
            retry_delay: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn test_invalid_coordinates_make_no_request() {
        let resolver = RouteResolver::new(ScriptedProvider::with(vec![Ok(two_point_route())]), quick_config());
        let result = resolver
            .resolve(Coordinates::new(200.0, 9.7), Coordinates::new(4.1, 9.82))
            .await;

        assert_eq!(result, Err(TrackingError::InvalidCoordinates { lat: 200.0, lng: 9.7 }));
        assert_eq!(resolver.provider().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_units_are_converted() {
        let resolver = RouteResolver::new(ScriptedProvider::with(vec![Ok(two_point_route())]), quick_config());
        let route = resolver
            .resolve(Coordinates::new(4.0511, 9.7679), Coordinates::new(4.1, 9.82))
            .await
            .unwrap();

        assert!((route.distance_km - 8.25).abs() < 1e-9);
        assert!((route.duration_min - 15.0).abs() < 1e-9);
        assert_eq!(route.waypoints.len(), 2);
    }

    #[tokio::test]
    async fn test_single_point_route_is_padded() {
        let point = Coordinates::new(4.0511, 9.7679);
        let resolver = RouteResolver::new(
            ScriptedProvider::with(vec![Ok(ProviderRoute {
                coordinates: vec![point],
                distance_m: 0.0,
                duration_s: 0.0,
            })]),
            quick_config(),
        );
        let route = resolver.resolve(point, point).await.unwrap();
        assert_eq!(route.waypoints, vec![point, point]);
    }

    #[tokio::test]
    async fn test_empty_route_is_not_found() {
        let resolver = RouteResolver::new(
            ScriptedProvider::with(vec![Ok(ProviderRoute {
                coordinates: Vec::new(),
                distance_m: 10.0,
                duration_s: 10.0,
            })]),
            quick_config(),
        );
        let result = resolver
            .resolve(Coordinates::new(4.0, 9.0), Coordinates::new(4.1, 9.1))
            .await;
        assert!(matches!(result, Err(TrackingError::RouteNotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_network_error() {
        let provider = ScriptedProvider {
            stall: true,
            ..Default::default()
        };
        let resolver = RouteResolver::new(provider, quick_config());
        let result = resolver
            .resolve(Coordinates::new(4.0, 9.0), Coordinates::new(4.1, 9.1))
            .await;
        assert!(matches!(result, Err(TrackingError::Network(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_from_transient_failure() {
        let resolver = RouteResolver::new(
            ScriptedProvider::with(vec![
                Err(TrackingError::Network("connection reset".to_string())),
                Ok(two_point_route()),
            ]),
            quick_config(),
        );
        let route = resolver
            .resolve_with_retry(Coordinates::new(4.0, 9.0), Coordinates::new(4.1, 9.1))
            .await;
        assert!(route.is_ok());
        assert_eq!(resolver.provider().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_route_not_found_is_not_retried() {
        let resolver = RouteResolver::new(
            ScriptedProvider::with(vec![
                Err(TrackingError::RouteNotFound("island".to_string())),
                Ok(two_point_route()),
            ]),
            quick_config(),
        );
        let result = resolver
            .resolve_with_retry(Coordinates::new(4.0, 9.0), Coordinates::new(4.1, 9.1))
            .await;
        assert!(matches!(result, Err(TrackingError::RouteNotFound(_))));
        assert_eq!(resolver.provider().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up_after_max_attempts() {
        let resolver = RouteResolver::new(ScriptedProvider::with(Vec::new()), quick_config());
        let result = resolver
            .resolve_with_retry(Coordinates::new(4.0, 9.0), Coordinates::new(4.1, 9.1))
            .await;
        assert!(matches!(result, Err(TrackingError::Network(_))));
        assert_eq!(resolver.provider().calls.load(Ordering::SeqCst), 3);
    }
}
