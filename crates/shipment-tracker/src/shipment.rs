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

//! Shipment record shared by the resolver, state machine, simulator and synchronizer.
//!
//! The same type doubles as the backend wire format (camelCase JSON), so a
//! fetched snapshot can be reconciled against local state field by field.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo::{distance_km, Coordinates, Location};
use crate::progress;

/// Shipment lifecycle status.
///
/// Backends in the wild use several spellings for the same state; they are
/// normalized here so nothing downstream branches on raw strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum MovementStatus {
    #[default]
    NotStarted,
    OnTransit,
    Paused,
    Delivered,
}

impl MovementStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::OnTransit => "on_transit",
            Self::Paused => "paused",
            Self::Delivered => "delivered",
        }
    }

    /// Terminal states accept no further transitions.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

impl std::fmt::Display for MovementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// A status string that maps to none of the known spellings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown movement status: {0:?}")]
pub struct UnknownStatus(pub String);

impl FromStr for MovementStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "not_started" | "notstarted" | "pending" | "" => Ok(Self::NotStarted),
            "on_transit" | "in_transit" | "moving" | "started" => Ok(Self::OnTransit),
            "paused" | "stopped" => Ok(Self::Paused),
            "delivered" | "arrived" | "completed" => Ok(Self::Delivered),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

impl TryFrom<String> for MovementStatus {
    type Error = UnknownStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Output of route resolution, applied to a shipment as one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRoute {
    pub waypoints: Vec<Coordinates>,
    pub distance_km: f64,
    pub duration_min: f64,
}

/// Per-order shipment state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shipment {
    pub order_id: String,
    pub origin: Location,
    pub destination: Location,
    #[serde(default)]
    pub route: Vec<Coordinates>,
    #[serde(default)]
    pub distance_km: f64,
    #[serde(default)]
    pub duration_min: f64,
    #[serde(default)]
    pub movement_status: MovementStatus,
    #[serde(default)]
    pub progress: f64,
    /// Absent until the shipment has moved; read through [`Shipment::current_location`].
    #[serde(default)]
    pub current_location: Option<Coordinates>,
    #[serde(default)]
    pub remaining_time_min: f64,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_paused_at: Option<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
}

impl Shipment {
    /// Create an unrouted shipment.
    #[must_use]
    pub fn new(
        order_id: impl Into<String>,
        origin: Location,
        destination: Location,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            origin,
            destination,
            route: Vec::new(),
            distance_km: 0.0,
            duration_min: 0.0,
            movement_status: MovementStatus::NotStarted,
            progress: 0.0,
            current_location: None,
            remaining_time_min: 0.0,
            start_time: None,
            last_paused_at: None,
            last_updated: now,
        }
    }

    /// Whether a usable route (at least two waypoints) is present.
    #[must_use]
    pub fn has_route(&self) -> bool {
        self.route.len() >= 2
    }

    /// Current position, falling back to the origin.
    #[must_use]
    pub fn current_location(&self) -> Coordinates {
        self.current_location
            .unwrap_or_else(|| self.origin.coordinates())
    }

    /// Replace route, distance and duration together and restart the lifecycle.
    pub fn apply_route(&mut self, route: ResolvedRoute, now: DateTime<Utc>) {
        self.route = route.waypoints;
        self.distance_km = route.distance_km;
        self.duration_min = route.duration_min;
        self.movement_status = MovementStatus::NotStarted;
        self.progress = 0.0;
        self.current_location = Some(self.origin.coordinates());
        self.remaining_time_min = route.duration_min;
        self.start_time = None;
        self.last_paused_at = None;
        self.last_updated = now;
    }

    /// Move to `progress` percent along the route, snapping to its waypoint.
    pub fn place_at(&mut self, progress: f64) {
        self.progress = progress::clamp_percent(progress);
        if let Some(point) = progress::waypoint_at(&self.route, self.progress) {
            self.current_location = Some(point);
        }
        self.remaining_time_min = progress::remaining_time_min(self.duration_min, self.progress);
    }

    /// Enforce the arrival rule: a moving shipment at 100% (or within
    /// `tolerance_km` of the destination) is delivered.
    ///
    /// Returns `true` when this call moved the shipment into `Delivered`.
    pub fn settle_arrival(&mut self, tolerance_km: f64) -> bool {
        if !matches!(
            self.movement_status,
            MovementStatus::OnTransit | MovementStatus::Paused | MovementStatus::Delivered
        ) {
            return false;
        }

        let near = distance_km(self.current_location(), self.destination.coordinates()) < tolerance_km;
        let arrived = near
            || self.progress >= progress::COMPLETE
            || self.movement_status == MovementStatus::Delivered;
        if !arrived {
            return false;
        }

        self.progress = progress::COMPLETE;
        self.remaining_time_min = 0.0;
        if !near {
            if let Some(last) = self.route.last() {
                self.current_location = Some(*last);
            }
        }

        let newly_delivered = self.movement_status != MovementStatus::Delivered;
        self.movement_status = MovementStatus::Delivered;
        newly_delivered
    }

    /// Read-only projection handed to the presentation layer.
    #[must_use]
    pub fn view(&self) -> TrackingView {
        TrackingView {
            order_id: self.order_id.clone(),
            progress: self.progress,
            current_location: self.current_location(),
            remaining_time_min: self.remaining_time_min,
            movement_status: self.movement_status,
            route: self.route.clone(),
            distance_km: self.distance_km,
        }
    }
}

/// What a map or status panel needs to render one shipment.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingView {
    pub order_id: String,
    pub progress: f64,
    pub current_location: Coordinates,
    pub remaining_time_min: f64,
    pub movement_status: MovementStatus,
    pub route: Vec<Coordinates>,
    pub distance_km: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Shipment {
        let mut shipment = Shipment::new(
            "order-1",
            Location::new(4.0511, 9.7679),
            Location::new(4.1000, 9.8200),
            Utc::now(),
        );
        let waypoints = (0..10)
            .map(|i| {
                Coordinates::new(4.0511, 9.7679).lerp(&Coordinates::new(4.1000, 9.8200), f64::from(i) / 9.0)
            })
            .collect();
        shipment.apply_route(
            ResolvedRoute {
                waypoints,
                distance_km: 8.0,
                duration_min: 60.0,
            },
            Utc::now(),
        );
        shipment
    }

    #[test]
    fn test_status_normalization() {
        assert_eq!("moving".parse::<MovementStatus>().unwrap(), MovementStatus::OnTransit);
        assert_eq!("In-Transit".parse::<MovementStatus>().unwrap(), MovementStatus::OnTransit);
        assert_eq!("stopped".parse::<MovementStatus>().unwrap(), MovementStatus::Paused);
        assert_eq!("delivered".parse::<MovementStatus>().unwrap(), MovementStatus::Delivered);
        assert_eq!("not_started".parse::<MovementStatus>().unwrap(), MovementStatus::NotStarted);
        assert!("teleported".parse::<MovementStatus>().is_err());
    }

    #[test]
    fn test_status_wire_format() {
        let status: MovementStatus = serde_json::from_str("\"moving\"").unwrap();
        assert_eq!(status, MovementStatus::OnTransit);
        assert_eq!(serde_json::to_string(&status).unwrap(), "\"on_transit\"");
        assert!(serde_json::from_str::<MovementStatus>("\"warp\"").is_err());
    }

    #[test]
    fn test_apply_route_resets_lifecycle() {
        let mut shipment = sample();
        shipment.movement_status = MovementStatus::Paused;
        shipment.place_at(40.0);

        let route = shipment.route.clone();
        shipment.apply_route(
            ResolvedRoute {
                waypoints: route,
                distance_km: 9.0,
                duration_min: 70.0,
            },
            Utc::now(),
        );

        assert_eq!(shipment.movement_status, MovementStatus::NotStarted);
        assert!(shipment.progress.abs() < f64::EPSILON);
        assert_eq!(shipment.current_location(), shipment.origin.coordinates());
        assert!((shipment.remaining_time_min - 70.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_place_at_snaps_to_waypoint() {
        let mut shipment = sample();
        shipment.place_at(50.0);
        assert_eq!(shipment.current_location(), shipment.route[4]);
        assert!((shipment.remaining_time_min - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_settle_arrival_near_destination() {
        let mut shipment = sample();
        shipment.movement_status = MovementStatus::OnTransit;
        shipment.progress = 97.0;
        shipment.current_location = Some(Coordinates::new(4.1002, 9.8200));

        assert!(shipment.settle_arrival(0.05));
        assert_eq!(shipment.movement_status, MovementStatus::Delivered);
        assert!((shipment.progress - 100.0).abs() < f64::EPSILON);
        assert!(shipment.remaining_time_min.abs() < f64::EPSILON);
    }

    #[test]
    fn test_settle_arrival_ignores_unstarted() {
        let mut shipment = sample();
        shipment.progress = 100.0;
        assert!(!shipment.settle_arrival(0.05));
        assert_eq!(shipment.movement_status, MovementStatus::NotStarted);
    }

    #[test]
    fn test_deserialize_backend_snapshot() {
        let json = r#"{
            "orderId": "A-17",
            "origin": {"lat": 4.0511, "lng": 9.7679, "address": "Yard"},
            "destination": {"lat": 4.1, "lng": 9.82},
            "route": [{"lat": 4.0511, "lng": 9.7679}, {"lat": 4.1, "lng": 9.82}],
            "distanceKm": 8.1,
            "durationMin": 14.0,
            "movementStatus": "moving",
            "progress": 12.5,
            "remainingTimeMin": 12.25,
            "lastUpdated": "2025-03-01T10:00:00Z"
        }"#;
        let shipment: Shipment = serde_json::from_str(json).unwrap();
        assert_eq!(shipment.movement_status, MovementStatus::OnTransit);
        assert_eq!(shipment.origin.address.as_deref(), Some("Yard"));
        assert_eq!(shipment.current_location(), Coordinates::new(4.0511, 9.7679));
    }
}
