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

//! Error taxonomy for route resolution, movement control and synchronization.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::movement::MovementCommand;
use crate::shipment::MovementStatus;

/// Errors produced by the tracking engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackingError {
    /// Latitude or longitude outside the valid range, or not finite.
    #[error("invalid coordinates: lat={lat}, lng={lng}")]
    InvalidCoordinates { lat: f64, lng: f64 },

    /// The routing provider found no path between the points.
    #[error("route not found: {0}")]
    RouteNotFound(String),

    /// Transient I/O failure talking to the routing provider or the backend.
    #[error("network error: {0}")]
    Network(String),

    /// A movement command that is not allowed from the current status.
    #[error("cannot {command} a shipment that is {from}")]
    InvalidTransition {
        from: MovementStatus,
        command: MovementCommand,
    },

    /// A server snapshot that is not newer than the local state.
    #[error("stale snapshot: server {server} is not newer than local {local}")]
    StaleSnapshot {
        server: DateTime<Utc>,
        local: DateTime<Utc>,
    },

    /// Movement requested before a route has been resolved.
    #[error("shipment {0} has no resolved route")]
    NoRoute(String),

    /// The backend refused the request, e.g. a transition its record does not allow.
    #[error("rejected by backend: {0}")]
    Rejected(String),

    /// The backend has no shipment record for the order.
    #[error("no shipment found for order {0}")]
    ShipmentNotFound(String),

    /// Unusable client configuration, such as a malformed base URL.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl TrackingError {
    /// Whether retrying the same request later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

impl From<reqwest::Error> for TrackingError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, TrackingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_network_errors_are_retryable() {
        assert!(TrackingError::Network("timeout".to_string()).is_retryable());
        assert!(!TrackingError::RouteNotFound("no path".to_string()).is_retryable());
        assert!(!TrackingError::Rejected("HTTP 409".to_string()).is_retryable());
        assert!(!TrackingError::InvalidCoordinates { lat: 200.0, lng: 9.7 }.is_retryable());
        assert!(!TrackingError::InvalidTransition {
            from: MovementStatus::Delivered,
            command: MovementCommand::Start,
        }
        .is_retryable());
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = TrackingError::InvalidTransition {
            from: MovementStatus::Delivered,
            command: MovementCommand::Pause,
        };
        assert_eq!(err.to_string(), "cannot pause a shipment that is delivered");
    }
}
