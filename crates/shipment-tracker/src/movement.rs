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

//! Movement state machine.
//!
//! ```text
//! not_started --start--> on_transit --pause--> paused
//!                            ^                   |
//!                            +------start--------+
//! on_transit --deliver--> delivered (terminal)
//! any but delivered --reroute--> not_started
//! ```
//!
//! A rejected command leaves the shipment untouched.

use chrono::{DateTime, Utc};
use log::{info, warn};

use crate::error::{Result, TrackingError};
use crate::progress;
use crate::shipment::{MovementStatus, Shipment};

/// Commands accepted by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementCommand {
    Start,
    Pause,
    /// Issued internally when progress reaches 100.
    Deliver,
    /// Replace the route and restart from the origin.
    Reroute,
}

impl std::fmt::Display for MovementCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Deliver => "deliver",
            Self::Reroute => "reroute",
        })
    }
}

impl MovementStatus {
    /// Target status for `command`, or `InvalidTransition`.
    pub fn next(self, command: MovementCommand) -> Result<MovementStatus> {
        match (self, command) {
            (Self::NotStarted | Self::Paused, MovementCommand::Start) => Ok(Self::OnTransit),
            (Self::OnTransit, MovementCommand::Pause) => Ok(Self::Paused),
            (Self::OnTransit, MovementCommand::Deliver) => Ok(Self::Delivered),
            (Self::NotStarted | Self::OnTransit | Self::Paused, MovementCommand::Reroute) => {
                Ok(Self::NotStarted)
            }
            (from, command) => Err(TrackingError::InvalidTransition { from, command }),
        }
    }
}

impl Shipment {
    /// Begin or resume movement.
    ///
    /// Records `start_time` on the first start only and clears `last_paused_at`.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<()> {
        let next = self.checked_next(MovementCommand::Start)?;
        if !self.has_route() {
            return Err(TrackingError::NoRoute(self.order_id.clone()));
        }

        if self.start_time.is_none() {
            self.start_time = Some(now);
        }
        self.last_paused_at = None;
        self.movement_status = next;
        self.last_updated = now;
        info!("[{}] Shipment started at {:.1}%", self.order_id, self.progress);
        Ok(())
    }

    /// Freeze movement; progress and position stay where they are.
    pub fn pause(&mut self, now: DateTime<Utc>) -> Result<()> {
        let next = self.checked_next(MovementCommand::Pause)?;
        self.last_paused_at = Some(now);
        self.movement_status = next;
        self.last_updated = now;
        info!("[{}] Shipment paused at {:.1}%", self.order_id, self.progress);
        Ok(())
    }

    /// Mark the shipment delivered and pin it to the end of the route.
    pub fn deliver(&mut self, now: DateTime<Utc>) -> Result<()> {
        let next = self.checked_next(MovementCommand::Deliver)?;
        self.movement_status = next;
        self.progress = progress::COMPLETE;
        self.remaining_time_min = 0.0;
        if let Some(last) = self.route.last() {
            self.current_location = Some(*last);
        }
        self.last_updated = now;
        info!("[{}] Shipment delivered", self.order_id);
        Ok(())
    }

    /// Validate a movement command without applying it.
    pub fn check(&self, command: MovementCommand) -> Result<MovementStatus> {
        self.checked_next(command)
    }

    fn checked_next(&self, command: MovementCommand) -> Result<MovementStatus> {
        self.movement_status.next(command).inspect_err(|e| {
            warn!("[{}] Rejected transition: {}", self.order_id, e);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{Coordinates, Location};
    use crate::shipment::ResolvedRoute;
    use chrono::Duration;

    fn routed() -> Shipment {
        let now = Utc::now();
        let mut shipment = Shipment::new(
            "order-7",
            Location::new(4.0511, 9.7679),
            Location::new(4.1000, 9.8200),
            now,
        );
        shipment.apply_route(
            ResolvedRoute {
                waypoints: vec![Coordinates::new(4.0511, 9.7679), Coordinates::new(4.1000, 9.8200)],
                distance_km: 8.0,
                duration_min: 60.0,
            },
            now,
        );
        shipment
    }

    #[test]
    fn test_transition_table() {
        use MovementCommand::{Deliver, Pause, Reroute, Start};
        use MovementStatus::{Delivered, NotStarted, OnTransit, Paused};

        assert_eq!(NotStarted.next(Start), Ok(OnTransit));
        assert_eq!(Paused.next(Start), Ok(OnTransit));
        assert_eq!(OnTransit.next(Pause), Ok(Paused));
        assert_eq!(OnTransit.next(Deliver), Ok(Delivered));
        assert_eq!(OnTransit.next(Reroute), Ok(NotStarted));
        assert_eq!(Paused.next(Reroute), Ok(NotStarted));

        for (from, command) in [
            (NotStarted, Pause),
            (NotStarted, Deliver),
            (OnTransit, Start),
            (Paused, Pause),
            (Paused, Deliver),
            (Delivered, Start),
            (Delivered, Pause),
            (Delivered, Deliver),
            (Delivered, Reroute),
        ] {
            assert_eq!(
                from.next(command),
                Err(TrackingError::InvalidTransition { from, command })
            );
        }
    }

    #[test]
    fn test_start_records_first_start_only() {
        let mut shipment = routed();
        let t0 = Utc::now();
        shipment.start(t0).unwrap();
        assert_eq!(shipment.start_time, Some(t0));

        shipment.pause(t0 + Duration::minutes(5)).unwrap();
        assert_eq!(shipment.last_paused_at, Some(t0 + Duration::minutes(5)));

        shipment.start(t0 + Duration::minutes(9)).unwrap();
        assert_eq!(shipment.start_time, Some(t0));
        assert_eq!(shipment.last_paused_at, None);
        assert_eq!(shipment.movement_status, MovementStatus::OnTransit);
    }

    #[test]
    fn test_start_without_route_fails() {
        let mut shipment = Shipment::new(
            "order-8",
            Location::new(4.0, 9.0),
            Location::new(4.1, 9.1),
            Utc::now(),
        );
        assert_eq!(
            shipment.start(Utc::now()),
            Err(TrackingError::NoRoute("order-8".to_string()))
        );
        assert_eq!(shipment.movement_status, MovementStatus::NotStarted);
    }

    #[test]
    fn test_delivered_is_terminal_and_unchanged() {
        let mut shipment = routed();
        shipment.start(Utc::now()).unwrap();
        shipment.deliver(Utc::now()).unwrap();
        let before = shipment.clone();

        assert!(matches!(
            shipment.start(Utc::now()),
            Err(TrackingError::InvalidTransition { .. })
        ));
        assert!(matches!(
            shipment.pause(Utc::now()),
            Err(TrackingError::InvalidTransition { .. })
        ));
        assert_eq!(shipment, before);
    }
}
