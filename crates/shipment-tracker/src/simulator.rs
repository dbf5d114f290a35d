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

//! Time-driven position simulation for shipments without a live device feed.

use chrono::{DateTime, Utc};
use log::{debug, info};

use crate::progress::{self, ARRIVAL_TOLERANCE_KM};
use crate::shipment::{MovementStatus, Shipment};

/// Result of a single simulator tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Shipment is not moving; nothing changed.
    Idle,
    /// First tick after a (re)start; establishes the reference instant.
    Resumed,
    /// Progress advanced to the given percentage.
    Advanced(f64),
    /// Progress reached 100 on this tick and the shipment is now delivered.
    Delivered,
}

/// Advances a shipment along its route from wall-clock deltas.
///
/// Elapsed time is measured from the previous tick, never from the original
/// start, so pausing and resuming does not make progress jump.
#[derive(Debug, Clone)]
pub struct PositionSimulator {
    last_tick: Option<DateTime<Utc>>,
    arrival_tolerance_km: f64,
}

impl Default for PositionSimulator {
    fn default() -> Self {
        Self::new(ARRIVAL_TOLERANCE_KM)
    }
}

impl PositionSimulator {
    #[must_use]
    pub fn new(arrival_tolerance_km: f64) -> Self {
        Self {
            last_tick: None,
            arrival_tolerance_km,
        }
    }

    /// Whether a reference instant is held, i.e. the simulation is live.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.last_tick.is_some()
    }

    /// Drop the reference instant; the next tick starts a fresh interval.
    pub fn halt(&mut self) {
        self.last_tick = None;
    }

    /// Advance `shipment` to `now`.
    pub fn tick(&mut self, shipment: &mut Shipment, now: DateTime<Utc>) -> TickOutcome {
        if shipment.movement_status != MovementStatus::OnTransit {
            self.halt();
            return TickOutcome::Idle;
        }

        let Some(last) = self.last_tick.replace(now) else {
            debug!("[{}] Simulation resumed at {:.1}%", shipment.order_id, shipment.progress);
            return TickOutcome::Resumed;
        };

        #[allow(
            clippy::cast_precision_loss,
            reason = "millisecond deltas between ticks are small"
        )]
        let elapsed_secs = (now - last).num_milliseconds() as f64 / 1000.0;
        let next = progress::time_progress(shipment.progress, elapsed_secs, shipment.duration_min);
        shipment.place_at(next);

        if shipment.settle_arrival(self.arrival_tolerance_km) {
            shipment.last_updated = now;
            self.halt();
            info!("[{}] Simulated shipment reached destination", shipment.order_id);
            return TickOutcome::Delivered;
        }

        TickOutcome::Advanced(shipment.progress)
    }
}
