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

//! Reconciliation of local simulation with the authoritative server snapshot.
//!
//! The merge rule lives in [`reconcile`], a pure function. [`PollingSynchronizer`]
//! wraps it with the side effects: fetching, the single-flight guard and the
//! status-dependent polling cadence.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use log::{debug, warn};

use crate::backend::ShipmentBackend;
use crate::error::{Result, TrackingError};
use crate::shipment::{MovementStatus, Shipment};

/// Merge a server snapshot into local state. Server wins when strictly newer.
///
/// A snapshot that is not newer yields `StaleSnapshot`; otherwise the result
/// is [`adopt`].
pub fn reconcile(local: &Shipment, server: &Shipment, arrival_tolerance_km: f64) -> Result<Shipment> {
    if server.last_updated <= local.last_updated {
        return Err(TrackingError::StaleSnapshot {
            server: server.last_updated,
            local: local.last_updated,
        });
    }
    Ok(adopt(local, server, arrival_tolerance_km))
}

/// Take the server's side regardless of timestamps.
///
/// The moving fields (progress, position, remaining time, status and
/// timestamps) come from the server. Route fields do too when the server holds
/// a different usable route, so a server-side re-route lands as one unit.
#[must_use]
pub fn adopt(local: &Shipment, server: &Shipment, arrival_tolerance_km: f64) -> Shipment {
    let mut merged = local.clone();
    if server.has_route() && server.route != local.route {
        merged.origin = server.origin.clone();
        merged.destination = server.destination.clone();
        merged.route = server.route.clone();
        merged.distance_km = server.distance_km;
        merged.duration_min = server.duration_min;
    }

    merged.progress = server.progress;
    merged.current_location = server.current_location;
    merged.remaining_time_min = server.remaining_time_min;
    merged.movement_status = server.movement_status;
    merged.start_time = server.start_time;
    merged.last_paused_at = server.last_paused_at;
    merged.last_updated = server.last_updated;
    merged.settle_arrival(arrival_tolerance_km);
    merged
}

/// What a single poll did.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The server snapshot replaced local state.
    Applied(MovementStatus),
    /// The server snapshot was not newer and was discarded.
    Stale,
    /// A previous poll was still in flight.
    Skipped,
    /// The backend has no record for the order.
    Missing,
    /// The request failed; local state is unchanged.
    Failed(TrackingError),
}

/// Polling cadence.
#[derive(Debug, Clone)]
pub struct PollIntervals {
    pub on_transit: Duration,
    pub idle: Duration,
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            on_transit: Duration::from_secs(5),
            idle: Duration::from_secs(30),
        }
    }
}

/// Fetches server snapshots for one shipment and folds them into local state.
#[derive(Debug)]
pub struct PollingSynchronizer {
    order_id: String,
    intervals: PollIntervals,
    arrival_tolerance_km: f64,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag however the poll ends, including cancellation.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl PollingSynchronizer {
    #[must_use]
    pub fn new(order_id: impl Into<String>, intervals: PollIntervals, arrival_tolerance_km: f64) -> Self {
        Self {
            order_id: order_id.into(),
            intervals,
            arrival_tolerance_km,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Delay before the next poll given the current status.
    #[must_use]
    pub fn interval_for(&self, status: MovementStatus) -> Duration {
        match status {
            MovementStatus::OnTransit => self.intervals.on_transit,
            _ => self.intervals.idle,
        }
    }

    /// Whether a poll is currently awaiting the backend.
    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Poll once and reconcile into `shipment`.
    ///
    /// Never fails: errors are logged and reported through the outcome so the
    /// caller keeps its last known state and tries again next interval.
    pub async fn poll_once<B: ShipmentBackend>(&self, backend: &B, shipment: &RwLock<Shipment>) -> PollOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("[{}] Poll skipped, previous request still pending", self.order_id);
            return PollOutcome::Skipped;
        }
        let _guard = InFlight(&self.in_flight);

        let server = match backend.fetch_snapshot(&self.order_id).await {
            Ok(Some(server)) => server,
            Ok(None) => {
                warn!("[{}] Backend has no shipment record", self.order_id);
                return PollOutcome::Missing;
            }
            Err(e) => {
                warn!("[{}] Poll failed: {}", self.order_id, e);
                return PollOutcome::Failed(e);
            }
        };

        let mut local = shipment.write().unwrap_or_else(PoisonError::into_inner);
        match reconcile(&local, &server, self.arrival_tolerance_km) {
            Ok(merged) => {
                let status = merged.movement_status;
                debug!(
                    "[{}] Applied server snapshot: {} at {:.1}%",
                    self.order_id, status, merged.progress
                );
                *local = merged;
                PollOutcome::Applied(status)
            }
            Err(e) => {
                debug!("[{}] Discarded server snapshot: {}", self.order_id, e);
                PollOutcome::Stale
            }
        }
    }
}
