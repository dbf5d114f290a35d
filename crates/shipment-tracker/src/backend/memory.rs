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

//! Process-local shipment store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::ShipmentBackend;
use crate::clock::{Clock, SystemClock};
use crate::error::{Result, TrackingError};
use crate::shipment::{MovementStatus, Shipment};

/// In-memory backend that behaves like the REST API: it stamps
/// `last_updated` on every write and applies transitions server-side.
#[derive(Debug, Clone)]
pub struct InMemoryBackend {
    records: Arc<Mutex<HashMap<String, Shipment>>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl InMemoryBackend {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Arc::new(Mutex::new(HashMap::new())),
            clock,
        }
    }

    /// Write a record directly, as an operator editing it server-side would.
    pub fn insert(&self, mut shipment: Shipment) -> Result<Shipment> {
        let mut records = self.records.lock().map_err(|_poison| Self::poisoned())?;
        shipment.last_updated = self.clock.now();
        records.insert(shipment.order_id.clone(), shipment.clone());
        Ok(shipment)
    }

    /// Current stored record.
    #[must_use]
    pub fn get(&self, order_id: &str) -> Option<Shipment> {
        self.records.lock().ok()?.get(order_id).cloned()
    }

    fn poisoned() -> TrackingError {
        TrackingError::Network("in-memory store unavailable".to_string())
    }
}

impl ShipmentBackend for InMemoryBackend {
    async fn save_snapshot(&self, shipment: &Shipment) -> Result<Shipment> {
        let now = self.clock.now();
        let mut records = self.records.lock().map_err(|_poison| Self::poisoned())?;
        let mut stored = shipment.clone();
        stored.last_updated = now;
        records.insert(stored.order_id.clone(), stored.clone());
        Ok(stored)
    }

    async fn fetch_snapshot(&self, order_id: &str) -> Result<Option<Shipment>> {
        let records = self.records.lock().map_err(|_poison| Self::poisoned())?;
        Ok(records.get(order_id).cloned())
    }

    async fn set_movement_status(&self, order_id: &str, status: MovementStatus) -> Result<Shipment> {
        let now = self.clock.now();
        let mut records = self.records.lock().map_err(|_poison| Self::poisoned())?;
        let record = records
            .get_mut(order_id)
            .ok_or_else(|| TrackingError::ShipmentNotFound(order_id.to_string()))?;

        if record.movement_status != status {
            match status {
                MovementStatus::OnTransit => record.start(now)?,
                MovementStatus::Paused => record.pause(now)?,
                MovementStatus::Delivered => record.deliver(now)?,
                MovementStatus::NotStarted => {
                    return Err(TrackingError::InvalidTransition {
                        from: record.movement_status,
                        command: crate::movement::MovementCommand::Start,
                    });
                }
            }
        }
        record.last_updated = now;
        Ok(record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::geo::{Coordinates, Location};
    use crate::shipment::ResolvedRoute;
    use chrono::{Duration, Utc};

    fn routed(now: chrono::DateTime<Utc>) -> Shipment {
        let mut shipment = Shipment::new("9", Location::new(4.0, 9.0), Location::new(4.1, 9.1), now);
        shipment.apply_route(
            ResolvedRoute {
                waypoints: vec![Coordinates::new(4.0, 9.0), Coordinates::new(4.1, 9.1)],
                distance_km: 15.7,
                duration_min: 20.0,
            },
            now,
        );
        shipment
    }

    #[tokio::test]
    async fn test_save_stamps_last_updated() {
        let clock = ManualClock::new(Utc::now());
        let backend = InMemoryBackend::new(Arc::new(clock.clone()));
        let shipment = routed(clock.now() - Duration::hours(1));

        clock.advance(Duration::seconds(5));
        let stored = backend.save_snapshot(&shipment).await.unwrap();
        assert_eq!(stored.last_updated, clock.now());
        assert_eq!(backend.fetch_snapshot("9").await.unwrap(), Some(stored));
        assert_eq!(backend.fetch_snapshot("10").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_status_applies_state_machine() {
        let backend = InMemoryBackend::default();
        backend.insert(routed(Utc::now())).unwrap();

        let started = backend.set_movement_status("9", MovementStatus::OnTransit).await.unwrap();
        assert_eq!(started.movement_status, MovementStatus::OnTransit);
        assert!(started.start_time.is_some());

        let result = backend.set_movement_status("9", MovementStatus::NotStarted).await;
        assert!(matches!(result, Err(TrackingError::InvalidTransition { .. })));

        let missing = backend.set_movement_status("nope", MovementStatus::Paused).await;
        assert_eq!(missing, Err(TrackingError::ShipmentNotFound("nope".to_string())));
    }

    #[test]
    fn test_insert_reports_poisoned_store() {
        let backend = InMemoryBackend::default();
        let records = Arc::clone(&backend.records);
        let _ = std::thread::spawn(move || {
            let _guard = records.lock().unwrap();
            panic!("poison the store");
        })
        .join();

        let result = backend.insert(routed(Utc::now()));
        assert!(matches!(result, Err(TrackingError::Network(_))));
        assert_eq!(backend.get("9"), None);
    }
}
