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

use log::info;
use std::collections::HashMap;
use std::sync::Arc;

use shipment_tracker::{
    Clock, Location, MovementStatus, RoutingProvider, ShipmentBackend, TrackerConfig, TrackingError,
    TrackingSession, TrackingView,
};

/// Manages tracking sessions for several orders with independent lifecycles
pub struct SessionManager<B, P> {
    /// Active sessions (keyed by order id)
    sessions: HashMap<String, TrackingSession<B, P>>,

    /// Backend shared by every session
    backend: Arc<B>,

    /// Routing provider, cloned into each new session
    provider: P,

    clock: Arc<dyn Clock>,
    config: TrackerConfig,
}

impl<B, P> std::fmt::Debug for SessionManager<B, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("sessions", &self.sessions.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl<B, P> SessionManager<B, P>
where
    B: ShipmentBackend + 'static,
    P: RoutingProvider + Clone,
{
    /// Create an empty session manager
    pub fn new(backend: Arc<B>, provider: P, clock: Arc<dyn Clock>, config: TrackerConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            backend,
            provider,
            clock,
            config,
        }
    }

    /// Start tracking an existing shipment; a session already running is reused
    pub async fn open(&mut self, order_id: &str) -> Result<&TrackingSession<B, P>, TrackingError> {
        if !self.sessions.contains_key(order_id) {
            info!("Opening session for order '{}'", order_id);
            let session = TrackingSession::open(
                order_id,
                Arc::clone(&self.backend),
                self.provider.clone(),
                Arc::clone(&self.clock),
                self.config.clone(),
            )
            .await?;
            self.sessions.insert(order_id.to_string(), session);
        }
        self.sessions
            .get(order_id)
            .ok_or_else(|| TrackingError::ShipmentNotFound(order_id.to_string()))
    }

    /// Create a shipment and track it, replacing any session for the same order
    pub async fn create(
        &mut self,
        order_id: &str,
        origin: Location,
        destination: Location,
    ) -> Result<&TrackingSession<B, P>, TrackingError> {
        self.remove(order_id).await;
        info!("Creating shipment for order '{}'", order_id);
        let session = TrackingSession::create(
            order_id,
            origin,
            destination,
            Arc::clone(&self.backend),
            self.provider.clone(),
            Arc::clone(&self.clock),
            self.config.clone(),
        )
        .await?;
        let session = self.sessions.entry(order_id.to_string()).or_insert(session);
        Ok(&*session)
    }

    /// Get the session for an order
    pub fn get(&self, order_id: &str) -> Option<&TrackingSession<B, P>> {
        self.sessions.get(order_id)
    }

    /// Stop and forget a session
    pub async fn remove(&mut self, order_id: &str) -> bool {
        if let Some(session) = self.sessions.remove(order_id) {
            info!("Removing session for order '{}'", order_id);
            session.shutdown().await;
            true
        } else {
            false
        }
    }

    /// Stop every session
    pub async fn stop_all(&mut self) {
        for (order_id, session) in self.sessions.drain() {
            info!("Stopping session for order '{}'", order_id);
            session.shutdown().await;
        }
    }

    /// Current views of all sessions, ordered by order id
    pub fn views(&self) -> Vec<TrackingView> {
        let mut views: Vec<_> = self.sessions.values().map(TrackingSession::view).collect();
        views.sort_by(|a, b| a.order_id.cmp(&b.order_id));
        views
    }

    /// Whether every tracked shipment has been delivered
    pub fn all_delivered(&self) -> bool {
        self.sessions
            .values()
            .all(|s| s.view().movement_status == MovementStatus::Delivered)
    }

    /// Get the number of managed sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl<B, P> Drop for SessionManager<B, P> {
    fn drop(&mut self) {
        if self.sessions.is_empty() {
            return;
        }
        info!("Shutting down SessionManager - stopping {} sessions", self.sessions.len());

        // Dropping a session cancels its timers
        for (order_id, session) in self.sessions.drain() {
            info!("Stopping session for order '{}'", order_id);
            drop(session);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipment_tracker::{Coordinates, InMemoryBackend, ManualClock, StraightLineProvider};

    fn manager() -> SessionManager<InMemoryBackend, StraightLineProvider> {
        let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
        SessionManager::new(
            Arc::new(InMemoryBackend::new(clock.clone())),
            StraightLineProvider::default(),
            clock,
            TrackerConfig::default(),
        )
    }

    fn location(lat: f64, lng: f64) -> Location {
        Location::from(Coordinates::new(lat, lng))
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracks_orders_independently() {
        let mut manager = manager();
        manager
            .create("A-1", location(4.0511, 9.7679), location(4.1000, 9.8200))
            .await
            .unwrap();
        manager
            .create("A-2", location(3.8480, 11.5021), location(3.8700, 11.5200))
            .await
            .unwrap();
        assert_eq!(manager.len(), 2);

        manager.get("A-1").unwrap().start().await.unwrap();
        let views = manager.views();
        assert_eq!(views[0].movement_status, MovementStatus::OnTransit);
        assert_eq!(views[1].movement_status, MovementStatus::NotStarted);
        assert!(!manager.all_delivered());

        assert!(manager.remove("A-1").await);
        assert!(!manager.remove("A-1").await);
        assert_eq!(manager.len(), 1);

        manager.stop_all().await;
        assert!(manager.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_reuses_running_session() {
        let mut manager = manager();
        let id = manager
            .create("B-1", location(4.0511, 9.7679), location(4.1000, 9.8200))
            .await
            .unwrap()
            .id();
        assert_eq!(manager.open("B-1").await.unwrap().id(), id);
        assert!(matches!(
            manager.open("missing").await,
            Err(TrackingError::ShipmentNotFound(_))
        ));
    }
}
