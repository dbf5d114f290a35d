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

//! Per-shipment tracking session.
//!
//! A [`TrackingSession`] owns one shipment and four timers:
//!
//! - **simulator**: advances progress from elapsed time while on transit
//! - **poll**: fetches the server snapshot and lets it win when newer
//! - **countdown**: refreshes the remaining-time display
//! - **saver**: persists the moving shipment at a lower frequency
//!
//! Dropping the session (or awaiting [`TrackingSession::shutdown`]) releases
//! all of them.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::backend::ShipmentBackend;
use crate::clock::Clock;
use crate::config::TrackerConfig;
use crate::error::{Result, TrackingError};
use crate::geo::{Coordinates, Location};
use crate::movement::MovementCommand;
use crate::progress;
use crate::route::{RouteResolver, RoutingProvider};
use crate::shipment::{MovementStatus, ResolvedRoute, Shipment, TrackingView};
use crate::simulator::{PositionSimulator, TickOutcome};
use crate::sync::{self, PollOutcome, PollingSynchronizer};
use crate::timer::TimerSet;

/// Notifications published by a session.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackingEvent {
    /// A new route was applied.
    RouteResolved { distance_km: f64, duration_min: f64 },
    /// Movement status changed, locally or from the server.
    StatusChanged(MovementStatus),
    /// The shipment reached its destination.
    Delivered,
    /// A newer server snapshot replaced local state.
    SnapshotApplied(MovementStatus),
    /// Fetching from or pushing to the backend failed.
    SyncFailed(TrackingError),
    /// A periodic snapshot save failed; it is retried on the next interval.
    SaveFailed(TrackingError),
}

/// Time left until arrival.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Countdown {
    pub remaining: Duration,
    /// Estimated arrival, only while on transit.
    pub eta: Option<DateTime<Utc>>,
}

impl Countdown {
    fn of(shipment: &Shipment, now: DateTime<Utc>) -> Self {
        let remaining = Duration::try_from_secs_f64(shipment.remaining_time_min * 60.0).unwrap_or_default();
        let eta = if shipment.movement_status == MovementStatus::OnTransit {
            chrono::Duration::from_std(remaining)
                .ok()
                .and_then(|d| now.checked_add_signed(d))
        } else {
            None
        };
        Self { remaining, eta }
    }
}

impl fmt::Display for Countdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.remaining.as_secs();
        write!(f, "{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
    }
}

/// State shared between the session handle and its timers.
struct Shared<B> {
    order_id: String,
    shipment: RwLock<Shipment>,
    backend: Arc<B>,
    clock: Arc<dyn Clock>,
    config: TrackerConfig,
    synchronizer: PollingSynchronizer,
    /// Set when the backend may be behind local state.
    dirty: AtomicBool,
    /// Server `last_updated` that local state was last based on. `None` until
    /// the record has been written or fetched once.
    synced: Mutex<Option<DateTime<Utc>>>,
    view_tx: watch::Sender<TrackingView>,
    countdown_tx: watch::Sender<Countdown>,
    event_tx: broadcast::Sender<TrackingEvent>,
}

impl<B: ShipmentBackend> Shared<B> {
    fn read(&self) -> RwLockReadGuard<'_, Shipment> {
        self.shipment.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Shipment> {
        self.shipment.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self) {
        let view = self.read().view();
        self.view_tx.send_replace(view);
    }

    fn emit(&self, event: TrackingEvent) {
        let _ = self.event_tx.send(event);
    }

    fn synced(&self) -> Option<DateTime<Utc>> {
        *self.synced.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mark_synced(&self, at: DateTime<Utc>) {
        let mut synced = self.synced.lock().unwrap_or_else(PoisonError::into_inner);
        if !matches!(*synced, Some(prev) if prev >= at) {
            *synced = Some(at);
        }
    }

    /// Persist the current snapshot and adopt the stored timestamp.
    ///
    /// The write only goes out while the server record is unchanged since
    /// the last sync. A record edited server-side in the meantime is adopted
    /// instead. Returns whether the snapshot was written.
    async fn save(&self) -> bool {
        if let Some(base) = self.synced() {
            match self.backend.fetch_snapshot(&self.order_id).await {
                Ok(Some(server)) if server.last_updated > base => {
                    info!(
                        "[{}] Server record changed since last sync, adopting it instead of saving",
                        self.order_id
                    );
                    self.adopt(&server);
                    return false;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("[{}] Snapshot save failed: {}", self.order_id, e);
                    self.dirty.store(true, Ordering::Release);
                    self.emit(TrackingEvent::SaveFailed(e));
                    return false;
                }
            }
        }

        let snapshot = self.read().clone();
        match self.backend.save_snapshot(&snapshot).await {
            Ok(stored) => {
                self.dirty.store(false, Ordering::Release);
                self.mark_synced(stored.last_updated);
                let mut local = self.write();
                if stored.last_updated > local.last_updated {
                    local.last_updated = stored.last_updated;
                }
                debug!("[{}] Saved snapshot at {:.1}%", self.order_id, snapshot.progress);
                true
            }
            Err(e) => {
                warn!("[{}] Snapshot save failed: {}", self.order_id, e);
                self.dirty.store(true, Ordering::Release);
                self.emit(TrackingEvent::SaveFailed(e));
                false
            }
        }
    }

    /// Apply a transition server-side, then persist local progress with it.
    ///
    /// Transient failures leave the session dirty for the saver. A rejection
    /// means the server record disagrees: local state is replaced by it and
    /// the error returned.
    async fn push_status(&self, status: MovementStatus) -> Result<()> {
        match self.backend.set_movement_status(&self.order_id, status).await {
            Ok(stored) => {
                self.mark_synced(stored.last_updated);
                self.save().await;
                Ok(())
            }
            Err(e) if e.is_retryable() => {
                warn!("[{}] Failed to push status {}: {}", self.order_id, status, e);
                self.dirty.store(true, Ordering::Release);
                self.emit(TrackingEvent::SyncFailed(e));
                Ok(())
            }
            Err(e) => {
                warn!("[{}] Backend rejected status {}: {}", self.order_id, status, e);
                self.emit(TrackingEvent::SyncFailed(e.clone()));
                self.resync().await;
                Err(e)
            }
        }
    }

    /// Replace local state with the server record, whatever its timestamp.
    async fn resync(&self) {
        match self.backend.fetch_snapshot(&self.order_id).await {
            Ok(Some(server)) => self.adopt(&server),
            Ok(None) => warn!("[{}] Backend has no shipment record to resync from", self.order_id),
            Err(e) => {
                warn!("[{}] Resync failed: {}", self.order_id, e);
                // The saver compares versions before writing and adopts a newer record.
                self.dirty.store(true, Ordering::Release);
                self.emit(TrackingEvent::SyncFailed(e));
            }
        }
    }

    fn adopt(&self, server: &Shipment) {
        let (before, status) = {
            let mut local = self.write();
            let before = local.movement_status;
            let merged = sync::adopt(&local, server, self.config.arrival_tolerance_km);
            *local = merged;
            (before, local.movement_status)
        };
        self.mark_synced(server.last_updated);
        // Arrival settled locally still has to reach the server.
        self.dirty.store(status != server.movement_status, Ordering::Release);
        self.applied(before, status);
    }

    fn applied(&self, before: MovementStatus, status: MovementStatus) {
        self.publish();
        self.emit(TrackingEvent::SnapshotApplied(status));
        if status != before {
            info!("[{}] Server moved shipment {} -> {}", self.order_id, before, status);
            self.emit(TrackingEvent::StatusChanged(status));
            if status == MovementStatus::Delivered {
                self.emit(TrackingEvent::Delivered);
            }
        }
    }

    async fn poll(&self) -> PollOutcome {
        let before = self.read().movement_status;
        let outcome = self
            .synchronizer
            .poll_once(self.backend.as_ref(), &self.shipment)
            .await;

        match &outcome {
            PollOutcome::Applied(status) => {
                let synced_at = self.read().last_updated;
                self.mark_synced(synced_at);
                if *status != before && *status == MovementStatus::Delivered {
                    // The server may only have reported 100%, not the status.
                    self.dirty.store(true, Ordering::Release);
                }
                self.applied(before, *status);
            }
            PollOutcome::Failed(e) => self.emit(TrackingEvent::SyncFailed(e.clone())),
            PollOutcome::Stale | PollOutcome::Skipped | PollOutcome::Missing => {}
        }
        outcome
    }

    fn on_delivered(&self) {
        self.publish();
        self.emit(TrackingEvent::StatusChanged(MovementStatus::Delivered));
        self.emit(TrackingEvent::Delivered);
    }
}

/// Tracks one shipment: simulation, server reconciliation and commands.
pub struct TrackingSession<B, P> {
    id: Uuid,
    shared: Arc<Shared<B>>,
    resolver: RouteResolver<P>,
    timers: TimerSet,
}

impl<B, P> fmt::Debug for TrackingSession<B, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackingSession")
            .field("id", &self.id)
            .field("order_id", &self.shared.order_id)
            .field("timers", &self.timers)
            .finish_non_exhaustive()
    }
}

impl<B, P> TrackingSession<B, P>
where
    B: ShipmentBackend + 'static,
    P: RoutingProvider,
{
    /// Create a shipment from an origin and destination and start tracking it.
    ///
    /// Route resolution is attempted once and its failure is returned, so the
    /// caller can report that tracking is unavailable. A failed initial save
    /// is only logged; the saver retries it.
    pub async fn create(
        order_id: impl Into<String>,
        origin: Location,
        destination: Location,
        backend: Arc<B>,
        provider: P,
        clock: Arc<dyn Clock>,
        config: TrackerConfig,
    ) -> Result<Self> {
        let resolver = RouteResolver::new(provider, config.resolver.clone());
        let mut shipment = Shipment::new(order_id, origin, destination, clock.now());
        let route = resolver
            .resolve(shipment.origin.coordinates(), shipment.destination.coordinates())
            .await?;
        shipment.apply_route(route, clock.now());

        let session = Self::launch(shipment, None, backend, resolver, clock, config);
        session.shared.save().await;
        Ok(session)
    }

    /// Start tracking a shipment the backend already knows about.
    ///
    /// A record without a usable route is resolved once, as in [`create`](Self::create).
    pub async fn open(
        order_id: impl Into<String>,
        backend: Arc<B>,
        provider: P,
        clock: Arc<dyn Clock>,
        config: TrackerConfig,
    ) -> Result<Self> {
        let order_id = order_id.into();
        let resolver = RouteResolver::new(provider, config.resolver.clone());
        let mut shipment = backend
            .fetch_snapshot(&order_id)
            .await?
            .ok_or_else(|| TrackingError::ShipmentNotFound(order_id.clone()))?;
        let synced = Some(shipment.last_updated);

        let needs_route = !shipment.has_route();
        if needs_route {
            let route = resolver
                .resolve(shipment.origin.coordinates(), shipment.destination.coordinates())
                .await?;
            shipment.apply_route(route, clock.now());
        }
        shipment.settle_arrival(config.arrival_tolerance_km);

        let session = Self::launch(shipment, synced, backend, resolver, clock, config);
        if needs_route {
            session.shared.save().await;
        }
        Ok(session)
    }

    fn launch(
        shipment: Shipment,
        synced: Option<DateTime<Utc>>,
        backend: Arc<B>,
        resolver: RouteResolver<P>,
        clock: Arc<dyn Clock>,
        config: TrackerConfig,
    ) -> Self {
        let id = Uuid::new_v4();
        let order_id = shipment.order_id.clone();
        let (view_tx, _) = watch::channel(shipment.view());
        let (countdown_tx, _) = watch::channel(Countdown::of(&shipment, clock.now()));
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity.max(1));
        let synchronizer = PollingSynchronizer::new(
            order_id.clone(),
            config.poll.clone(),
            config.arrival_tolerance_km,
        );

        let shared = Arc::new(Shared {
            order_id: order_id.clone(),
            shipment: RwLock::new(shipment),
            backend,
            clock,
            config,
            synchronizer,
            dirty: AtomicBool::new(false),
            synced: Mutex::new(synced),
            view_tx,
            countdown_tx,
            event_tx,
        });

        let mut timers = TimerSet::new();
        let s = Arc::clone(&shared);
        timers.spawn("simulator", move |token| simulate_loop(s, token));
        let s = Arc::clone(&shared);
        timers.spawn("poll", move |token| poll_loop(s, token));
        let s = Arc::clone(&shared);
        timers.spawn("countdown", move |token| countdown_loop(s, token));
        let s = Arc::clone(&shared);
        timers.spawn("saver", move |token| save_loop(s, token));

        info!("[{}] Tracking session {} started", order_id, id);
        Self {
            id,
            shared,
            resolver,
            timers,
        }
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn order_id(&self) -> &str {
        &self.shared.order_id
    }

    /// Current render state.
    #[must_use]
    pub fn view(&self) -> TrackingView {
        self.shared.read().view()
    }

    /// Full local shipment record.
    #[must_use]
    pub fn shipment(&self) -> Shipment {
        self.shared.read().clone()
    }

    /// Stream of render states; updated on every change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<TrackingView> {
        self.shared.view_tx.subscribe()
    }

    #[must_use]
    pub fn countdown(&self) -> Countdown {
        *self.shared.countdown_tx.borrow()
    }

    #[must_use]
    pub fn subscribe_countdown(&self) -> watch::Receiver<Countdown> {
        self.shared.countdown_tx.subscribe()
    }

    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<TrackingEvent> {
        self.shared.event_tx.subscribe()
    }

    /// Begin or resume movement.
    ///
    /// The transition applies locally first. A failure to reach the backend is
    /// reported as an event and converged by the saver. When the backend
    /// rejects the transition, the session falls back to the server record and
    /// the rejection is returned.
    pub async fn start(&self) -> Result<()> {
        self.command(MovementCommand::Start).await
    }

    /// Freeze movement at the current position.
    pub async fn pause(&self) -> Result<()> {
        self.command(MovementCommand::Pause).await
    }

    async fn command(&self, command: MovementCommand) -> Result<()> {
        let status = {
            let mut shipment = self.shared.write();
            let now = self.shared.clock.now();
            match command {
                MovementCommand::Start => shipment.start(now)?,
                MovementCommand::Pause => shipment.pause(now)?,
                MovementCommand::Deliver => shipment.deliver(now)?,
                MovementCommand::Reroute => {
                    return Err(TrackingError::InvalidTransition {
                        from: shipment.movement_status,
                        command,
                    })
                }
            }
            shipment.movement_status
        };

        self.shared.publish();
        self.shared.emit(TrackingEvent::StatusChanged(status));
        self.shared.push_status(status).await
    }

    /// Change the destination of a shipment that has not started yet.
    ///
    /// Transient routing failures are retried. On any failure the shipment
    /// keeps its previous route.
    pub async fn set_destination(&self, destination: Location) -> Result<()> {
        let origin = {
            let shipment = self.shared.read();
            if shipment.movement_status != MovementStatus::NotStarted {
                warn!(
                    "[{}] Destination change rejected while {}",
                    self.shared.order_id, shipment.movement_status
                );
                return Err(TrackingError::InvalidTransition {
                    from: shipment.movement_status,
                    command: MovementCommand::Reroute,
                });
            }
            shipment.origin.clone()
        };
        self.replace_route(origin, destination, false).await
    }

    /// Re-plan between new endpoints, resetting progress and status.
    ///
    /// Allowed in any state except delivered.
    pub async fn reroute(&self, origin: Location, destination: Location) -> Result<()> {
        self.shared.read().check(MovementCommand::Reroute)?;
        self.replace_route(origin, destination, true).await
    }

    async fn replace_route(&self, origin: Location, destination: Location, from_any_state: bool) -> Result<()> {
        let route: ResolvedRoute = self
            .resolver
            .resolve_with_retry(origin.coordinates(), destination.coordinates())
            .await
            .inspect_err(|e| warn!("[{}] Route update failed: {}", self.shared.order_id, e))?;

        let (distance_km, duration_min) = (route.distance_km, route.duration_min);
        {
            let mut shipment = self.shared.write();
            // Status may have moved while the provider was answering.
            let current = shipment.movement_status;
            if current.is_terminal() || (!from_any_state && current != MovementStatus::NotStarted) {
                return Err(TrackingError::InvalidTransition {
                    from: current,
                    command: MovementCommand::Reroute,
                });
            }
            shipment.origin = origin;
            shipment.destination = destination;
            shipment.apply_route(route, self.shared.clock.now());
            if current != MovementStatus::NotStarted {
                info!("[{}] Rerouted; shipment reset from {}", self.shared.order_id, current);
            }
        }

        self.shared.publish();
        self.shared.emit(TrackingEvent::RouteResolved {
            distance_km,
            duration_min,
        });
        self.shared.emit(TrackingEvent::StatusChanged(MovementStatus::NotStarted));
        self.shared.save().await;
        Ok(())
    }

    /// Feed an independently known position, e.g. from a device.
    ///
    /// Progress is computed from distance covered and never moves backwards.
    /// Reports are ignored unless the shipment is on transit. Returns the
    /// resulting progress.
    pub async fn report_position(&self, position: Coordinates) -> Result<f64> {
        position.validate()?;
        let tolerance = self.shared.config.arrival_tolerance_km;

        let (progress, delivered) = {
            let mut shipment = self.shared.write();
            if shipment.movement_status != MovementStatus::OnTransit {
                debug!(
                    "[{}] Ignoring position report while {}",
                    self.shared.order_id, shipment.movement_status
                );
                return Ok(shipment.progress);
            }

            let measured = progress::distance_progress(
                shipment.origin.coordinates(),
                position,
                shipment.destination.coordinates(),
                shipment.distance_km,
                tolerance,
            );
            let next = measured.max(shipment.progress);
            shipment.progress = next;
            shipment.current_location = Some(position);
            shipment.remaining_time_min = progress::remaining_time_min(shipment.duration_min, next);

            let delivered = shipment.settle_arrival(tolerance);
            if delivered {
                shipment.last_updated = self.shared.clock.now();
                info!("[{}] Reported position reached destination", self.shared.order_id);
            }
            (shipment.progress, delivered)
        };

        if delivered {
            self.shared.on_delivered();
            self.shared.push_status(MovementStatus::Delivered).await?;
        } else {
            self.shared.publish();
        }
        Ok(progress)
    }

    /// Poll the server now instead of waiting for the next interval.
    pub async fn refresh(&self) -> PollOutcome {
        self.shared.poll().await
    }

    /// Stop all timers and wait for them to finish.
    pub async fn shutdown(mut self) {
        info!("[{}] Stopping tracking session {}", self.shared.order_id, self.id);
        self.timers.shutdown().await;
    }
}

async fn simulate_loop<B: ShipmentBackend>(shared: Arc<Shared<B>>, token: CancellationToken) {
    let mut simulator = PositionSimulator::new(shared.config.arrival_tolerance_km);
    let mut interval = tokio::time::interval(shared.config.tick_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = token.cancelled() => break,
            _ = interval.tick() => {}
        }

        let outcome = {
            let mut shipment = shared.write();
            simulator.tick(&mut shipment, shared.clock.now())
        };

        match outcome {
            TickOutcome::Advanced(_) => shared.publish(),
            TickOutcome::Delivered => {
                shared.on_delivered();
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = shared.push_status(MovementStatus::Delivered) => {}
                }
            }
            TickOutcome::Idle | TickOutcome::Resumed => {}
        }
    }
}

async fn poll_loop<B: ShipmentBackend>(shared: Arc<Shared<B>>, token: CancellationToken) {
    loop {
        let wait = shared.synchronizer.interval_for(shared.read().movement_status);
        tokio::select! {
            () = token.cancelled() => break,
            () = tokio::time::sleep(wait) => {}
        }
        tokio::select! {
            () = token.cancelled() => break,
            outcome = shared.poll() => {
                debug!("[{}] Poll outcome: {:?}", shared.order_id, outcome);
            }
        }
    }
}

async fn countdown_loop<B: ShipmentBackend>(shared: Arc<Shared<B>>, token: CancellationToken) {
    let mut interval = tokio::time::interval(shared.config.countdown_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = token.cancelled() => break,
            _ = interval.tick() => {}
        }
        let countdown = Countdown::of(&shared.read(), shared.clock.now());
        shared.countdown_tx.send_replace(countdown);
    }
}

async fn save_loop<B: ShipmentBackend>(shared: Arc<Shared<B>>, token: CancellationToken) {
    let mut interval = tokio::time::interval(shared.config.save_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately.
    interval.tick().await;

    loop {
        tokio::select! {
            () = token.cancelled() => break,
            _ = interval.tick() => {}
        }
        let due = shared.read().movement_status == MovementStatus::OnTransit
            || shared.dirty.load(Ordering::Acquire);
        if !due {
            continue;
        }
        tokio::select! {
            () = token.cancelled() => break,
            _ = shared.save() => {}
        }
    }
}
