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

//! Shipment route and progress tracking engine.
//!
//! This library turns an origin/destination pair into a road route, moves a
//! shipment along it over time, and keeps that simulated state reconciled
//! with an authoritative backend. It is organized in layers that can be used
//! independently or composed together:
//!
//! - **Geometry**: coordinates, haversine distance ([`geo`])
//! - **Routing**: provider abstraction, timeout and retry ([`route`])
//! - **State**: the shipment record, progress math and the movement state
//!   machine ([`shipment`], [`progress`], [`movement`])
//! - **Simulation and sync**: time-driven position updates and server
//!   reconciliation ([`simulator`], [`sync`])
//! - **Session**: all of the above wired to timers, channels and a backend
//!   ([`TrackingSession`])
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use shipment_tracker::{
//!     HttpBackend, Location, OsrmProvider, SystemClock, TrackerConfig, TrackingSession,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = Arc::new(HttpBackend::new("https://shop.example.com/api/", None)?);
//!     let provider = OsrmProvider::new("https://router.project-osrm.org", "driving")?;
//!
//!     let session = TrackingSession::create(
//!         "order-42",
//!         Location::new(4.0511, 9.7679),
//!         Location::new(4.1000, 9.8200),
//!         backend,
//!         provider,
//!         Arc::new(SystemClock),
//!         TrackerConfig::default(),
//!     )
//!     .await?;
//!     session.start().await?;
//!
//!     let mut views = session.subscribe();
//!     while views.changed().await.is_ok() {
//!         let view = views.borrow().clone();
//!         println!("{:.1}% at {}", view.progress, view.current_location);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Using Individual Layers
//!
//! The pure parts need no runtime:
//!
//! ```
//! use shipment_tracker::geo::{distance_km, Coordinates};
//! use shipment_tracker::progress;
//!
//! let origin = Coordinates::new(4.0511, 9.7679);
//! let destination = Coordinates::new(4.1000, 9.8200);
//! let total = distance_km(origin, destination);
//!
//! let halfway = origin.lerp(&destination, 0.5);
//! let p = progress::distance_progress(origin, halfway, destination, total, 0.05);
//! assert!((p - 50.0).abs() < 1.0);
//! ```

pub mod backend;
pub mod clock;
pub mod config;
pub mod error;
pub mod geo;
pub mod movement;
pub mod progress;
pub mod route;
pub mod session;
pub mod shipment;
pub mod simulator;
pub mod sync;
pub mod timer;

pub use backend::{HttpBackend, InMemoryBackend, ShipmentBackend};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::TrackerConfig;
pub use error::{Result, TrackingError};
pub use geo::{Coordinates, Location};
pub use movement::MovementCommand;
pub use route::{OsrmProvider, ResolverConfig, RouteResolver, RoutingProvider, StraightLineProvider};
pub use session::{Countdown, TrackingEvent, TrackingSession};
pub use shipment::{MovementStatus, ResolvedRoute, Shipment, TrackingView};
pub use simulator::{PositionSimulator, TickOutcome};
pub use sync::{reconcile, PollIntervals, PollOutcome, PollingSynchronizer};
pub use timer::TimerSet;
