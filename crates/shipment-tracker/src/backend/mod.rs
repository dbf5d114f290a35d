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

//! Shipment persistence backend.
//!
//! The backend is the authority on shipment state. Implementations:
//! - [`HttpBackend`]: the storefront REST API
//! - [`InMemoryBackend`]: process-local store for offline runs and tests

pub mod http;
pub mod memory;

use std::future::Future;

use crate::error::Result;
use crate::shipment::{MovementStatus, Shipment};

pub use http::HttpBackend;
pub use memory::InMemoryBackend;

/// Persistence operations consumed by a tracking session.
pub trait ShipmentBackend: Send + Sync {
    /// Idempotent upsert. Returns the stored record, including the
    /// server-assigned `last_updated`.
    fn save_snapshot(&self, shipment: &Shipment) -> impl Future<Output = Result<Shipment>> + Send;

    /// Fetch the authoritative record, or `None` if the order has none yet.
    fn fetch_snapshot(&self, order_id: &str) -> impl Future<Output = Result<Option<Shipment>>> + Send;

    /// Apply a movement transition server-side and return the resulting record.
    fn set_movement_status(
        &self,
        order_id: &str,
        status: MovementStatus,
    ) -> impl Future<Output = Result<Shipment>> + Send;
}
