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

//! REST client for the storefront's shipment endpoints.
//!
//! Routes, relative to the configured base URL:
//! - `GET    orders/{id}/shipment`        fetch snapshot (404 = none yet)
//! - `PUT    orders/{id}/shipment`        save snapshot (upsert)
//! - `PATCH  orders/{id}/shipment/status` apply a movement transition

use std::time::Duration;

use log::debug;
use reqwest::{StatusCode, Url};
use serde::Serialize;

use super::ShipmentBackend;
use crate::error::{Result, TrackingError};
use crate::geo::{Coordinates, Location};
use crate::shipment::{MovementStatus, Shipment};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Body of a snapshot save. The server owns `lastUpdated`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotPayload<'a> {
    order_id: &'a str,
    origin: &'a Location,
    destination: &'a Location,
    route: &'a [Coordinates],
    distance_km: f64,
    duration_min: f64,
    progress: f64,
    current_location: Coordinates,
    movement_status: MovementStatus,
    remaining_time_min: f64,
}

impl<'a> From<&'a Shipment> for SnapshotPayload<'a> {
    fn from(s: &'a Shipment) -> Self {
        Self {
            order_id: &s.order_id,
            origin: &s.origin,
            destination: &s.destination,
            route: &s.route,
            distance_km: s.distance_km,
            duration_min: s.duration_min,
            progress: s.progress,
            current_location: s.current_location(),
            movement_status: s.movement_status,
            remaining_time_min: s.remaining_time_min,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusPayload<'a> {
    order_id: &'a str,
    movement_status: MovementStatus,
}

/// Shipment backend over HTTP + JSON.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpBackend {
    /// Create a client for `base_url`, optionally authenticating with a bearer token.
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| TrackingError::Config(format!("backend url {base_url:?}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(TrackingError::Config(format!("backend url {base_url} cannot be a base")));
        }
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    fn shipment_url(&self, order_id: &str, suffix: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["orders", order_id, "shipment"])
                .extend(suffix);
        }
        url
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Client errors are final; timeouts, throttling and server errors may clear up.
    fn failure(status: StatusCode, body: &str) -> TrackingError {
        let message = format!("HTTP {status}: {body}");
        if status.is_client_error()
            && status != StatusCode::REQUEST_TIMEOUT
            && status != StatusCode::TOO_MANY_REQUESTS
        {
            TrackingError::Rejected(message)
        } else {
            TrackingError::Network(message)
        }
    }

    async fn decode(order_id: &str, response: reqwest::Response) -> Result<Shipment> {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(TrackingError::ShipmentNotFound(order_id.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::failure(status, &body));
        }
        let body = response.bytes().await?;
        serde_json::from_slice(&body)
            .map_err(|e| TrackingError::Network(format!("malformed shipment for {order_id}: {e}")))
    }
}

impl ShipmentBackend for HttpBackend {
    async fn save_snapshot(&self, shipment: &Shipment) -> Result<Shipment> {
        let url = self.shipment_url(&shipment.order_id, &[]);
        debug!("[{}] PUT {}", shipment.order_id, url);
        let response = self
            .authorize(self.client.put(url))
            .json(&SnapshotPayload::from(shipment))
            .send()
            .await?;
        Self::decode(&shipment.order_id, response).await
    }

    async fn fetch_snapshot(&self, order_id: &str) -> Result<Option<Shipment>> {
        let url = self.shipment_url(order_id, &[]);
        debug!("[{}] GET {}", order_id, url);
        let response = self.authorize(self.client.get(url)).send().await?;
        match Self::decode(order_id, response).await {
            Ok(shipment) => Ok(Some(shipment)),
            Err(TrackingError::ShipmentNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn set_movement_status(&self, order_id: &str, status: MovementStatus) -> Result<Shipment> {
        let url = self.shipment_url(order_id, &["status"]);
        debug!("[{}] PATCH {} -> {}", order_id, url, status);
        let response = self
            .authorize(self.client.patch(url))
            .json(&StatusPayload {
                order_id,
                movement_status: status,
            })
            .send()
            .await?;
        Self::decode(order_id, response).await
    }
}
