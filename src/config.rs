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

//! Application configuration management.
//!
//! Configuration is persisted as TOML through `confy`. Every field has a serde
//! default so older files keep loading as fields are added.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use shipment_tracker::route::osrm::DEFAULT_OSRM_URL;
use shipment_tracker::route::straight_line::DEFAULT_SPEED_KMH;
use shipment_tracker::{PollIntervals, ResolverConfig, TrackerConfig};

const APP_NAME: &str = "shiptrack";
const CONFIG_NAME: &str = "config";

/// Environment variable that overrides `backend_token`.
pub const TOKEN_ENV_VAR: &str = "SHIPTRACK_BACKEND_TOKEN";

/// Application configuration stored in TOML format
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    /// Configuration schema version for migrations
    #[serde(default = "default_config_version")]
    pub config_version: u32,

    /// Base URL of the storefront API
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    /// Bearer token for the storefront API (optional, env var takes precedence)
    #[serde(default)]
    pub backend_token: Option<String>,

    /// OSRM server used for road routing
    #[serde(default = "default_routing_url")]
    pub routing_url: String,

    /// OSRM profile, e.g. "driving"
    #[serde(default = "default_routing_profile")]
    pub routing_profile: String,

    /// Simulator tick in milliseconds
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Poll interval while on transit, in seconds
    #[serde(default = "default_poll_on_transit_secs")]
    pub poll_on_transit_secs: u64,

    /// Poll interval otherwise, in seconds
    #[serde(default = "default_poll_idle_secs")]
    pub poll_idle_secs: u64,

    /// Snapshot save interval while on transit, in seconds
    #[serde(default = "default_save_secs")]
    pub save_secs: u64,

    /// Route request timeout in seconds
    #[serde(default = "default_route_timeout_secs")]
    pub route_timeout_secs: u64,

    /// Assumed speed for the offline straight-line router
    #[serde(default = "default_fallback_speed_kmh")]
    pub fallback_speed_kmh: f64,
}

// Default value functions for serde
fn default_config_version() -> u32 {
    1
}

fn default_backend_url() -> String {
    "http://localhost:8080/api/".to_string()
}

fn default_routing_url() -> String {
    DEFAULT_OSRM_URL.to_string()
}

fn default_routing_profile() -> String {
    "driving".to_string()
}

fn default_tick_ms() -> u64 {
    1000
}

fn default_poll_on_transit_secs() -> u64 {
    5
}

fn default_poll_idle_secs() -> u64 {
    30
}

fn default_save_secs() -> u64 {
    15
}

fn default_route_timeout_secs() -> u64 {
    10
}

fn default_fallback_speed_kmh() -> f64 {
    DEFAULT_SPEED_KMH
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config_version: default_config_version(),
            backend_url: default_backend_url(),
            backend_token: None,
            routing_url: default_routing_url(),
            routing_profile: default_routing_profile(),
            tick_ms: default_tick_ms(),
            poll_on_transit_secs: default_poll_on_transit_secs(),
            poll_idle_secs: default_poll_idle_secs(),
            save_secs: default_save_secs(),
            route_timeout_secs: default_route_timeout_secs(),
            fallback_speed_kmh: default_fallback_speed_kmh(),
        }
    }
}

impl AppConfig {
    /// Load configuration from disk, creating it with defaults on first run
    pub fn load() -> Result<Self, confy::ConfyError> {
        confy::load(APP_NAME, CONFIG_NAME)
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<(), confy::ConfyError> {
        confy::store(APP_NAME, CONFIG_NAME, self)
    }

    /// Get the config file path for display to user
    pub fn config_path() -> Result<std::path::PathBuf, confy::ConfyError> {
        confy::get_configuration_file_path(APP_NAME, CONFIG_NAME)
    }

    /// Backend token, preferring the environment over the file.
    pub fn resolve_token(&self) -> Option<String> {
        Self::resolve_token_from(std::env::var(TOKEN_ENV_VAR).ok(), self.backend_token.as_deref())
    }

    fn resolve_token_from(env_token: Option<String>, config_token: Option<&str>) -> Option<String> {
        if let Some(token) = env_token.filter(|t| !t.is_empty()) {
            return Some(token);
        }
        config_token.map(str::to_string).filter(|t| !t.is_empty())
    }

    /// Tracker tunables derived from this file, clamped to sane minimums.
    pub fn tracker_config(&self) -> TrackerConfig {
        let defaults = TrackerConfig::default();
        TrackerConfig {
            tick_interval: Duration::from_millis(self.tick_ms.max(50)),
            poll: PollIntervals {
                on_transit: Duration::from_secs(self.poll_on_transit_secs.max(1)),
                idle: Duration::from_secs(self.poll_idle_secs.max(1)),
            },
            save_interval: Duration::from_secs(self.save_secs.max(1)),
            resolver: ResolverConfig {
                timeout: Duration::from_secs(self.route_timeout_secs.max(1)),
                ..defaults.resolver.clone()
            },
            ..defaults
        }
    }
}
