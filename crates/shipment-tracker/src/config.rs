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

use std::time::Duration;

use crate::progress::ARRIVAL_TOLERANCE_KM;
use crate::route::ResolverConfig;
use crate::sync::PollIntervals;

/// Configuration for a tracking session.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Simulator tick period.
    pub tick_interval: Duration,
    /// Server polling cadence.
    pub poll: PollIntervals,
    /// Countdown refresh period.
    pub countdown_interval: Duration,
    /// Periodic snapshot save period while in transit.
    pub save_interval: Duration,
    /// Route request timeout and retry policy.
    pub resolver: ResolverConfig,
    /// Distance from the destination that counts as arrived.
    pub arrival_tolerance_km: f64,
    /// Buffer size of the event broadcast channel.
    pub event_channel_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            poll: PollIntervals::default(),
            countdown_interval: Duration::from_secs(1),
            save_interval: Duration::from_secs(15),
            resolver: ResolverConfig::default(),
            arrival_tolerance_km: ARRIVAL_TOLERANCE_KM,
            event_channel_capacity: 64,
        }
    }
}
