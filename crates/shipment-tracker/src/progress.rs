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

//! Completion percentage and waypoint index math.
//!
//! Two modes feed the same invariant:
//! - **distance**: a position is known (device feed), progress is the share of
//!   straight-line distance covered from the origin
//! - **time**: no feed, progress accumulates from elapsed time over the
//!   planned duration
//!
//! Both are clamped to `[0, 100]` and map onto the route by
//! `floor((len - 1) * progress / 100)`.

use crate::geo::{distance_km, Coordinates};

/// Progress value of a finished shipment.
pub const COMPLETE: f64 = 100.0;

/// Distance from the destination under which a shipment counts as arrived.
///
/// 50 meters carries over from the storefront's tracker; it is a tunable,
/// not a derived constant.
pub const ARRIVAL_TOLERANCE_KM: f64 = 0.05;

/// Clamp to `[0, 100]`, mapping NaN to 0.
#[must_use]
pub fn clamp_percent(progress: f64) -> f64 {
    if progress.is_nan() {
        0.0
    } else {
        progress.clamp(0.0, COMPLETE)
    }
}

/// Distance-based progress for an independently known position.
#[must_use]
pub fn distance_progress(
    origin: Coordinates,
    current: Coordinates,
    destination: Coordinates,
    total_distance_km: f64,
    tolerance_km: f64,
) -> f64 {
    if distance_km(current, destination) < tolerance_km {
        return COMPLETE;
    }
    if total_distance_km <= 0.0 {
        return 0.0;
    }
    let covered = distance_km(origin, current);
    clamp_percent(covered / total_distance_km * 100.0)
}

/// Time-based progress: accumulate `elapsed_secs` onto `last_progress`.
///
/// A zero or negative duration means there is nothing to travel. Negative
/// elapsed time (clock stepped backwards) never moves progress back.
#[must_use]
pub fn time_progress(last_progress: f64, elapsed_secs: f64, duration_min: f64) -> f64 {
    if duration_min <= 0.0 {
        return COMPLETE;
    }
    let delta = elapsed_secs.max(0.0) / (duration_min * 60.0) * 100.0;
    clamp_percent(clamp_percent(last_progress) + delta)
}

/// Route index for a progress value, clamped to the last waypoint.
#[must_use]
pub fn waypoint_index(route_len: usize, progress: f64) -> Option<usize> {
    let last = route_len.checked_sub(1)?;
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss,
        reason = "progress is clamped to [0, 100] and routes are far below 2^52 points"
    )]
    let index = (last as f64 * clamp_percent(progress) / COMPLETE).floor() as usize;
    Some(index.min(last))
}

/// Waypoint for a progress value, if the route has any points.
#[must_use]
pub fn waypoint_at(route: &[Coordinates], progress: f64) -> Option<Coordinates> {
    waypoint_index(route.len(), progress).map(|i| route[i])
}

/// Minutes left given the planned duration and current progress.
#[must_use]
pub fn remaining_time_min(duration_min: f64, progress: f64) -> f64 {
    (duration_min * (1.0 - clamp_percent(progress) / COMPLETE)).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGIN: Coordinates = Coordinates::new(4.0511, 9.7679);
    const DESTINATION: Coordinates = Coordinates::new(4.1000, 9.8200);

    #[test]
    fn test_time_progress_half_way() {
        let p = time_progress(0.0, 30.0 * 60.0, 60.0);
        assert!((p - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_time_progress_accumulates_and_clamps() {
        let p = time_progress(90.0, 3600.0, 60.0);
        assert!((p - COMPLETE).abs() < f64::EPSILON);
        let p = time_progress(20.0, -30.0, 60.0);
        assert!((p - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_time_progress_zero_duration_completes() {
        assert!((time_progress(0.0, 0.0, 0.0) - COMPLETE).abs() < f64::EPSILON);
    }

    #[test]
    fn test_progress_always_in_range() {
        for last in [-50.0, 0.0, 33.3, 99.9, 150.0, f64::NAN] {
            for elapsed in [0.0, 1.0, 59.0, 1e9] {
                let p = time_progress(last, elapsed, 45.0);
                assert!((0.0..=COMPLETE).contains(&p), "{last} {elapsed} -> {p}");
            }
        }
    }

    #[test]
    fn test_distance_progress_ratio() {
        let total = distance_km(ORIGIN, DESTINATION);
        let mid = ORIGIN.lerp(&DESTINATION, 0.5);
        let p = distance_progress(ORIGIN, mid, DESTINATION, total, ARRIVAL_TOLERANCE_KM);
        assert!((p - 50.0).abs() < 1.0);
    }

    #[test]
    fn test_distance_progress_arrival_override() {
        // Road distance far longer than the straight line would give < 100 without the override
        let near = Coordinates::new(4.1003, 9.8200);
        let p = distance_progress(ORIGIN, near, DESTINATION, 40.0, ARRIVAL_TOLERANCE_KM);
        assert!((p - COMPLETE).abs() < f64::EPSILON);
    }

    #[test]
    fn test_distance_progress_caps_at_complete() {
        let beyond = Coordinates::new(4.2, 9.9);
        let p = distance_progress(ORIGIN, beyond, DESTINATION, 1.0, ARRIVAL_TOLERANCE_KM);
        assert!((p - COMPLETE).abs() < f64::EPSILON);
    }

    #[test]
    fn test_waypoint_index() {
        assert_eq!(waypoint_index(10, 0.0), Some(0));
        assert_eq!(waypoint_index(10, 50.0), Some(4));
        assert_eq!(waypoint_index(10, 99.9), Some(8));
        assert_eq!(waypoint_index(10, 100.0), Some(9));
        assert_eq!(waypoint_index(10, 250.0), Some(9));
        assert_eq!(waypoint_index(1, 70.0), Some(0));
        assert_eq!(waypoint_index(0, 70.0), None);
    }

    #[test]
    fn test_remaining_time() {
        assert!((remaining_time_min(60.0, 25.0) - 45.0).abs() < 1e-9);
        assert!(remaining_time_min(60.0, 100.0).abs() < f64::EPSILON);
    }
}
