#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]

pub mod app;
pub mod capabilities;
pub mod event;
pub mod isochrones;
pub mod locations;
pub mod model;
pub mod theme;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use app::{App, ViewModel};
pub use capabilities::{Capabilities, Effect};
pub use event::{Event, SearchMode};
pub use model::Model;

pub const DEFAULT_API_BASE: &str = "https://librarymap-api.fly.dev/";

// Plymouth city centre; the map opens here until a position arrives.
pub const DEFAULT_MAP_LAT: f64 = 50.3732;
pub const DEFAULT_MAP_LNG: f64 = -4.1429;
pub const DEFAULT_MAP_ZOOM: f64 = 12.0;
pub const DEFAULT_MAP_PITCH: f64 = 0.0;
pub const DEFAULT_MAP_BEARING: f64 = 0.0;

pub const POSITION_REFRESH_INTERVAL_MS: u64 = 60_000;
pub const CLOCK_TICK_INTERVAL_MS: u64 = 5_000;

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

// --- Error taxonomy ---
//
// Failures are recovered locally: prior state stays untouched and the error
// is surfaced as a transient signal the shell can show and dismiss. Nothing
// here is fatal; the next tick or user action retries.

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum CoreError {
    #[error("position unavailable: {reason}")]
    PositionUnavailable { reason: String },
    #[error("network failure: {reason}")]
    NetworkFailure { reason: String },
}

impl CoreError {
    #[must_use]
    pub fn user_facing_message(&self) -> String {
        match self {
            Self::PositionUnavailable { .. } => {
                "Unable to determine your location. Please check your GPS settings.".into()
            }
            Self::NetworkFailure { .. } => {
                "Unable to connect. Please check your internet connection and try again.".into()
            }
        }
    }
}

// --- Distance helpers ---

#[must_use]
pub fn haversine_distance(p1: event::Coordinate, p2: event::Coordinate) -> f64 {
    const EPSILON: f64 = 1e-10;

    if (p1.lat() - p2.lat()).abs() < EPSILON && (p1.lng() - p2.lng()).abs() < EPSILON {
        return 0.0;
    }

    let lat1_rad = p1.lat().to_radians();
    let lat2_rad = p2.lat().to_radians();
    let delta_lat = (p2.lat() - p1.lat()).to_radians();
    let delta_lng = (p2.lng() - p1.lng()).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);

    let a = a.clamp(0.0, 1.0);

    let c = 2.0 * a.sqrt().asin();

    let result = EARTH_RADIUS_M * c;

    if result.is_finite() {
        result
    } else {
        f64::MAX
    }
}

#[must_use]
pub fn format_distance(meters: f64) -> String {
    if !meters.is_finite() || meters < 0.0 {
        return "Unknown".to_string();
    }

    if meters < 1000.0 {
        format!("{meters:.0} m")
    } else if meters < 10_000.0 {
        format!("{:.1} km", meters / 1000.0)
    } else {
        format!("{:.0} km", meters / 1000.0)
    }
}
