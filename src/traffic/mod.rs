//! Ambient traffic: decorative cars driving real routes around a point.
//!
//! The simulation ([`TrafficSim`]) is pure and driven by explicit
//! timestamps; [`AmbientTraffic`] wires it to timers, the maps provider and
//! a [`CarRenderer`].

mod car;
mod engine;
mod render;
mod sim;

pub use car::{Car, CarFrame, CarId, Phase};
pub use engine::{AmbientTraffic, load_routes_around};
pub use render::{CarRenderer, LogRenderer};
pub use sim::{FrameBatch, TrafficSim};

use std::time::Duration;

/// Tuning knobs for the ambient traffic engine.
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficConfig {
    /// Upper bound on simultaneously visible cars.
    pub max_cars: usize,
    pub fade_in: Duration,
    pub fade_out: Duration,
    pub min_lifetime: Duration,
    pub max_lifetime: Duration,
    pub min_speed_kmh: f64,
    pub max_speed_kmh: f64,
    pub spawn_interval: Duration,
    /// Radius around the center in which route endpoints are drawn.
    pub route_radius_m: f64,
    /// Number of routes fetched when the feature activates.
    pub route_count: usize,
    pub frame_interval: Duration,
    /// Tries at picking a route different from the previous spawn's.
    pub route_pick_attempts: usize,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            max_cars: 2,
            fade_in: Duration::from_millis(1200),
            fade_out: Duration::from_millis(1200),
            min_lifetime: Duration::from_millis(4000),
            max_lifetime: Duration::from_millis(9000),
            min_speed_kmh: 20.0,
            max_speed_kmh: 30.0,
            spawn_interval: Duration::from_millis(3500),
            route_radius_m: 800.0,
            route_count: 10,
            frame_interval: Duration::from_millis(16),
            route_pick_attempts: 10,
        }
    }
}
