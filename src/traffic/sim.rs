use rand::Rng;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use super::TrafficConfig;
use super::car::{Car, CarFrame, CarId};
use crate::geo::Route;

/// Result of advancing the simulation by one frame.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FrameBatch {
    pub frames: Vec<CarFrame>,
    pub removed: Vec<CarId>,
}

/// Deterministic core of the ambient traffic engine.
///
/// Time is passed in explicitly as the offset from an arbitrary epoch, so
/// the same seed and the same timestamps always produce the same frames.
pub struct TrafficSim<R = StdRng> {
    config: TrafficConfig,
    routes: Vec<Arc<Route>>,
    cars: Vec<Car>,
    next_id: CarId,
    last_route: Option<usize>,
    rng: R,
}

impl<R: Rng> TrafficSim<R> {
    pub fn new(config: TrafficConfig, rng: R) -> Self {
        Self {
            config,
            routes: Vec::new(),
            cars: Vec::new(),
            next_id: 1,
            last_route: None,
            rng,
        }
    }

    pub fn config(&self) -> &TrafficConfig {
        &self.config
    }

    /// Replaces the route pool. Routes with fewer than two points cannot
    /// carry a car and are dropped. Cars already on the road keep their
    /// route.
    pub fn set_routes(&mut self, routes: Vec<Route>) {
        self.routes = routes
            .into_iter()
            .filter(|r| r.len() >= 2)
            .map(Arc::new)
            .collect();
        self.last_route = None;
        debug!(routes = self.routes.len(), "Traffic route pool updated");
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    pub fn cars(&self) -> &[Car] {
        &self.cars
    }

    pub fn population(&self) -> usize {
        self.cars.len()
    }

    /// Spawns a car at `now` unless the population is at its cap or no
    /// route is loaded.
    pub fn try_spawn(&mut self, now: Duration) -> Option<CarId> {
        if self.cars.len() >= self.config.max_cars || self.routes.is_empty() {
            return None;
        }

        let route_index = self.pick_route();
        let speed_kmh = sample(&mut self.rng, self.config.min_speed_kmh, self.config.max_speed_kmh);
        let lifetime_ms = sample(
            &mut self.rng,
            self.config.min_lifetime.as_millis() as f64,
            self.config.max_lifetime.as_millis() as f64,
        );

        let id = self.next_id;
        self.next_id += 1;
        self.last_route = Some(route_index);
        self.cars.push(Car::new(
            id,
            Arc::clone(&self.routes[route_index]),
            route_index,
            speed_kmh / 3.6,
            now,
            Duration::from_millis(lifetime_ms.round() as u64),
        ));
        debug!(car = id, route = route_index, speed_kmh, lifetime_ms, "Car spawned");
        Some(id)
    }

    /// Picks a random route, avoiding the one used by the previous spawn
    /// for a bounded number of attempts. A single route is always reused.
    fn pick_route(&mut self) -> usize {
        let count = self.routes.len();
        if count == 1 {
            return 0;
        }
        let mut index = self.rng.gen_range(0..count);
        for _ in 1..self.config.route_pick_attempts {
            if Some(index) != self.last_route {
                break;
            }
            index = self.rng.gen_range(0..count);
        }
        index
    }

    /// Advances every car to `now`. Cars whose fade-out completed are
    /// dropped and reported in [`FrameBatch::removed`].
    pub fn update(&mut self, now: Duration) -> FrameBatch {
        let fade_in = self.config.fade_in;
        let fade_out = self.config.fade_out;
        let mut batch = FrameBatch::default();

        self.cars.retain_mut(|car| {
            let (frame, done) = car.update(now, fade_in, fade_out);
            if done {
                trace!(car = frame.id, "Car faded out");
                batch.removed.push(frame.id);
                false
            } else {
                batch.frames.push(frame);
                true
            }
        });
        batch
    }

    /// Removes every car at once and returns their ids.
    pub fn clear(&mut self) -> Vec<CarId> {
        self.cars.drain(..).map(|c| c.id()).collect()
    }
}

/// Uniform sample in `[lo, hi)`, tolerating a degenerate range.
fn sample<R: Rng>(rng: &mut R, lo: f64, hi: f64) -> f64 {
    if hi <= lo { lo } else { rng.gen_range(lo..hi) }
}
