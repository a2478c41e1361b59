use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval, interval_at};
use tracing::{info, warn};

use super::TrafficConfig;
use super::render::CarRenderer;
use super::sim::TrafficSim;
use crate::geo::{GeoPoint, Route};
use crate::services::MapsApi;

struct Shared {
    sim: TrafficSim,
    renderer: Box<dyn CarRenderer>,
}

/// Timer-driven ambient traffic around a center point.
///
/// [`activate`](Self::activate) loads routes in the background and starts
/// the spawn and frame timers; [`deactivate`](Self::deactivate) stops them
/// and removes every car from the renderer before returning.
pub struct AmbientTraffic<M: ?Sized> {
    config: TrafficConfig,
    maps: Arc<M>,
    shared: Arc<Mutex<Shared>>,
    tasks: Vec<JoinHandle<()>>,
    seed: Option<u64>,
}

impl<M: MapsApi + ?Sized + 'static> AmbientTraffic<M> {
    pub fn new(config: TrafficConfig, maps: Arc<M>, renderer: Box<dyn CarRenderer>) -> Self {
        let sim = TrafficSim::new(config.clone(), StdRng::from_entropy());
        Self {
            config,
            maps,
            shared: Arc::new(Mutex::new(Shared { sim, renderer })),
            tasks: Vec::new(),
            seed: None,
        }
    }

    /// Makes route selection and car sampling reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self.lock().sim = TrafficSim::new(self.config.clone(), StdRng::seed_from_u64(seed));
        self
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        lock_shared(&self.shared)
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(1)),
            None => StdRng::from_entropy(),
        }
    }

    pub fn is_active(&self) -> bool {
        !self.tasks.is_empty()
    }

    pub fn population(&self) -> usize {
        self.lock().sim.population()
    }

    /// Starts traffic around `center`. No-op while already active.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn activate(&mut self, center: GeoPoint) {
        if self.is_active() {
            return;
        }
        info!(%center, "Ambient traffic activated");

        let maps = Arc::clone(&self.maps);
        let shared = Arc::clone(&self.shared);
        let config = self.config.clone();
        let mut rng = self.rng();
        self.tasks.push(tokio::spawn(async move {
            let routes = load_routes_around(
                maps.as_ref(),
                center,
                config.route_radius_m,
                config.route_count,
                &mut rng,
            )
            .await;
            lock_shared(&shared).sim.set_routes(routes);
        }));

        let shared = Arc::clone(&self.shared);
        let config = self.config.clone();
        self.tasks.push(tokio::spawn(async move {
            let epoch = Instant::now();
            let mut spawn = interval_at(epoch + config.spawn_interval, config.spawn_interval);
            let mut frame = interval(config.frame_interval);
            frame.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = spawn.tick() => {
                        lock_shared(&shared).sim.try_spawn(epoch.elapsed());
                    }
                    _ = frame.tick() => {
                        let mut guard = lock_shared(&shared);
                        let Shared { sim, renderer } = &mut *guard;
                        let batch = sim.update(epoch.elapsed());
                        for f in &batch.frames {
                            renderer.draw(f);
                        }
                        for id in batch.removed {
                            renderer.remove(id);
                        }
                    }
                }
            }
        }));
    }

    /// Stops all timers and synchronously removes every car.
    pub fn deactivate(&mut self) {
        if !self.is_active() {
            return;
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }

        let mut guard = self.lock();
        let Shared { sim, renderer } = &mut *guard;
        let ids = sim.clear();
        for id in &ids {
            renderer.remove(*id);
        }
        sim.set_routes(Vec::new());
        info!(removed = ids.len(), "Ambient traffic deactivated");
    }
}

impl<M: ?Sized> Drop for AmbientTraffic<M> {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

fn lock_shared(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fetches up to `count` driving routes between random points within
/// `radius_m` of `center`. Failed requests are skipped.
pub async fn load_routes_around<M, R>(
    maps: &M,
    center: GeoPoint,
    radius_m: f64,
    count: usize,
    rng: &mut R,
) -> Vec<Route>
where
    M: MapsApi + ?Sized,
    R: Rng + Send,
{
    let mut routes = Vec::with_capacity(count);
    for _ in 0..count {
        let from = random_point(rng, center, radius_m);
        let to = random_point(rng, center, radius_m);
        match maps.directions(from, to).await {
            Ok(points) => match Route::new(points) {
                Some(route) if route.len() >= 2 => routes.push(route),
                _ => warn!(%from, %to, "Directions returned no usable path"),
            },
            Err(e) => warn!(%from, %to, error = %e, "Failed to load traffic route"),
        }
    }
    info!(loaded = routes.len(), requested = count, "Traffic routes loaded");
    routes
}

fn random_point<R: Rng>(rng: &mut R, center: GeoPoint, radius_m: f64) -> GeoPoint {
    let north = rng.gen_range(-1.0..=1.0) * radius_m;
    let east = rng.gen_range(-1.0..=1.0) * radius_m;
    center.offset_meters(north, east)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::PlaceDto;
    use crate::traffic::{CarFrame, CarId};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct StraightLines {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MapsApi for StraightLines {
        async fn directions(&self, origin: GeoPoint, destination: GeoPoint) -> anyhow::Result<Vec<GeoPoint>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n % 2 == 1 {
                anyhow::bail!("ZERO_RESULTS");
            }
            Ok(vec![origin, destination])
        }

        async fn reverse_geocode(&self, _point: GeoPoint) -> anyhow::Result<Option<PlaceDto>> {
            Ok(None)
        }

        async fn search_places(&self, _query: &str, _near: Option<GeoPoint>) -> anyhow::Result<Vec<PlaceDto>> {
            Ok(Vec::new())
        }
    }

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<(HashSet<CarId>, usize)>>);

    impl CarRenderer for Recorder {
        fn draw(&mut self, frame: &CarFrame) {
            let mut state = self.0.lock().unwrap();
            state.0.insert(frame.id);
            state.1 += 1;
        }

        fn remove(&mut self, id: CarId) {
            self.0.lock().unwrap().0.remove(&id);
        }
    }

    fn maps() -> Arc<StraightLines> {
        Arc::new(StraightLines {
            calls: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_load_routes_skips_failures_and_stays_in_radius() {
        let maps = maps();
        let center = GeoPoint::new(55.75, 37.62);
        let mut rng = StdRng::seed_from_u64(1);
        let routes = load_routes_around(maps.as_ref(), center, 800.0, 10, &mut rng).await;

        assert_eq!(routes.len(), 5);
        for route in &routes {
            for p in route.points() {
                // Square of half-side 800 m has a corner at about 1131 m.
                assert!(center.distance_to(p) <= 1140.0);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_activate_spawns_and_deactivate_clears() {
        let recorder = Recorder::default();
        let mut traffic = AmbientTraffic::new(TrafficConfig::default(), maps(), Box::new(recorder.clone()))
            .with_seed(3);

        traffic.activate(GeoPoint::new(55.75, 37.62));
        assert!(traffic.is_active());

        tokio::time::sleep(Duration::from_millis(3600)).await;
        assert_eq!(traffic.population(), 1);
        assert!(!recorder.0.lock().unwrap().0.is_empty());

        traffic.deactivate();
        assert!(!traffic.is_active());
        assert_eq!(traffic.population(), 0);
        assert!(recorder.0.lock().unwrap().0.is_empty());

        let frames = recorder.0.lock().unwrap().1;
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(recorder.0.lock().unwrap().1, frames);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_spawn_before_first_interval() {
        let mut traffic = AmbientTraffic::new(TrafficConfig::default(), maps(), Box::new(Recorder::default()))
            .with_seed(3);
        traffic.activate(GeoPoint::new(0.0, 0.0));
        tokio::time::sleep(Duration::from_millis(3400)).await;
        assert_eq!(traffic.population(), 0);
        traffic.deactivate();
    }
}
