//! Scripted geolocation provider.
//!
//! [`GeoSimulator`] stands in for the device location API: consumers ask it
//! for the current fix or register watchers, and never learn whether the
//! position comes from hardware or from a route being played back. Playback
//! is controlled out of band with [`set_route`](GeoSimulator::set_route),
//! [`start`](GeoSimulator::start) and [`stop`](GeoSimulator::stop).

use rand::Rng;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::geo::GeoPoint;

/// Accuracy reported with every fabricated fix, in meters.
pub const FIX_ACCURACY_M: f64 = 5.0;

/// Maximum distance of the randomized fallback point from the base fix.
pub const FALLBACK_JITTER_M: f64 = 1000.0;

/// Identifier returned by [`GeoSimulator::watch_position`].
pub type WatchId = u32;

/// A position fix as delivered to consumers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionFix {
    pub coords: GeoPoint,
    pub accuracy: f64,
}

impl PositionFix {
    fn at(coords: GeoPoint) -> Self {
        Self {
            coords,
            accuracy: FIX_ACCURACY_M,
        }
    }
}

type Watcher = Arc<dyn Fn(PositionFix) + Send + Sync>;

struct Inner {
    route: Vec<GeoPoint>,
    cursor: usize,
    fallback: GeoPoint,
    watchers: BTreeMap<WatchId, Watcher>,
    next_watch_id: WatchId,
    timer: Option<JoinHandle<()>>,
    /// Bumped whenever a traversal is cancelled so a tick that already
    /// fired cannot act on the new route.
    generation: u64,
}

impl Inner {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.generation += 1;
    }
}

/// Handle to a shared simulated position feed. Clones share state.
#[derive(Clone)]
pub struct GeoSimulator {
    inner: Arc<Mutex<Inner>>,
    tick: Duration,
}

impl GeoSimulator {
    /// Creates an idle simulator reporting `fallback` until a route is set.
    pub fn new(fallback: GeoPoint, tick: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                route: Vec::new(),
                cursor: 0,
                fallback,
                watchers: BTreeMap::new(),
                next_watch_id: 1,
                timer: None,
                generation: 0,
            })),
            tick,
        }
    }

    /// Like [`new`](Self::new) but with the fallback randomized once within
    /// [`FALLBACK_JITTER_M`] of `base` along each axis.
    pub fn with_jittered_fallback<R: Rng>(base: GeoPoint, rng: &mut R, tick: Duration) -> Self {
        let north = rng.gen_range(-1.0..=1.0) * FALLBACK_JITTER_M;
        let east = rng.gen_range(-1.0..=1.0) * FALLBACK_JITTER_M;
        Self::new(base.offset_meters(north, east), tick)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn tick_period(&self) -> Duration {
        self.tick
    }

    /// Replaces the route, rewinds to its first point and cancels any
    /// running traversal. An empty route restores the fallback point.
    pub fn set_route(&self, route: Vec<GeoPoint>) {
        let mut inner = self.lock();
        inner.cancel_timer();
        info!(points = route.len(), "Geosim route set");
        inner.route = route;
        inner.cursor = 0;
    }

    /// Starts advancing along the route, one point per tick.
    ///
    /// No-op when the route is empty or a traversal is already running.
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) {
        let mut inner = self.lock();
        if inner.route.is_empty() || inner.timer.is_some() {
            return;
        }

        let generation = inner.generation;
        let sim = self.clone();
        let period = self.tick;
        inner.timer = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if !sim.advance(generation) {
                    break;
                }
            }
        }));
        debug!(generation, "Geosim traversal started");
    }

    /// Cancels the traversal. Idempotent.
    pub fn stop(&self) {
        let mut inner = self.lock();
        if inner.timer.is_some() {
            debug!(cursor = inner.cursor, "Geosim traversal stopped");
        }
        inner.cancel_timer();
    }

    pub fn is_running(&self) -> bool {
        self.lock().timer.is_some()
    }

    /// Index of the point that the next tick will broadcast.
    pub fn cursor(&self) -> usize {
        self.lock().cursor
    }

    /// Broadcasts the point under the cursor and moves the cursor forward.
    ///
    /// Returns `false` once the traversal is over: either the last point
    /// was just broadcast or `generation` is stale.
    fn advance(&self, generation: u64) -> bool {
        let (fix, watchers, more) = {
            let mut inner = self.lock();
            if inner.generation != generation {
                return false;
            }
            let Some(&point) = inner.route.get(inner.cursor) else {
                inner.timer = None;
                return false;
            };
            let more = inner.cursor + 1 < inner.route.len();
            if more {
                inner.cursor += 1;
            } else {
                // Halt at the last point; the task exits right after.
                inner.timer = None;
                debug!("Geosim reached end of route");
            }
            let watchers: Vec<Watcher> = inner.watchers.values().cloned().collect();
            (PositionFix::at(point), watchers, more)
        };

        // Outside the lock so a watcher may call back into the simulator.
        for watcher in watchers {
            watcher(fix);
        }
        more
    }

    /// Current fix: the route point under the cursor, or the fallback when
    /// no route is set.
    pub fn current_position(&self) -> PositionFix {
        let inner = self.lock();
        let point = inner.route.get(inner.cursor).copied().unwrap_or(inner.fallback);
        PositionFix::at(point)
    }

    /// Callback flavour of [`current_position`](Self::current_position).
    pub fn get_current_position(&self, callback: impl FnOnce(PositionFix)) {
        let fix = self.current_position();
        callback(fix);
    }

    /// Registers a watcher that receives every broadcast until cleared.
    pub fn watch_position(&self, callback: impl Fn(PositionFix) + Send + Sync + 'static) -> WatchId {
        let mut inner = self.lock();
        let id = inner.next_watch_id;
        inner.next_watch_id += 1;
        inner.watchers.insert(id, Arc::new(callback));
        id
    }

    pub fn clear_watch(&self, id: WatchId) {
        self.lock().watchers.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const TICK: Duration = Duration::from_millis(1000);

    fn route(n: usize) -> Vec<GeoPoint> {
        (0..n).map(|i| GeoPoint::new(i as f64, 0.0)).collect()
    }

    fn collect(sim: &GeoSimulator) -> Arc<Mutex<Vec<PositionFix>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        sim.watch_position(move |fix| sink.lock().unwrap().push(fix));
        seen
    }

    #[test]
    fn test_fallback_is_stable_without_route() {
        let sim = GeoSimulator::new(GeoPoint::new(36.9, 30.7), TICK);
        let first = sim.current_position();
        for _ in 0..5 {
            assert_eq!(sim.current_position(), first);
        }
        assert_eq!(first.coords, GeoPoint::new(36.9, 30.7));
        assert_eq!(first.accuracy, FIX_ACCURACY_M);
    }

    #[test]
    fn test_jittered_fallback_within_radius() {
        let base = GeoPoint::new(36.9, 30.7);
        let mut rng = StdRng::seed_from_u64(7);
        let sim = GeoSimulator::with_jittered_fallback(base, &mut rng, TICK);
        let p = sim.current_position().coords;
        // Both axes are bounded by the jitter, so the diagonal is too.
        assert!(base.distance_to(&p) <= FALLBACK_JITTER_M * 2f64.sqrt() + 5.0);
        assert_eq!(sim.current_position().coords, p);
    }

    #[test]
    fn test_get_current_position_follows_cursor() {
        let sim = GeoSimulator::new(GeoPoint::new(0.0, 0.0), TICK);
        sim.set_route(route(3));
        let generation = sim.lock().generation;
        assert!(sim.advance(generation));

        let mut seen = None;
        sim.get_current_position(|fix| seen = Some(fix.coords));
        assert_eq!(seen, Some(GeoPoint::new(1.0, 0.0)));
    }

    #[test]
    fn test_watch_ids_increase_and_are_not_reused() {
        let sim = GeoSimulator::new(GeoPoint::new(0.0, 0.0), TICK);
        let a = sim.watch_position(|_| {});
        let b = sim.watch_position(|_| {});
        sim.clear_watch(a);
        let c = sim.watch_position(|_| {});
        assert!(a < b && b < c);
    }

    #[tokio::test(start_paused = true)]
    async fn test_traversal_broadcasts_each_point_once_then_halts() {
        let sim = GeoSimulator::new(GeoPoint::new(0.0, 0.0), TICK);
        let seen = collect(&sim);
        sim.set_route(route(4));
        sim.start();
        assert!(sim.is_running());

        tokio::time::sleep(TICK * 10).await;

        let seen = seen.lock().unwrap();
        let lats: Vec<f64> = seen.iter().map(|f| f.coords.latitude).collect();
        assert_eq!(lats, vec![0.0, 1.0, 2.0, 3.0]);
        assert!(!sim.is_running());
        assert_eq!(sim.cursor(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_broadcast_waits_one_tick() {
        let sim = GeoSimulator::new(GeoPoint::new(0.0, 0.0), TICK);
        let seen = collect(&sim);
        sim.set_route(route(3));
        sim.start();

        tokio::time::sleep(TICK / 2).await;
        assert!(seen.lock().unwrap().is_empty());
        tokio::time::sleep(TICK).await;
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_without_route_is_noop() {
        let sim = GeoSimulator::new(GeoPoint::new(0.0, 0.0), TICK);
        sim.start();
        assert!(!sim.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_does_not_double_speed() {
        let sim = GeoSimulator::new(GeoPoint::new(0.0, 0.0), TICK);
        let seen = collect(&sim);
        sim.set_route(route(10));
        sim.start();
        sim.start();

        tokio::time::sleep(TICK * 3 + TICK / 2).await;
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_route_resets_cursor_and_cancels() {
        let sim = GeoSimulator::new(GeoPoint::new(0.0, 0.0), TICK);
        let seen = collect(&sim);
        sim.set_route(route(10));
        sim.start();
        tokio::time::sleep(TICK * 2 + TICK / 2).await;
        assert_eq!(sim.cursor(), 2);

        sim.set_route(route(5));
        assert_eq!(sim.cursor(), 0);
        assert!(!sim.is_running());

        let before = seen.lock().unwrap().len();
        tokio::time::sleep(TICK * 5).await;
        assert_eq!(seen.lock().unwrap().len(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent_and_freezes_cursor() {
        let sim = GeoSimulator::new(GeoPoint::new(0.0, 0.0), TICK);
        sim.set_route(route(10));
        sim.start();
        tokio::time::sleep(TICK * 3 + TICK / 2).await;
        sim.stop();
        sim.stop();
        let cursor = sim.cursor();

        tokio::time::sleep(TICK * 5).await;
        assert_eq!(sim.cursor(), cursor);
        assert_eq!(sim.current_position().coords, GeoPoint::new(cursor as f64, 0.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleared_watcher_stops_receiving() {
        let sim = GeoSimulator::new(GeoPoint::new(0.0, 0.0), TICK);
        let kept = collect(&sim);
        let dropped = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&dropped);
        let id = sim.watch_position(move |_| *counter.lock().unwrap() += 1);

        sim.set_route(route(6));
        sim.start();
        tokio::time::sleep(TICK * 2 + TICK / 2).await;
        sim.clear_watch(id);
        tokio::time::sleep(TICK * 10).await;

        assert_eq!(*dropped.lock().unwrap(), 2);
        assert_eq!(kept.lock().unwrap().len(), 6);
    }
}
