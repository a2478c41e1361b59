use std::sync::Arc;
use std::time::Duration;

use crate::geo::{GeoPoint, Route};

pub type CarId = u64;

/// Visibility phase. A car only ever moves forward through
/// `FadeIn -> Running -> FadeOut` and is removed after `FadeOut` ends.
/// Every car is drawn in `Running` for at least one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    FadeIn,
    Running,
    FadeOut,
}

/// What a renderer needs to draw one car for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CarFrame {
    pub id: CarId,
    pub position: GeoPoint,
    /// Degrees clockwise from north.
    pub heading: f64,
    /// `0.0` (invisible) to `1.0` (opaque).
    pub opacity: f64,
    pub phase: Phase,
}

/// A decorative car following one route at constant speed.
#[derive(Debug, Clone)]
pub struct Car {
    id: CarId,
    route: Arc<Route>,
    pub(crate) route_index: usize,
    speed_mps: f64,
    spawned_at: Duration,
    lifetime: Duration,
    phase: Phase,
    fade_out_started: Option<Duration>,
    traveled_meters: f64,
}

impl Car {
    pub(crate) fn new(
        id: CarId,
        route: Arc<Route>,
        route_index: usize,
        speed_mps: f64,
        spawned_at: Duration,
        lifetime: Duration,
    ) -> Self {
        Self {
            id,
            route,
            route_index,
            speed_mps,
            spawned_at,
            lifetime,
            phase: Phase::FadeIn,
            fade_out_started: None,
            traveled_meters: 0.0,
        }
    }

    pub fn id(&self) -> CarId {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn speed_mps(&self) -> f64 {
        self.speed_mps
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    pub fn traveled_meters(&self) -> f64 {
        self.traveled_meters
    }

    pub fn route_length_meters(&self) -> f64 {
        self.route.length_meters()
    }

    /// Advances the car to `now` and returns its frame, plus whether the
    /// fade-out has completed and the car should be removed.
    ///
    /// Motion is a function of elapsed time only, so a car keeps moving
    /// through both fades; the phase gates opacity alone.
    pub(crate) fn update(&mut self, now: Duration, fade_in: Duration, fade_out: Duration) -> (CarFrame, bool) {
        let age = now.saturating_sub(self.spawned_at);
        let route_len = self.route.length_meters();
        self.traveled_meters = (age.as_secs_f64() * self.speed_mps).min(route_len);
        let at_end = self.traveled_meters >= route_len;

        let mut opacity = 1.0;
        let mut done = false;
        let mut entered_running = false;

        if self.phase == Phase::FadeIn {
            let t = ratio(age, fade_in);
            opacity = t;
            if t >= 1.0 {
                self.phase = Phase::Running;
                entered_running = true;
            }
        }

        if self.phase == Phase::Running && !entered_running && (age >= self.lifetime || at_end) {
            self.phase = Phase::FadeOut;
            self.fade_out_started = Some(now);
        }

        if self.phase == Phase::FadeOut {
            let started = self.fade_out_started.unwrap_or(now);
            let t = ratio(now.saturating_sub(started), fade_out);
            opacity = 1.0 - t;
            done = t >= 1.0;
        }

        let pos = self.route.position_at(self.traveled_meters);
        let frame = CarFrame {
            id: self.id,
            position: pos.point,
            heading: pos.heading,
            opacity,
            phase: self.phase,
        };
        (frame, done)
    }
}

/// `elapsed / total` clamped to `[0, 1]`; a zero-length ramp is complete.
fn ratio(elapsed: Duration, total: Duration) -> f64 {
    if total.is_zero() {
        return 1.0;
    }
    (elapsed.as_secs_f64() / total.as_secs_f64()).min(1.0)
}
