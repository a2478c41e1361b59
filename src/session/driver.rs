use anyhow::{Context, Result};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use super::drain;
use crate::api::BackendClient;
use crate::api::types::{DriverOffer, DriverRideSnapshot, DriverStatus, RideStatus};
use crate::config::Timings;
use crate::fetch::HttpClient;
use crate::flow::{DriverEvent, DriverStep, IllegalTransition, PickupCode};
use crate::geo::GeoPoint;
use crate::geosim::{GeoSimulator, WatchId};
use crate::poll::Poller;
use crate::services::MapsApi;

/// Outcome of submitting a pickup code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickupCheck {
    Accepted,
    /// The server did not recognise the code; the driver may retry.
    Rejected,
}

/// Driver screen: online/offline, offers, pickup and the ride itself.
pub struct DriverSession<C, M: ?Sized> {
    backend: BackendClient<C>,
    maps: Arc<M>,
    geo: GeoSimulator,
    step: DriverStep,
    last_fix: Arc<Mutex<Option<GeoPoint>>>,
    watch_id: Option<WatchId>,
    offers: Poller<DriverOffer>,
    offer_rx: UnboundedReceiver<DriverOffer>,
    positions: Poller<DriverRideSnapshot>,
    position_rx: UnboundedReceiver<DriverRideSnapshot>,
}

impl<C, M> DriverSession<C, M>
where
    C: HttpClient + 'static,
    M: MapsApi + ?Sized,
{
    pub fn new(backend: BackendClient<C>, maps: Arc<M>, geo: GeoSimulator, timings: &Timings) -> Self {
        let (offers, offer_rx) = Poller::new("driver-offers", timings.offer_poll);
        let (positions, position_rx) = Poller::new("driver-position", timings.position_report);
        Self {
            backend,
            maps,
            geo,
            step: DriverStep::Offline,
            last_fix: Arc::new(Mutex::new(None)),
            watch_id: None,
            offers,
            offer_rx,
            positions,
            position_rx,
        }
    }

    pub fn step(&self) -> &DriverStep {
        &self.step
    }

    pub fn geo(&self) -> &GeoSimulator {
        &self.geo
    }

    /// Latest watched fix, or the provider's current position.
    pub fn current_fix(&self) -> GeoPoint {
        current_fix(&self.geo, &self.last_fix)
    }

    pub fn is_polling_offers(&self) -> bool {
        self.offers.is_running()
    }

    pub fn is_reporting_position(&self) -> bool {
        self.positions.is_running()
    }

    #[tracing::instrument(skip(self))]
    pub async fn ensure_profile(&self) -> Result<()> {
        self.backend
            .ensure_driver_profile()
            .await
            .context("failed to ensure driver profile")
    }

    /// Goes online from `Offline`, or continues from `RideCompleted`.
    ///
    /// Reports `ONLINE_ACTIVE` with the current fix first; on failure the
    /// step is left unchanged.
    #[tracing::instrument(skip(self), fields(step = %self.step))]
    pub async fn go_online(&mut self) -> Result<()> {
        let event = match self.step {
            DriverStep::RideCompleted => DriverEvent::Continued,
            _ => DriverEvent::WentOnline,
        };
        let next = self.step.apply(event)?;

        let fix = self.current_fix();
        self.backend
            .post_driver_state(DriverStatus::OnlineActive, Some(fix))
            .await?;

        self.start_tracking();
        self.step = next;
        self.start_position_reports();
        self.start_offer_polling();
        info!(%fix, "Driver online");
        Ok(())
    }

    /// Goes offline from `Online` or `RideCompleted`.
    #[tracing::instrument(skip(self), fields(step = %self.step))]
    pub async fn go_offline(&mut self) -> Result<()> {
        let next = self.step.apply(DriverEvent::WentOffline)?;
        self.backend
            .post_driver_state(DriverStatus::Offline, None)
            .await?;

        self.stop_offer_polling();
        self.positions.stop();
        drain(&mut self.position_rx);
        self.stop_tracking();
        self.step = next;
        info!("Driver offline");
        Ok(())
    }

    /// Applies an offer found by the poller. Ignored unless `Online`.
    pub fn handle_offer(&mut self, offer: DriverOffer) -> bool {
        if self.step != DriverStep::Online {
            debug!(offer_id = %offer.offer_id, step = %self.step, "Dropping late offer");
            return false;
        }
        info!(offer_id = %offer.offer_id, passenger = %offer.passenger_name, "Offer received");
        match self.step.apply(DriverEvent::OfferReceived(offer)) {
            Ok(next) => {
                self.step = next;
                self.stop_offer_polling();
                true
            }
            Err(e) => {
                warn!(error = %e, "Offer not applied");
                false
            }
        }
    }

    /// Accepts the previewed offer. Returns `false` when the backend no
    /// longer had a ride for it, in which case the preview stays.
    #[tracing::instrument(skip(self))]
    pub async fn accept_offer(&mut self) -> Result<bool> {
        let offer = self.previewed_offer("OfferAccepted")?;
        let Some(ride_id) = self.backend.accept_offer(&offer.offer_id).await? else {
            warn!(offer_id = %offer.offer_id, "Offer accepted without a ride");
            return Ok(false);
        };

        self.step = self.step.apply(DriverEvent::OfferAccepted {
            ride_id: ride_id.clone(),
        })?;
        info!(%ride_id, "Going to pickup");

        let from = self.current_fix();
        self.drive(from, offer.origin.point()).await;
        Ok(true)
    }

    #[tracing::instrument(skip(self))]
    pub async fn decline_offer(&mut self) -> Result<()> {
        let offer = self.previewed_offer("OfferDeclined")?;
        self.backend.decline_offer(&offer.offer_id).await?;
        self.step = self.step.apply(DriverEvent::OfferDeclined)?;
        self.start_offer_polling();
        Ok(())
    }

    /// Applies the answer to a position report. An `Arrived` status while
    /// going to pickup moves to `ArrivedAtPickup` and stops the simulated
    /// drive.
    pub fn handle_position_snapshot(&mut self, snapshot: DriverRideSnapshot) -> bool {
        if snapshot.status != Some(RideStatus::Arrived) {
            return false;
        }
        if !matches!(self.step, DriverStep::GoingToPickup { .. }) {
            return false;
        }
        match self.step.apply(DriverEvent::ArrivedAtPickup) {
            Ok(next) => {
                self.step = next;
                self.geo.stop();
                info!(needs_code = snapshot.needs_code, "Arrived at pickup");
                true
            }
            Err(e) => {
                warn!(error = %e, "Arrival not applied");
                false
            }
        }
    }

    /// Submits the rider's pickup code. A wrong code is reported as
    /// [`PickupCheck::Rejected`] and keeps `ArrivedAtPickup`; any other
    /// failure is returned and also keeps the step.
    #[tracing::instrument(skip(self, code))]
    pub async fn submit_pickup_code(&mut self, code: &str) -> Result<PickupCheck> {
        let code: PickupCode = code.parse()?;
        let (offer, ride_id) = match &self.step {
            DriverStep::ArrivedAtPickup { offer, ride_id } => (offer.clone(), ride_id.clone()),
            other => {
                return Err(IllegalTransition {
                    from: other.kind(),
                    event: DriverEvent::RideStarted.name().to_string(),
                }
                .into());
            }
        };

        if let Err(e) = self.backend.start_ride(&ride_id, code.value()).await {
            if e.is_conflict() {
                info!(%ride_id, "Pickup code rejected");
                return Ok(PickupCheck::Rejected);
            }
            return Err(e.into());
        }

        self.step = self.step.apply(DriverEvent::RideStarted)?;
        info!(%ride_id, "Ride started");
        self.drive(offer.origin.point(), offer.destination.point()).await;
        Ok(PickupCheck::Accepted)
    }

    pub fn end_ride(&mut self) -> Result<()> {
        self.step = self.step.apply(DriverEvent::RideEnded)?;
        self.geo.stop();
        info!("Ride completed");
        Ok(())
    }

    /// Waits for the next poll result and applies it. Returns whether the
    /// step changed. Cancel-safe.
    pub async fn process_next_poll(&mut self) -> bool {
        tokio::select! {
            Some(offer) = self.offer_rx.recv() => self.handle_offer(offer),
            Some(snapshot) = self.position_rx.recv() => self.handle_position_snapshot(snapshot),
            else => false,
        }
    }

    fn previewed_offer(&self, event: &str) -> Result<DriverOffer, IllegalTransition> {
        match &self.step {
            DriverStep::OrderPreview { offer } => Ok(offer.clone()),
            other => Err(IllegalTransition {
                from: other.kind(),
                event: event.to_string(),
            }),
        }
    }

    /// Plays the driving route between two points through the geolocation
    /// shim. Routing failures leave the shim idle.
    async fn drive(&self, from: GeoPoint, to: GeoPoint) {
        match self.maps.directions(from, to).await {
            Ok(path) if !path.is_empty() => {
                self.geo.set_route(path);
                self.geo.start();
            }
            Ok(_) => warn!(%from, %to, "Directions returned an empty path"),
            Err(e) => warn!(%from, %to, error = %e, "Directions request failed"),
        }
    }

    fn start_tracking(&mut self) {
        if self.watch_id.is_some() {
            return;
        }
        let last_fix = Arc::clone(&self.last_fix);
        self.watch_id = Some(self.geo.watch_position(move |fix| {
            *last_fix.lock().unwrap_or_else(PoisonError::into_inner) = Some(fix.coords);
        }));
    }

    fn stop_tracking(&mut self) {
        if let Some(id) = self.watch_id.take() {
            self.geo.clear_watch(id);
        }
    }

    fn start_offer_polling(&mut self) {
        drain(&mut self.offer_rx);
        let backend = self.backend.clone();
        self.offers.start(move || {
            let backend = backend.clone();
            async move { backend.driver_offer().await.map_err(anyhow::Error::from) }
        });
    }

    fn stop_offer_polling(&mut self) {
        self.offers.stop();
        drain(&mut self.offer_rx);
    }

    fn start_position_reports(&mut self) {
        let backend = self.backend.clone();
        let geo = self.geo.clone();
        let last_fix = Arc::clone(&self.last_fix);
        self.positions.start(move || {
            let backend = backend.clone();
            let fix = current_fix(&geo, &last_fix);
            async move { backend.post_driver_position(fix).await.map_err(anyhow::Error::from) }
        });
    }
}

fn current_fix(geo: &GeoSimulator, last_fix: &Mutex<Option<GeoPoint>>) -> GeoPoint {
    let cached = *last_fix.lock().unwrap_or_else(PoisonError::into_inner);
    cached.unwrap_or_else(|| geo.current_position().coords)
}
