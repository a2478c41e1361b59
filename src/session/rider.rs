use anyhow::{Context, Result, anyhow};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use super::drain;
use crate::alert;
use crate::api::BackendClient;
use crate::api::types::{ActiveRide, LocationDto, PlaceDto, RideRequest, RideSnapshot, TariffRequest};
use crate::config::Timings;
use crate::fetch::HttpClient;
use crate::flow::{FareQuote, IllegalTransition, RiderEvent, RiderStep};
use crate::geo::{GeoPoint, Route};
use crate::geosim::GeoSimulator;
use crate::poll::Poller;
use crate::services::MapsApi;
use crate::traffic::AmbientTraffic;

/// Fallback alert text when a tariff error carries no message.
const TARIFF_FAILED: &str = "Failed to calculate fare";

/// Fare estimation for the candidate route.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TariffState {
    #[default]
    Idle,
    Loading,
    Ready(FareQuote),
    Failed(String),
}

impl TariffState {
    pub fn quote(&self) -> Option<&FareQuote> {
        match self {
            TariffState::Ready(quote) => Some(quote),
            _ => None,
        }
    }
}

/// Rider screen: route definition, fare, waiting and ride tracking.
pub struct RiderSession<C, M: ?Sized> {
    backend: BackendClient<C>,
    maps: Arc<M>,
    geo: GeoSimulator,
    step: RiderStep,
    origin: Option<PlaceDto>,
    destination: Option<PlaceDto>,
    route: Option<Route>,
    tariff: TariffState,
    traffic: AmbientTraffic<M>,
    rides: Poller<ActiveRide>,
    ride_rx: UnboundedReceiver<ActiveRide>,
    snapshots: Poller<RideSnapshot>,
    snapshot_rx: UnboundedReceiver<RideSnapshot>,
}

impl<C, M> RiderSession<C, M>
where
    C: HttpClient + 'static,
    M: MapsApi + ?Sized + 'static,
{
    pub fn new(
        backend: BackendClient<C>,
        maps: Arc<M>,
        geo: GeoSimulator,
        traffic: AmbientTraffic<M>,
        timings: &Timings,
    ) -> Self {
        let (rides, ride_rx) = Poller::new("passenger-ride", timings.active_ride_poll);
        let (snapshots, snapshot_rx) = Poller::new("ride-snapshot", timings.snapshot_poll);
        Self {
            backend,
            maps,
            geo,
            step: RiderStep::DefiningRoute,
            origin: None,
            destination: None,
            route: None,
            tariff: TariffState::Idle,
            traffic,
            rides,
            ride_rx,
            snapshots,
            snapshot_rx,
        }
    }

    pub fn step(&self) -> &RiderStep {
        &self.step
    }

    pub fn origin(&self) -> Option<&PlaceDto> {
        self.origin.as_ref()
    }

    pub fn destination(&self) -> Option<&PlaceDto> {
        self.destination.as_ref()
    }

    /// The rendered candidate route, once directions succeeded.
    pub fn route(&self) -> Option<&Route> {
        self.route.as_ref()
    }

    pub fn tariff(&self) -> &TariffState {
        &self.tariff
    }

    pub fn traffic(&self) -> &AmbientTraffic<M> {
        &self.traffic
    }

    /// Fare including the rider's adjustment, when a quote is available.
    pub fn fare(&self) -> Option<f64> {
        self.tariff.quote().map(FareQuote::fare)
    }

    /// The code to show the driver, while the driver waits at pickup.
    pub fn ride_code(&self) -> Option<u32> {
        self.step.ride_code()
    }

    #[tracing::instrument(skip(self))]
    pub async fn ensure_profile(&self) -> Result<()> {
        self.backend
            .ensure_passenger_profile()
            .await
            .context("failed to ensure passenger profile")
    }

    /// Resolves the rider's own position to a place, for a default origin.
    pub async fn locate(&self) -> Result<Option<PlaceDto>> {
        let fix = self.geo.current_position().coords;
        self.maps.reverse_geocode(fix).await
    }

    /// Free-text place search biased towards the rider's position.
    pub async fn search(&self, query: &str) -> Result<Vec<PlaceDto>> {
        let near = self.geo.current_position().coords;
        self.maps.search_places(query, Some(near)).await
    }

    /// Resolves a map point to a place. Points the provider cannot name
    /// get a bare place labelled with their coordinates.
    pub async fn resolve_place(&self, point: GeoPoint) -> PlaceDto {
        match self.maps.reverse_geocode(point).await {
            Ok(Some(place)) => place,
            Ok(None) => bare_place(point),
            Err(e) => {
                warn!(%point, error = %e, "Reverse geocoding failed");
                bare_place(point)
            }
        }
    }

    pub async fn set_origin(&mut self, place: PlaceDto) -> Result<()> {
        self.ensure_defining("SetOrigin")?;
        self.origin = Some(place);
        self.refresh_route().await;
        Ok(())
    }

    pub async fn set_destination(&mut self, place: PlaceDto) -> Result<()> {
        self.ensure_defining("SetDestination")?;
        self.destination = Some(place);
        self.refresh_route().await;
        Ok(())
    }

    /// Nudges the offered fare. Returns whether the adjustment changed.
    /// The fare is fixed once the request is sent.
    pub fn adjust_fare(&mut self, delta: f64) -> bool {
        if let Err(e) = self.ensure_defining("AdjustFare") {
            debug!(error = %e, "Fare adjustment ignored");
            return false;
        }
        match &mut self.tariff {
            TariffState::Ready(quote) => quote.nudge(delta),
            _ => false,
        }
    }

    /// Sends the ride request and starts waiting for a driver.
    #[tracing::instrument(skip(self))]
    pub async fn request_ride(&mut self) -> Result<()> {
        self.ensure_defining("RideRequested")?;
        let (Some(origin), Some(destination)) = (self.origin.clone(), self.destination.clone()) else {
            return Err(anyhow!("origin and destination must be set"));
        };

        let quote = self.tariff.quote();
        let request = RideRequest {
            origin,
            destination,
            quote_id: quote.map(|q| q.quote_id.clone()),
            adjustment: quote.map(FareQuote::adjustment),
        };
        let request_id = self.backend.request_ride(&request).await?;
        info!(%request_id, "Ride requested");

        self.step = self.step.apply(RiderEvent::RideRequested { request_id })?;
        self.start_ride_polling();
        self.traffic.activate(request.origin.point());
        Ok(())
    }

    /// Stops waiting for a driver and returns to route definition.
    pub fn cancel(&mut self) -> Result<()> {
        self.step = self.step.apply(RiderEvent::Cancelled)?;
        self.stop_ride_polling();
        self.traffic.deactivate();
        info!("Ride request cancelled");
        Ok(())
    }

    /// Applies an active ride found by the poller. Ignored unless waiting.
    pub fn handle_active_ride(&mut self, ride: ActiveRide) -> bool {
        if !matches!(self.step, RiderStep::WaitingForDriver { .. }) {
            debug!(ride_id = %ride.ride.id, step = %self.step, "Dropping late active ride");
            return false;
        }
        let ride_id = ride.ride.id.clone();
        match self.step.apply(RiderEvent::DriverAssigned(Box::new(ride))) {
            Ok(next) => {
                self.step = next;
                self.stop_ride_polling();
                self.traffic.deactivate();
                self.start_snapshot_polling();
                info!(%ride_id, "Driver assigned");
                true
            }
            Err(e) => {
                warn!(error = %e, "Active ride not applied");
                false
            }
        }
    }

    /// Applies a ride snapshot. Returns whether the step changed kind.
    pub fn handle_snapshot(&mut self, snapshot: RideSnapshot) -> bool {
        let before = self.step.kind();
        match self.step.apply(RiderEvent::SnapshotReceived(snapshot)) {
            Ok(next) => {
                self.step = next;
                if !self.step.tracks_ride() {
                    self.snapshots.stop();
                    drain(&mut self.snapshot_rx);
                }
                let changed = self.step.kind() != before;
                if changed {
                    info!(from = before, to = self.step.kind(), "Ride status changed");
                }
                changed
            }
            Err(e) => {
                debug!(error = %e, "Snapshot ignored");
                false
            }
        }
    }

    /// Waits for the next poll result and applies it. Returns whether the
    /// step changed. Cancel-safe.
    pub async fn process_next_poll(&mut self) -> bool {
        tokio::select! {
            Some(ride) = self.ride_rx.recv() => self.handle_active_ride(ride),
            Some(snapshot) = self.snapshot_rx.recv() => self.handle_snapshot(snapshot),
            else => false,
        }
    }

    fn ensure_defining(&self, event: &str) -> Result<(), IllegalTransition> {
        if self.step == RiderStep::DefiningRoute {
            return Ok(());
        }
        Err(IllegalTransition {
            from: self.step.kind(),
            event: event.to_string(),
        })
    }

    /// Renders the candidate route and, once it is drawn, asks for a fare.
    async fn refresh_route(&mut self) {
        self.route = None;
        self.tariff = TariffState::Idle;
        let (Some(origin), Some(destination)) = (&self.origin, &self.destination) else {
            return;
        };
        let (from, to) = (origin.point(), destination.point());

        match self.maps.directions(from, to).await {
            Ok(path) => self.route = Route::new(path),
            Err(e) => warn!(%from, %to, error = %e, "Directions request failed"),
        }
        if self.route.is_none() {
            return;
        }

        let request = TariffRequest {
            origin: LocationDto::from(origin),
            destination: LocationDto::from(destination),
        };
        self.tariff = TariffState::Loading;
        self.tariff = match self.backend.calculate_tariff(&request).await {
            Ok(response) => {
                info!(
                    amount = response.estimation.amount,
                    limit = response.estimation.adjustment_limit,
                    "Tariff estimated"
                );
                TariffState::Ready(FareQuote::new(response))
            }
            Err(e) => {
                warn!(error = %e, "Tariff request failed");
                TariffState::Failed(alert::api_message(&e, TARIFF_FAILED))
            }
        };
    }

    fn start_ride_polling(&mut self) {
        drain(&mut self.ride_rx);
        let backend = self.backend.clone();
        self.rides.start(move || {
            let backend = backend.clone();
            async move { backend.passenger_ride().await.map_err(anyhow::Error::from) }
        });
    }

    fn stop_ride_polling(&mut self) {
        self.rides.stop();
        drain(&mut self.ride_rx);
    }

    fn start_snapshot_polling(&mut self) {
        drain(&mut self.snapshot_rx);
        let backend = self.backend.clone();
        self.snapshots.start(move || {
            let backend = backend.clone();
            async move {
                backend
                    .passenger_ride_snapshot()
                    .await
                    .map_err(anyhow::Error::from)
            }
        });
    }
}

fn bare_place(point: GeoPoint) -> PlaceDto {
    PlaceDto {
        place_id: String::new(),
        address: point.to_string(),
        short_name: point.to_string(),
        latitude: point.latitude,
        longitude: point.longitude,
        city: None,
        country: None,
    }
}
