use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderValue};
use reqwest::{Method, Request, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;

use super::error::ApiError;
use super::types::*;
use crate::fetch::HttpClient;
use crate::geo::GeoPoint;

/// Typed client for the TeleGo backend.
///
/// Cheap to clone: the transport is shared, so pollers can own a copy.
pub struct BackendClient<C> {
    http: Arc<C>,
    base_url: String,
}

impl<C> Clone for BackendClient<C> {
    fn clone(&self) -> Self {
        Self {
            http: Arc::clone(&self.http),
            base_url: self.base_url.clone(),
        }
    }
}

impl<C: HttpClient> BackendClient<C> {
    pub fn new(http: C, base_url: &str) -> Result<Self, ApiError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url).map_err(|e| ApiError::InvalidUrl(format!("{base_url}: {e}")))?;
        Ok(Self {
            http: Arc::new(http),
            base_url,
        })
    }

    /// Sends a request and returns the raw body of a 2xx response.
    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Vec<u8>, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let url = Url::parse(&url).map_err(|e| ApiError::InvalidUrl(format!("{url}: {e}")))?;

        let mut req = Request::new(method.clone(), url);
        req.headers_mut()
            .insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(body) = body {
            req.headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            *req.body_mut() = Some(serde_json::to_vec(body)?.into());
        }

        let resp = self.http.execute(req).await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;
        debug!(%method, path, status = status.as_u16(), bytes = bytes.len(), "Backend response");

        if !status.is_success() {
            return Err(ApiError::from_response(status, &bytes));
        }
        Ok(bytes.to_vec())
    }

    /// Decodes an optional JSON body: empty bodies and `null` become `None`.
    fn decode_optional<T: DeserializeOwned>(bytes: &[u8]) -> Result<Option<T>, ApiError> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        Ok(serde_json::from_slice(bytes)?)
    }

    async fn get_optional<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, ApiError> {
        let bytes = self.send::<()>(Method::GET, path, None).await?;
        Self::decode_optional(&bytes)
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: Option<&B>) -> Result<Vec<u8>, ApiError> {
        self.send(Method::POST, path, body).await
    }

    /// Idempotently creates the caller's driver profile.
    #[tracing::instrument(skip(self))]
    pub async fn ensure_driver_profile(&self) -> Result<(), ApiError> {
        self.post::<()>("/api/me/driver", None).await?;
        Ok(())
    }

    /// Idempotently creates the caller's passenger profile.
    #[tracing::instrument(skip(self))]
    pub async fn ensure_passenger_profile(&self) -> Result<(), ApiError> {
        self.post::<()>("/api/me/passenger", None).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn post_driver_state(
        &self,
        status: DriverStatus,
        fix: Option<GeoPoint>,
    ) -> Result<(), ApiError> {
        let body = PostDriverState {
            status,
            latitude: fix.map(|p| p.latitude),
            longitude: fix.map(|p| p.longitude),
        };
        self.post("/api/me/driver/state", Some(&body)).await?;
        Ok(())
    }

    /// Returns the offer currently addressed to this driver, if any.
    pub async fn driver_offer(&self) -> Result<Option<DriverOffer>, ApiError> {
        self.get_optional("/api/me/driver/offers").await
    }

    /// Accepts an offer. `None` means the offer was no longer available.
    #[tracing::instrument(skip(self))]
    pub async fn accept_offer(&self, offer_id: &str) -> Result<Option<String>, ApiError> {
        let bytes = self
            .post::<()>(&format!("/api/me/driver/offers/{offer_id}/accept"), None)
            .await?;
        Self::decode_optional(&bytes)
    }

    #[tracing::instrument(skip(self))]
    pub async fn decline_offer(&self, offer_id: &str) -> Result<(), ApiError> {
        self.post::<()>(&format!("/api/me/driver/offers/{offer_id}/decline"), None)
            .await?;
        Ok(())
    }

    /// Reports the driver's position; the answer describes the current ride.
    pub async fn post_driver_position(
        &self,
        position: GeoPoint,
    ) -> Result<Option<DriverRideSnapshot>, ApiError> {
        let bytes = self
            .post("/api/me/driver/position", Some(&PostDriverPosition::from(position)))
            .await?;
        Self::decode_optional(&bytes)
    }

    /// Starts the ride. A wrong pickup code is rejected with `409 Conflict`.
    #[tracing::instrument(skip(self))]
    pub async fn start_ride(&self, ride_id: &str, ride_code: u32) -> Result<(), ApiError> {
        let body = StartRide {
            ride_id: ride_id.to_string(),
            ride_code,
        };
        self.post("/api/me/driver/ride/start", Some(&body)).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, request), fields(quote_id = ?request.quote_id))]
    pub async fn request_ride(&self, request: &RideRequest) -> Result<String, ApiError> {
        let bytes = self.post("/api/ride-request", Some(request)).await?;
        let resp: RideRequestResponse = serde_json::from_slice(&bytes)?;
        Ok(resp.ride_request_id)
    }

    pub async fn passenger_ride(&self) -> Result<Option<ActiveRide>, ApiError> {
        self.get_optional("/api/me/passenger/ride").await
    }

    pub async fn passenger_ride_snapshot(&self) -> Result<Option<RideSnapshot>, ApiError> {
        self.get_optional("/api/me/passenger/ride/snapshot").await
    }

    #[tracing::instrument(skip(self, request))]
    pub async fn calculate_tariff(&self, request: &TariffRequest) -> Result<TariffResponse, ApiError> {
        let bytes = self.post("/api/tariff/calculate", Some(request)).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
