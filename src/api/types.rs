//! Wire types exchanged with the TeleGo backend.
//!
//! These are read-only projections: the ride lifecycle is owned by the
//! server and only mirrored here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;
use crate::price::SymbolPosition;

/// A resolved place, as sent in ride requests and received in offers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceDto {
    pub place_id: String,
    pub address: String,
    pub short_name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl PlaceDto {
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place_id: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
}

impl From<&PlaceDto> for LocationDto {
    fn from(place: &PlaceDto) -> Self {
        Self {
            place_id: Some(place.place_id.clone()).filter(|id| !id.is_empty()),
            latitude: place.latitude,
            longitude: place.longitude,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriverStatus {
    OnlineActive,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostDriverState {
    pub status: DriverStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostDriverPosition {
    pub latitude: f64,
    pub longitude: f64,
}

impl From<GeoPoint> for PostDriverPosition {
    fn from(p: GeoPoint) -> Self {
        Self {
            latitude: p.latitude,
            longitude: p.longitude,
        }
    }
}

/// Price attached to an offer or an active ride.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferPrice {
    pub amount: f64,
    #[serde(default)]
    pub currency: String,
    pub currency_symbol: String,
    pub currency_symbol_position: SymbolPosition,
}

/// A ride offer pending the driver's decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverOffer {
    pub offer_id: String,
    pub driver_id: String,
    pub ride_request_id: String,
    pub distance_meters: f64,
    pub passenger_name: String,
    pub origin: PlaceDto,
    pub destination: PlaceDto,
    #[serde(default)]
    pub price: Option<OfferPrice>,
}

/// Server-side ride status. Encoded as an integer on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum RideStatus {
    DriverOnTheWay,
    Arrived,
    InProgress,
    Completed,
}

impl TryFrom<u8> for RideStatus {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(RideStatus::DriverOnTheWay),
            2 => Ok(RideStatus::Arrived),
            3 => Ok(RideStatus::InProgress),
            4 => Ok(RideStatus::Completed),
            other => Err(format!("unknown ride status {other}")),
        }
    }
}

impl From<RideStatus> for u8 {
    fn from(status: RideStatus) -> Self {
        match status {
            RideStatus::DriverOnTheWay => 1,
            RideStatus::Arrived => 2,
            RideStatus::InProgress => 3,
            RideStatus::Completed => 4,
        }
    }
}

/// Answer to a driver position report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverRideSnapshot {
    #[serde(default)]
    pub status: Option<RideStatus>,
    #[serde(default)]
    pub needs_code: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StartRide {
    pub ride_id: String,
    pub ride_code: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RideRequest {
    pub origin: PlaceDto,
    pub destination: PlaceDto,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote_id: Option<String>,
    pub adjustment: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RideRequestResponse {
    #[serde(rename = "rideRequestId", alias = "ride_request_id")]
    pub ride_request_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassengerRide {
    pub id: String,
    pub driver_id: String,
    pub passenger_id: String,
    pub status: RideStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassengerDriver {
    pub user_id: String,
    pub rating_sum: f64,
    pub rating_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassengerDriverUser {
    pub telegram_id: i64,
    pub first_name: Option<String>,
    pub user_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverState {
    pub driver_id: String,
    pub last_latitude: f64,
    pub last_longitude: f64,
    pub last_heartbeat_at: DateTime<Utc>,
}

impl DriverState {
    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.last_latitude, self.last_longitude)
    }
}

/// The passenger's assigned ride with everything needed to render it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveRide {
    pub ride: PassengerRide,
    pub origin: PlaceDto,
    pub destination: PlaceDto,
    pub driver: PassengerDriver,
    pub driver_user: PassengerDriverUser,
    pub driver_state: DriverState,
    pub offer_price: OfferPrice,
}

/// Polled view of the passenger's ride.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideSnapshot {
    pub ride_id: String,
    pub driver_state: DriverState,
    pub ride_status: RideStatus,
    pub ride_code: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TariffRequest {
    pub origin: LocationDto,
    pub destination: LocationDto,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TariffEstimation {
    pub amount: f64,
    pub formatted: String,
    pub currency: String,
    pub distance_km: f64,
    pub duration_min: f64,
    pub currency_symbol: String,
    pub currency_symbol_position: SymbolPosition,
    pub adjustment_limit: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TariffResponse {
    pub estimation: TariffEstimation,
    pub quote_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ride_status_wire_format() {
        let s: RideStatus = serde_json::from_value(json!(2)).unwrap();
        assert_eq!(s, RideStatus::Arrived);
        assert_eq!(serde_json::to_value(RideStatus::Completed).unwrap(), json!(4));
        assert!(serde_json::from_value::<RideStatus>(json!(9)).is_err());
    }

    #[test]
    fn test_driver_state_payload_omits_missing_fix() {
        let body = PostDriverState {
            status: DriverStatus::Offline,
            latitude: None,
            longitude: None,
        };
        assert_eq!(serde_json::to_value(body).unwrap(), json!({"status": "OFFLINE"}));

        let body = PostDriverState {
            status: DriverStatus::OnlineActive,
            latitude: Some(10.0),
            longitude: Some(20.0),
        };
        assert_eq!(
            serde_json::to_value(body).unwrap(),
            json!({"status": "ONLINE_ACTIVE", "latitude": 10.0, "longitude": 20.0})
        );
    }

    #[test]
    fn test_ride_request_response_accepts_both_spellings() {
        let a: RideRequestResponse =
            serde_json::from_value(json!({"rideRequestId": "r1"})).unwrap();
        let b: RideRequestResponse =
            serde_json::from_value(json!({"ride_request_id": "r1"})).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_driver_snapshot_defaults() {
        let s: DriverRideSnapshot = serde_json::from_value(json!({})).unwrap();
        assert_eq!(s.status, None);
        assert!(!s.needs_code);
    }
}
