use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::IllegalTransition;
use crate::api::types::DriverOffer;

/// Where the driver is in the ride lifecycle.
///
/// The offer travels with the step from `OrderPreview` until the ride is
/// completed, so it cannot outlive the states that need it.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverStep {
    Offline,
    Online,
    OrderPreview { offer: DriverOffer },
    GoingToPickup { offer: DriverOffer, ride_id: String },
    ArrivedAtPickup { offer: DriverOffer, ride_id: String },
    RideInProgress { offer: DriverOffer, ride_id: String },
    RideCompleted,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DriverEvent {
    WentOnline,
    WentOffline,
    OfferReceived(DriverOffer),
    OfferAccepted { ride_id: String },
    OfferDeclined,
    ArrivedAtPickup,
    RideStarted,
    RideEnded,
    Continued,
}

impl DriverEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DriverEvent::WentOnline => "WentOnline",
            DriverEvent::WentOffline => "WentOffline",
            DriverEvent::OfferReceived(_) => "OfferReceived",
            DriverEvent::OfferAccepted { .. } => "OfferAccepted",
            DriverEvent::OfferDeclined => "OfferDeclined",
            DriverEvent::ArrivedAtPickup => "ArrivedAtPickup",
            DriverEvent::RideStarted => "RideStarted",
            DriverEvent::RideEnded => "RideEnded",
            DriverEvent::Continued => "Continued",
        }
    }
}

impl DriverStep {
    pub fn kind(&self) -> &'static str {
        match self {
            DriverStep::Offline => "Offline",
            DriverStep::Online => "Online",
            DriverStep::OrderPreview { .. } => "OrderPreview",
            DriverStep::GoingToPickup { .. } => "GoingToPickup",
            DriverStep::ArrivedAtPickup { .. } => "ArrivedAtPickup",
            DriverStep::RideInProgress { .. } => "RideInProgress",
            DriverStep::RideCompleted => "RideCompleted",
        }
    }

    pub fn offer(&self) -> Option<&DriverOffer> {
        match self {
            DriverStep::OrderPreview { offer }
            | DriverStep::GoingToPickup { offer, .. }
            | DriverStep::ArrivedAtPickup { offer, .. }
            | DriverStep::RideInProgress { offer, .. } => Some(offer),
            _ => None,
        }
    }

    pub fn ride_id(&self) -> Option<&str> {
        match self {
            DriverStep::GoingToPickup { ride_id, .. }
            | DriverStep::ArrivedAtPickup { ride_id, .. }
            | DriverStep::RideInProgress { ride_id, .. } => Some(ride_id),
            _ => None,
        }
    }

    /// Whether the driver's own position should be reported.
    pub fn reports_position(&self) -> bool {
        !matches!(self, DriverStep::Offline)
    }

    pub fn apply(&self, event: DriverEvent) -> Result<DriverStep, IllegalTransition> {
        use DriverEvent as E;
        use DriverStep as S;

        let next = match (self, event) {
            (S::Offline, E::WentOnline) => S::Online,
            (S::Online, E::WentOffline) | (S::RideCompleted, E::WentOffline) => S::Offline,
            (S::Online, E::OfferReceived(offer)) => S::OrderPreview { offer },
            (S::OrderPreview { offer }, E::OfferAccepted { ride_id }) => S::GoingToPickup {
                offer: offer.clone(),
                ride_id,
            },
            (S::OrderPreview { .. }, E::OfferDeclined) => S::Online,
            (S::GoingToPickup { offer, ride_id }, E::ArrivedAtPickup) => S::ArrivedAtPickup {
                offer: offer.clone(),
                ride_id: ride_id.clone(),
            },
            (S::ArrivedAtPickup { offer, ride_id }, E::RideStarted) => S::RideInProgress {
                offer: offer.clone(),
                ride_id: ride_id.clone(),
            },
            (S::RideInProgress { .. }, E::RideEnded) => S::RideCompleted,
            (S::RideCompleted, E::Continued) => S::Online,
            (from, event) => {
                return Err(IllegalTransition {
                    from: from.kind(),
                    event: event.name().to_string(),
                });
            }
        };
        Ok(next)
    }
}

impl fmt::Display for DriverStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("pickup code must be exactly 4 digits")]
pub struct InvalidPickupCode;

/// The four-digit code the rider reads out to start the ride.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PickupCode(u32);

impl PickupCode {
    pub fn value(self) -> u32 {
        self.0
    }
}

impl FromStr for PickupCode {
    type Err = InvalidPickupCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != 4 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(InvalidPickupCode);
        }
        s.parse().map(PickupCode).map_err(|_| InvalidPickupCode)
    }
}

impl fmt::Display for PickupCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.0)
    }
}
