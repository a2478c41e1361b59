use std::fmt;

use super::IllegalTransition;
use crate::api::types::{ActiveRide, RideSnapshot, RideStatus, TariffEstimation, TariffResponse};
use crate::price::format_amount;

/// Tolerance for float accumulation when comparing against the limit.
const LIMIT_EPSILON: f64 = 1e-9;

/// Where the rider is in the ride lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum RiderStep {
    DefiningRoute,
    WaitingForDriver {
        request_id: String,
    },
    DriverEnRoute {
        ride: Box<ActiveRide>,
    },
    DriverArrived {
        ride: Box<ActiveRide>,
        snapshot: RideSnapshot,
    },
    RideInProgress {
        ride: Box<ActiveRide>,
        snapshot: RideSnapshot,
    },
    RideCompleted,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RiderEvent {
    RideRequested { request_id: String },
    Cancelled,
    DriverAssigned(Box<ActiveRide>),
    SnapshotReceived(RideSnapshot),
}

impl RiderEvent {
    pub fn name(&self) -> String {
        match self {
            RiderEvent::RideRequested { .. } => "RideRequested".to_string(),
            RiderEvent::Cancelled => "Cancelled".to_string(),
            RiderEvent::DriverAssigned(_) => "DriverAssigned".to_string(),
            RiderEvent::SnapshotReceived(s) => format!("SnapshotReceived({:?})", s.ride_status),
        }
    }
}

impl RiderStep {
    pub fn kind(&self) -> &'static str {
        match self {
            RiderStep::DefiningRoute => "DefiningRoute",
            RiderStep::WaitingForDriver { .. } => "WaitingForDriver",
            RiderStep::DriverEnRoute { .. } => "DriverEnRoute",
            RiderStep::DriverArrived { .. } => "DriverArrived",
            RiderStep::RideInProgress { .. } => "RideInProgress",
            RiderStep::RideCompleted => "RideCompleted",
        }
    }

    pub fn ride(&self) -> Option<&ActiveRide> {
        match self {
            RiderStep::DriverEnRoute { ride }
            | RiderStep::DriverArrived { ride, .. }
            | RiderStep::RideInProgress { ride, .. } => Some(ride),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> Option<&RideSnapshot> {
        match self {
            RiderStep::DriverArrived { snapshot, .. } | RiderStep::RideInProgress { snapshot, .. } => {
                Some(snapshot)
            }
            _ => None,
        }
    }

    /// The code the rider shows the driver; only meaningful once the
    /// driver is at the pickup point.
    pub fn ride_code(&self) -> Option<u32> {
        match self {
            RiderStep::DriverArrived { snapshot, .. } => Some(snapshot.ride_code),
            _ => None,
        }
    }

    /// Whether a ride snapshot should be polled in this step.
    pub fn tracks_ride(&self) -> bool {
        self.ride().is_some()
    }

    /// Applies an event. A snapshot either refreshes the current stage or
    /// moves the ride exactly one stage forward; anything else is rejected,
    /// so the rider always passes through `DriverArrived`.
    pub fn apply(&self, event: RiderEvent) -> Result<RiderStep, IllegalTransition> {
        use RiderEvent as E;
        use RiderStep as S;

        let next = match (self, event) {
            (S::DefiningRoute, E::RideRequested { request_id }) => S::WaitingForDriver { request_id },
            (S::WaitingForDriver { .. }, E::Cancelled) => S::DefiningRoute,
            (S::WaitingForDriver { .. }, E::DriverAssigned(ride)) => S::DriverEnRoute { ride },
            (from, E::SnapshotReceived(snapshot)) => {
                let illegal = || IllegalTransition {
                    from: from.kind(),
                    event: format!("SnapshotReceived({:?})", snapshot.ride_status),
                };
                let Some(ride) = from.ride() else {
                    return Err(illegal());
                };
                let (current, target) = (stage_of(from), target_stage(snapshot.ride_status));
                if target != current && target != current + 1 {
                    return Err(illegal());
                }

                let mut ride = Box::new(ride.clone());
                ride.driver_state = snapshot.driver_state.clone();
                match snapshot.ride_status {
                    RideStatus::DriverOnTheWay => S::DriverEnRoute { ride },
                    RideStatus::Arrived => S::DriverArrived { ride, snapshot },
                    RideStatus::InProgress => S::RideInProgress { ride, snapshot },
                    RideStatus::Completed => S::RideCompleted,
                }
            }
            (from, event) => {
                return Err(IllegalTransition {
                    from: from.kind(),
                    event: event.name(),
                });
            }
        };
        Ok(next)
    }
}

fn stage_of(step: &RiderStep) -> u8 {
    match step {
        RiderStep::DriverArrived { .. } => 2,
        RiderStep::RideInProgress { .. } => 3,
        RiderStep::RideCompleted => 4,
        _ => 1,
    }
}

fn target_stage(status: RideStatus) -> u8 {
    status.into()
}

impl fmt::Display for RiderStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

/// A tariff quote plus the rider's adjustment of it.
///
/// The adjustment stays within `[-limit, +limit]`; a nudge that would leave
/// that range is refused and leaves the adjustment untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct FareQuote {
    pub quote_id: String,
    pub estimation: TariffEstimation,
    adjustment: f64,
}

impl FareQuote {
    pub fn new(response: TariffResponse) -> Self {
        Self {
            quote_id: response.quote_id,
            estimation: response.estimation,
            adjustment: 0.0,
        }
    }

    pub fn base_amount(&self) -> f64 {
        self.estimation.amount
    }

    pub fn limit(&self) -> f64 {
        self.estimation.adjustment_limit.abs()
    }

    pub fn adjustment(&self) -> f64 {
        self.adjustment
    }

    /// Moves the adjustment by `delta`. Returns whether it changed.
    pub fn nudge(&mut self, delta: f64) -> bool {
        let next = self.adjustment + delta;
        if !next.is_finite() || next.abs() > self.limit() + LIMIT_EPSILON {
            return false;
        }
        self.adjustment = next;
        true
    }

    /// The fare the rider will offer.
    pub fn fare(&self) -> f64 {
        self.base_amount() + self.adjustment
    }

    pub fn formatted_fare(&self) -> String {
        format_amount(
            self.fare(),
            &self.estimation.currency_symbol,
            self.estimation.currency_symbol_position,
        )
    }
}
