//! Ride-flow reducers.
//!
//! Each flow is a sum type of steps plus an event type; `apply` is the only
//! way to move between steps and rejects events that make no sense in the
//! current step instead of ignoring them.

pub mod driver;
pub mod rider;

pub use driver::{DriverEvent, DriverStep, InvalidPickupCode, PickupCode};
pub use rider::{FareQuote, RiderEvent, RiderStep};

use thiserror::Error;

/// An event that is not valid in the current step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot apply {event} while {from}")]
pub struct IllegalTransition {
    pub from: &'static str,
    pub event: String,
}
