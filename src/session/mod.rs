//! Screen-level controllers.
//!
//! A session owns one flow step and every side effect tied to it: backend
//! calls, pollers, the geolocation shim and ambient traffic. Poll results
//! arrive on channels and are applied by
//! [`process_next_poll`](DriverSession::process_next_poll), so all state
//! changes happen on the caller's task.

mod driver;
mod rider;

pub use driver::{DriverSession, PickupCheck};
pub use rider::{RiderSession, TariffState};

use tokio::sync::mpsc::UnboundedReceiver;

/// Discards results that were queued before a poller was stopped.
fn drain<T>(rx: &mut UnboundedReceiver<T>) {
    while rx.try_recv().is_ok() {}
}
