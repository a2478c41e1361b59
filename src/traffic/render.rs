use tracing::{debug, trace};

use super::car::{CarFrame, CarId};

/// Sink for car frames. Implementations map ids to whatever they draw.
pub trait CarRenderer: Send {
    /// Creates the car on first sight, updates it otherwise.
    fn draw(&mut self, frame: &CarFrame);

    fn remove(&mut self, id: CarId);
}

/// Renderer that only traces frames.
#[derive(Debug, Default)]
pub struct LogRenderer;

impl CarRenderer for LogRenderer {
    fn draw(&mut self, frame: &CarFrame) {
        trace!(
            car = frame.id,
            position = %frame.position,
            heading = frame.heading,
            opacity = frame.opacity,
            phase = ?frame.phase,
            "Car frame"
        );
    }

    fn remove(&mut self, id: CarId) {
        debug!(car = id, "Car removed");
    }
}
