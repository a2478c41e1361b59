//! CSV persistence for ambient traffic frames.

use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use csv::{Writer, WriterBuilder};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::path::Path;
use tracing::{debug, warn};

use crate::traffic::{CarFrame, CarId, CarRenderer, Phase};

/// One CSV row: a drawn frame or a removal.
#[derive(Debug, Serialize)]
struct FrameRecord {
    timestamp: String,
    event: &'static str,
    car_id: CarId,
    latitude: Option<f64>,
    longitude: Option<f64>,
    heading: Option<f64>,
    opacity: Option<f64>,
    phase: Option<&'static str>,
}

fn phase_name(phase: Phase) -> &'static str {
    match phase {
        Phase::FadeIn => "fade_in",
        Phase::Running => "running",
        Phase::FadeOut => "fade_out",
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A [`CarRenderer`] that appends every frame to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub struct CsvFrameRecorder {
    writer: Writer<File>,
}

impl CsvFrameRecorder {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file_exists = path.exists();
        debug!(path = %path.display(), file_exists, "Opening frame recorder");

        let file = OpenOptions::new().append(true).create(true).open(path)?;
        let writer = WriterBuilder::new()
            .has_headers(!file_exists)
            .from_writer(file);
        Ok(Self { writer })
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    fn write(&mut self, record: &FrameRecord) {
        if let Err(e) = self.writer.serialize(record) {
            warn!(error = %e, car = record.car_id, "Failed to record frame");
        }
    }
}

impl CarRenderer for CsvFrameRecorder {
    fn draw(&mut self, frame: &CarFrame) {
        self.write(&FrameRecord {
            timestamp: now(),
            event: "draw",
            car_id: frame.id,
            latitude: Some(frame.position.latitude),
            longitude: Some(frame.position.longitude),
            heading: Some(frame.heading),
            opacity: Some(frame.opacity),
            phase: Some(phase_name(frame.phase)),
        });
    }

    fn remove(&mut self, id: CarId) {
        self.write(&FrameRecord {
            timestamp: now(),
            event: "remove",
            car_id: id,
            latitude: None,
            longitude: None,
            heading: None,
            opacity: None,
            phase: None,
        });
        if let Err(e) = self.writer.flush() {
            warn!(error = %e, "Failed to flush frame recorder");
        }
    }
}
