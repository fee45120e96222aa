#![warn(missing_docs)]
//! Deterministic testing surfaces: lossy links, moving scenes, full
//! server to client sessions, event streams and metrics reports.

mod link;
mod metrics;
mod scene;
mod session;

use anyhow::{Context, Result};
use entsync_core::FrameNumber;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

pub use link::{LinkStats, LossyLink};
pub use metrics::*;
pub use scene::{Scene, SceneBuilder};
pub use session::{Session, SessionConfig, StepReport, FRAME_SECONDS};

/// Primary event record captured by headless runs.
#[derive(Debug, Serialize)]
pub struct EventRecord<'a> {
    /// Session step the event belongs to.
    pub step: u64,
    /// Entity frame involved, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame: Option<FrameNumber>,
    /// Human-readable kind label.
    pub kind: &'a str,
    /// Free-form payload.
    pub payload: &'a str,
}

/// A sink that writes newline-delimited JSON to disk.
pub struct JsonlSink {
    file: BufWriter<File>,
}

impl JsonlSink {
    /// Create a new sink at `path`, creating parent dirs if needed.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path)
            .with_context(|| format!("failed to create event log {}", path.display()))?;
        Ok(Self {
            file: BufWriter::new(file),
        })
    }

    /// Append an event to the log.
    pub fn write(&mut self, event: &EventRecord<'_>) -> Result<()> {
        serde_json::to_writer(&mut self.file, event)?;
        self.file.write_all(b"\n")?;
        Ok(())
    }

    /// Flush buffered events to disk.
    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }
}
