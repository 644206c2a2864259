//! Batch timing log
//!
//! Writes one CSV row per committed batch (`batch,transfers,elapsed_ms`) so
//! that per-batch latency can be compared across strategies after a run.

use crate::types::LedgerError;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

/// Timing of one committed batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchTiming {
    /// 0-based batch index within the run
    pub batch: usize,

    /// Transfers committed by the batch
    pub transfers: usize,

    /// Wall-clock time spent in the committer, in milliseconds
    pub elapsed_ms: f64,
}

impl BatchTiming {
    pub fn new(batch: usize, transfers: usize, elapsed: Duration) -> Self {
        Self {
            batch,
            transfers,
            elapsed_ms: elapsed.as_secs_f64() * 1000.0,
        }
    }
}

/// CSV sink for batch timings
pub struct BatchLog {
    writer: csv::Writer<Box<dyn Write>>,
}

impl BatchLog {
    /// Create (or truncate) the timing log at `path`
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::IoError` if the file cannot be created.
    pub fn create(path: &Path) -> Result<Self, LedgerError> {
        let file = File::create(path)?;
        Ok(Self::from_writer(file))
    }

    /// Write the timing log to an arbitrary writer
    pub fn from_writer<W: Write + 'static>(writer: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(Box::new(writer)),
        }
    }

    /// Append one row; the header is written before the first row
    pub fn record(&mut self, timing: &BatchTiming) -> Result<(), LedgerError> {
        self.writer.serialize(timing)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), LedgerError> {
        self.writer.flush()?;
        Ok(())
    }
}
