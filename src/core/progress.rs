//! Throughput and progress reporting
//!
//! `ProgressReporter` is the run-scoped context holding the cumulative
//! transfer counters. It renders a single, continuously overwritten status
//! line; the line is a display concern and carries no stability contract.

use super::traits::ProgressSink;
use std::io::{self, Write};
use std::time::Instant;
use tracing::warn;

/// Per-transfer reports only render on multiples of this many transfers
pub const RENDER_EVERY: u64 = 512;

const BAR_WIDTH: u64 = 40;

/// Cumulative progress of one run
///
/// # Render Policy
///
/// - An increment of exactly 1 (per-transfer reporting) renders only when
///   the cumulative total reaches a multiple of [`RENDER_EVERY`]
/// - Any other increment (whole-batch reporting) always renders
///
/// Throughput is the number of transfers recorded since the previous
/// render divided by the seconds elapsed since that render.
#[derive(Debug)]
pub struct ProgressReporter<W: Write> {
    out: W,
    target_total: u64,
    applied_total: u64,
    since_render: u64,
    last_render: Instant,
    renders: u64,
    write_failed: bool,
}

impl<W: Write> ProgressReporter<W> {
    /// Create a reporter for a run of `target_total` transfers
    ///
    /// # Arguments
    ///
    /// * `out` - Where the status line is written (typically stderr)
    /// * `target_total` - Number of transfers the run will apply
    pub fn new(out: W, target_total: u64) -> Self {
        Self {
            out,
            target_total,
            applied_total: 0,
            since_render: 0,
            last_render: Instant::now(),
            renders: 0,
            write_failed: false,
        }
    }

    /// Transfers applied so far
    pub fn applied_total(&self) -> u64 {
        self.applied_total
    }

    /// Transfers the run is expected to apply
    pub fn target_total(&self) -> u64 {
        self.target_total
    }

    /// Number of status lines rendered so far
    pub fn renders(&self) -> u64 {
        self.renders
    }

    /// Terminate the status line
    pub fn finish(&mut self) {
        let result = writeln!(self.out).and_then(|_| self.out.flush());
        self.handle_write(result);
    }

    /// Consume the reporter and return its writer
    pub fn into_inner(self) -> W {
        self.out
    }

    fn should_render(&self, applied: u64) -> bool {
        applied != 1 || self.applied_total % RENDER_EVERY == 0
    }

    fn render(&mut self) {
        let elapsed = self.last_render.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 {
            self.since_render as f64 / elapsed
        } else {
            0.0
        };
        let line = render_line(self.applied_total, self.target_total, rate);

        let result = write!(self.out, "\r{}", line).and_then(|_| self.out.flush());
        self.handle_write(result);

        self.renders += 1;
        self.since_render = 0;
        self.last_render = Instant::now();
    }

    fn handle_write(&mut self, result: io::Result<()>) {
        if let Err(e) = result {
            if !self.write_failed {
                warn!("Failed to write progress output: {}", e);
                self.write_failed = true;
            }
        }
    }
}

impl<W: Write> ProgressSink for ProgressReporter<W> {
    fn record(&mut self, applied: u64) {
        self.applied_total += applied;
        self.since_render += applied;

        if self.should_render(applied) {
            self.render();
        }
    }
}

/// Format one status line
///
/// # Arguments
///
/// * `applied` - Transfers applied so far
/// * `target` - Transfers the run will apply (0 renders a full bar)
/// * `rate` - Current throughput in transfers per second
pub fn render_line(applied: u64, target: u64, rate: f64) -> String {
    let (filled, percent) = if target == 0 {
        (BAR_WIDTH, 100.0)
    } else {
        let capped = applied.min(target);
        (
            capped * BAR_WIDTH / target,
            capped as f64 * 100.0 / target as f64,
        )
    };

    let bar: String = (0..BAR_WIDTH)
        .map(|i| if i < filled { '#' } else { '-' })
        .collect();

    format!(
        "[{}] {}/{} ({:.1}%) {:.0} transfers/s",
        bar, applied, target, percent, rate
    )
}
