//! I/O module
//!
//! Handles run output other than the progress line.
//!
//! # Components
//!
//! - `batch_log` - Per-batch timing log in CSV format

pub mod batch_log;

pub use batch_log::{BatchLog, BatchTiming};
