//! Core batching module
//!
//! This module contains the components around the committers:
//! - `traits` - Store and progress seams shared by every strategy
//! - `aggregator` - Per-batch net balance deltas
//! - `progress` - Run-scoped throughput reporting
//! - `driver` - Synthetic batch generation and the run loop

pub mod aggregator;
pub mod driver;
pub mod progress;
pub mod traits;

pub use aggregator::{aggregate, AccountUpdates};
pub use driver::{prepare_accounts, AccountPair, Driver, RunConfig, RunSummary};
pub use progress::ProgressReporter;
pub use traits::{LedgerStore, NoProgress, ProgressSink};
