//! Transfer Batch Engine Library
//! # Overview
//!
//! This library commits batches of double-entry transfers to a relational
//! ledger store and compares three commit strategies for throughput.
//!
//! # Architecture
//!
//! The system is organized into several key components:
//!
//! - [`types`] - Core data types (Account, Transfer, LedgerError)
//! - [`cli`] - CLI arguments parsing
//! - [`core`] - Batching components:
//!   - [`core::aggregator`] - Net per-account balance deltas of a batch
//!   - [`core::progress`] - Cumulative throughput reporting
//!   - [`core::driver`] - Synthetic batch generation and the run loop
//! - [`strategy`] - The V1, V2 and V3 committers
//! - [`store`] - PostgreSQL and in-memory ledger stores
//! - [`io`] - Per-batch timing log
//!
//! # Commit Strategies
//!
//! - **V1 per-transfer**: Two balance updates and one insert per transfer,
//!   no transaction
//! - **V2 statement-batched**: The same per-row updates issued as batched
//!   statements inside one transaction
//! - **V3 aggregated**: One update per distinct account, plus a bulk insert,
//!   inside one transaction
//!
//! # Balances
//!
//! Each account maintains posted and pending debits and credits. Only the
//! posted counters are touched by committers; every update is additive.

// Module declarations
pub mod cli;
pub mod core;
pub mod io;
pub mod store;
pub mod strategy;
pub mod types;

pub use core::{aggregate, AccountUpdates, Driver, LedgerStore, ProgressReporter, RunConfig};
pub use store::{MemoryStore, PgStore};
pub use strategy::{create_committer, BatchCommitter, Committer};
pub use types::{Account, AccountId, AccountUpdate, LedgerError, Transfer, TransferId};
