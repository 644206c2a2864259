//! Commit strategy module
//!
//! This module defines the Strategy pattern for committing a batch of
//! transfers to the store. All strategies share one contract: persist every
//! transfer row, add the batch's effect to every involved account's posted
//! balances, and report the applied count to a progress sink. They differ in
//! atomicity and in the number of round trips they issue:
//!
//! | Strategy | Transaction | Balance updates per batch | Progress reports |
//! |----------|-------------|---------------------------|------------------|
//! | V1 `PerTransferCommitter` | none | 2 × transfers | one per transfer |
//! | V2 `StatementBatchedCommitter` | one | 2 × transfers (2 batched statements) | one per batch |
//! | V3 `AggregatedCommitter` | one | distinct accounts touched | one per batch |
//!
//! Given the same starting balances and a batch in which every transfer
//! succeeds, all three leave the store in the same final state.

use crate::cli::StrategyType;
use crate::core::traits::{LedgerStore, ProgressSink};
use crate::types::{LedgerError, Transfer};
use tracing::warn;

pub mod aggregated;
pub mod per_transfer;
pub mod statement_batched;

pub use aggregated::AggregatedCommitter;
pub use per_transfer::PerTransferCommitter;
pub use statement_batched::StatementBatchedCommitter;

/// Phase a committer invocation goes through
///
/// Transactional strategies move `Aggregating -> Writing -> Committed`.
/// The per-transfer strategy moves `Aggregating (no-op) -> Writing -> Done`,
/// each row being applied independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitPhase {
    Aggregating,
    Writing,
    Committed,
    Done,
}

/// Result of a successful committer invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitOutcome {
    /// Transfer rows written
    pub transfers: usize,

    /// Additive balance updates issued to the store
    pub balance_updates: usize,

    /// Terminal phase reached
    pub phase: CommitPhase,
}

/// Batch committer trait
///
/// # Errors
///
/// Every store failure is returned to the caller; nothing is retried.
/// Transactional strategies roll the whole batch back before returning.
#[allow(async_fn_in_trait)]
pub trait BatchCommitter {
    /// Apply a batch of transfers to the store
    ///
    /// # Arguments
    ///
    /// * `store` - The store session, used exclusively by this call
    /// * `batch` - Transfers to persist, in driver order
    /// * `progress` - Sink receiving the number of transfers applied
    async fn commit<S, P>(
        &self,
        store: &mut S,
        batch: &[Transfer],
        progress: &mut P,
    ) -> Result<CommitOutcome, LedgerError>
    where
        S: LedgerStore,
        P: ProgressSink;
}

/// Runtime-selected committer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Committer {
    PerTransfer(PerTransferCommitter),
    StatementBatched(StatementBatchedCommitter),
    Aggregated(AggregatedCommitter),
}

impl Committer {
    /// Short human-readable name of the strategy
    pub fn name(&self) -> &'static str {
        match self {
            Committer::PerTransfer(_) => "v1 per-transfer",
            Committer::StatementBatched(_) => "v2 statement-batched",
            Committer::Aggregated(_) => "v3 aggregated",
        }
    }
}

impl BatchCommitter for Committer {
    async fn commit<S, P>(
        &self,
        store: &mut S,
        batch: &[Transfer],
        progress: &mut P,
    ) -> Result<CommitOutcome, LedgerError>
    where
        S: LedgerStore,
        P: ProgressSink,
    {
        match self {
            Committer::PerTransfer(c) => c.commit(store, batch, progress).await,
            Committer::StatementBatched(c) => c.commit(store, batch, progress).await,
            Committer::Aggregated(c) => c.commit(store, batch, progress).await,
        }
    }
}

/// Create a committer based on the specified strategy type
///
/// # Arguments
///
/// * `strategy_type` - The strategy selected at process start
///
/// # Returns
///
/// The matching `Committer`
pub fn create_committer(strategy_type: StrategyType) -> Committer {
    match strategy_type {
        StrategyType::V1 => Committer::PerTransfer(PerTransferCommitter),
        StrategyType::V2 => Committer::StatementBatched(StatementBatchedCommitter),
        StrategyType::V3 => Committer::Aggregated(AggregatedCommitter),
    }
}

/// Roll back the open transaction after `error` and hand the error back
///
/// A failing rollback is logged; the original error is what the caller sees.
pub(crate) async fn roll_back<S: LedgerStore>(store: &mut S, error: LedgerError) -> LedgerError {
    if let Err(rollback_error) = store.rollback().await {
        warn!("Rollback after '{}' failed: {}", error, rollback_error);
    }
    error
}
