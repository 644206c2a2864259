//! V1: naive, non-transactional, per-transfer commit
//!
//! Each transfer costs three round trips in sequence: credit update, debit
//! update, row insert. Nothing encloses them in a transaction, so a failure
//! part way through a batch leaves earlier transfers fully posted and the
//! failing transfer posted up to the step that failed. This is the baseline
//! that measures the cost of safety; the partial state is reported through
//! `LedgerError::PartiallyApplied`, never repaired.

use super::{BatchCommitter, CommitOutcome, CommitPhase};
use crate::core::traits::{LedgerStore, ProgressSink};
use crate::types::{BalanceSide, LedgerError, Transfer, WriteStep};
use tracing::trace;

/// Per-transfer, non-transactional committer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PerTransferCommitter;

impl PerTransferCommitter {
    /// Apply one transfer's three writes, naming the step that failed
    async fn apply<S: LedgerStore>(
        store: &mut S,
        transfer: &Transfer,
    ) -> Result<(), (WriteStep, LedgerError)> {
        store
            .post_balance(BalanceSide::Credit, transfer.delta(BalanceSide::Credit))
            .await
            .map_err(|e| (WriteStep::CreditUpdate, e))?;
        store
            .post_balance(BalanceSide::Debit, transfer.delta(BalanceSide::Debit))
            .await
            .map_err(|e| (WriteStep::DebitUpdate, e))?;
        store
            .insert_transfer(transfer)
            .await
            .map_err(|e| (WriteStep::Insert, e))
    }
}

impl BatchCommitter for PerTransferCommitter {
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
        trace!(phase = ?CommitPhase::Writing, transfers = batch.len());

        for (applied, transfer) in batch.iter().enumerate() {
            if let Err((step, e)) = Self::apply(store, transfer).await {
                return Err(LedgerError::partially_applied(applied, transfer.id, step, e));
            }
            progress.record(1);
        }

        Ok(CommitOutcome {
            transfers: batch.len(),
            balance_updates: batch.len() * 2,
            phase: CommitPhase::Done,
        })
    }
}
