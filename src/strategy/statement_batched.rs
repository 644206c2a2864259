//! V2: per-row updates in batched statements, transactional commit
//!
//! No client-side aggregation: every transfer stages one credit-side and one
//! debit-side additive update. Inside one transaction the staged credit
//! updates run as one batched statement, then the debit updates, then all
//! transfer rows are bulk-inserted. The final balances match V3, but the
//! store executes one update per transfer per side.

use super::{roll_back, BatchCommitter, CommitOutcome, CommitPhase};
use crate::core::traits::{LedgerStore, ProgressSink};
use crate::types::{BalanceDelta, BalanceSide, LedgerError, Transfer};
use tracing::trace;

/// Statement-batched, transactional committer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatementBatchedCommitter;

impl StatementBatchedCommitter {
    fn stage(batch: &[Transfer], side: BalanceSide) -> Vec<BalanceDelta> {
        batch.iter().map(|transfer| transfer.delta(side)).collect()
    }

    async fn write<S: LedgerStore>(
        store: &mut S,
        batch: &[Transfer],
        credits: &[BalanceDelta],
        debits: &[BalanceDelta],
    ) -> Result<(), LedgerError> {
        store.post_balances(BalanceSide::Credit, credits).await?;
        store.post_balances(BalanceSide::Debit, debits).await?;
        store.insert_transfers(batch).await
    }
}

impl BatchCommitter for StatementBatchedCommitter {
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
        if batch.is_empty() {
            return Ok(CommitOutcome {
                transfers: 0,
                balance_updates: 0,
                phase: CommitPhase::Committed,
            });
        }

        let credits = Self::stage(batch, BalanceSide::Credit);
        let debits = Self::stage(batch, BalanceSide::Debit);

        trace!(phase = ?CommitPhase::Writing, transfers = batch.len());
        store.begin().await?;
        if let Err(e) = Self::write(store, batch, &credits, &debits).await {
            return Err(roll_back(store, e).await);
        }
        store.commit().await?;

        progress.record(batch.len() as u64);

        Ok(CommitOutcome {
            transfers: batch.len(),
            balance_updates: credits.len() + debits.len(),
            phase: CommitPhase::Committed,
        })
    }
}
