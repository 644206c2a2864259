//! V3: fully aggregated, transactional commit
//!
//! The batch is folded into per-account deltas first. Then, inside one
//! transaction, every transfer row is written with a single bulk insert and
//! each distinct account receives one additive update. Round trips grow with
//! the number of distinct accounts, not with the batch size.

use super::{roll_back, BatchCommitter, CommitOutcome, CommitPhase};
use crate::core::aggregator::{aggregate, AccountUpdates};
use crate::core::traits::{LedgerStore, ProgressSink};
use crate::types::{LedgerError, Transfer};
use tracing::trace;

/// Aggregating, transactional committer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregatedCommitter;

impl AggregatedCommitter {
    async fn write<S: LedgerStore>(
        store: &mut S,
        batch: &[Transfer],
        updates: &AccountUpdates,
    ) -> Result<(), LedgerError> {
        store.insert_transfers(batch).await?;

        for (account_id, update) in updates {
            store.apply_account_update(*account_id, update).await?;
        }

        Ok(())
    }
}

impl BatchCommitter for AggregatedCommitter {
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

        trace!(phase = ?CommitPhase::Aggregating, transfers = batch.len());
        let updates = aggregate(batch);

        trace!(phase = ?CommitPhase::Writing, accounts = updates.len());
        store.begin().await?;
        if let Err(e) = Self::write(store, batch, &updates).await {
            return Err(roll_back(store, e).await);
        }
        store.commit().await?;

        progress.record(batch.len() as u64);

        Ok(CommitOutcome {
            transfers: batch.len(),
            balance_updates: updates.len(),
            phase: CommitPhase::Committed,
        })
    }
}
