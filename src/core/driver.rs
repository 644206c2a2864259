//! Driver loop
//!
//! Generates synthetic transfer batches between two accounts and feeds them,
//! one batch at a time and in order, to a single committer over a single
//! store session.

use super::traits::{LedgerStore, ProgressSink};
use crate::io::{BatchLog, BatchTiming};
use crate::strategy::BatchCommitter;
use crate::types::{Account, AccountId, LedgerError, Transfer};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const DEFAULT_BATCHES: usize = 100;
pub const DEFAULT_BATCH_SIZE: usize = 2048;
pub const DEFAULT_AMOUNT: u64 = 1000;

/// Shape of one benchmark run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunConfig {
    /// Number of batches to commit
    pub batches: usize,
    /// Transfers per batch
    pub batch_size: usize,
    /// Amount of every generated transfer
    pub amount: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            batches: DEFAULT_BATCHES,
            batch_size: DEFAULT_BATCH_SIZE,
            amount: DEFAULT_AMOUNT,
        }
    }
}

impl RunConfig {
    /// Create a RunConfig, replacing zero values with the defaults
    pub fn new(batches: usize, batch_size: usize, amount: u64) -> Self {
        let default = Self::default();

        let batches = if batches == 0 {
            warn!("Invalid batches (0), using default ({})", default.batches);
            default.batches
        } else {
            batches
        };

        let batch_size = if batch_size == 0 {
            warn!(
                "Invalid batch_size (0), using default ({})",
                default.batch_size
            );
            default.batch_size
        } else {
            batch_size
        };

        let amount = if amount == 0 {
            warn!("Invalid amount (0), using default ({})", default.amount);
            default.amount
        } else {
            amount
        };

        Self {
            batches,
            batch_size,
            amount,
        }
    }

    /// Number of transfers the whole run applies
    pub fn target_total(&self) -> u64 {
        (self.batches as u64) * (self.batch_size as u64)
    }
}

/// The two accounts transfers move between
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccountPair {
    pub first: AccountId,
    pub second: AccountId,
}

/// Totals of a completed run
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RunSummary {
    pub batches: usize,
    pub transfers: u64,
    /// Time spent inside the committer, summed over batches
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn transfers_per_second(&self) -> f64 {
        let seconds = self.elapsed.as_secs_f64();
        if seconds > 0.0 {
            self.transfers as f64 / seconds
        } else {
            0.0
        }
    }
}

/// Resolve the accounts a run will use
///
/// With `existing` set, both accounts must already be in the store.
/// Otherwise two fresh zero-balance accounts are created.
pub async fn prepare_accounts<S: LedgerStore>(
    store: &mut S,
    existing: Option<AccountPair>,
) -> Result<AccountPair, LedgerError> {
    if let Some(pair) = existing {
        for id in [pair.first, pair.second] {
            if store.account(id).await?.is_none() {
                return Err(LedgerError::account_not_found(id));
            }
        }
        info!("Using existing accounts {} and {}", pair.first, pair.second);
        return Ok(pair);
    }

    let accounts = [Account::generate(), Account::generate()];
    store.create_accounts(&accounts).await?;

    let pair = AccountPair {
        first: accounts[0].id,
        second: accounts[1].id,
    };
    info!("Created accounts {} and {}", pair.first, pair.second);
    Ok(pair)
}

/// Generate one batch of transfers alternating direction between the pair
///
/// Even positions debit `first` and credit `second`; odd positions go the
/// other way. Every transfer gets a fresh id.
pub fn generate_batch(accounts: &AccountPair, size: usize, amount: u64) -> Vec<Transfer> {
    (0..size)
        .map(|i| {
            if i % 2 == 0 {
                Transfer::new(accounts.first, accounts.second, amount)
            } else {
                Transfer::new(accounts.second, accounts.first, amount)
            }
        })
        .collect()
}

/// Runs batches through one committer
#[derive(Debug, Clone)]
pub struct Driver<C: BatchCommitter> {
    committer: C,
    config: RunConfig,
}

impl<C: BatchCommitter> Driver<C> {
    pub fn new(committer: C, config: RunConfig) -> Self {
        Self { committer, config }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Commit `config.batches` generated batches in order
    ///
    /// # Arguments
    ///
    /// * `store` - The store session, owned by this run
    /// * `accounts` - Accounts the generated transfers move between
    /// * `progress` - Sink receiving applied counts from the committer
    /// * `timings` - Optional per-batch timing log
    ///
    /// # Errors
    ///
    /// Stops at the first failing batch and returns its error. Batches
    /// committed before it stay in the store.
    pub async fn run<S, P>(
        &self,
        store: &mut S,
        accounts: &AccountPair,
        progress: &mut P,
        mut timings: Option<&mut BatchLog>,
    ) -> Result<RunSummary, LedgerError>
    where
        S: LedgerStore,
        P: ProgressSink,
    {
        let mut summary = RunSummary {
            batches: 0,
            transfers: 0,
            elapsed: Duration::ZERO,
        };

        for index in 0..self.config.batches {
            let batch = generate_batch(accounts, self.config.batch_size, self.config.amount);

            let started = Instant::now();
            let outcome = self
                .committer
                .commit(store, &batch, progress)
                .await
                .map_err(|e| {
                    warn!(batch = index, "Batch failed: {}", e);
                    e
                })?;
            let elapsed = started.elapsed();

            debug!(
                batch = index,
                transfers = outcome.transfers,
                balance_updates = outcome.balance_updates,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                "Batch committed"
            );

            if let Some(log) = timings.as_mut() {
                log.record(&BatchTiming::new(index, outcome.transfers, elapsed))?;
            }

            summary.batches += 1;
            summary.transfers += outcome.transfers as u64;
            summary.elapsed += elapsed;
        }

        if let Some(log) = timings.as_mut() {
            log.flush()?;
        }

        Ok(summary)
    }
}
