//! Core traits for the backing store and progress telemetry
//!
//! This module defines the trait abstractions that let the three batch
//! committers run unchanged against PostgreSQL or the in-memory store.

use crate::types::{
    Account, AccountId, AccountUpdate, BalanceDelta, BalanceSide, LedgerError, Transfer,
    TransferId,
};

/// Trait for a single store session
///
/// Every method is one round trip to the store. The session is owned by
/// exactly one writer; transaction control is explicit so that the
/// non-transactional strategy can issue statements outside of any
/// transaction.
#[allow(async_fn_in_trait)]
pub trait LedgerStore {
    /// Open a transaction; fails if one is already open
    async fn begin(&mut self) -> Result<(), LedgerError>;

    /// Commit the open transaction
    async fn commit(&mut self) -> Result<(), LedgerError>;

    /// Roll back the open transaction, discarding every write since `begin`
    async fn rollback(&mut self) -> Result<(), LedgerError>;

    /// Create accounts atomically, one insert per account
    async fn create_accounts(&mut self, accounts: &[Account]) -> Result<(), LedgerError>;

    /// Insert a single transfer row
    async fn insert_transfer(&mut self, transfer: &Transfer) -> Result<(), LedgerError>;

    /// Bulk-insert transfer rows in one operation
    ///
    /// The operation is atomic on its own: either every row is written or
    /// none is.
    async fn insert_transfers(&mut self, transfers: &[Transfer]) -> Result<(), LedgerError>;

    /// Apply one additive update to one side of one account
    async fn post_balance(&mut self, side: BalanceSide, delta: BalanceDelta)
        -> Result<(), LedgerError>;

    /// Apply one additive update per delta as a single batched statement
    ///
    /// Deltas are not deduplicated: an account listed twice is updated twice.
    /// The statement is one round trip and atomic on its own.
    async fn post_balances(
        &mut self,
        side: BalanceSide,
        deltas: &[BalanceDelta],
    ) -> Result<(), LedgerError>;

    /// Apply an aggregated update to both posted columns of one account
    async fn apply_account_update(
        &mut self,
        account_id: AccountId,
        update: &AccountUpdate,
    ) -> Result<(), LedgerError>;

    /// Fetch an account by id
    async fn account(&mut self, id: AccountId) -> Result<Option<Account>, LedgerError>;

    /// Fetch a transfer by id
    async fn transfer(&mut self, id: TransferId) -> Result<Option<Transfer>, LedgerError>;
}

/// Trait for throughput telemetry
///
/// Committers report how many transfers they just applied; implementations
/// decide what to do with the count.
pub trait ProgressSink {
    /// Record `applied` more transfers
    fn record(&mut self, applied: u64);
}

impl<P: ProgressSink + ?Sized> ProgressSink for &mut P {
    fn record(&mut self, applied: u64) {
        (**self).record(applied);
    }
}

/// Progress sink that discards every report
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn record(&mut self, _applied: u64) {}
}
