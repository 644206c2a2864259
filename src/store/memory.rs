//! In-memory ledger store
//!
//! This module provides `MemoryStore`, a `LedgerStore` that keeps accounts
//! and transfers in process memory while reproducing the store semantics the
//! committers depend on:
//!
//! - Additive balance updates that fail on unknown accounts
//! - Unique transfer ids and account references checked on insert
//! - Bulk inserts and batched update statements that are atomic on their own
//! - Transactions backed by an undo log: `begin` starts an empty log, every
//!   write records what it changed, `rollback` replays the log
//!
//! It also counts the operations it receives (`StoreStats`) and can make a
//! chosen write operation fail, which is how tests observe round-trip counts
//! and the atomicity behaviour of each strategy.

use super::to_bigint;
use crate::core::traits::LedgerStore;
use crate::types::{
    Account, AccountId, AccountUpdate, BalanceDelta, BalanceSide, LedgerError, Transfer,
    TransferId,
};
use std::collections::{HashMap, HashSet};

/// Operation counters of a `MemoryStore`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Write and transaction-control operations received
    pub round_trips: u64,

    /// Individual additive balance updates applied
    ///
    /// A batched statement counts one update per row. Rejected updates are
    /// not counted.
    pub balance_updates: u64,

    /// Transfer rows successfully written
    pub transfers_written: u64,

    /// Transactions committed
    pub commits: u64,

    /// Transactions rolled back
    pub rollbacks: u64,
}

/// Posted balances of an account as `(debits_posted, credits_posted)`
type Posted = (u64, u64);

#[derive(Debug, Default)]
struct LedgerState {
    accounts: HashMap<AccountId, Account>,
    transfers: HashMap<TransferId, Transfer>,
}

impl LedgerState {
    /// Validate a set of transfer rows against the current state
    fn check_transfers(&self, transfers: &[Transfer]) -> Result<(), LedgerError> {
        let mut seen: HashSet<TransferId> = HashSet::with_capacity(transfers.len());

        for transfer in transfers {
            if self.transfers.contains_key(&transfer.id) || !seen.insert(transfer.id) {
                return Err(LedgerError::duplicate_transfer(transfer.id));
            }
            for account_id in [transfer.debit_account_id, transfer.credit_account_id] {
                if !self.accounts.contains_key(&account_id) {
                    return Err(LedgerError::account_not_found(account_id));
                }
            }
            to_bigint("amount", transfer.amount)?;
            to_bigint("timestamp", transfer.timestamp)?;
        }

        Ok(())
    }

    /// Compute `current + delta` within the store's column width
    fn added(
        account_id: AccountId,
        column: &str,
        current: u64,
        delta: u128,
    ) -> Result<u64, LedgerError> {
        let delta = to_bigint(column, delta)?;
        let current = to_bigint(column, current)?;
        current
            .checked_add(delta)
            .map(|sum| sum as u64)
            .ok_or_else(|| LedgerError::balance_overflow(account_id))
    }

    fn posted(&self, account_id: AccountId) -> Option<Posted> {
        self.accounts
            .get(&account_id)
            .map(|account| (account.debits_posted, account.credits_posted))
    }

    fn set_posted(&mut self, account_id: AccountId, (debits, credits): Posted) {
        if let Some(account) = self.accounts.get_mut(&account_id) {
            account.debits_posted = debits;
            account.credits_posted = credits;
        }
    }

    /// Apply one additive update; the account is unchanged on error
    fn post(&mut self, side: BalanceSide, delta: BalanceDelta) -> Result<(), LedgerError> {
        let account = self
            .accounts
            .get_mut(&delta.account_id)
            .ok_or_else(|| LedgerError::account_not_found(delta.account_id))?;

        let column = match side {
            BalanceSide::Credit => &mut account.credits_posted,
            BalanceSide::Debit => &mut account.debits_posted,
        };
        *column = Self::added(
            delta.account_id,
            side.column(),
            *column,
            u128::from(delta.amount),
        )?;

        Ok(())
    }
}

/// Writes made since `begin`
///
/// Its size follows the writes of the open transaction, never the size of
/// the store.
#[derive(Debug, Default)]
struct UndoLog {
    /// Balances of every touched account before its first write
    balances: HashMap<AccountId, Posted>,

    /// Transfers inserted
    transfers: Vec<TransferId>,

    /// Accounts created
    accounts: Vec<AccountId>,
}

impl UndoLog {
    fn is_empty(&self) -> bool {
        self.balances.is_empty() && self.transfers.is_empty() && self.accounts.is_empty()
    }

    fn replay(self, state: &mut LedgerState) {
        for (account_id, posted) in self.balances {
            state.set_posted(account_id, posted);
        }
        for id in self.transfers {
            state.transfers.remove(&id);
        }
        for id in self.accounts {
            state.accounts.remove(&id);
        }
    }
}

/// In-memory `LedgerStore` implementation
///
/// # Examples
///
/// ```
/// use transfer_batch_engine::store::MemoryStore;
/// use transfer_batch_engine::types::Account;
///
/// let store = MemoryStore::with_accounts(vec![Account::generate(), Account::generate()]);
/// assert_eq!(store.account_count(), 2);
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: LedgerState,

    /// Undo log of the open transaction, if any
    undo: Option<UndoLog>,

    stats: StoreStats,

    /// Number of write operations received so far
    writes: u64,

    /// 1-based index of the write operation that must fail
    fail_at: Option<u64>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with accounts
    ///
    /// Seeding does not count towards the store statistics.
    pub fn with_accounts(accounts: Vec<Account>) -> Self {
        let mut store = Self::new();
        store.state.accounts = accounts
            .into_iter()
            .map(|account| (account.id, account))
            .collect();
        store
    }

    /// Make the `write`-th write operation from now fail with `FaultInjected`
    ///
    /// Writes are counted per operation: a bulk insert or a batched update
    /// statement is one write, however many rows it carries.
    pub fn fail_at_write(&mut self, write: u64) {
        self.fail_at = Some(self.writes + write);
    }

    /// Operation counters accumulated so far
    pub fn stats(&self) -> StoreStats {
        self.stats
    }

    /// Reset the operation counters
    pub fn reset_stats(&mut self) {
        self.stats = StoreStats::default();
    }

    /// Whether a transaction is currently open
    pub fn in_transaction(&self) -> bool {
        self.undo.is_some()
    }

    pub fn account_count(&self) -> usize {
        self.state.accounts.len()
    }

    pub fn transfer_count(&self) -> usize {
        self.state.transfers.len()
    }

    /// Start a write operation, failing it if a fault is armed for it
    fn start_write(&mut self) -> Result<(), LedgerError> {
        self.stats.round_trips += 1;
        self.writes += 1;

        if self.fail_at == Some(self.writes) {
            self.fail_at = None;
            return Err(LedgerError::FaultInjected { write: self.writes });
        }

        Ok(())
    }

    /// Record an account's balances before the open transaction first changed them
    fn remember(&mut self, account_id: AccountId, posted: Posted) {
        if let Some(undo) = self.undo.as_mut() {
            undo.balances.entry(account_id).or_insert(posted);
        }
    }

    fn write_transfers(&mut self, transfers: &[Transfer]) {
        for transfer in transfers {
            self.state.transfers.insert(transfer.id, transfer.clone());
        }
        if let Some(undo) = self.undo.as_mut() {
            undo.transfers.extend(transfers.iter().map(|t| t.id));
        }
        self.stats.transfers_written += transfers.len() as u64;
    }
}

impl LedgerStore for MemoryStore {
    async fn begin(&mut self) -> Result<(), LedgerError> {
        self.stats.round_trips += 1;
        if self.undo.is_some() {
            return Err(LedgerError::transaction_state("transaction already open"));
        }
        self.undo = Some(UndoLog::default());
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), LedgerError> {
        self.stats.round_trips += 1;
        self.undo
            .take()
            .ok_or_else(|| LedgerError::transaction_state("commit without open transaction"))?;
        self.stats.commits += 1;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), LedgerError> {
        self.stats.round_trips += 1;
        let undo = self
            .undo
            .take()
            .ok_or_else(|| LedgerError::transaction_state("rollback without open transaction"))?;
        undo.replay(&mut self.state);
        self.stats.rollbacks += 1;
        Ok(())
    }

    async fn create_accounts(&mut self, accounts: &[Account]) -> Result<(), LedgerError> {
        self.start_write()?;

        let mut seen: HashSet<AccountId> = HashSet::with_capacity(accounts.len());
        for account in accounts {
            if self.state.accounts.contains_key(&account.id) || !seen.insert(account.id) {
                return Err(LedgerError::duplicate_account(account.id));
            }
        }

        for account in accounts {
            self.state.accounts.insert(account.id, account.clone());
        }
        if let Some(undo) = self.undo.as_mut() {
            undo.accounts.extend(accounts.iter().map(|a| a.id));
        }

        Ok(())
    }

    async fn insert_transfer(&mut self, transfer: &Transfer) -> Result<(), LedgerError> {
        self.start_write()?;
        self.state.check_transfers(std::slice::from_ref(transfer))?;
        self.write_transfers(std::slice::from_ref(transfer));
        Ok(())
    }

    async fn insert_transfers(&mut self, transfers: &[Transfer]) -> Result<(), LedgerError> {
        self.start_write()?;
        self.state.check_transfers(transfers)?;
        self.write_transfers(transfers);
        Ok(())
    }

    async fn post_balance(
        &mut self,
        side: BalanceSide,
        delta: BalanceDelta,
    ) -> Result<(), LedgerError> {
        self.start_write()?;

        let prior = self.state.posted(delta.account_id);
        self.state.post(side, delta)?;
        if let Some(posted) = prior {
            self.remember(delta.account_id, posted);
        }

        self.stats.balance_updates += 1;
        Ok(())
    }

    async fn post_balances(
        &mut self,
        side: BalanceSide,
        deltas: &[BalanceDelta],
    ) -> Result<(), LedgerError> {
        self.start_write()?;

        // The statement is atomic: a failing row undoes the rows before it
        let mut prior: HashMap<AccountId, Posted> = HashMap::new();
        for delta in deltas {
            if let Some(posted) = self.state.posted(delta.account_id) {
                prior.entry(delta.account_id).or_insert(posted);
            }
            if let Err(e) = self.state.post(side, *delta) {
                for (account_id, posted) in prior {
                    self.state.set_posted(account_id, posted);
                }
                return Err(e);
            }
        }

        for (account_id, posted) in prior {
            self.remember(account_id, posted);
        }
        self.stats.balance_updates += deltas.len() as u64;
        Ok(())
    }

    async fn apply_account_update(
        &mut self,
        account_id: AccountId,
        update: &AccountUpdate,
    ) -> Result<(), LedgerError> {
        self.start_write()?;

        let account = self
            .state
            .accounts
            .get(&account_id)
            .ok_or_else(|| LedgerError::account_not_found(account_id))?;
        let prior = (account.debits_posted, account.credits_posted);

        // Both columns change in one statement, so compute before assigning
        let credits_posted = LedgerState::added(
            account_id,
            "credits_posted",
            account.credits_posted,
            update.credits_posted,
        )?;
        let debits_posted = LedgerState::added(
            account_id,
            "debits_posted",
            account.debits_posted,
            update.debits_posted,
        )?;
        self.state.set_posted(account_id, (debits_posted, credits_posted));
        self.remember(account_id, prior);

        self.stats.balance_updates += 1;
        Ok(())
    }

    async fn account(&mut self, id: AccountId) -> Result<Option<Account>, LedgerError> {
        Ok(self.state.accounts.get(&id).cloned())
    }

    async fn transfer(&mut self, id: TransferId) -> Result<Option<Transfer>, LedgerError> {
        Ok(self.state.transfers.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn two_accounts() -> (MemoryStore, AccountId, AccountId) {
        let a = Account::generate();
        let b = Account::generate();
        let (a_id, b_id) = (a.id, b.id);
        (MemoryStore::with_accounts(vec![a, b]), a_id, b_id)
    }

    #[tokio::test]
    async fn test_post_balance_is_additive() {
        let (mut store, a, _) = two_accounts();

        let delta = BalanceDelta { account_id: a, amount: 100 };
        store.post_balance(BalanceSide::Credit, delta).await.unwrap();
        store.post_balance(BalanceSide::Credit, delta).await.unwrap();
        store.post_balance(BalanceSide::Debit, delta).await.unwrap();

        let account = store.account(a).await.unwrap().unwrap();
        assert_eq!(account.credits_posted, 200);
        assert_eq!(account.debits_posted, 100);
        assert_eq!(store.stats().balance_updates, 3);
    }

    #[tokio::test]
    async fn test_post_balance_unknown_account_fails() {
        let (mut store, _, _) = two_accounts();
        let missing = Uuid::now_v7();

        let result = store
            .post_balance(BalanceSide::Debit, BalanceDelta { account_id: missing, amount: 1 })
            .await;

        assert_eq!(result, Err(LedgerError::account_not_found(missing)));
    }

    #[tokio::test]
    async fn test_post_balances_counts_every_row() {
        let (mut store, a, b) = two_accounts();
        let deltas = vec![
            BalanceDelta { account_id: a, amount: 1 },
            BalanceDelta { account_id: a, amount: 2 },
            BalanceDelta { account_id: b, amount: 3 },
        ];

        store.post_balances(BalanceSide::Credit, &deltas).await.unwrap();

        let stats = store.stats();
        assert_eq!(stats.round_trips, 1);
        assert_eq!(stats.balance_updates, 3);
        assert_eq!(store.account(a).await.unwrap().unwrap().credits_posted, 3);
        assert_eq!(store.account(b).await.unwrap().unwrap().credits_posted, 3);
    }

    #[tokio::test]
    async fn test_balance_overflow_is_rejected() {
        let (mut store, a, _) = two_accounts();
        let max = BalanceDelta { account_id: a, amount: i64::MAX as u64 };

        store.post_balance(BalanceSide::Credit, max).await.unwrap();
        let result = store
            .post_balance(BalanceSide::Credit, BalanceDelta { account_id: a, amount: 1 })
            .await;

        assert_eq!(result, Err(LedgerError::balance_overflow(a)));
        assert_eq!(
            store.account(a).await.unwrap().unwrap().credits_posted,
            i64::MAX as u64
        );
    }

    #[tokio::test]
    async fn test_apply_account_update_touches_both_columns() {
        let (mut store, a, _) = two_accounts();

        store
            .apply_account_update(a, &AccountUpdate { debits_posted: 7, credits_posted: 9 })
            .await
            .unwrap();

        let account = store.account(a).await.unwrap().unwrap();
        assert_eq!(account.debits_posted, 7);
        assert_eq!(account.credits_posted, 9);
        assert_eq!(store.stats().balance_updates, 1);
    }

    #[tokio::test]
    async fn test_apply_account_update_out_of_range_leaves_account_unchanged() {
        let (mut store, a, _) = two_accounts();

        let result = store
            .apply_account_update(
                a,
                &AccountUpdate { debits_posted: u128::from(u64::MAX), credits_posted: 5 },
            )
            .await;

        assert!(matches!(result, Err(LedgerError::ValueOutOfRange { .. })));
        let account = store.account(a).await.unwrap().unwrap();
        assert_eq!(account.credits_posted, 0);
        assert_eq!(account.debits_posted, 0);
    }

    #[tokio::test]
    async fn test_insert_transfer_rejects_duplicate_id() {
        let (mut store, a, b) = two_accounts();
        let transfer = Transfer::new(a, b, 10);

        store.insert_transfer(&transfer).await.unwrap();
        let result = store.insert_transfer(&transfer).await;

        assert_eq!(result, Err(LedgerError::duplicate_transfer(transfer.id)));
        assert_eq!(store.transfer_count(), 1);
    }

    #[tokio::test]
    async fn test_insert_transfer_rejects_unknown_account() {
        let (mut store, a, _) = two_accounts();
        let missing = Uuid::now_v7();

        let result = store.insert_transfer(&Transfer::new(a, missing, 10)).await;

        assert_eq!(result, Err(LedgerError::account_not_found(missing)));
    }

    #[tokio::test]
    async fn test_bulk_insert_is_all_or_nothing() {
        let (mut store, a, b) = two_accounts();
        let first = Transfer::new(a, b, 1);
        let duplicate = Transfer::with_id(first.id, b, a, 2);

        let result = store
            .insert_transfers(&[first.clone(), Transfer::new(a, b, 3), duplicate])
            .await;

        assert_eq!(result, Err(LedgerError::duplicate_transfer(first.id)));
        assert_eq!(store.transfer_count(), 0);
        assert_eq!(store.stats().transfers_written, 0);
    }

    #[tokio::test]
    async fn test_rollback_replays_undo_log() {
        let (mut store, a, b) = two_accounts();

        store.begin().await.unwrap();
        store.insert_transfer(&Transfer::new(a, b, 10)).await.unwrap();
        store
            .post_balance(BalanceSide::Credit, BalanceDelta { account_id: b, amount: 10 })
            .await
            .unwrap();
        store.rollback().await.unwrap();

        assert!(!store.in_transaction());
        assert_eq!(store.transfer_count(), 0);
        assert_eq!(store.account(b).await.unwrap().unwrap().credits_posted, 0);
        assert_eq!(store.stats().rollbacks, 1);
    }

    #[tokio::test]
    async fn test_transaction_log_follows_writes_not_store_size() {
        let (mut store, a, b) = two_accounts();
        let history: Vec<Transfer> = (0..10_000).map(|_| Transfer::new(a, b, 1)).collect();
        store.insert_transfers(&history).await.unwrap();
        store
            .post_balance(BalanceSide::Credit, BalanceDelta { account_id: b, amount: 10_000 })
            .await
            .unwrap();

        store.begin().await.unwrap();
        assert!(store.undo.as_ref().is_some_and(UndoLog::is_empty));

        store.insert_transfer(&Transfer::new(a, b, 5)).await.unwrap();
        store
            .post_balance(BalanceSide::Credit, BalanceDelta { account_id: b, amount: 5 })
            .await
            .unwrap();
        store
            .post_balance(BalanceSide::Credit, BalanceDelta { account_id: b, amount: 5 })
            .await
            .unwrap();

        let undo = store.undo.as_ref().unwrap();
        assert_eq!(undo.transfers.len(), 1);
        assert_eq!(undo.balances.len(), 1);
        assert_eq!(undo.balances.get(&b), Some(&(0, 10_000)));

        store.rollback().await.unwrap();
        assert_eq!(store.transfer_count(), 10_000);
        assert_eq!(store.account(b).await.unwrap().unwrap().credits_posted, 10_000);
    }

    #[tokio::test]
    async fn test_rollback_removes_created_accounts() {
        let mut store = MemoryStore::new();
        let account = Account::generate();

        store.begin().await.unwrap();
        store.create_accounts(&[account.clone()]).await.unwrap();
        store
            .post_balance(BalanceSide::Debit, BalanceDelta { account_id: account.id, amount: 3 })
            .await
            .unwrap();
        store.rollback().await.unwrap();

        assert_eq!(store.account_count(), 0);
    }

    #[tokio::test]
    async fn test_batched_statement_is_atomic() {
        let (mut store, a, b) = two_accounts();
        let missing = Uuid::now_v7();
        let deltas = vec![
            BalanceDelta { account_id: a, amount: 1 },
            BalanceDelta { account_id: b, amount: 2 },
            BalanceDelta { account_id: missing, amount: 3 },
        ];

        let result = store.post_balances(BalanceSide::Debit, &deltas).await;

        assert_eq!(result, Err(LedgerError::account_not_found(missing)));
        assert_eq!(store.account(a).await.unwrap().unwrap().debits_posted, 0);
        assert_eq!(store.account(b).await.unwrap().unwrap().debits_posted, 0);
        assert_eq!(store.stats().balance_updates, 0);
    }

    #[tokio::test]
    async fn test_rejected_updates_are_not_counted() {
        let (mut store, a, _) = two_accounts();
        let missing = Uuid::now_v7();

        let unknown = BalanceDelta { account_id: missing, amount: 1 };
        assert!(store.post_balance(BalanceSide::Credit, unknown).await.is_err());
        let too_large = AccountUpdate { debits_posted: u128::from(u64::MAX), credits_posted: 0 };
        assert!(store.apply_account_update(a, &too_large).await.is_err());
        assert!(store
            .apply_account_update(missing, &AccountUpdate::default())
            .await
            .is_err());

        let stats = store.stats();
        assert_eq!(stats.balance_updates, 0);
        assert_eq!(stats.round_trips, 3);
    }

    #[tokio::test]
    async fn test_commit_keeps_writes() {
        let (mut store, a, b) = two_accounts();

        store.begin().await.unwrap();
        store.insert_transfer(&Transfer::new(a, b, 10)).await.unwrap();
        store.commit().await.unwrap();

        assert_eq!(store.transfer_count(), 1);
        assert_eq!(store.stats().commits, 1);
    }

    #[tokio::test]
    async fn test_transaction_control_misuse() {
        let mut store = MemoryStore::new();

        assert!(matches!(
            store.commit().await,
            Err(LedgerError::TransactionState { .. })
        ));
        assert!(matches!(
            store.rollback().await,
            Err(LedgerError::TransactionState { .. })
        ));

        store.begin().await.unwrap();
        assert!(matches!(
            store.begin().await,
            Err(LedgerError::TransactionState { .. })
        ));
    }

    #[tokio::test]
    async fn test_fault_injection_fails_chosen_write_once() {
        let (mut store, a, _) = two_accounts();
        let delta = BalanceDelta { account_id: a, amount: 1 };

        store.fail_at_write(2);
        assert!(store.post_balance(BalanceSide::Credit, delta).await.is_ok());
        assert_eq!(
            store.post_balance(BalanceSide::Credit, delta).await,
            Err(LedgerError::FaultInjected { write: 2 })
        );
        assert!(store.post_balance(BalanceSide::Credit, delta).await.is_ok());

        assert_eq!(store.account(a).await.unwrap().unwrap().credits_posted, 2);
    }

    #[tokio::test]
    async fn test_create_accounts_rejects_duplicates_atomically() {
        let mut store = MemoryStore::new();
        let account = Account::generate();

        let result = store
            .create_accounts(&[Account::generate(), account.clone(), account.clone()])
            .await;

        assert_eq!(result, Err(LedgerError::duplicate_account(account.id)));
        assert_eq!(store.account_count(), 0);
    }
}
