//! Balance aggregation for a single batch
//!
//! Folds a batch of transfers into the net posted-balance change of every
//! account the batch touches. The result is a short-lived accumulator owned
//! by one committer invocation and dropped once its updates are applied.

use crate::types::{AccountId, AccountUpdate, Transfer};
use std::collections::hash_map;
use std::collections::HashMap;

/// Net per-account deltas of one batch
///
/// Sparse: accounts that do not appear in the batch are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountUpdates {
    updates: HashMap<AccountId, AccountUpdate>,
}

impl AccountUpdates {
    /// Delta accumulated for `account_id`, if the batch touched it
    pub fn get(&self, account_id: &AccountId) -> Option<&AccountUpdate> {
        self.updates.get(account_id)
    }

    /// Number of distinct accounts touched by the batch
    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    pub fn iter(&self) -> hash_map::Iter<'_, AccountId, AccountUpdate> {
        self.updates.iter()
    }
}

impl<'a> IntoIterator for &'a AccountUpdates {
    type Item = (&'a AccountId, &'a AccountUpdate);
    type IntoIter = hash_map::Iter<'a, AccountId, AccountUpdate>;

    fn into_iter(self) -> Self::IntoIter {
        self.updates.iter()
    }
}

/// Fold a batch of transfers into per-account posted-balance deltas
///
/// Each transfer adds its `amount` to the credit account's
/// `credits_posted` and to the debit account's `debits_posted`. Iteration
/// order does not affect the result.
///
/// # Arguments
///
/// * `transfers` - The batch to aggregate
///
/// # Returns
///
/// The sparse map of deltas keyed by account id. Accumulators are 128 bits
/// wide, so summing 64-bit amounts cannot overflow for any realistic batch.
pub fn aggregate(transfers: &[Transfer]) -> AccountUpdates {
    let mut updates: HashMap<AccountId, AccountUpdate> = HashMap::new();

    for transfer in transfers {
        updates
            .entry(transfer.credit_account_id)
            .or_default()
            .credits_posted += u128::from(transfer.amount);
        updates
            .entry(transfer.debit_account_id)
            .or_default()
            .debits_posted += u128::from(transfer.amount);
    }

    AccountUpdates { updates }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use uuid::Uuid;

    fn ids() -> (Uuid, Uuid, Uuid) {
        (Uuid::from_u128(1), Uuid::from_u128(2), Uuid::from_u128(3))
    }

    #[test]
    fn test_empty_batch_has_no_updates() {
        let updates = aggregate(&[]);
        assert!(updates.is_empty());
        assert_eq!(updates.len(), 0);
    }

    #[test]
    fn test_single_transfer_updates_both_sides() {
        let (a, b, _) = ids();
        let updates = aggregate(&[Transfer::new(a, b, 1000)]);

        assert_eq!(updates.len(), 2);
        assert_eq!(
            updates.get(&a),
            Some(&AccountUpdate { debits_posted: 1000, credits_posted: 0 })
        );
        assert_eq!(
            updates.get(&b),
            Some(&AccountUpdate { debits_posted: 0, credits_posted: 1000 })
        );
    }

    #[test]
    fn test_opposite_transfers_both_accumulate() {
        let (a, b, _) = ids();
        let updates = aggregate(&[Transfer::new(a, b, 1000), Transfer::new(b, a, 1000)]);

        let expected = AccountUpdate { debits_posted: 1000, credits_posted: 1000 };
        assert_eq!(updates.get(&a), Some(&expected));
        assert_eq!(updates.get(&b), Some(&expected));
    }

    #[test]
    fn test_untouched_accounts_are_absent() {
        let (a, b, c) = ids();
        let updates = aggregate(&[Transfer::new(a, b, 5)]);
        assert!(updates.get(&c).is_none());
    }

    #[rstest]
    #[case::small(4)]
    #[case::odd(7)]
    #[case::large(2048)]
    fn test_deltas_equal_sum_of_matching_amounts(#[case] size: u64) {
        let (a, b, c) = ids();
        let accounts = [a, b, c];
        let transfers: Vec<Transfer> = (0..size)
            .map(|i| {
                let debit = accounts[(i % 3) as usize];
                let credit = accounts[((i + 1) % 3) as usize];
                Transfer::new(debit, credit, i + 1)
            })
            .collect();

        let updates = aggregate(&transfers);

        for account in accounts {
            let credits: u128 = transfers
                .iter()
                .filter(|t| t.credit_account_id == account)
                .map(|t| u128::from(t.amount))
                .sum();
            let debits: u128 = transfers
                .iter()
                .filter(|t| t.debit_account_id == account)
                .map(|t| u128::from(t.amount))
                .sum();
            let update = updates.get(&account).copied().unwrap_or_default();
            assert_eq!(update.credits_posted, credits);
            assert_eq!(update.debits_posted, debits);
        }
    }

    #[test]
    fn test_order_does_not_matter() {
        let (a, b, c) = ids();
        let mut transfers = vec![
            Transfer::new(a, b, 10),
            Transfer::new(b, c, 20),
            Transfer::new(c, a, 30),
            Transfer::new(a, c, 40),
        ];
        let forward = aggregate(&transfers);
        transfers.reverse();
        let backward = aggregate(&transfers);

        assert_eq!(forward, backward);
    }

    #[test]
    fn test_accumulator_exceeds_u64_without_overflow() {
        let (a, b, _) = ids();
        let updates = aggregate(&[Transfer::new(a, b, u64::MAX), Transfer::new(a, b, u64::MAX)]);

        assert_eq!(
            updates.get(&a).map(|u| u.debits_posted),
            Some(u128::from(u64::MAX) * 2)
        );
    }
}
