//! Account-related types for the transfer batching engine
//!
//! This module defines the Account record as persisted in the `accounts`
//! table, together with the positional column order used when writing it.

use super::transfer::{current_timestamp, AccountId};
use uuid::Uuid;

/// Column order of the `accounts` table
///
/// Account rows are written positionally, so this order is part of the
/// storage contract.
pub const ACCOUNT_COLUMNS: [&str; 12] = [
    "id",
    "debits_pending",
    "debits_posted",
    "credits_pending",
    "credits_posted",
    "user_data_128",
    "user_data_64",
    "user_data_32",
    "ledger",
    "code",
    "flags",
    "timestamp",
];

/// A double-entry account
///
/// Posted balances only ever grow: they are mutated exclusively by the
/// batch committers through additive updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Unique, time-ordered identifier (immutable once created)
    pub id: AccountId,

    /// Reserved for two-phase transfers, always zero
    pub debits_pending: u64,

    /// Sum of all posted transfers debiting this account
    pub debits_posted: u64,

    /// Reserved for two-phase transfers, always zero
    pub credits_pending: u64,

    /// Sum of all posted transfers crediting this account
    pub credits_posted: u64,

    /// Opaque caller-defined metadata
    pub user_data_128: [u8; 16],
    pub user_data_64: [u8; 8],
    pub user_data_32: [u8; 4],

    /// Classification tags, never validated
    pub ledger: u32,
    pub code: u16,

    /// Unused bit field, always zero
    pub flags: u16,

    /// Creation time in nanoseconds since the UNIX epoch
    pub timestamp: u64,
}

impl Account {
    /// Create a new account with the given id and zero balances
    ///
    /// # Arguments
    ///
    /// * `id` - The identifier for this account
    ///
    /// # Returns
    ///
    /// A new Account with every balance, tag and metadata field zeroed and
    /// `timestamp` set to the current time.
    pub fn new(id: AccountId) -> Self {
        Account {
            id,
            debits_pending: 0,
            debits_posted: 0,
            credits_pending: 0,
            credits_posted: 0,
            user_data_128: [0; 16],
            user_data_64: [0; 8],
            user_data_32: [0; 4],
            ledger: 0,
            code: 0,
            flags: 0,
            timestamp: current_timestamp(),
        }
    }

    /// Create a new account with a freshly generated time-ordered id
    pub fn generate() -> Self {
        Account::new(Uuid::now_v7())
    }
}
