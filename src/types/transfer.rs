//! Transfer-related types for the transfer batching engine
//!
//! This module defines the Transfer record, the ephemeral per-batch
//! AccountUpdate accumulator and the balance side/delta values used by
//! additive updates.

use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Account identifier (128-bit, time-ordered)
pub type AccountId = Uuid;

/// Transfer identifier (128-bit, time-ordered)
pub type TransferId = Uuid;

/// Column order of the `transfers` table
///
/// Bulk inserts write rows positionally in exactly this order.
pub const TRANSFER_COLUMNS: [&str; 13] = [
    "id",
    "debit_account_id",
    "credit_account_id",
    "amount",
    "pending_id",
    "user_data_128",
    "user_data_64",
    "user_data_32",
    "timeout",
    "ledger",
    "code",
    "flags",
    "timestamp",
];

/// Current time in nanoseconds since the UNIX epoch
pub(crate) fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(nanos_since_epoch)
        .unwrap_or_default()
}

/// Nanoseconds in `elapsed`, saturating at `u64::MAX` (year 2554)
fn nanos_since_epoch(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX)
}

/// A double-entry transfer between two accounts
///
/// A committed transfer adds exactly `amount` to the debit account's
/// `debits_posted` and to the credit account's `credits_posted`. Transfers
/// are persisted once and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    /// Unique, time-ordered identifier
    pub id: TransferId,

    /// Account whose `debits_posted` grows by `amount`
    pub debit_account_id: AccountId,

    /// Account whose `credits_posted` grows by `amount`
    pub credit_account_id: AccountId,

    /// Magnitude in the ledger's minor unit
    pub amount: u64,

    /// Pending transfer this one would resolve; two-phase transfers are
    /// unsupported so this is always `None`
    pub pending_id: Option<TransferId>,

    /// Opaque caller-defined metadata
    pub user_data_128: [u8; 16],
    pub user_data_64: [u8; 8],
    pub user_data_32: [u8; 4],

    /// Pending timeout in seconds, always zero
    pub timeout: u32,

    /// Classification tags, never validated
    pub ledger: u32,
    pub code: u16,

    /// Unused bit field, always zero
    pub flags: u16,

    /// Creation time in nanoseconds since the UNIX epoch
    pub timestamp: u64,
}

impl Transfer {
    /// Create a posted transfer with a freshly generated id
    ///
    /// # Arguments
    ///
    /// * `debit_account_id` - Account to debit
    /// * `credit_account_id` - Account to credit
    /// * `amount` - Amount to move
    pub fn new(debit_account_id: AccountId, credit_account_id: AccountId, amount: u64) -> Self {
        Transfer::with_id(Uuid::now_v7(), debit_account_id, credit_account_id, amount)
    }

    /// Create a posted transfer with an explicit id
    pub fn with_id(
        id: TransferId,
        debit_account_id: AccountId,
        credit_account_id: AccountId,
        amount: u64,
    ) -> Self {
        Transfer {
            id,
            debit_account_id,
            credit_account_id,
            amount,
            pending_id: None,
            user_data_128: [0; 16],
            user_data_64: [0; 8],
            user_data_32: [0; 4],
            timeout: 0,
            ledger: 0,
            code: 0,
            flags: 0,
            timestamp: current_timestamp(),
        }
    }

    /// Delta this transfer applies to the given side's posted balance
    pub fn delta(&self, side: BalanceSide) -> BalanceDelta {
        let account_id = match side {
            BalanceSide::Credit => self.credit_account_id,
            BalanceSide::Debit => self.debit_account_id,
        };
        BalanceDelta {
            account_id,
            amount: self.amount,
        }
    }
}

/// Which posted balance column an additive update targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BalanceSide {
    /// `credits_posted`
    Credit,
    /// `debits_posted`
    Debit,
}

impl BalanceSide {
    /// Name of the posted balance column for this side
    pub fn column(self) -> &'static str {
        match self {
            BalanceSide::Credit => "credits_posted",
            BalanceSide::Debit => "debits_posted",
        }
    }
}

/// A single additive update: `column = column + amount WHERE id = account_id`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceDelta {
    pub account_id: AccountId,
    pub amount: u64,
}

/// Net posted-balance change of one account within one batch
///
/// Accumulators are 128 bits wide so that summing 64-bit amounts over a
/// batch cannot overflow. Narrowing to the store's width happens on write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccountUpdate {
    pub debits_posted: u128,
    pub credits_posted: u128,
}
