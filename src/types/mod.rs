//! Types module
//!
//! Contains the entity model used throughout the application.
//! This module organizes types into logical submodules:
//! - `account`: Account records and the `accounts` column order
//! - `transfer`: Transfer records, identifiers and per-batch balance deltas
//! - `error`: Error types for the transfer batching engine

pub mod account;
pub mod error;
pub mod transfer;

pub use account::{Account, ACCOUNT_COLUMNS};
pub use error::{LedgerError, WriteStep};
pub use transfer::{
    AccountId, AccountUpdate, BalanceDelta, BalanceSide, Transfer, TransferId, TRANSFER_COLUMNS,
};
