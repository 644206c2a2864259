//! Error types for the transfer batching engine
//!
//! This module defines all error types that can occur while committing
//! transfer batches. Every failure propagates to the caller of a committer;
//! nothing is retried.
//!
//! # Error Categories
//!
//! - **Connectivity Errors**: the store session cannot be established or was lost (fatal)
//! - **Constraint Errors**: duplicate ids, unknown account references
//! - **Range Errors**: values that do not fit the store's column width
//! - **Partial Application**: a non-transactional batch failed midway

use super::transfer::{AccountId, TransferId};
use std::fmt;
use thiserror::Error;

/// Step of the per-transfer write sequence that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStep {
    /// Additive update of the credit account
    CreditUpdate,
    /// Additive update of the debit account
    DebitUpdate,
    /// Insert of the transfer row
    Insert,
}

impl fmt::Display for WriteStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let step = match self {
            WriteStep::CreditUpdate => "credit update",
            WriteStep::DebitUpdate => "debit update",
            WriteStep::Insert => "transfer insert",
        };
        f.write_str(step)
    }
}

/// Main error type for the transfer batching engine
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    /// The store could not be reached or the session was dropped
    ///
    /// This is a fatal error: the run cannot proceed.
    #[error("Store connection error: {message}")]
    Connection {
        /// Description of the connectivity failure
        message: String,
    },

    /// Any other error reported by the store
    #[error("Database error: {message}")]
    Database {
        /// Description of the database error
        message: String,
    },

    /// A transfer with this id has already been persisted
    #[error("Duplicate transfer id {id}")]
    DuplicateTransfer {
        /// The duplicated transfer id
        id: TransferId,
    },

    /// An account with this id already exists
    #[error("Duplicate account id {id}")]
    DuplicateAccount {
        /// The duplicated account id
        id: AccountId,
    },

    /// A transfer or balance update referenced an unknown account
    #[error("Account {id} not found")]
    AccountNotFound {
        /// The missing account id
        id: AccountId,
    },

    /// The store rejected a write because of an integrity constraint
    #[error("Constraint violation{}: {message}", constraint.as_ref().map(|c| format!(" on {}", c)).unwrap_or_default())]
    ConstraintViolation {
        /// Name of the violated constraint (if reported)
        constraint: Option<String>,
        /// Description of the violation
        message: String,
    },

    /// Applying an additive update would overflow a stored balance
    #[error("Balance overflow on account {id}")]
    BalanceOverflow {
        /// Account whose balance would overflow
        id: AccountId,
    },

    /// A value does not fit the width of its store column
    #[error("Value {value} out of range for column {column}")]
    ValueOutOfRange {
        /// Target column
        column: String,
        /// Rejected value
        value: String,
    },

    /// Transaction control used out of order (nested begin, commit without begin)
    #[error("Invalid transaction state: {message}")]
    TransactionState {
        /// Description of the misuse
        message: String,
    },

    /// A write failed because a fault was injected at this operation
    #[error("Injected failure at write operation {write}")]
    FaultInjected {
        /// 1-based index of the failed write operation
        write: u64,
    },

    /// A non-transactional batch failed midway
    ///
    /// The first `applied` transfers of the batch are fully posted and
    /// `transfer` is partially posted up to (but excluding) `step`.
    #[error("Batch partially applied: {applied} transfers posted, {step} of transfer {transfer} failed: {source}")]
    PartiallyApplied {
        /// Number of transfers fully applied before the failure
        applied: usize,
        /// Transfer whose write sequence failed
        transfer: TransferId,
        /// Step of the write sequence that failed
        step: WriteStep,
        /// Underlying store error
        source: Box<LedgerError>,
    },

    /// I/O error while writing progress or timing output
    #[error("I/O error: {message}")]
    IoError {
        /// Description of the I/O error
        message: String,
    },

    /// Error while writing the batch timing log
    #[error("CSV error: {message}")]
    CsvError {
        /// Description of the CSV error
        message: String,
    },
}

// Conversion from sqlx::Error to LedgerError
impl From<sqlx::Error> for LedgerError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::Database(db) => {
                // SQLSTATE class 23: integrity constraint violation
                if db.code().is_some_and(|code| code.starts_with("23")) {
                    LedgerError::ConstraintViolation {
                        constraint: db.constraint().map(str::to_string),
                        message: db.message().to_string(),
                    }
                } else {
                    LedgerError::Database {
                        message: db.message().to_string(),
                    }
                }
            }
            error @ (sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed) => LedgerError::Connection {
                message: error.to_string(),
            },
            other => LedgerError::Database {
                message: other.to_string(),
            },
        }
    }
}

// Conversion from io::Error to LedgerError
impl From<std::io::Error> for LedgerError {
    fn from(error: std::io::Error) -> Self {
        LedgerError::IoError {
            message: error.to_string(),
        }
    }
}

// Conversion from csv::Error to LedgerError
impl From<csv::Error> for LedgerError {
    fn from(error: csv::Error) -> Self {
        LedgerError::CsvError {
            message: error.to_string(),
        }
    }
}

// Helper functions for creating common errors

impl LedgerError {
    /// Create a DuplicateTransfer error
    pub fn duplicate_transfer(id: TransferId) -> Self {
        LedgerError::DuplicateTransfer { id }
    }

    /// Create a DuplicateAccount error
    pub fn duplicate_account(id: AccountId) -> Self {
        LedgerError::DuplicateAccount { id }
    }

    /// Create an AccountNotFound error
    pub fn account_not_found(id: AccountId) -> Self {
        LedgerError::AccountNotFound { id }
    }

    /// Create a BalanceOverflow error
    pub fn balance_overflow(id: AccountId) -> Self {
        LedgerError::BalanceOverflow { id }
    }

    /// Create a ValueOutOfRange error
    pub fn value_out_of_range(column: &str, value: impl fmt::Display) -> Self {
        LedgerError::ValueOutOfRange {
            column: column.to_string(),
            value: value.to_string(),
        }
    }

    /// Create a TransactionState error
    pub fn transaction_state(message: &str) -> Self {
        LedgerError::TransactionState {
            message: message.to_string(),
        }
    }

    /// Wrap a store error raised in the middle of a non-transactional batch
    pub fn partially_applied(
        applied: usize,
        transfer: TransferId,
        step: WriteStep,
        source: LedgerError,
    ) -> Self {
        LedgerError::PartiallyApplied {
            applied,
            transfer,
            step,
            source: Box::new(source),
        }
    }

    /// Whether this error means the store session is unusable
    pub fn is_fatal(&self) -> bool {
        match self {
            LedgerError::Connection { .. } => true,
            LedgerError::PartiallyApplied { source, .. } => source.is_fatal(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use uuid::Uuid;

    const ID: Uuid = Uuid::from_u128(0x1ee733d0_6ce0_6db9_acdc_496f3d280584);

    #[rstest]
    #[case::connection(
        LedgerError::Connection { message: "connection refused".to_string() },
        "Store connection error: connection refused"
    )]
    #[case::duplicate_transfer(
        LedgerError::DuplicateTransfer { id: ID },
        "Duplicate transfer id 1ee733d0-6ce0-6db9-acdc-496f3d280584"
    )]
    #[case::account_not_found(
        LedgerError::AccountNotFound { id: ID },
        "Account 1ee733d0-6ce0-6db9-acdc-496f3d280584 not found"
    )]
    #[case::constraint_with_name(
        LedgerError::ConstraintViolation { constraint: Some("transfers_pkey".to_string()), message: "duplicate key".to_string() },
        "Constraint violation on transfers_pkey: duplicate key"
    )]
    #[case::constraint_without_name(
        LedgerError::ConstraintViolation { constraint: None, message: "duplicate key".to_string() },
        "Constraint violation: duplicate key"
    )]
    #[case::out_of_range(
        LedgerError::ValueOutOfRange { column: "amount".to_string(), value: "18446744073709551615".to_string() },
        "Value 18446744073709551615 out of range for column amount"
    )]
    #[case::fault(
        LedgerError::FaultInjected { write: 3 },
        "Injected failure at write operation 3"
    )]
    fn test_error_display(#[case] error: LedgerError, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }

    #[test]
    fn test_partially_applied_display() {
        let error = LedgerError::partially_applied(
            4,
            ID,
            WriteStep::Insert,
            LedgerError::duplicate_transfer(ID),
        );

        assert_eq!(
            error.to_string(),
            "Batch partially applied: 4 transfers posted, transfer insert of transfer \
             1ee733d0-6ce0-6db9-acdc-496f3d280584 failed: Duplicate transfer id \
             1ee733d0-6ce0-6db9-acdc-496f3d280584"
        );
    }

    #[rstest]
    #[case::connection(LedgerError::Connection { message: "reset".to_string() }, true)]
    #[case::nested_connection(
        LedgerError::partially_applied(0, ID, WriteStep::CreditUpdate, LedgerError::Connection { message: "reset".to_string() }),
        true
    )]
    #[case::duplicate(LedgerError::duplicate_transfer(ID), false)]
    fn test_is_fatal(#[case] error: LedgerError, #[case] expected: bool) {
        assert_eq!(error.is_fatal(), expected);
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "Broken pipe");
        let error: LedgerError = io_error.into();
        assert!(matches!(error, LedgerError::IoError { .. }));
        assert_eq!(error.to_string(), "I/O error: Broken pipe");
    }

    #[test]
    fn test_sqlx_pool_timeout_is_connection_error() {
        let error: LedgerError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(error, LedgerError::Connection { .. }));
        assert!(error.is_fatal());
    }

    #[test]
    fn test_sqlx_row_not_found_is_database_error() {
        let error: LedgerError = sqlx::Error::RowNotFound.into();
        assert!(matches!(error, LedgerError::Database { .. }));
    }
}
