//! Store module
//!
//! Backends implementing [`LedgerStore`](crate::core::traits::LedgerStore).
//!
//! # Components
//!
//! - `postgres` - Single-session PostgreSQL backend (sqlx)
//! - `memory` - In-process backend with transaction snapshots, statistics and fault injection

pub mod memory;
pub mod postgres;

pub use memory::{MemoryStore, StoreStats};
pub use postgres::PgStore;

use crate::types::LedgerError;

/// Narrow a value to the store's `BIGINT` width
pub(crate) fn to_bigint(column: &str, value: impl Into<u128>) -> Result<i64, LedgerError> {
    let value = value.into();
    i64::try_from(value).map_err(|_| LedgerError::value_out_of_range(column, value))
}
