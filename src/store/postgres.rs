//! PostgreSQL ledger store
//!
//! `PgStore` drives the `accounts` and `transfers` tables over a single
//! session. The pool is capped at one connection so that every statement of
//! a run, transactional or not, goes through the same backend session.
//!
//! # Schema
//!
//! The tables are expected to exist (see `sql/schema.sql`). Identifiers are
//! `uuid`, balances, amounts, ledgers, timeouts and timestamps are `bigint`,
//! `code` is `integer`, and user data and flags are `bytea`.

use super::to_bigint;
use crate::core::traits::LedgerStore;
use crate::types::{
    Account, AccountId, AccountUpdate, BalanceDelta, BalanceSide, LedgerError, Transfer,
    TransferId, ACCOUNT_COLUMNS, TRANSFER_COLUMNS,
};
use sqlx::postgres::{
    PgArguments, PgDatabaseError, PgPool, PgPoolOptions, PgQueryResult, PgRow,
};
use sqlx::query::Query;
use sqlx::{Executor, Postgres, QueryBuilder, Row, Transaction};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

/// PostgreSQL limit on bind parameters per statement
const MAX_BIND_PARAMS: usize = 65_535;

/// Rows per multi-row insert so a chunk stays under the bind limit
const TRANSFER_ROWS_PER_INSERT: usize = MAX_BIND_PARAMS / TRANSFER_COLUMNS.len();

const TRANSFERS_PKEY: &str = "transfers_pkey";
const ACCOUNTS_PKEY: &str = "accounts_pkey";

const UPDATE_CREDITS: &str =
    "UPDATE accounts SET credits_posted = credits_posted + $1 WHERE id = $2";
const UPDATE_DEBITS: &str = "UPDATE accounts SET debits_posted = debits_posted + $1 WHERE id = $2";
const UPDATE_BOTH: &str = "UPDATE accounts SET credits_posted = credits_posted + $1, \
                           debits_posted = debits_posted + $2 WHERE id = $3";

fn insert_prefix(table: &str, columns: &[&str]) -> String {
    format!("INSERT INTO {} ({}) ", table, columns.join(", "))
}

fn insert_statement(table: &str, columns: &[&str]) -> String {
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${}", i)).collect();
    format!(
        "{}VALUES ({})",
        insert_prefix(table, columns),
        placeholders.join(", ")
    )
}

fn select_statement(table: &str, columns: &[&str]) -> String {
    format!("SELECT {} FROM {} WHERE id = $1", columns.join(", "), table)
}

/// One additive update per delta, joined into a single multi-statement string
///
/// Repeated accounts stay repeated: each delta is its own `UPDATE`. Only
/// `uuid` and integer literals are inlined.
fn batched_update_sql(side: BalanceSide, deltas: &[BalanceDelta]) -> Result<String, LedgerError> {
    let column = side.column();
    let mut sql = String::with_capacity(deltas.len() * 96);
    for delta in deltas {
        let amount = to_bigint(column, delta.amount)?;
        sql.push_str(&format!(
            "UPDATE accounts SET {column} = {column} + {amount} WHERE id = '{}';",
            delta.account_id
        ));
    }
    Ok(sql)
}

fn update_statement(side: BalanceSide) -> &'static str {
    match side {
        BalanceSide::Credit => UPDATE_CREDITS,
        BalanceSide::Debit => UPDATE_DEBITS,
    }
}

/// Rewrite a primary-key violation into the matching duplicate error
fn duplicate_or(error: LedgerError, pkey: &str, duplicate: LedgerError) -> LedgerError {
    match error {
        LedgerError::ConstraintViolation {
            constraint: Some(ref constraint),
            ..
        } if constraint == pkey => duplicate,
        other => other,
    }
}

/// Id named by a unique-violation detail such as `Key (id)=(...) already exists.`
fn duplicate_key_id(detail: &str) -> Option<TransferId> {
    let rest = detail.strip_prefix("Key (id)=(")?;
    let end = rest.find(')')?;
    TransferId::parse_str(&rest[..end]).ok()
}

/// First id that appears twice in the rows being inserted
fn repeated_id(transfers: &[Transfer]) -> Option<TransferId> {
    let mut seen = HashSet::with_capacity(transfers.len());
    transfers
        .iter()
        .map(|transfer| transfer.id)
        .find(|id| !seen.insert(*id))
}

/// Rewrite a `transfers_pkey` violation into `DuplicateTransfer`
///
/// The id comes from the error detail when the server sent one, otherwise
/// from the rows themselves.
fn duplicate_transfer_or(
    error: LedgerError,
    detail: Option<&str>,
    transfers: &[Transfer],
) -> LedgerError {
    let is_pkey = matches!(
        &error,
        LedgerError::ConstraintViolation { constraint: Some(constraint), .. }
            if constraint == TRANSFERS_PKEY
    );
    if !is_pkey {
        return error;
    }

    let id = detail.and_then(duplicate_key_id).or_else(|| match transfers {
        [only] => Some(only.id),
        _ => repeated_id(transfers),
    });
    match id {
        Some(id) => LedgerError::duplicate_transfer(id),
        None => error,
    }
}

fn transfer_insert_error(error: sqlx::Error, transfers: &[Transfer]) -> LedgerError {
    let detail = match &error {
        sqlx::Error::Database(db) => db
            .try_downcast_ref::<PgDatabaseError>()
            .and_then(PgDatabaseError::detail)
            .map(str::to_string),
        _ => None,
    };
    duplicate_transfer_or(error.into(), detail.as_deref(), transfers)
}

/// Classify an error raised by an additive update on `account_id`
fn update_error(error: sqlx::Error, account_id: AccountId) -> LedgerError {
    if let sqlx::Error::Database(db) = &error {
        // numeric_value_out_of_range: bigint overflow of a balance
        if db.code().as_deref() == Some("22003") {
            return LedgerError::balance_overflow(account_id);
        }
    }
    error.into()
}

fn from_bigint(column: &str, value: i64) -> Result<u64, LedgerError> {
    u64::try_from(value).map_err(|_| LedgerError::value_out_of_range(column, value))
}

fn fixed_bytes<const N: usize>(column: &str, bytes: Vec<u8>) -> Result<[u8; N], LedgerError> {
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| LedgerError::value_out_of_range(column, format!("{} bytes", len)))
}

fn flags_from_bytes(bytes: Vec<u8>) -> Result<u16, LedgerError> {
    fixed_bytes::<2>("flags", bytes).map(u16::from_be_bytes)
}

/// Values of one transfer row, in `TRANSFER_COLUMNS` order
struct TransferRow {
    id: TransferId,
    debit_account_id: AccountId,
    credit_account_id: AccountId,
    amount: i64,
    pending_id: Option<TransferId>,
    user_data_128: Vec<u8>,
    user_data_64: Vec<u8>,
    user_data_32: Vec<u8>,
    timeout: i64,
    ledger: i64,
    code: i32,
    flags: Vec<u8>,
    timestamp: i64,
}

impl TryFrom<&Transfer> for TransferRow {
    type Error = LedgerError;

    fn try_from(transfer: &Transfer) -> Result<Self, Self::Error> {
        Ok(TransferRow {
            id: transfer.id,
            debit_account_id: transfer.debit_account_id,
            credit_account_id: transfer.credit_account_id,
            amount: to_bigint("amount", transfer.amount)?,
            pending_id: transfer.pending_id,
            user_data_128: transfer.user_data_128.to_vec(),
            user_data_64: transfer.user_data_64.to_vec(),
            user_data_32: transfer.user_data_32.to_vec(),
            timeout: i64::from(transfer.timeout),
            ledger: i64::from(transfer.ledger),
            code: i32::from(transfer.code),
            flags: transfer.flags.to_be_bytes().to_vec(),
            timestamp: to_bigint("timestamp", transfer.timestamp)?,
        })
    }
}

fn transfer_from_row(row: &PgRow) -> Result<Transfer, LedgerError> {
    Ok(Transfer {
        id: row.try_get("id")?,
        debit_account_id: row.try_get("debit_account_id")?,
        credit_account_id: row.try_get("credit_account_id")?,
        amount: from_bigint("amount", row.try_get("amount")?)?,
        pending_id: row.try_get("pending_id")?,
        user_data_128: fixed_bytes("user_data_128", row.try_get("user_data_128")?)?,
        user_data_64: fixed_bytes("user_data_64", row.try_get("user_data_64")?)?,
        user_data_32: fixed_bytes("user_data_32", row.try_get("user_data_32")?)?,
        timeout: narrow("timeout", row.try_get::<i64, _>("timeout")?)?,
        ledger: narrow("ledger", row.try_get::<i64, _>("ledger")?)?,
        code: narrow("code", row.try_get::<i32, _>("code")?)?,
        flags: flags_from_bytes(row.try_get("flags")?)?,
        timestamp: from_bigint("timestamp", row.try_get("timestamp")?)?,
    })
}

fn account_from_row(row: &PgRow) -> Result<Account, LedgerError> {
    Ok(Account {
        id: row.try_get("id")?,
        debits_pending: from_bigint("debits_pending", row.try_get("debits_pending")?)?,
        debits_posted: from_bigint("debits_posted", row.try_get("debits_posted")?)?,
        credits_pending: from_bigint("credits_pending", row.try_get("credits_pending")?)?,
        credits_posted: from_bigint("credits_posted", row.try_get("credits_posted")?)?,
        user_data_128: fixed_bytes("user_data_128", row.try_get("user_data_128")?)?,
        user_data_64: fixed_bytes("user_data_64", row.try_get("user_data_64")?)?,
        user_data_32: fixed_bytes("user_data_32", row.try_get("user_data_32")?)?,
        ledger: narrow("ledger", row.try_get::<i64, _>("ledger")?)?,
        code: narrow("code", row.try_get::<i32, _>("code")?)?,
        flags: flags_from_bytes(row.try_get("flags")?)?,
        timestamp: from_bigint("timestamp", row.try_get("timestamp")?)?,
    })
}

fn narrow<T, U>(column: &str, value: T) -> Result<U, LedgerError>
where
    T: Copy + std::fmt::Display,
    U: TryFrom<T>,
{
    U::try_from(value).map_err(|_| LedgerError::value_out_of_range(column, value))
}

/// Single-session PostgreSQL `LedgerStore`
pub struct PgStore {
    pool: PgPool,

    /// Transaction opened by `begin`, if any
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgStore {
    /// Connect to PostgreSQL with a single-connection pool
    ///
    /// # Arguments
    ///
    /// * `database_url` - Connection string, e.g. `postgresql://postgres@localhost/tigerbeetle`
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Connection` if the server cannot be reached.
    pub async fn connect(database_url: &str) -> Result<Self, LedgerError> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        debug!("Connected to PostgreSQL");
        Ok(Self { pool, tx: None })
    }

    /// Close the session, rolling back any transaction left open
    pub async fn close(mut self) {
        if let Some(tx) = self.tx.take() {
            if let Err(e) = tx.rollback().await {
                warn!("Failed to roll back open transaction on close: {}", e);
            }
        }
        self.pool.close().await;
    }

    /// Execute a statement inside the open transaction, or in autocommit mode
    async fn execute<'q>(
        &mut self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> Result<PgQueryResult, sqlx::Error> {
        match self.tx.as_mut() {
            Some(tx) => query.execute(&mut **tx).await,
            None => query.execute(&self.pool).await,
        }
    }

    async fn fetch_optional<'q>(
        &mut self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> Result<Option<PgRow>, sqlx::Error> {
        match self.tx.as_mut() {
            Some(tx) => query.fetch_optional(&mut **tx).await,
            None => query.fetch_optional(&self.pool).await,
        }
    }

    /// Run an additive update and require that it matched an account
    async fn execute_update<'q>(
        &mut self,
        query: Query<'q, Postgres, PgArguments>,
        account_id: AccountId,
    ) -> Result<(), LedgerError> {
        let result = self
            .execute(query)
            .await
            .map_err(|e| update_error(e, account_id))?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::account_not_found(account_id));
        }
        Ok(())
    }

    async fn insert_account(&mut self, account: &Account) -> Result<(), LedgerError> {
        let statement = insert_statement("accounts", &ACCOUNT_COLUMNS);
        let query = sqlx::query(&statement)
            .bind(account.id)
            .bind(to_bigint("debits_pending", account.debits_pending)?)
            .bind(to_bigint("debits_posted", account.debits_posted)?)
            .bind(to_bigint("credits_pending", account.credits_pending)?)
            .bind(to_bigint("credits_posted", account.credits_posted)?)
            .bind(account.user_data_128.to_vec())
            .bind(account.user_data_64.to_vec())
            .bind(account.user_data_32.to_vec())
            .bind(i64::from(account.ledger))
            .bind(i32::from(account.code))
            .bind(account.flags.to_be_bytes().to_vec())
            .bind(to_bigint("timestamp", account.timestamp)?);

        self.execute(query).await.map_err(|e| {
            duplicate_or(
                e.into(),
                ACCOUNTS_PKEY,
                LedgerError::duplicate_account(account.id),
            )
        })?;
        Ok(())
    }

    async fn insert_transfer_rows(&mut self, rows: Vec<TransferRow>) -> Result<(), sqlx::Error> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(insert_prefix("transfers", &TRANSFER_COLUMNS));

        builder.push_values(rows, |mut b, row| {
            b.push_bind(row.id)
                .push_bind(row.debit_account_id)
                .push_bind(row.credit_account_id)
                .push_bind(row.amount)
                .push_bind(row.pending_id)
                .push_bind(row.user_data_128)
                .push_bind(row.user_data_64)
                .push_bind(row.user_data_32)
                .push_bind(row.timeout)
                .push_bind(row.ledger)
                .push_bind(row.code)
                .push_bind(row.flags)
                .push_bind(row.timestamp);
        });

        self.execute(builder.build()).await?;
        Ok(())
    }

    /// Send a multi-statement batch in one round trip
    ///
    /// Without bind parameters the batch goes over the simple query
    /// protocol; the affected-row counts of its statements are summed.
    async fn execute_batch(
        &mut self,
        sql: &str,
        deltas: &[BalanceDelta],
    ) -> Result<(), LedgerError> {
        let result = match self.tx.as_mut() {
            Some(tx) => (&mut **tx).execute(sql).await,
            None => self.pool.execute(sql).await,
        }?;

        if result.rows_affected() < deltas.len() as u64 {
            return Err(self.missing_account(deltas).await);
        }
        Ok(())
    }

    /// Name the first account of `deltas` that does not exist
    async fn missing_account(&mut self, deltas: &[BalanceDelta]) -> LedgerError {
        let ids: Vec<AccountId> = deltas.iter().map(|delta| delta.account_id).collect();
        let query = sqlx::query("SELECT id FROM accounts WHERE id = ANY($1)").bind(ids);
        let rows = match self.tx.as_mut() {
            Some(tx) => query.fetch_all(&mut **tx).await,
            None => query.fetch_all(&self.pool).await,
        };

        let found: HashSet<AccountId> = match rows {
            Ok(rows) => rows
                .iter()
                .filter_map(|row| row.try_get("id").ok())
                .collect(),
            Err(e) => return e.into(),
        };

        deltas
            .iter()
            .find(|delta| !found.contains(&delta.account_id))
            .map(|delta| LedgerError::account_not_found(delta.account_id))
            .unwrap_or_else(|| LedgerError::Database {
                message: "batched update matched fewer rows than it carried".to_string(),
            })
    }

    /// Roll back a transaction this store opened on its own behalf
    async fn abandon(&mut self, error: LedgerError) -> LedgerError {
        if let Err(rollback_error) = self.rollback().await {
            warn!("Rollback failed: {}", rollback_error);
        }
        error
    }
}

impl LedgerStore for PgStore {
    async fn begin(&mut self) -> Result<(), LedgerError> {
        if self.tx.is_some() {
            return Err(LedgerError::transaction_state("transaction already open"));
        }
        self.tx = Some(self.pool.begin().await?);
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), LedgerError> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| LedgerError::transaction_state("commit without open transaction"))?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), LedgerError> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| LedgerError::transaction_state("rollback without open transaction"))?;
        tx.rollback().await?;
        Ok(())
    }

    async fn create_accounts(&mut self, accounts: &[Account]) -> Result<(), LedgerError> {
        let own_tx = self.tx.is_none();
        if own_tx {
            self.begin().await?;
        }

        for account in accounts {
            if let Err(e) = self.insert_account(account).await {
                return Err(if own_tx { self.abandon(e).await } else { e });
            }
        }

        if own_tx {
            self.commit().await?;
        }
        Ok(())
    }

    async fn insert_transfer(&mut self, transfer: &Transfer) -> Result<(), LedgerError> {
        let row = TransferRow::try_from(transfer)?;
        self.insert_transfer_rows(vec![row])
            .await
            .map_err(|e| transfer_insert_error(e, std::slice::from_ref(transfer)))
    }

    async fn insert_transfers(&mut self, transfers: &[Transfer]) -> Result<(), LedgerError> {
        if transfers.is_empty() {
            return Ok(());
        }

        let rows = transfers
            .iter()
            .map(TransferRow::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        // Several statements are only atomic inside a transaction
        let own_tx = self.tx.is_none() && rows.len() > TRANSFER_ROWS_PER_INSERT;
        if own_tx {
            self.begin().await?;
        }

        let mut rows = rows.into_iter().peekable();
        while rows.peek().is_some() {
            let chunk: Vec<TransferRow> = rows.by_ref().take(TRANSFER_ROWS_PER_INSERT).collect();
            if let Err(e) = self.insert_transfer_rows(chunk).await {
                let e = transfer_insert_error(e, transfers);
                return Err(if own_tx { self.abandon(e).await } else { e });
            }
        }

        if own_tx {
            self.commit().await?;
        }
        Ok(())
    }

    async fn post_balance(
        &mut self,
        side: BalanceSide,
        delta: BalanceDelta,
    ) -> Result<(), LedgerError> {
        let query = sqlx::query(update_statement(side))
            .bind(to_bigint(side.column(), delta.amount)?)
            .bind(delta.account_id);
        self.execute_update(query, delta.account_id).await
    }

    async fn post_balances(
        &mut self,
        side: BalanceSide,
        deltas: &[BalanceDelta],
    ) -> Result<(), LedgerError> {
        if deltas.is_empty() {
            return Ok(());
        }
        let sql = batched_update_sql(side, deltas)?;

        // A row matching no account is not a server error, so undo it ourselves
        let own_tx = self.tx.is_none();
        if own_tx {
            self.begin().await?;
        }

        if let Err(e) = self.execute_batch(&sql, deltas).await {
            return Err(if own_tx { self.abandon(e).await } else { e });
        }

        if own_tx {
            self.commit().await?;
        }
        Ok(())
    }

    async fn apply_account_update(
        &mut self,
        account_id: AccountId,
        update: &AccountUpdate,
    ) -> Result<(), LedgerError> {
        let query = sqlx::query(UPDATE_BOTH)
            .bind(to_bigint("credits_posted", update.credits_posted)?)
            .bind(to_bigint("debits_posted", update.debits_posted)?)
            .bind(account_id);
        self.execute_update(query, account_id).await
    }

    async fn account(&mut self, id: AccountId) -> Result<Option<Account>, LedgerError> {
        let statement = select_statement("accounts", &ACCOUNT_COLUMNS);
        let row = self.fetch_optional(sqlx::query(&statement).bind(id)).await?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn transfer(&mut self, id: TransferId) -> Result<Option<Transfer>, LedgerError> {
        let statement = select_statement("transfers", &TRANSFER_COLUMNS);
        let row = self.fetch_optional(sqlx::query(&statement).bind(id)).await?;
        row.as_ref().map(transfer_from_row).transpose()
    }
}
