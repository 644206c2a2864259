use crate::core::{AccountPair, RunConfig};
use crate::core::driver::{DEFAULT_AMOUNT, DEFAULT_BATCHES, DEFAULT_BATCH_SIZE};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use uuid::Uuid;

pub const DEFAULT_DATABASE_URL: &str = "postgresql://postgres@localhost/tigerbeetle";

/// Benchmark batched double-entry transfer commits
#[derive(Parser, Debug)]
#[command(name = "transfer-batch-engine")]
#[command(about = "Benchmark batched double-entry transfer commits", long_about = None)]
pub struct CliArgs {
    /// Commit strategy to use for every batch
    #[arg(
        long = "strategy",
        value_name = "STRATEGY",
        default_value = "v3",
        help = "Commit strategy: 'v1' per-transfer, 'v2' statement-batched, 'v3' aggregated"
    )]
    pub strategy: StrategyType,

    /// Number of batches to commit
    #[arg(long = "batches", value_name = "COUNT", default_value_t = DEFAULT_BATCHES)]
    pub batches: usize,

    /// Number of transfers per batch
    #[arg(long = "batch-size", value_name = "SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Amount of every generated transfer
    #[arg(long = "amount", value_name = "AMOUNT", default_value_t = DEFAULT_AMOUNT)]
    pub amount: u64,

    /// Backing store
    #[arg(long = "store", value_name = "STORE", default_value = "postgres")]
    pub store: StoreType,

    /// PostgreSQL connection string
    #[arg(
        long = "database-url",
        value_name = "URL",
        env = "DATABASE_URL",
        default_value = DEFAULT_DATABASE_URL
    )]
    pub database_url: String,

    /// Existing account to use as the first side of generated transfers
    #[arg(long = "debit-account", value_name = "UUID", requires = "credit_account")]
    pub debit_account: Option<Uuid>,

    /// Existing account to use as the second side of generated transfers
    #[arg(long = "credit-account", value_name = "UUID", requires = "debit_account")]
    pub credit_account: Option<Uuid>,

    /// Write per-batch timings to this CSV file
    #[arg(long = "timings", value_name = "PATH")]
    pub timings: Option<PathBuf>,
}

/// Available commit strategies
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StrategyType {
    /// Per-transfer, non-transactional
    #[value(alias = "per-transfer")]
    V1,
    /// Per-row updates in batched statements, transactional
    #[value(alias = "statement-batched")]
    V2,
    /// Aggregated per-account updates, transactional
    #[value(alias = "aggregated")]
    V3,
}

/// Available backing stores
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StoreType {
    Postgres,
    Memory,
}

impl CliArgs {
    /// Create a RunConfig from CLI arguments
    ///
    /// Zero values fall back to the defaults with a warning.
    pub fn to_run_config(&self) -> RunConfig {
        RunConfig::new(self.batches, self.batch_size, self.amount)
    }

    /// Accounts supplied on the command line, if any
    pub fn existing_accounts(&self) -> Option<AccountPair> {
        match (self.debit_account, self.credit_account) {
            (Some(first), Some(second)) => Some(AccountPair { first, second }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    // Strategy parsing tests
    #[rstest]
    #[case::default_strategy(&["program"], StrategyType::V3)]
    #[case::explicit_v1(&["program", "--strategy", "v1"], StrategyType::V1)]
    #[case::explicit_v2(&["program", "--strategy", "v2"], StrategyType::V2)]
    #[case::alias_v1(&["program", "--strategy", "per-transfer"], StrategyType::V1)]
    #[case::alias_v3(&["program", "--strategy", "aggregated"], StrategyType::V3)]
    fn test_strategy_parsing(#[case] args: &[&str], #[case] expected: StrategyType) {
        let parsed = CliArgs::try_parse_from(args).unwrap();
        assert_eq!(parsed.strategy, expected);
    }

    #[rstest]
    #[case::default_store(&["program"], StoreType::Postgres)]
    #[case::memory(&["program", "--store", "memory"], StoreType::Memory)]
    fn test_store_parsing(#[case] args: &[&str], #[case] expected: StoreType) {
        let parsed = CliArgs::try_parse_from(args).unwrap();
        assert_eq!(parsed.store, expected);
    }

    // RunConfig conversion tests
    #[rstest]
    #[case::all_defaults(&["program"], 100, 2048, 1000)]
    #[case::custom_batches(&["program", "--batches", "5"], 5, 2048, 1000)]
    #[case::custom_batch_size(&["program", "--batch-size", "64"], 100, 64, 1000)]
    #[case::zero_batch_size(&["program", "--batch-size", "0"], 100, 2048, 1000)]
    #[case::all_custom(
        &["program", "--batches", "5", "--batch-size", "64", "--amount", "7"],
        5,
        64,
        7
    )]
    fn test_run_config_conversion(
        #[case] args: &[&str],
        #[case] batches: usize,
        #[case] batch_size: usize,
        #[case] amount: u64,
    ) {
        let parsed = CliArgs::try_parse_from(args).unwrap();
        let config = parsed.to_run_config();

        assert_eq!(config.batches, batches);
        assert_eq!(config.batch_size, batch_size);
        assert_eq!(config.amount, amount);
    }

    #[test]
    fn test_existing_accounts_pair() {
        let first = Uuid::from_u128(1);
        let second = Uuid::from_u128(2);
        let parsed = CliArgs::try_parse_from([
            "program".to_string(),
            "--debit-account".to_string(),
            first.to_string(),
            "--credit-account".to_string(),
            second.to_string(),
        ])
        .unwrap();

        assert_eq!(
            parsed.existing_accounts(),
            Some(AccountPair { first, second })
        );
    }

    #[test]
    fn test_timings_path() {
        let parsed = CliArgs::try_parse_from(["program", "--timings", "out.csv"]).unwrap();
        assert_eq!(parsed.timings, Some(PathBuf::from("out.csv")));
    }

    // Error handling tests
    #[rstest]
    #[case::invalid_strategy(&["program", "--strategy", "v4"])]
    #[case::invalid_store(&["program", "--store", "sqlite"])]
    #[case::lone_debit_account(&["program", "--debit-account", "00000000-0000-0000-0000-000000000001"])]
    #[case::malformed_account(&["program", "--debit-account", "nope", "--credit-account", "nope"])]
    #[case::negative_batches(&["program", "--batches", "-1"])]
    fn test_parsing_errors(#[case] args: &[&str]) {
        let result = CliArgs::try_parse_from(args);
        assert!(result.is_err());
    }
}
