// CLI module
// Command-line interface and argument parsing

mod args;

pub use args::{CliArgs, StoreType, StrategyType, DEFAULT_DATABASE_URL};

use clap::Parser;

/// Parse command-line arguments using clap
///
/// If parsing fails (invalid strategy, malformed account id, a lone
/// `--debit-account`, or `--help`), clap prints the error or help text and
/// exits the process.
pub fn parse_args() -> CliArgs {
    CliArgs::parse()
}
