//! Transfer Batch Engine CLI
//!
//! Command-line benchmark committing synthetic transfer batches to a ledger.
//!
//! # Usage
//!
//! ```bash
//! cargo run --release
//! cargo run --release -- --strategy v1 --batches 10
//! cargo run --release -- --store memory --batch-size 8192 --timings timings.csv
//! DATABASE_URL=postgresql://postgres@localhost/ledger cargo run --release -- --strategy v2
//! ```
//!
//! Progress is rendered on stderr as a single overwritten line. Logs also go
//! to stderr, filtered by `RUST_LOG` (default `info`).
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (connection failure, failed batch, unwritable timing log, etc.)

use std::io;
use std::process;
use tracing::{error, info};
use transfer_batch_engine::cli::{self, CliArgs, StoreType};
use transfer_batch_engine::core::{prepare_accounts, Driver, LedgerStore, ProgressReporter};
use transfer_batch_engine::io::BatchLog;
use transfer_batch_engine::store::{MemoryStore, PgStore};
use transfer_batch_engine::strategy::create_committer;
use transfer_batch_engine::LedgerError;

fn main() {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = cli::parse_args();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start runtime: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(&args)) {
        if e.is_fatal() {
            error!("Store session lost: {}", e);
        } else {
            error!("Run failed: {}", e);
        }
        process::exit(1);
    }
}

async fn run(args: &CliArgs) -> Result<(), LedgerError> {
    match args.store {
        StoreType::Memory => {
            let mut store = MemoryStore::new();
            bench(&mut store, args).await
        }
        StoreType::Postgres => {
            let mut store = PgStore::connect(&args.database_url).await?;
            let result = bench(&mut store, args).await;
            store.close().await;
            result
        }
    }
}

async fn bench<S: LedgerStore>(store: &mut S, args: &CliArgs) -> Result<(), LedgerError> {
    let config = args.to_run_config();
    let committer = create_committer(args.strategy);
    let mut timings = args.timings.as_deref().map(BatchLog::create).transpose()?;

    let accounts = prepare_accounts(store, args.existing_accounts()).await?;

    info!(
        strategy = committer.name(),
        batches = config.batches,
        batch_size = config.batch_size,
        "Starting run"
    );

    let mut progress = ProgressReporter::new(io::stderr(), config.target_total());
    let driver = Driver::new(committer, config);
    let result = driver
        .run(store, &accounts, &mut progress, timings.as_mut())
        .await;
    progress.finish();

    let summary = result?;
    info!(
        batches = summary.batches,
        transfers = summary.transfers,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "Run complete: {:.0} transfers/s",
        summary.transfers_per_second()
    );
    Ok(())
}
