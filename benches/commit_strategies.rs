//! Benchmark suite for comparing commit strategies
//!
//! This benchmark compares the in-process cost of the three committers using
//! the divan benchmarking framework. It runs against the in-memory store, so
//! it measures strategy overhead (aggregation, staging, store calls) rather
//! than database round-trip latency; use the binary against PostgreSQL for
//! the latter.
//!
//! # Running Benchmarks
//!
//! ```bash
//! # Run all benchmarks
//! cargo bench
//! ```
//!
//! Every benchmark commits one batch of alternating transfers between two
//! accounts, at three batch sizes.

use divan::Bencher;
use tokio::runtime::Runtime;
use transfer_batch_engine::cli::StrategyType;
use transfer_batch_engine::core::driver::generate_batch;
use transfer_batch_engine::core::{aggregate, prepare_accounts, NoProgress};
use transfer_batch_engine::store::MemoryStore;
use transfer_batch_engine::strategy::{create_committer, BatchCommitter};

const BATCH_SIZES: [usize; 3] = [128, 2048, 8192];

fn main() {
    divan::main();
}

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("Failed to build runtime")
}

fn bench_strategy(bencher: Bencher, strategy: StrategyType, batch_size: usize) {
    let rt = runtime();
    let mut store = MemoryStore::new();
    let pair = rt
        .block_on(prepare_accounts(&mut store, None))
        .expect("Failed to create accounts");
    let committer = create_committer(strategy);

    bencher
        .with_inputs(|| generate_batch(&pair, batch_size, 1000))
        .bench_local_values(|batch| {
            rt.block_on(committer.commit(&mut store, &batch, &mut NoProgress))
                .expect("Commit failed")
        });
}

/// Benchmark the per-transfer strategy
#[divan::bench(args = BATCH_SIZES)]
fn v1_per_transfer(bencher: Bencher, batch_size: usize) {
    bench_strategy(bencher, StrategyType::V1, batch_size);
}

/// Benchmark the statement-batched strategy
#[divan::bench(args = BATCH_SIZES)]
fn v2_statement_batched(bencher: Bencher, batch_size: usize) {
    bench_strategy(bencher, StrategyType::V2, batch_size);
}

/// Benchmark the aggregated strategy
#[divan::bench(args = BATCH_SIZES)]
fn v3_aggregated(bencher: Bencher, batch_size: usize) {
    bench_strategy(bencher, StrategyType::V3, batch_size);
}

/// Benchmark the balance aggregation step alone
#[divan::bench(args = BATCH_SIZES)]
fn aggregate_batch(bencher: Bencher, batch_size: usize) {
    let rt = runtime();
    let mut store = MemoryStore::new();
    let pair = rt
        .block_on(prepare_accounts(&mut store, None))
        .expect("Failed to create accounts");
    let batch = generate_batch(&pair, batch_size, 1000);

    bencher.bench_local(|| aggregate(divan::black_box(&batch)));
}
