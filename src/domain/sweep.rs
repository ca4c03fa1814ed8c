//! Independent backtests run side by side.
//!
//! Each job owns its configuration and shares read-only candles. Workers pull
//! job indices from a queue, so results can finish in any order; they are
//! returned in job order.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::{debug, info};

use crate::domain::backtest::{BacktestResult, Runner};
use crate::domain::candle::Candle;
use crate::domain::engine_config::EngineConfig;
use crate::domain::metrics::Summary;

#[derive(Debug, Clone)]
pub struct SweepJob {
    pub label: String,
    pub candles: Arc<[Candle]>,
    pub config: EngineConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepOutcome {
    pub label: String,
    pub result: BacktestResult,
    pub summary: Summary,
}

/// Execution order for `len` jobs, permuted by a seeded generator.
pub fn shuffled_order(len: usize, seed: u64) -> Vec<usize> {
    let mut order: Vec<usize> = (0..len).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    order.shuffle(&mut rng);
    order
}

fn default_workers() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Runs every job using up to one worker per available core.
pub fn run_parallel(jobs: Vec<SweepJob>) -> Vec<SweepOutcome> {
    let order: Vec<usize> = (0..jobs.len()).collect();
    run_in_order(jobs, &order, default_workers())
}

/// Like [`run_parallel`], but workers pick jobs up in a seeded random order.
pub fn run_parallel_shuffled(jobs: Vec<SweepJob>, seed: u64) -> Vec<SweepOutcome> {
    let order = shuffled_order(jobs.len(), seed);
    run_in_order(jobs, &order, default_workers())
}

/// Runs `jobs`, dispatching them in `order` across `workers` threads.
/// Indices in `order` that are out of range are ignored.
pub fn run_in_order(jobs: Vec<SweepJob>, order: &[usize], workers: usize) -> Vec<SweepOutcome> {
    if jobs.is_empty() {
        return Vec::new();
    }
    let workers = workers.clamp(1, jobs.len());
    info!(jobs = jobs.len(), workers, "sweep started");

    let next = AtomicUsize::new(0);
    let (tx, rx) = mpsc::channel::<(usize, SweepOutcome)>();

    thread::scope(|scope| {
        for worker in 0..workers {
            let tx = tx.clone();
            let jobs = &jobs;
            let next = &next;
            scope.spawn(move || {
                loop {
                    let slot = next.fetch_add(1, Ordering::Relaxed);
                    let Some(&index) = order.get(slot) else {
                        break;
                    };
                    let Some(job) = jobs.get(index) else {
                        continue;
                    };
                    debug!(worker, label = %job.label, "sweep job started");
                    let result = Runner::new(job.config.clone()).run(&job.candles);
                    let summary = result.summary();
                    let outcome = SweepOutcome {
                        label: job.label.clone(),
                        result,
                        summary,
                    };
                    if tx.send((index, outcome)).is_err() {
                        break;
                    }
                }
            });
        }
    });
    drop(tx);

    let mut finished: Vec<(usize, SweepOutcome)> = rx.into_iter().collect();
    finished.sort_by_key(|(index, _)| *index);
    finished.dedup_by_key(|(index, _)| *index);
    info!(completed = finished.len(), "sweep finished");
    finished.into_iter().map(|(_, outcome)| outcome).collect()
}
