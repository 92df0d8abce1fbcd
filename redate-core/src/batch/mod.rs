//! Batch runner: applies the transaction coordinator to many files.
//!
//! Files are independent; one failure never aborts the rest, and the
//! report always has one entry per input file in input order, however the
//! work interleaves. Progress is exposed as a finite stream of outcomes
//! in completion order.

pub mod locks;
pub mod report;

pub use report::BatchReport;

use crate::error::RedateError;
use crate::ops::{TransactionOutcome, TxCoordinator};
use crate::pool::SharePool;
use chrono::{DateTime, Utc};
use locks::PathLocks;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub struct BatchRunner {
    pool: Arc<SharePool>,
    coordinator: Arc<TxCoordinator>,
    locks: Arc<PathLocks>,
    max_workers: usize,
    cancel: CancellationToken,
}

impl BatchRunner {
    pub fn new(pool: Arc<SharePool>, coordinator: TxCoordinator, max_workers: usize) -> Self {
        Self {
            pool,
            coordinator: Arc::new(coordinator),
            locks: Arc::new(PathLocks::new()),
            max_workers: max_workers.max(1),
            cancel: CancellationToken::new(),
        }
    }

    /// Token that cancels the batch. Files not yet started record
    /// `Failed(Cancelled)`; a transaction past its write always finishes
    /// its verify/rollback sequence.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run all files and collect the full report
    pub async fn run(&self, files: Vec<PathBuf>, target: DateTime<Utc>) -> BatchReport {
        let (mut progress, handle) = self.run_streaming(files, target);
        while progress.recv().await.is_some() {}

        match handle.await {
            Ok(report) => report,
            Err(err) => {
                // Only reachable if the aggregator itself panicked
                error!("Batch aggregation failed: {}", err);
                BatchReport::from_results(Vec::new(), Duration::ZERO)
            }
        }
    }

    /// Start all files and return a progress receiver (one outcome per
    /// input file, completion order, not restartable) plus a handle
    /// resolving to the input-ordered report.
    pub fn run_streaming(
        &self,
        files: Vec<PathBuf>,
        target: DateTime<Utc>,
    ) -> (
        mpsc::Receiver<TransactionOutcome>,
        JoinHandle<BatchReport>,
    ) {
        let total = files.len();
        let started = Instant::now();
        let capacity = total.max(1);
        let (progress_tx, progress_rx) = mpsc::channel(capacity);
        let (done_tx, mut done_rx) = mpsc::channel::<(usize, TransactionOutcome)>(capacity);
        let workers = Arc::new(Semaphore::new(self.max_workers));

        info!(
            "Starting batch of {} files (workers: {}, pool: {})",
            total,
            self.max_workers,
            self.pool.size()
        );

        for (index, path) in files.iter().cloned().enumerate() {
            let pool = Arc::clone(&self.pool);
            let coordinator = Arc::clone(&self.coordinator);
            let locks = Arc::clone(&self.locks);
            let workers = Arc::clone(&workers);
            let cancel = self.cancel.clone();
            let done = done_tx.clone();

            tokio::spawn(async move {
                let outcome =
                    run_one(pool, coordinator, locks, workers, cancel, path, target).await;
                // The aggregator only goes away if the batch was dropped
                let _ = done.send((index, outcome)).await;
            });
        }
        drop(done_tx);

        let handle = tokio::spawn(async move {
            let mut slots: Vec<Option<TransactionOutcome>> = Vec::with_capacity(total);
            slots.resize_with(total, || None);

            while let Some((index, outcome)) = done_rx.recv().await {
                let _ = progress_tx.send(outcome.clone()).await;
                if index < slots.len() {
                    slots[index] = Some(outcome);
                }
            }

            let results = slots
                .into_iter()
                .zip(files)
                .map(|(slot, path)| {
                    slot.unwrap_or_else(|| {
                        // A worker died without reporting; never silently
                        // drop the file from the report
                        TransactionOutcome::from_failure(
                            path,
                            &RedateError::Connectivity("worker terminated".into()),
                        )
                    })
                })
                .collect();

            let report = BatchReport::from_results(results, started.elapsed());
            info!(
                "Batch finished: {} committed, {} rolled back, {} failed",
                report.committed, report.rolled_back, report.failed
            );
            report
        });

        (progress_rx, handle)
    }
}

async fn run_one(
    pool: Arc<SharePool>,
    coordinator: Arc<TxCoordinator>,
    locks: Arc<PathLocks>,
    workers: Arc<Semaphore>,
    cancel: CancellationToken,
    path: PathBuf,
    target: DateTime<Utc>,
) -> TransactionOutcome {
    if cancel.is_cancelled() {
        return TransactionOutcome::from_failure(path, &RedateError::Cancelled);
    }

    let _worker = tokio::select! {
        permit = Arc::clone(&workers).acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => {
                return TransactionOutcome::from_failure(
                    path,
                    &RedateError::Connectivity("worker pool closed".into()),
                );
            }
        },
        _ = cancel.cancelled() => {
            return TransactionOutcome::from_failure(path, &RedateError::Cancelled);
        }
    };

    // Serialize transactions on the same path; different paths proceed
    // independently
    let gate = locks.lock_for(&path);
    let _gate = tokio::select! {
        guard = gate.lock_owned() => guard,
        _ = cancel.cancelled() => {
            return TransactionOutcome::from_failure(path, &RedateError::Cancelled);
        }
    };

    if cancel.is_cancelled() {
        return TransactionOutcome::from_failure(path, &RedateError::Cancelled);
    }

    // One pooled connection for the whole transaction; the guard returns
    // it on every exit path
    let client = match pool.acquire().await {
        Ok(client) => client,
        Err(err) => return TransactionOutcome::from_failure(path, &err),
    };

    coordinator
        .execute(client.client(), &path, target, &cancel)
        .await
}
