//! Load workers: pull batches off the shared queue and COPY each one inside its
//! own transaction.

use crate::counters::LoadCounters;
use crate::record::Batch;
use crate::sink::{CopyTarget, SinkSession};
use crate::transform::KeyRule;
use anyhow::{Context, Result};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Receiving end of the batch queue, shared by every worker.
///
/// The lock is held only while waiting for the next batch, so at most one idle
/// worker sits in `recv` at a time and each batch goes to exactly one worker.
pub type SharedQueue = Arc<Mutex<mpsc::Receiver<Batch>>>;

/// Per-run settings every worker reads.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub target: CopyTarget,
    pub rule: KeyRule,
    pub log_batches: bool,
}

/// What a worker did before its queue ran dry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub batches: u64,
    pub rows: u64,
    pub columns: u64,
}

/// Result of loading one batch.
#[derive(Debug, Clone, Copy)]
struct BatchOutcome {
    rows: u64,
    columns: u64,
    took: Duration,
}

impl BatchOutcome {
    fn rows_per_second(&self) -> f64 {
        if self.took.as_secs_f64() > 0.0 {
            self.rows as f64 / self.took.as_secs_f64()
        } else {
            0.0
        }
    }
}

/// The `--log-batches` line.
impl fmt::Display for BatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[BATCH] took {:?}, batch size {}, row rate {:.6}/sec",
            self.took,
            self.rows,
            self.rows_per_second()
        )
    }
}

/// One member of the load worker pool. Owns its sink session exclusively.
pub struct LoadWorker<S: SinkSession> {
    id: usize,
    session: S,
    queue: SharedQueue,
    counters: Arc<LoadCounters>,
    settings: Arc<WorkerSettings>,
    cancel: CancellationToken,
}

impl<S: SinkSession + 'static> LoadWorker<S> {
    pub fn new(
        id: usize,
        session: S,
        queue: SharedQueue,
        counters: Arc<LoadCounters>,
        settings: Arc<WorkerSettings>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            session,
            queue,
            counters,
            settings,
            cancel,
        }
    }

    /// Process batches until the queue is closed and empty, or the run is
    /// cancelled. A failed batch cancels the run and ends this worker.
    pub async fn run(mut self) -> Result<WorkerStats> {
        let mut stats = WorkerStats::default();
        let queue = Arc::clone(&self.queue);
        let cancel = self.cancel.clone();

        while let Some(batch) = next_batch(&queue, &cancel).await {
            match self.load_batch(&batch).await {
                Ok(outcome) => {
                    self.counters.add_rows(outcome.rows);
                    self.counters.add_columns(outcome.columns);
                    self.counters.add_batch();

                    stats.batches += 1;
                    stats.rows += outcome.rows;
                    stats.columns += outcome.columns;

                    if self.settings.log_batches {
                        println!("{outcome}");
                    }
                }
                Err(e) => {
                    self.cancel.cancel();
                    return Err(e.context(format!(
                        "Worker {} failed to load batch {}",
                        self.id,
                        batch.sequence()
                    )));
                }
            }
        }

        debug!(
            "Worker {} finished: {} batches, {} rows",
            self.id, stats.batches, stats.rows
        );
        Ok(stats)
    }

    /// Begin, stream, commit. Anything short of a successful commit is rolled back.
    async fn load_batch(&mut self, batch: &Batch) -> Result<BatchOutcome> {
        let start = Instant::now();

        self.session
            .begin()
            .await
            .context("Failed to begin transaction")?;

        let columns = match self.copy_batch(batch).await {
            Ok(columns) => columns,
            Err(e) => {
                if let Err(rollback_err) = self.session.rollback().await {
                    warn!(
                        "Worker {} could not roll back batch {}: {rollback_err:#}",
                        self.id,
                        batch.sequence()
                    );
                }
                return Err(e);
            }
        };

        self.session
            .commit()
            .await
            .context("Failed to commit batch")?;

        Ok(BatchOutcome {
            rows: batch.len() as u64,
            columns,
            took: start.elapsed(),
        })
    }

    /// Stream every record of `batch` and return the number of column values sent.
    async fn copy_batch(&mut self, batch: &Batch) -> Result<u64> {
        let settings = Arc::clone(&self.settings);
        let delimiter = settings.target.delimiter;

        self.session
            .start_copy(&settings.target)
            .await
            .with_context(|| {
                format!(
                    "Failed to start COPY into {}",
                    settings.target.qualified_name()
                )
            })?;

        let mut columns: u64 = 0;
        for record in batch.records() {
            let row = settings.rule.apply(record, delimiter)?;
            trace!(line = record.line(), "{}", row.join(delimiter));

            columns += row.len() as u64;
            self.session
                .write_row(&row)
                .await
                .with_context(|| format!("Failed to write line {}", record.line()))?;
        }

        let copied = self
            .session
            .finish_copy()
            .await
            .context("Failed to finish COPY")?;
        trace!(
            "Worker {} copied {copied} rows for batch {}",
            self.id,
            batch.sequence()
        );

        Ok(columns)
    }
}

/// Wait for the next batch. `None` once the queue is closed and drained, or
/// the run has been cancelled.
async fn next_batch(queue: &SharedQueue, cancel: &CancellationToken) -> Option<Batch> {
    if cancel.is_cancelled() {
        return None;
    }
    let mut queue = queue.lock().await;
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        batch = queue.recv() => batch,
    }
}

/// Spawn one task per session, all draining the same queue.
pub fn spawn_workers<S>(
    sessions: Vec<S>,
    queue: SharedQueue,
    counters: &Arc<LoadCounters>,
    settings: &Arc<WorkerSettings>,
    cancel: &CancellationToken,
) -> Vec<JoinHandle<Result<WorkerStats>>>
where
    S: SinkSession + 'static,
{
    sessions
        .into_iter()
        .enumerate()
        .map(|(id, session)| {
            let worker = LoadWorker::new(
                id,
                session,
                Arc::clone(&queue),
                Arc::clone(counters),
                Arc::clone(settings),
                cancel.clone(),
            );
            tokio::spawn(worker.run())
        })
        .collect()
}
