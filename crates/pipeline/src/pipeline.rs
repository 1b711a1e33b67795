//! Load orchestration.
//!
//! A run moves through fixed stages and never goes back:
//!
//! 1. INIT: validate settings, open one sink session per worker, optionally
//!    truncate the destination.
//! 2. DISPATCH: start the workers and the reporter, then scan the input on the
//!    calling task.
//! 3. DRAIN: close the queue and wait for every worker.
//! 4. SUMMARIZE: rows, elapsed time and mean rate.
//!
//! Post-load steps are separate ([`Pipeline::post_load`]) so callers can print
//! the load summary first.

use crate::batcher::Batcher;
use crate::counters::LoadCounters;
use crate::error::PipelineError;
use crate::reporter::ProgressReporter;
use crate::sink::{BulkSink, CopyTarget};
use crate::transform::KeyRule;
use crate::worker::{spawn_workers, SharedQueue, WorkerSettings, WorkerStats};
use anyhow::{anyhow, Context, Result};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncBufRead;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default number of rows per COPY transaction.
pub const DEFAULT_BATCH_SIZE: usize = 5000;

/// Settings for one load run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Destination table and COPY settings
    pub target: CopyTarget,

    /// Rows per batch (one transaction each)
    pub batch_size: usize,

    /// Number of parallel workers, each with its own session
    pub workers: usize,

    /// Composite key derivation applied to every record
    pub rule: KeyRule,

    /// Progress line interval; zero disables reporting
    pub reporting_period: Duration,

    /// Print timing for every committed batch
    pub log_batches: bool,

    /// Truncate the destination before loading
    pub truncate: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target: CopyTarget::new("public", "test_table"),
            batch_size: DEFAULT_BATCH_SIZE,
            workers: 1,
            rule: KeyRule::default(),
            reporting_period: Duration::ZERO,
            log_batches: false,
            truncate: false,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.batch_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "batch size must be at least 1".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(PipelineError::InvalidConfig(
                "at least one worker is required".to_string(),
            ));
        }
        if self.target.table.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "destination table name is empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Steps run once the load has finished.
#[derive(Debug, Clone, Default)]
pub struct PostLoad {
    /// Statements to execute (aggregation into long-lived tables, etc.)
    pub script: Option<String>,

    /// Truncate the destination (staging) table afterwards
    pub clear_table: bool,
}

impl PostLoad {
    pub fn is_empty(&self) -> bool {
        self.script.is_none() && !self.clear_table
    }
}

/// Outcome of a completed load.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadSummary {
    /// Lines read by the batcher
    pub rows: u64,
    /// Column values streamed, derived key included
    pub columns: u64,
    /// Batches committed
    pub batches: u64,
    pub elapsed: Duration,
    pub workers: usize,
}

impl LoadSummary {
    /// Mean rate over the whole run, based on lines read.
    pub fn rows_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.rows as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }

    /// The console summary line.
    pub fn render(&self, verbose: bool) -> String {
        if verbose {
            format!("{self:#}")
        } else {
            self.to_string()
        }
    }
}

/// `COPY <rows>`; the alternate form adds timing and mean rate.
impl fmt::Display for LoadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "COPY {}", self.rows)?;
        if f.alternate() {
            write!(
                f,
                ", took {:?} with {} worker(s) (mean rate {:.6}/sec)",
                self.elapsed,
                self.workers,
                self.rows_per_second()
            )?;
        }
        Ok(())
    }
}

/// Parallel COPY loader over a [`BulkSink`].
pub struct Pipeline<S: BulkSink> {
    sink: S,
    config: PipelineConfig,
}

impl<S: BulkSink> Pipeline<S> {
    pub fn new(sink: S, config: PipelineConfig) -> Self {
        Self { sink, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Load every line of `input`.
    ///
    /// Any failure (unreadable input, malformed record, sink error) aborts the
    /// whole run. Batches committed before the failure stay committed.
    pub async fn run<R>(&self, input: R) -> Result<LoadSummary>
    where
        R: AsyncBufRead + Unpin,
    {
        let config = &self.config;
        config.validate()?;
        self.sink
            .validate_target(&config.target)
            .await
            .with_context(|| format!("Cannot load into {}", config.target.qualified_name()))?;

        info!(
            "Loading into {} with {} worker(s), batch size {}",
            config.target.qualified_name(),
            config.workers,
            config.batch_size
        );

        // Every worker connects before any input is read.
        let mut sessions = Vec::with_capacity(config.workers);
        for id in 0..config.workers {
            let session = self
                .sink
                .open_session()
                .await
                .with_context(|| format!("Failed to open sink session for worker {id}"))?;
            sessions.push(session);
        }

        if config.truncate {
            info!("Truncating {}", config.target.qualified_name());
            self.sink
                .truncate(&config.target)
                .await
                .context("Failed to truncate destination table")?;
        }

        let counters = Arc::new(LoadCounters::new());
        let cancel = CancellationToken::new();
        let settings = Arc::new(WorkerSettings {
            target: config.target.clone(),
            rule: config.rule,
            log_batches: config.log_batches,
        });

        // One batch of slack per worker.
        let (tx, rx) = mpsc::channel(config.workers);
        let queue: SharedQueue = Arc::new(Mutex::new(rx));
        let handles = spawn_workers(sessions, queue, &counters, &settings, &cancel);

        let reporter = ProgressReporter::new(Arc::clone(&counters), config.reporting_period)
            .map(ProgressReporter::spawn);

        let start = Instant::now();
        let batcher = Batcher::new(config.batch_size, tx, cancel.clone())?;
        // The batcher owns the only sender; returning from scan closes the queue.
        let scanned = batcher.scan(input).await;
        if scanned.is_err() {
            cancel.cancel();
        }

        let drained = drain(handles, &cancel).await;
        if let Some(reporter) = reporter {
            reporter.abort();
        }

        // A worker's error explains an aborted scan, so it takes precedence.
        let worker_stats = drained?;
        let lines = scanned?;
        let elapsed = start.elapsed();

        let snapshot = counters.snapshot();
        if snapshot.rows != lines {
            warn!(
                "Counted {} committed rows but read {lines} lines",
                snapshot.rows
            );
        }
        debug!("Per-worker stats: {worker_stats:?}");

        let summary = LoadSummary {
            rows: lines,
            columns: snapshot.columns,
            batches: snapshot.batches,
            elapsed,
            workers: config.workers,
        };
        info!(
            "Loaded {} rows in {:?} ({:.2} rows/sec)",
            summary.rows,
            summary.elapsed,
            summary.rows_per_second()
        );
        Ok(summary)
    }

    /// Run the post-load script, then clear the staging table if asked.
    /// Returns how long the steps took.
    pub async fn post_load(&self, steps: &PostLoad) -> Result<Duration> {
        let start = Instant::now();

        if let Some(script) = &steps.script {
            info!("Running post-load script");
            self.sink
                .execute_script(script)
                .await
                .context("Post-load script failed")?;
        }

        if steps.clear_table {
            info!("Clearing {}", self.config.target.qualified_name());
            self.sink
                .truncate(&self.config.target)
                .await
                .context("Failed to clear destination table after post-load")?;
        }

        Ok(start.elapsed())
    }
}

/// Wait for every worker and return the first failure, if any.
async fn drain(
    handles: Vec<JoinHandle<Result<WorkerStats>>>,
    cancel: &CancellationToken,
) -> Result<Vec<WorkerStats>> {
    let mut stats = Vec::with_capacity(handles.len());
    let mut first_error: Option<anyhow::Error> = None;

    for handle in handles {
        match handle.await {
            Ok(Ok(worker)) => stats.push(worker),
            Ok(Err(e)) => {
                first_error.get_or_insert(e);
            }
            Err(join_error) => {
                cancel.cancel();
                first_error.get_or_insert(anyhow!("Worker task failed: {join_error}"));
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(stats),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = PipelineConfig::default();
        assert_eq!(config.batch_size, 5000);
        assert_eq!(config.workers, 1);
        assert_eq!(config.target.qualified_name(), "public.test_table");
        assert!(config.reporting_period.is_zero());
        assert!(!config.truncate);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let zero_workers = PipelineConfig {
            workers: 0,
            ..Default::default()
        };
        assert!(matches!(
            zero_workers.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));

        let zero_batch = PipelineConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(zero_batch.validate().is_err());
    }

    #[test]
    fn test_summary_render() {
        let summary = LoadSummary {
            rows: 1000,
            columns: 4000,
            batches: 2,
            elapsed: Duration::from_secs(2),
            workers: 4,
        };
        assert_eq!(summary.rows_per_second(), 500.0);
        assert_eq!(summary.render(false), "COPY 1000");
        assert_eq!(summary.to_string(), "COPY 1000");
        assert_eq!(
            summary.render(true),
            "COPY 1000, took 2s with 4 worker(s) (mean rate 500.000000/sec)"
        );
    }

    #[test]
    fn test_summary_zero_elapsed() {
        let summary = LoadSummary {
            rows: 0,
            columns: 0,
            batches: 0,
            elapsed: Duration::ZERO,
            workers: 1,
        };
        assert_eq!(summary.rows_per_second(), 0.0);
    }

    #[test]
    fn test_post_load_is_empty() {
        assert!(PostLoad::default().is_empty());
        assert!(!PostLoad {
            script: None,
            clear_table: true
        }
        .is_empty());
    }
}
