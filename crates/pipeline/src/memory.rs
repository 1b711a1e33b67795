//! In-memory sink.
//!
//! Mirrors the transactional contract of a real backend: rows written inside a
//! transaction only become visible on commit, and a rollback discards them.
//! Backs `--dry-run` (with row retention off) and the pipeline tests.

use crate::sink::{BulkSink, CopyTarget, SinkSession};
use crate::transform::TransformedRow;
use anyhow::{anyhow, bail, Context, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct MemoryState {
    retain_rows: bool,
    fail_on: Option<String>,
    tables: Mutex<HashMap<String, Vec<String>>>,
    committed_rows: AtomicU64,
    sessions: AtomicU64,
    commits: AtomicU64,
    rollbacks: AtomicU64,
    truncates: AtomicU64,
    scripts: Mutex<Vec<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Sink that keeps committed rows in a map keyed by `schema.table`.
#[derive(Debug, Clone)]
pub struct MemorySink {
    state: Arc<MemoryState>,
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySink {
    /// A sink that keeps every committed row.
    pub fn new() -> Self {
        Self {
            state: Arc::new(MemoryState {
                retain_rows: true,
                ..Default::default()
            }),
        }
    }

    /// A sink that only counts committed rows.
    pub fn discarding() -> Self {
        Self {
            state: Arc::new(MemoryState::default()),
        }
    }

    /// A sink whose sessions reject any row containing `needle`.
    pub fn failing_on(needle: impl Into<String>) -> Self {
        Self {
            state: Arc::new(MemoryState {
                retain_rows: true,
                fail_on: Some(needle.into()),
                ..Default::default()
            }),
        }
    }

    /// Committed rows of `target`, as the delimited lines the COPY stream saw.
    pub fn rows(&self, target: &CopyTarget) -> Vec<String> {
        lock(&self.state.tables)
            .get(&target.qualified_name())
            .cloned()
            .unwrap_or_default()
    }

    pub fn committed_rows(&self) -> u64 {
        self.state.committed_rows.load(Ordering::Relaxed)
    }

    pub fn sessions_opened(&self) -> u64 {
        self.state.sessions.load(Ordering::Relaxed)
    }

    pub fn commits(&self) -> u64 {
        self.state.commits.load(Ordering::Relaxed)
    }

    pub fn rollbacks(&self) -> u64 {
        self.state.rollbacks.load(Ordering::Relaxed)
    }

    pub fn truncates(&self) -> u64 {
        self.state.truncates.load(Ordering::Relaxed)
    }

    pub fn scripts(&self) -> Vec<String> {
        lock(&self.state.scripts).clone()
    }
}

#[async_trait::async_trait]
impl BulkSink for MemorySink {
    type Session = MemorySession;

    async fn open_session(&self) -> Result<MemorySession> {
        self.state.sessions.fetch_add(1, Ordering::Relaxed);
        Ok(MemorySession {
            state: Arc::clone(&self.state),
            in_transaction: false,
            copy: None,
            pending: Vec::new(),
            pending_count: 0,
        })
    }

    async fn truncate(&self, target: &CopyTarget) -> Result<()> {
        self.state.truncates.fetch_add(1, Ordering::Relaxed);
        lock(&self.state.tables).remove(&target.qualified_name());
        Ok(())
    }

    async fn execute_script(&self, script: &str) -> Result<()> {
        lock(&self.state.scripts).push(script.to_string());
        Ok(())
    }
}

struct OpenCopy {
    target: CopyTarget,
    rows: u64,
}

/// Session handed out by [`MemorySink`].
pub struct MemorySession {
    state: Arc<MemoryState>,
    in_transaction: bool,
    copy: Option<OpenCopy>,
    pending: Vec<(String, String)>,
    pending_count: u64,
}

#[async_trait::async_trait]
impl SinkSession for MemorySession {
    async fn begin(&mut self) -> Result<()> {
        if self.in_transaction {
            bail!("Transaction already open");
        }
        self.in_transaction = true;
        Ok(())
    }

    async fn start_copy(&mut self, target: &CopyTarget) -> Result<()> {
        if self.copy.is_some() {
            bail!("COPY already in progress");
        }
        self.copy = Some(OpenCopy {
            target: target.clone(),
            rows: 0,
        });
        Ok(())
    }

    async fn write_row(&mut self, row: &TransformedRow<'_>) -> Result<()> {
        let copy = self
            .copy
            .as_mut()
            .context("write_row called without an open COPY")?;
        let line = row.join(copy.target.delimiter);

        if let Some(needle) = &self.state.fail_on {
            if line.contains(needle.as_str()) {
                return Err(anyhow!("rejected row {line:?}"));
            }
        }

        copy.rows += 1;
        self.pending_count += 1;
        if self.state.retain_rows {
            self.pending.push((copy.target.qualified_name(), line));
        }
        Ok(())
    }

    async fn finish_copy(&mut self) -> Result<u64> {
        let copy = self
            .copy
            .take()
            .context("finish_copy called without an open COPY")?;
        Ok(copy.rows)
    }

    async fn commit(&mut self) -> Result<()> {
        if !self.in_transaction {
            bail!("No transaction to commit");
        }
        if self.copy.is_some() {
            bail!("Cannot commit while COPY is in progress");
        }

        let mut tables = lock(&self.state.tables);
        for (table, line) in self.pending.drain(..) {
            tables.entry(table).or_default().push(line);
        }
        drop(tables);

        self.state
            .committed_rows
            .fetch_add(self.pending_count, Ordering::Relaxed);
        self.state.commits.fetch_add(1, Ordering::Relaxed);
        self.pending_count = 0;
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.copy = None;
        self.pending.clear();
        self.pending_count = 0;
        self.in_transaction = false;
        self.state.rollbacks.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
