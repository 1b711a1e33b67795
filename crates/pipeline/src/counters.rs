//! Shared load counters.
//!
//! Workers add to these after each committed batch; the progress reporter and
//! the final summary read them. Every update is a monotonic atomic add, so a
//! reader may observe a value between two workers' updates but never a torn
//! one.

use std::sync::atomic::{AtomicU64, Ordering};

/// Rows, column values and batches committed so far.
#[derive(Debug, Default)]
pub struct LoadCounters {
    rows: AtomicU64,
    columns: AtomicU64,
    batches: AtomicU64,
}

/// Point-in-time copy of [`LoadCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub rows: u64,
    pub columns: u64,
    pub batches: u64,
}

impl LoadCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_rows(&self, count: u64) {
        self.rows.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_columns(&self, count: u64) {
        self.columns.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_batch(&self) {
        self.batches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rows(&self) -> u64 {
        self.rows.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            rows: self.rows.load(Ordering::Relaxed),
            columns: self.columns.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
        }
    }
}
