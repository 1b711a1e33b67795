//! Periodic throughput reporting.

use crate::counters::LoadCounters;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// One progress line's worth of figures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSample {
    pub elapsed: Duration,
    pub period_rate: f64,
    pub overall_rate: f64,
    pub total_rows: u64,
}

impl fmt::Display for ProgressSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "at {:?}, row rate {:.6}/sec (period), row rate {:.6}/sec (overall), {} total rows",
            Duration::from_secs(self.elapsed.as_secs()),
            self.period_rate,
            self.overall_rate,
            self.total_rows
        )
    }
}

/// Turns successive row-count readings into interval and overall rates.
#[derive(Debug, Clone)]
pub struct RateSampler {
    start: Instant,
    prev_time: Instant,
    prev_rows: u64,
}

impl RateSampler {
    pub fn new(start: Instant) -> Self {
        Self {
            start,
            prev_time: start,
            prev_rows: 0,
        }
    }

    pub fn sample(&mut self, now: Instant, rows: u64) -> ProgressSample {
        let period = now.saturating_duration_since(self.prev_time);
        let elapsed = now.saturating_duration_since(self.start);

        let sample = ProgressSample {
            elapsed,
            period_rate: rate(rows.saturating_sub(self.prev_rows), period),
            overall_rate: rate(rows, elapsed),
            total_rows: rows,
        };

        self.prev_time = now;
        self.prev_rows = rows;
        sample
    }
}

fn rate(rows: u64, over: Duration) -> f64 {
    if over.as_secs_f64() > 0.0 {
        rows as f64 / over.as_secs_f64()
    } else {
        0.0
    }
}

/// Background task printing a progress line every `period`.
pub struct ProgressReporter {
    counters: Arc<LoadCounters>,
    period: Duration,
}

impl ProgressReporter {
    /// `None` when `period` is zero: reporting is disabled.
    pub fn new(counters: Arc<LoadCounters>, period: Duration) -> Option<Self> {
        if period.is_zero() {
            None
        } else {
            Some(Self { counters, period })
        }
    }

    /// Start the reporter. It runs until the returned handle is aborted.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let start = tokio::time::Instant::now();
            let mut sampler = RateSampler::new(start.into_std());
            let mut ticker = tokio::time::interval_at(start + self.period, self.period);

            loop {
                let now = ticker.tick().await;
                let sample = sampler.sample(now.into_std(), self.counters.rows());
                println!("{sample}");
            }
        })
    }
}
