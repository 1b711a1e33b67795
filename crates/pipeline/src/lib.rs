//! Parallel bulk-load pipeline
//!
//! Reads delimited text records from a stream, groups them into fixed-size
//! batches and drives a fixed pool of workers that COPY each batch into a sink
//! inside its own transaction.
//!
//! ```text
//! input ─▶ Batcher ─▶ bounded queue ─▶ LoadWorker × N ─▶ BulkSink
//!                                          │
//!                                  LoadCounters ─▶ ProgressReporter
//! ```
//!
//! The queue holds one batch per worker, so a slow sink holds the reader back
//! instead of letting batches pile up in memory. Batches complete in no
//! particular order.

mod batcher;
mod counters;
mod error;
mod input;
mod memory;
mod pipeline;
mod record;
mod reporter;
mod sink;
mod transform;
mod worker;

pub use batcher::Batcher;
pub use counters::{CounterSnapshot, LoadCounters};
pub use error::PipelineError;
pub use input::{InputSource, DEFAULT_BUFFER_SIZE};
pub use memory::{MemorySession, MemorySink};
pub use pipeline::{LoadSummary, Pipeline, PipelineConfig, PostLoad, DEFAULT_BATCH_SIZE};
pub use record::{Batch, Delimiter, Record};
pub use reporter::{ProgressReporter, ProgressSample, RateSampler};
pub use sink::{BulkSink, CopyTarget, SinkSession};
pub use transform::{KeyRule, TransformedRow};
pub use worker::{spawn_workers, LoadWorker, SharedQueue, WorkerSettings, WorkerStats};
