//! parallel-copy Library
//!
//! Bulk-loads newline-delimited text into a PostgreSQL table by streaming
//! fixed-size batches through `COPY ... FROM STDIN` on several connections at
//! once.
//!
//! # Features
//!
//! - Parallel workers, one connection and one transaction per batch
//! - Bounded queue between reader and workers (backpressure, flat memory)
//! - Derived composite key column spliced into every row
//! - Periodic throughput reporting
//! - Post-load SQL script and staging-table cleanup
//!
//! # Crates
//!
//! - `parallel_copy_pipeline` - batching, worker pool, sink traits, in-memory sink
//! - `parallel_copy_postgresql` - the PostgreSQL COPY sink
//!
//! # CLI Usage
//!
//! ```bash
//! # Load a CSV file with 8 workers, reporting every 10 seconds
//! parallel-copy --file metrics.csv --workers 8 --reporting-period 10s --verbose
//!
//! # Tab-separated input from stdin into a specific table
//! zcat dump.tsv.gz | parallel-copy --split '\t' --schema staging --table counters
//! ```

pub mod config;

pub use config::{parse_duration, LoadArgs, PostgresOpts};

// Re-export the member crates for convenience
pub use parallel_copy_pipeline as pipeline;
pub use parallel_copy_postgresql as postgresql;
