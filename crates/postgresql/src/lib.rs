//! PostgreSQL backend for parallel-copy
//!
//! Implements the pipeline's [`BulkSink`](parallel_copy_pipeline::BulkSink)
//! contract on top of tokio-postgres: every worker session is its own
//! connection, and every batch is one `BEGIN; COPY ... FROM STDIN; COMMIT`.

mod connect;
mod error;
mod session;
mod statement;

pub use connect::{build_config, connect, DEFAULT_CONNECTION};
pub use error::PostgresSinkError;
pub use session::{PostgresSession, PostgresSink, FLUSH_THRESHOLD};
pub use statement::{copy_statement, delimiter_literal, quote_identifier, truncate_statement};
