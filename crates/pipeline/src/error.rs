//! Error types for the copy pipeline.

use thiserror::Error;

/// Errors raised by the pipeline stages themselves.
///
/// Failures reported by a sink travel as `anyhow::Error` with context attached;
/// these variants cover everything the pipeline detects on its own.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Configuration rejected before any input is read.
    #[error("Configuration error: {0}")]
    InvalidConfig(String),

    /// A record has fewer fields than the key rule needs.
    #[error(
        "Malformed record on line {line}: expected at least {required} fields, found {found}: {record:?}"
    )]
    MalformedRecord {
        line: u64,
        required: usize,
        found: usize,
        record: String,
    },

    /// Reading the input stream failed.
    #[error("Error reading input after line {line}")]
    Input {
        line: u64,
        #[source]
        source: std::io::Error,
    },

    /// Every worker went away while the batcher still had batches to publish.
    #[error("Batch queue closed before input was exhausted")]
    QueueClosed,

    /// The run was cancelled because another stage failed.
    #[error("Run aborted")]
    Aborted,
}
