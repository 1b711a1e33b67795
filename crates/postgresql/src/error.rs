//! Error types for the PostgreSQL sink.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PostgresSinkError {
    /// PostgreSQL connection or query error.
    #[error("PostgreSQL error: {0}")]
    PostgreSQL(#[from] tokio_postgres::Error),

    /// Unparseable connection string.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Row written or COPY finished with no COPY open.
    #[error("No COPY in progress on this session")]
    NoCopyInProgress,

    /// COPY started twice, or commit attempted mid-COPY.
    #[error("A COPY is already in progress on this session")]
    CopyInProgress,
}
