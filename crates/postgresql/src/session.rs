//! COPY sessions over tokio-postgres.

use crate::connect::connect;
use crate::error::PostgresSinkError;
use crate::statement::{copy_statement, truncate_statement};
use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use futures::SinkExt;
use parallel_copy_pipeline::{BulkSink, CopyTarget, Delimiter, SinkSession, TransformedRow};
use std::pin::Pin;
use tokio_postgres::{Client, Config, CopyInSink};
use tracing::debug;

/// Buffered COPY data is flushed to the server once it reaches this size.
pub const FLUSH_THRESHOLD: usize = 64 * 1024;

/// Sink writing into a PostgreSQL database.
#[derive(Debug, Clone)]
pub struct PostgresSink {
    config: Config,
}

impl PostgresSink {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[async_trait]
impl BulkSink for PostgresSink {
    type Session = PostgresSession;

    async fn open_session(&self) -> Result<PostgresSession> {
        let client = connect(&self.config)
            .await
            .context("Failed to connect to PostgreSQL")?;
        Ok(PostgresSession::new(client))
    }

    async fn truncate(&self, target: &CopyTarget) -> Result<()> {
        let client = connect(&self.config).await?;
        let sql = truncate_statement(target);
        debug!("{sql}");
        client
            .batch_execute(&sql)
            .await
            .map_err(PostgresSinkError::from)?;
        Ok(())
    }

    async fn execute_script(&self, script: &str) -> Result<()> {
        let client = connect(&self.config).await?;
        client
            .batch_execute(script)
            .await
            .map_err(PostgresSinkError::from)?;
        Ok(())
    }
}

/// One connection, at most one open transaction and one open COPY.
pub struct PostgresSession {
    client: Client,
    copy: Option<Pin<Box<CopyInSink<bytes::Bytes>>>>,
    buffer: BytesMut,
    delimiter: Delimiter,
}

impl PostgresSession {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            copy: None,
            buffer: BytesMut::with_capacity(FLUSH_THRESHOLD),
            delimiter: Delimiter::default(),
        }
    }

    async fn flush(&mut self) -> Result<(), PostgresSinkError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let copy = self
            .copy
            .as_mut()
            .ok_or(PostgresSinkError::NoCopyInProgress)?;
        copy.send(self.buffer.split().freeze()).await?;
        Ok(())
    }
}

/// Append `row` to `buffer` as one line of COPY text.
fn encode_row(buffer: &mut BytesMut, row: &TransformedRow<'_>, delimiter: Delimiter) {
    let mut utf8 = [0u8; 4];
    let sep = delimiter.as_char().encode_utf8(&mut utf8).as_bytes();

    for (i, field) in row.fields().iter().enumerate() {
        if i > 0 {
            buffer.put_slice(sep);
        }
        buffer.put_slice(field.as_bytes());
    }
    buffer.put_u8(b'\n');
}

#[async_trait]
impl SinkSession for PostgresSession {
    async fn begin(&mut self) -> Result<()> {
        self.client
            .batch_execute("BEGIN")
            .await
            .map_err(PostgresSinkError::from)?;
        Ok(())
    }

    async fn start_copy(&mut self, target: &CopyTarget) -> Result<()> {
        if self.copy.is_some() {
            return Err(PostgresSinkError::CopyInProgress.into());
        }
        let sql = copy_statement(target);
        debug!("{sql}");

        let sink = self
            .client
            .copy_in::<_, bytes::Bytes>(sql.as_str())
            .await
            .map_err(PostgresSinkError::from)?;
        self.copy = Some(Box::pin(sink));
        self.delimiter = target.delimiter;
        self.buffer.clear();
        Ok(())
    }

    async fn write_row(&mut self, row: &TransformedRow<'_>) -> Result<()> {
        if self.copy.is_none() {
            return Err(PostgresSinkError::NoCopyInProgress.into());
        }
        encode_row(&mut self.buffer, row, self.delimiter);
        if self.buffer.len() >= FLUSH_THRESHOLD {
            self.flush().await?;
        }
        Ok(())
    }

    async fn finish_copy(&mut self) -> Result<u64> {
        self.flush().await?;
        let mut copy = self.copy.take().ok_or(PostgresSinkError::NoCopyInProgress)?;
        let rows = copy
            .as_mut()
            .finish()
            .await
            .map_err(PostgresSinkError::from)?;
        Ok(rows)
    }

    async fn commit(&mut self) -> Result<()> {
        if self.copy.is_some() {
            return Err(PostgresSinkError::CopyInProgress.into());
        }
        self.client
            .batch_execute("COMMIT")
            .await
            .map_err(PostgresSinkError::from)?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        // Dropping an unfinished COPY aborts it on the server.
        self.copy = None;
        self.buffer.clear();
        self.client
            .batch_execute("ROLLBACK")
            .await
            .map_err(PostgresSinkError::from)?;
        Ok(())
    }
}
