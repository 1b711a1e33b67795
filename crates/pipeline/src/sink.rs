//! Bulk-insert sink abstraction.
//!
//! The pipeline never talks to a database directly. A [`BulkSink`] hands out one
//! [`SinkSession`] per worker, and each session exposes the transactional COPY
//! contract: begin, open a stream, feed rows, close the stream, commit or roll
//! back.
//!
//! # Usage Pattern
//!
//! ```ignore
//! let mut session = sink.open_session().await?;
//! session.begin().await?;
//! session.start_copy(&target).await?;
//! for row in rows {
//!     session.write_row(&row).await?;
//! }
//! session.finish_copy().await?;
//! session.commit().await?;
//! ```

use crate::error::PipelineError;
use crate::record::Delimiter;
use crate::transform::TransformedRow;
use anyhow::Result;

/// Destination table and stream settings for a COPY.
///
/// `columns` and `options` are passed through to the backend verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyTarget {
    pub schema: String,
    pub table: String,
    pub columns: Option<String>,
    pub delimiter: Delimiter,
    pub options: String,
}

impl CopyTarget {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            columns: None,
            delimiter: Delimiter::default(),
            options: String::new(),
        }
    }

    pub fn with_columns(mut self, columns: impl Into<String>) -> Self {
        let columns = columns.into();
        self.columns = if columns.trim().is_empty() {
            None
        } else {
            Some(columns)
        };
        self
    }

    pub fn with_delimiter(mut self, delimiter: Delimiter) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_options(mut self, options: impl Into<String>) -> Self {
        self.options = options.into();
        self
    }

    /// `schema.table`, unquoted. Used for logging and as the in-memory key.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }

    /// Whether the extra options switch COPY to CSV format.
    pub fn is_csv(&self) -> bool {
        self.options
            .split(|c: char| !c.is_ascii_alphanumeric())
            .any(|word| word.eq_ignore_ascii_case("csv"))
    }

    /// Reject a delimiter that text-format COPY cannot use.
    pub fn check_delimiter(&self) -> Result<(), PipelineError> {
        if !self.is_csv() && self.delimiter.is_reserved_in_text_copy() {
            return Err(PipelineError::InvalidConfig(format!(
                "COPY delimiter cannot be {:?} (backslash, dot, lowercase letters and digits are reserved)",
                self.delimiter.as_char()
            )));
        }
        Ok(())
    }
}

/// A storage backend that can accept streamed bulk inserts.
#[async_trait::async_trait]
pub trait BulkSink: Send + Sync {
    type Session: SinkSession + 'static;

    /// Check that `target` is loadable before anything is opened or truncated.
    async fn validate_target(&self, target: &CopyTarget) -> Result<()> {
        target.check_delimiter()?;
        Ok(())
    }

    /// Open a dedicated session. Each worker owns one for its whole lifetime.
    async fn open_session(&self) -> Result<Self::Session>;

    /// Remove every row from the destination table.
    async fn truncate(&self, target: &CopyTarget) -> Result<()>;

    /// Run a block of statements (post-load aggregation and the like).
    async fn execute_script(&self, script: &str) -> Result<()>;
}

/// One connection's worth of transactional COPY operations.
#[async_trait::async_trait]
pub trait SinkSession: Send {
    async fn begin(&mut self) -> Result<()>;

    async fn start_copy(&mut self, target: &CopyTarget) -> Result<()>;

    /// Feed one row to the open COPY stream.
    async fn write_row(&mut self, row: &TransformedRow<'_>) -> Result<()>;

    /// Close the COPY stream, returning the number of rows the backend accepted.
    async fn finish_copy(&mut self) -> Result<u64>;

    async fn commit(&mut self) -> Result<()>;

    /// Abandon the transaction, including any COPY still open.
    async fn rollback(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_target_builder() {
        let target = CopyTarget::new("public", "counter_3g_lastday")
            .with_columns("resulttime,unique_id,rnc")
            .with_delimiter(Delimiter::TAB)
            .with_options("NULL 'NULL'");

        assert_eq!(target.qualified_name(), "public.counter_3g_lastday");
        assert_eq!(target.columns.as_deref(), Some("resulttime,unique_id,rnc"));
        assert!(target.delimiter.is_tab());
        assert_eq!(target.options, "NULL 'NULL'");
    }

    #[test]
    fn test_reserved_delimiter_rejected_in_text_format() {
        for d in [".", "\\", "a", "7"] {
            let target =
                CopyTarget::new("public", "t").with_delimiter(Delimiter::parse(d).unwrap());
            assert!(matches!(
                target.check_delimiter(),
                Err(PipelineError::InvalidConfig(_))
            ));
        }
        assert!(CopyTarget::new("public", "t").check_delimiter().is_ok());
        assert!(CopyTarget::new("public", "t")
            .with_delimiter(Delimiter::TAB)
            .check_delimiter()
            .is_ok());
    }

    #[test]
    fn test_csv_format_allows_any_ascii_delimiter() {
        let target = CopyTarget::new("public", "t")
            .with_delimiter(Delimiter::parse("x").unwrap())
            .with_options("(FORMAT csv, HEADER false)");
        assert!(target.is_csv());
        assert!(target.check_delimiter().is_ok());

        assert!(!CopyTarget::new("public", "t")
            .with_options("NULL 'csvnull'")
            .is_csv());
    }

    #[test]
    fn test_blank_column_list_means_natural_order() {
        let target = CopyTarget::new("public", "t").with_columns("  ");
        assert_eq!(target.columns, None);
    }
}
