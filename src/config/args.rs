//! CLI argument definitions for a load run.

use super::duration::parse_duration;
use anyhow::{bail, Context};
use clap::Args;
use parallel_copy_pipeline::{
    CopyTarget, Delimiter, KeyRule, PipelineConfig, PostLoad, DEFAULT_BATCH_SIZE,
};
use parallel_copy_postgresql::DEFAULT_CONNECTION;
use std::path::PathBuf;

/// PostgreSQL connection options
#[derive(Args, Clone, Debug)]
pub struct PostgresOpts {
    /// PostgreSQL connection string (key/value or URL form)
    #[arg(long, env = "PGCOPY_CONNECTION", default_value = DEFAULT_CONNECTION)]
    pub connection: String,

    /// Database to load into (overrides any dbname in the connection string)
    #[arg(long, default_value = "test")]
    pub db_name: String,
}

/// Everything that shapes one load.
#[derive(Args, Clone, Debug)]
pub struct LoadArgs {
    #[command(flatten)]
    pub postgres: PostgresOpts,

    /// Destination schema
    #[arg(long, default_value = "public")]
    pub schema: String,

    /// Destination table
    #[arg(long, default_value = "test_table")]
    pub table: String,

    /// Truncate the destination table before loading
    #[arg(long)]
    pub truncate: bool,

    /// Additional options to pass to COPY (ex. NULL 'NULL')
    #[arg(long, default_value = "")]
    pub copy_options: String,

    /// Field delimiter: a single character, or \t for tab
    #[arg(long, default_value = ",")]
    pub split: String,

    /// Input file (reads standard input when omitted)
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Comma-separated destination column list, passed to COPY verbatim
    #[arg(long, default_value = "")]
    pub columns: String,

    /// Rows per COPY transaction
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Number of parallel COPY workers (one connection each)
    #[arg(long, default_value_t = 1)]
    pub workers: usize,

    /// Print timing for every committed batch
    #[arg(long)]
    pub log_batches: bool,

    /// Progress line interval (e.g. 500ms, 10s, 5m); 0s disables it
    #[arg(long, default_value = "0s")]
    pub reporting_period: String,

    /// Print elapsed time and mean rate with the summary
    #[arg(long)]
    pub verbose: bool,

    /// Zero-based column position of the derived key
    #[arg(long, default_value_t = 1)]
    pub key_position: usize,

    /// The two zero-based input fields concatenated into the key
    #[arg(long, value_delimiter = ',', default_value = "3,2")]
    pub key_fields: Vec<usize>,

    /// SQL script to run after the load completes
    #[arg(long)]
    pub post_load_sql: Option<PathBuf>,

    /// Truncate the destination table once post-load steps have run
    #[arg(long)]
    pub clear_table_after_post_load: bool,

    /// Run the pipeline against an in-memory sink; nothing is written
    #[arg(long)]
    pub dry_run: bool,
}

impl LoadArgs {
    pub fn key_rule(&self) -> anyhow::Result<KeyRule> {
        match self.key_fields.as_slice() {
            [first, second] => Ok(KeyRule::new(self.key_position, *first, *second)),
            other => bail!(
                "--key-fields takes exactly two field indices, got {}",
                other.len()
            ),
        }
    }

    pub fn target(&self) -> anyhow::Result<CopyTarget> {
        let delimiter = Delimiter::parse(&self.split).context("Invalid --split value")?;
        Ok(CopyTarget::new(&self.schema, &self.table)
            .with_columns(&self.columns)
            .with_delimiter(delimiter)
            .with_options(&self.copy_options))
    }

    pub fn pipeline_config(&self) -> anyhow::Result<PipelineConfig> {
        let reporting_period = parse_duration(&self.reporting_period)
            .context("Invalid --reporting-period value")?;

        let config = PipelineConfig {
            target: self.target()?,
            batch_size: self.batch_size,
            workers: self.workers,
            rule: self.key_rule()?,
            reporting_period,
            log_batches: self.log_batches,
            truncate: self.truncate,
        };
        config.validate()?;
        Ok(config)
    }

    /// Read the post-load script, if any.
    pub async fn post_load(&self) -> anyhow::Result<PostLoad> {
        let script = match &self.post_load_sql {
            Some(path) => Some(tokio::fs::read_to_string(path).await.with_context(|| {
                format!("Failed to read post-load script: {}", path.display())
            })?),
            None => None,
        };
        Ok(PostLoad {
            script,
            clear_table: self.clear_table_after_post_load,
        })
    }
}
