//! Command-line interface for parallel-copy
//!
//! # Usage Examples
//!
//! ```bash
//! # Load data.csv into test.public.test_table with 4 workers
//! parallel-copy --file data.csv --workers 4 --verbose
//!
//! # Replace the contents of a staging table, then roll it up
//! parallel-copy --file counters.tsv --split '\t' \
//!   --table counter_3g --truncate \
//!   --columns "cell,key,ts,value" \
//!   --post-load-sql rollup.sql --clear-table-after-post-load
//!
//! # Check input shape and throughput without touching the database
//! parallel-copy --file data.csv --workers 4 --dry-run --reporting-period 1s
//! ```

use anyhow::Context;
use clap::Parser;
use parallel_copy::pipeline::{
    BulkSink, InputSource, MemorySink, Pipeline, PipelineConfig, PostLoad, DEFAULT_BUFFER_SIZE,
};
use parallel_copy::postgresql::{build_config, PostgresSink};
use parallel_copy::LoadArgs;
use tokio::io::AsyncBufRead;
use tracing::info;

#[derive(Parser)]
#[command(name = "parallel-copy")]
#[command(about = "Load delimited text into PostgreSQL with parallel COPY streams")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    load: LoadArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let args = cli.load;

    let config = args.pipeline_config()?;
    let post_load = args.post_load().await?;

    let source = InputSource::from_path(args.file.clone());
    info!("Reading from {}", source.display_name());
    let input = source.open(DEFAULT_BUFFER_SIZE).await?;

    if args.dry_run {
        info!("Dry run: rows are transformed and counted but not written");
        run_load(MemorySink::discarding(), config, input, &post_load, args.verbose).await
    } else {
        let pg_config = build_config(&args.postgres.connection, &args.postgres.db_name)
            .context("Invalid PostgreSQL connection settings")?;
        run_load(
            PostgresSink::new(pg_config),
            config,
            input,
            &post_load,
            args.verbose,
        )
        .await
    }
}

async fn run_load<S, R>(
    sink: S,
    config: PipelineConfig,
    input: R,
    post_load: &PostLoad,
    verbose: bool,
) -> anyhow::Result<()>
where
    S: BulkSink,
    R: AsyncBufRead + Unpin,
{
    let pipeline = Pipeline::new(sink, config);
    let summary = pipeline.run(input).await?;
    println!("{}", summary.render(verbose));

    if !post_load.is_empty() {
        let took = pipeline.post_load(post_load).await?;
        println!("Post-load steps completed in {took:?}");
    }
    Ok(())
}
