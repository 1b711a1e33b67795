//! End-to-end loads into a live PostgreSQL server.
//!
//! Set `PGCOPY_TEST_CONNECTION` to point at a server whose `postgres` database
//! may be written to, then run with `--ignored`.

use anyhow::Result;
use parallel_copy_pipeline::{
    CopyTarget, Delimiter, KeyRule, Pipeline, PipelineConfig, PipelineError, PostLoad,
};
use parallel_copy_postgresql::{build_config, connect, PostgresSink};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

fn connection_string() -> String {
    std::env::var("PGCOPY_TEST_CONNECTION").unwrap_or_else(|_| {
        "host=localhost user=postgres password=postgres sslmode=disable".to_string()
    })
}

async fn setup_table(table: &str) -> Result<(tokio_postgres::Client, PostgresSink)> {
    let config = build_config(&connection_string(), "postgres")?;
    let client = connect(&config).await?;
    client
        .batch_execute(&format!(
            "DROP TABLE IF EXISTS public.{table};
             CREATE TABLE public.{table} (a TEXT, k TEXT, b TEXT, c TEXT);
             DROP TABLE IF EXISTS public.{table}_rollup;
             CREATE TABLE public.{table}_rollup (n BIGINT);"
        ))
        .await?;
    Ok((client, PostgresSink::new(config)))
}

async fn count(client: &tokio_postgres::Client, table: &str) -> Result<i64> {
    let row = client
        .query_one(format!("SELECT COUNT(*) FROM public.{table}").as_str(), &[])
        .await?;
    Ok(row.get(0))
}

fn config(table: &str, workers: usize, batch_size: usize) -> PipelineConfig {
    PipelineConfig {
        target: CopyTarget::new("public", table).with_columns("a,k,b,c"),
        batch_size,
        workers,
        rule: KeyRule::new(1, 2, 1),
        ..Default::default()
    }
}

#[tokio::test]
#[ignore = "Requires PostgreSQL"]
async fn test_parallel_load() -> Result<()> {
    init_logging();
    let table = "pgcopy_e2e_parallel";
    let (client, sink) = setup_table(table).await?;

    let input: String = (0..10_000).map(|i| format!("r{i},x{i},y{i}\n")).collect();
    let pipeline = Pipeline::new(sink, config(table, 4, 333));
    let summary = pipeline.run(input.as_bytes()).await?;

    assert_eq!(summary.rows, 10_000);
    assert_eq!(summary.columns, 40_000);
    assert_eq!(count(&client, table).await?, 10_000);

    let row = client
        .query_one(
            format!("SELECT k FROM public.{table} WHERE a = 'r42'").as_str(),
            &[],
        )
        .await?;
    assert_eq!(row.get::<_, String>(0), "y42x42");
    Ok(())
}

#[tokio::test]
#[ignore = "Requires PostgreSQL"]
async fn test_tab_delimited_load_with_truncate() -> Result<()> {
    init_logging();
    let table = "pgcopy_e2e_tab";
    let (client, sink) = setup_table(table).await?;

    let mut cfg = config(table, 2, 2);
    cfg.target = cfg.target.with_delimiter(Delimiter::TAB);
    cfg.truncate = true;
    let pipeline = Pipeline::new(sink, cfg);

    let input = "a\tb\tc\nd\te\tf\ng\th\ti\n";
    pipeline.run(input.as_bytes()).await?;
    pipeline.run(input.as_bytes()).await?;

    assert_eq!(count(&client, table).await?, 3);
    Ok(())
}

#[tokio::test]
#[ignore = "Requires PostgreSQL"]
async fn test_malformed_batch_is_not_committed() -> Result<()> {
    init_logging();
    let table = "pgcopy_e2e_malformed";
    let (client, sink) = setup_table(table).await?;

    let pipeline = Pipeline::new(sink, config(table, 1, 2));
    let err = pipeline
        .run("a,b,c\nd,e,f\ng,h,i\nbroken\n".as_bytes())
        .await
        .unwrap_err();

    assert!(err
        .chain()
        .any(|e| matches!(
            e.downcast_ref::<PipelineError>(),
            Some(PipelineError::MalformedRecord { line: 4, .. })
        )));
    // The first batch committed; the one holding the bad line rolled back.
    assert_eq!(count(&client, table).await?, 2);
    Ok(())
}

#[tokio::test]
#[ignore = "Requires PostgreSQL"]
async fn test_post_load_script_and_clear() -> Result<()> {
    init_logging();
    let table = "pgcopy_e2e_postload";
    let (client, sink) = setup_table(table).await?;

    let pipeline = Pipeline::new(sink, config(table, 1, 10));
    pipeline.run("a,b,c\nd,e,f\n".as_bytes()).await?;

    pipeline
        .post_load(&PostLoad {
            script: Some(format!(
                "INSERT INTO public.{table}_rollup SELECT COUNT(*) FROM public.{table};"
            )),
            clear_table: true,
        })
        .await?;

    assert_eq!(count(&client, table).await?, 0);
    let rollup = client
        .query_one(format!("SELECT n FROM public.{table}_rollup").as_str(), &[])
        .await?;
    assert_eq!(rollup.get::<_, i64>(0), 2);
    Ok(())
}
