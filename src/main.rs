use anyhow::Result;
use reqwest::Client;
use sodump::{auth::Authenticator, bigquery::BigQuery, config::Config, extract};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    std::panic::set_hook(Box::new(|info| {
        eprintln!("panic: {:?}", info);
    }));

    // every failure funnels through one handler: report and exit nonzero
    if let Err(err) = run().await {
        eprintln!("ERROR: {:#}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // ─── 2) configuration ────────────────────────────────────────────
    let config = Config::from_env()?;
    info!(
        query = config.query.as_str(),
        out = %config.out_path.display(),
        "startup"
    );

    // ─── 3) clients ──────────────────────────────────────────────────
    let auth = Authenticator::from_key_file(&config.credentials_path)?;
    let bq = BigQuery::new(
        Client::new(),
        auth,
        config.project_id.clone(),
        config.location.clone(),
    );

    // ─── 4) run the query ────────────────────────────────────────────
    let (job, rows) = bq.run_query(&config.sql()).await?;
    info!(rows = rows.len(), "query returned");

    // ─── 5) serialize + write ────────────────────────────────────────
    let lines = extract::render_lines(&rows)?;
    extract::write_output(&config.out_path, &lines)?;

    info!(
        job_id = %job.job_reference.job_id,
        rows = lines.len(),
        "post details dumped successfully"
    );
    Ok(())
}
