use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bench_results::connectors::create_connector;
use bench_results::{
    dispatch, load_config, Config, ReporterRegistry, Result, Session, WorkerPool,
};

/// Aggregate a stored load-test session and submit it to a reporter.
#[derive(Parser, Debug)]
#[command(name = "bench-results")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stored session JSON, overrides `connector.json.path`
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Reporter tag, overrides `reporter.type`
    #[arg(short, long)]
    reporter: Option<String>,

    /// Output directory for the json reporter
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG wins when set
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let cancel = CancellationToken::new();
    let watcher = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            wait_for_shutdown().await;
            warn!("shutdown requested, cancelling run");
            cancel.cancel();
        }
    });

    let outcome = run(cli, cancel).await;
    watcher.abort();

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_cancelled() => {
            warn!("{e}");
            ExitCode::from(130)
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, cancel: CancellationToken) -> Result<()> {
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(input) = cli.input {
        config.connector.json.path = input;
    }
    if let Some(reporter) = cli.reporter {
        config.reporter.reporter_type = reporter;
    }
    if let Some(output) = cli.output {
        config.reporter.json.directory = output;
    }

    let pool = WorkerPool::from_config(config.workers);
    let pool = pool.scope();
    info!(workers = pool.size(), "worker pool ready");

    // Queued blocking jobs fail once the run is cancelled.
    let shutdown = tokio::spawn({
        let pool = (*pool).clone();
        let cancel = cancel.clone();
        async move {
            cancel.cancelled().await;
            pool.shutdown();
        }
    });
    let outcome = aggregate_and_submit(&config, &pool, &cancel).await;
    shutdown.abort();
    outcome
}

async fn aggregate_and_submit(
    config: &Config,
    pool: &WorkerPool,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut connector = create_connector(&config.connector, pool);
    let report = Session::collect(connector.as_mut()).await?;
    info!(
        stages = report.summaries.len(),
        events = report.payload.events.len(),
        metrics_sets = report.payload.metrics_sets.len(),
        "session aggregated"
    );

    let mut reporter =
        ReporterRegistry::global().create(&config.reporter.reporter_type, &config.reporter, pool)?;
    let dispatched = dispatch(reporter.as_mut(), &report.payload, cancel).await?;
    info!(
        reporter = reporter.reporter_type(),
        submitted = ?dispatched.submitted,
        "report submitted"
    );
    Ok(())
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();
}

/// Wait for SIGINT or SIGTERM
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("cannot listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("cannot listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
