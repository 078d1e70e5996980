use anyhow::Context;
use clap::{Parser, ValueEnum};
use nozzle_api::WebServer;
use nozzle_cache::TtlCache;
use nozzle_config::Configuration;
use nozzle_ingest::Nozzle;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const LOG_FILE: &str = "firehose-nozzle.log";

#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
enum RunMode {
    /// Run the full bridge: nozzle, cache, and web server.
    Normal,
    /// Stand up only the REST surface (debugging aid).
    Webserver,
}

#[derive(Parser)]
#[command(name = "firehose-nozzle")]
#[command(about = "Bridges RLP envelope metrics to a token-gated REST API")]
struct Args {
    /// Path to the nozzle configuration file
    #[arg(long, default_value = "./config/firehose-nozzle.json")]
    config: String,

    /// Mode to run the nozzle in
    #[arg(long, value_enum, default_value = "normal")]
    mode: RunMode,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Directory log files are written to
    #[arg(long, default_value = "./logs")]
    log_directory: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    std::fs::create_dir_all(&args.log_directory)
        .with_context(|| format!("creating log directory {}", args.log_directory))?;

    let file_appender = tracing_appender::rolling::never(&args.log_directory, LOG_FILE);
    let (file_writer, _appender_guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config,
        mode = ?args.mode,
        "starting firehose nozzle"
    );

    let config = Configuration::load(&args.config).context("loading configuration")?;

    let cache = Arc::new(TtlCache::new(config.metric_ttl()));
    let shutdown = CancellationToken::new();
    cache.spawn_janitor(shutdown.child_token());

    let server = WebServer::new(&config, Arc::clone(&cache));
    let mut server_errors = server.start();

    let result = match args.mode {
        RunMode::Webserver => {
            tokio::select! {
                error = server_errors.recv() => Err(fatal_server_error(error)),
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupt received, shutting down");
                    Ok(())
                }
            }
        }
        RunMode::Normal => run_bridge(&config, &cache, &mut server_errors).await,
    };

    shutdown.cancel();
    result
}

/// The steady-state loop: every envelope from the nozzle lands in the
/// cache; any web server error is fatal.
async fn run_bridge(
    config: &Configuration,
    cache: &Arc<TtlCache>,
    server_errors: &mut tokio::sync::mpsc::Receiver<anyhow::Error>,
) -> anyhow::Result<()> {
    let mut nozzle = Nozzle::new(config).context("constructing nozzle")?;
    let mut messages = nozzle.messages();
    nozzle.start().await.context("starting nozzle")?;

    loop {
        tokio::select! {
            envelope = messages.recv() => match envelope {
                Some(envelope) => cache.update(&envelope),
                None => {
                    info!(
                        dropped = nozzle.dropped_envelopes(),
                        "envelope channel closed, shutting down"
                    );
                    return Ok(());
                }
            },
            error = server_errors.recv() => {
                nozzle.stop();
                return Err(fatal_server_error(error));
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, stopping nozzle");
                nozzle.stop();
            }
        }
    }
}

fn fatal_server_error(error: Option<anyhow::Error>) -> anyhow::Error {
    match error {
        Some(error) => error.context("error while running web server"),
        None => anyhow::anyhow!("web server exited unexpectedly"),
    }
}
