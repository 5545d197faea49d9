mod auth;
mod config;
mod credentials;
mod git;
mod health;
mod http;
mod metrics;
mod relay;
mod response;
mod worker;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::metrics::MetricsRegistry;
use crate::relay::Relay;
use crate::worker::SyncWorker;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "mirror-relay", about = "Webhook relay and git mirror-sync worker")]
struct Cli {
    /// Path to the YAML configuration file.  Defaults apply when omitted.
    #[arg(short, long, env = "MIRROR_RELAY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default).
    Serve,
    /// Run the sync worker once against a JSON event file and print the
    /// response envelope.
    Sync {
        #[arg(long)]
        event: PathBuf,
    },
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

/// State shared by all request handlers.
pub struct AppState {
    pub config: Arc<Config>,
    pub relay: Arc<Relay>,
    pub worker: Arc<SyncWorker>,
    pub metrics: MetricsRegistry,
    /// HMAC secret for `/webhook`; `None` disables verification.
    pub webhook_secret: Option<String>,
}

// ---------------------------------------------------------------------------
// AWS setup
// ---------------------------------------------------------------------------

async fn load_aws_config(config: &Config) -> aws_config::SdkConfig {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
    if let Some(region) = &config.aws.region {
        loader = loader.region(aws_config::Region::new(region.clone()));
    }
    loader.load().await
}

fn build_worker(
    config: &Config,
    aws_config: &aws_config::SdkConfig,
    metrics: &MetricsRegistry,
) -> Arc<SyncWorker> {
    let store = credentials::build_parameter_store(&config.worker, aws_config);
    tracing::info!(
        store = ?config.worker.parameter_store,
        git = %config.worker.git_binary,
        fail_on_git_error = config.worker.fail_on_git_error,
        "sync worker initialised"
    );
    Arc::new(SyncWorker::new(
        config.worker.clone(),
        store,
        metrics.clone(),
    ))
}

// ---------------------------------------------------------------------------
// HTTP server (axum)
// ---------------------------------------------------------------------------

async fn run_http_server(state: Arc<AppState>) -> Result<()> {
    let listen_addr: std::net::SocketAddr = state
        .config
        .server
        .listen
        .parse()
        .context("invalid server.listen address")?;

    let app = http::handler::create_router(state);

    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {listen_addr}"))?;

    tracing::info!(%listen_addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    Ok(())
}

async fn serve(config: Arc<Config>) -> Result<()> {
    let aws_config = load_aws_config(&config).await;

    let http_client = reqwest::Client::builder()
        .user_agent(concat!("mirror-relay/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build reqwest client")?;

    let metrics = MetricsRegistry::new();
    let worker = build_worker(&config, &aws_config, &metrics);

    let dispatcher = relay::build_dispatcher(
        &config.relay,
        &aws_config,
        &http_client,
        Arc::clone(&worker),
    )?;
    tracing::info!(mode = dispatcher.kind(), "relay dispatcher initialised");
    let relay = Arc::new(Relay::new(dispatcher, metrics.clone()));

    let webhook_secret = auth::webhook::webhook_secret(&config.relay);
    if webhook_secret.is_none() {
        tracing::warn!("no webhook secret configured; signatures will not be verified");
    }

    let state = Arc::new(AppState {
        config,
        relay,
        worker,
        metrics,
        webhook_secret,
    });

    let worker = Arc::clone(&state.worker);
    let served = run_http_server(state).await;

    // Syncs accepted before the signal still run to completion.
    worker.drain().await;
    served?;

    tracing::info!("mirror-relay shut down cleanly");
    Ok(())
}

// ---------------------------------------------------------------------------
// One-shot sync
// ---------------------------------------------------------------------------

async fn sync_once(config: &Config, event_path: &Path) -> Result<bool> {
    let raw = tokio::fs::read_to_string(event_path)
        .await
        .with_context(|| format!("failed to read event file: {}", event_path.display()))?;
    let event: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse event file: {}", event_path.display()))?;

    let aws_config = load_aws_config(config).await;
    let worker = build_worker(config, &aws_config, &MetricsRegistry::new());

    let response = worker.handle(&event).await;
    println!("{}", serde_json::to_string_pretty(&response)?);

    Ok((200..300).contains(&response.status_code))
}

// ---------------------------------------------------------------------------
// Graceful shutdown
// ---------------------------------------------------------------------------

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received SIGINT"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // ---- CLI ----
    let cli = Cli::parse();

    // ---- Tracing ----
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // ---- Config ----
    let config = Arc::new(config::load_config(cli.config.as_deref())?);
    tracing::info!(
        config_path = ?cli.config,
        dispatch = ?config.relay.dispatch.mode,
        "starting mirror-relay"
    );

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Sync { event } => {
            if !sync_once(&config, &event).await? {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}
