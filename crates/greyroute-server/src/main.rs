//! greyroute server
//!
//! Runs either the grey-routing gateway or a stand-in business server.
//!
//! # Usage
//!
//! ```bash
//! # Two business servers, one for grey and one for regular traffic
//! greyroute-server upstream --port 8081
//! greyroute-server upstream --port 8083
//!
//! # Gateway on :8080 with the embedded demo strategy
//! greyroute-server gateway
//!
//! # Grey call (version v1, known store) lands on :8081
//! curl http://localhost:8080/api/v1/business/online-json-direct \
//!   -d '{"storeId": "SID000001"}'
//!
//! # Push a new strategy
//! curl -X PUT http://localhost:8080/grey/strategy/json -d @strategy.json
//! ```

mod app;
mod config;
mod repository;
mod upstream;

use anyhow::Context;
use clap::{Parser, Subcommand};
use config::ServerConfig;
use futures::StreamExt;
use greyroute_config_file::FileStrategyRepository;
use greyroute_core::StrategyRepository;
use greyroute_observability::Metrics;
use greyroute_routing::GreyEngine;
use repository::MemoryStrategyRepository;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{Level, debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// greyroute - grey (canary) traffic gateway
#[derive(Parser)]
#[command(name = "greyroute-server", version)]
#[command(about = "Grey traffic gateway driven by a hot-reloaded strategy", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to configuration file (YAML or TOML)
    #[arg(
        short,
        long,
        value_name = "FILE",
        env = "GREYROUTE_CONFIG",
        global = true
    )]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the grey-routing gateway (default)
    Gateway,
    /// Run a stand-in business server that echoes the request URI
    Upstream {
        /// Port to listen on
        #[arg(short, long, default_value = "8081")]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let mut config = match &cli.config {
        Some(config_path) => ServerConfig::from_file(config_path)?,
        None => ServerConfig::default(),
    };

    // Merge environment variables (they override config file)
    config.merge_env();

    init_tracing(&config.logging.level)?;

    match &cli.config {
        Some(config_path) => info!("Loaded configuration from: {}", config_path),
        None => info!("Using default configuration"),
    }

    match cli.command {
        Some(Commands::Upstream { port }) => run_upstream(&config.host, port).await?,
        Some(Commands::Gateway) | None => run_gateway(config).await?,
    }

    Ok(())
}

fn init_tracing(level: &str) -> Result<(), Box<dyn std::error::Error>> {
    let log_level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::new(format!("{}", log_level));

    // Connection-level chatter from the forwarding client is rarely useful
    match "hyper_util=warn".parse() {
        Ok(directive) => filter = filter.add_directive(directive),
        Err(e) => tracing::warn!("Failed to set hyper log filter: {}", e),
    }

    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

async fn run_gateway(config: ServerConfig) -> anyhow::Result<()> {
    info!("Initializing greyroute gateway");

    let metrics = Arc::new(Metrics::new()?);

    // Pick the strategy source
    let (repository, file_repository): (
        Arc<dyn StrategyRepository>,
        Option<Arc<FileStrategyRepository>>,
    ) = match &config.strategy_file {
        Some(path) => {
            let file_repository = Arc::new(
                FileStrategyRepository::new(path.clone())
                    .await
                    .with_context(|| format!("opening strategy file {}", path.display()))?,
            );
            info!("Strategy source: {}", file_repository.path().display());
            let repository: Arc<dyn StrategyRepository> = file_repository.clone();
            (repository, Some(file_repository))
        }
        None => {
            info!("Strategy source: embedded demo strategy");
            let repository: Arc<dyn StrategyRepository> =
                Arc::new(MemoryStrategyRepository::demo());
            (repository, None)
        }
    };

    let engine = GreyEngine::with_metrics(repository.clone(), metrics.clone());
    engine
        .initialize(config.refresher_config())
        .await
        .context("loading initial grey strategy")?;
    info!(
        "Grey strategy loaded (version {:?}), refreshing every {}s",
        engine.version(),
        config.refresh_interval_secs
    );

    if config.watch_strategy_file {
        match &file_repository {
            Some(file_repository) => spawn_strategy_watcher(file_repository, engine.clone()),
            None => warn!("watch_strategy_file is set but no strategy_file is configured"),
        }
    }

    let state = app::AppState::new(engine.clone(), repository, config.default_upstream.clone());
    let app = app::router(state, metrics);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = TcpListener::bind(addr).await?;

    info!("");
    info!("greyroute gateway listening on http://{}", addr);
    info!("   Business API:  http://{}/api/{{version}}/business/{{identify}}", addr);
    info!("   Strategy:      http://{}/grey/strategy/json", addr);
    info!("   Default upstream: {}", config.default_upstream);
    info!("   Observability:");
    info!("   - Health check:       http://{}/healthz", addr);
    info!("   - Readiness check:    http://{}/readyz", addr);
    info!("   - Prometheus metrics: http://{}/metrics", addr);
    info!("");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    engine.shutdown().await;
    info!("Gateway stopped");

    Ok(())
}

/// Reload the engine whenever the strategy file changes on disk
fn spawn_strategy_watcher(file_repository: &FileStrategyRepository, engine: GreyEngine) {
    let mut changes = file_repository.watch_changes();

    tokio::spawn(async move {
        while let Some(change) = changes.next().await {
            match change {
                Ok(change) => {
                    debug!("Strategy file changed at {}", change.timestamp);
                    if let Err(e) = engine.force_reload().await {
                        warn!("Reload after file change failed: {}", e);
                    }
                }
                Err(e) => warn!("Strategy file watch error: {}", e),
            }
        }
        debug!("Strategy file watcher stopped");
    });
}

async fn run_upstream(host: &str, port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Upstream demo server listening on http://{}", addr);

    axum::serve(listener, upstream::router(port))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
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

    info!("Shutdown signal received");
}
