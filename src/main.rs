//! SIEM core binary entry point.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use siem_core::config::Config;
use siem_core::enricher;
use siem_core::metrics::MetricsCollector;
use siem_core::pipeline::PipelineOrchestrator;
use siem_core::router::{self, AppState};
use siem_core::storage::StorageAdapter;

#[derive(Parser)]
#[command(name = "siem-core", about = "Streaming log enrichment, anomaly scoring, and correlation-rule SIEM core")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[arg(long, global = true, default_value = "pretty")]
    log_format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the collector pipeline and Admin API (the default command).
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, &cli.log_format);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_server().await,
    }
}

fn init_logging(level: &str, format: &str) {
    let level: Level = level.parse().unwrap_or(Level::INFO);
    let registry = tracing_subscriber::registry().with(EnvFilter::from_default_env().add_directive(level.into()));

    if format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().pretty()).init();
    }
}

async fn run_server() -> anyhow::Result<()> {
    let config = Config::load();
    info!(host = %config.server_host, port = config.server_port, "starting siem-core");

    let storage = Arc::new(StorageAdapter::new(&config));
    let metrics = Arc::new(MetricsCollector::new()?);
    let provider = Arc::from(enricher::provider_from_env());

    let sources = config.log_sources.clone();
    let api_key = config.api_key.clone();
    let server_host = config.server_host.clone();
    let server_port = config.server_port;

    let orchestrator = Arc::new(PipelineOrchestrator::new(config, Arc::clone(&storage), Arc::clone(&metrics), provider));

    orchestrator.initialize(sources).await?;
    orchestrator.start_monitoring().await?;

    let state = Arc::new(AppState {
        orchestrator: Arc::clone(&orchestrator),
        storage,
        metrics,
        api_key,
    });
    let app = router::create_router(state);

    let listener = tokio::net::TcpListener::bind((server_host.as_str(), server_port)).await?;
    info!(addr = %listener.local_addr()?, "Admin API listening");

    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Admin API server error");
            }
        }
        _ = shutdown_signal() => {
            info!("shutdown signal received, stopping monitoring");
            orchestrator.stop_monitoring().await;
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
