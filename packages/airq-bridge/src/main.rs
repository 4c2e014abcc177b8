use airq_bridge::{
    cli::{Cli, Commands},
    config::BridgeConfig,
    handlers::read_last_log,
    cors_layer, create_router, AppState, DurableLog, IngestLoop, IngestStats, SharedState,
};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "airq_bridge=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = BridgeConfig::from_env()?;
    let log = DurableLog::new(config.log_path.clone());

    match cli.command {
        Some(Commands::LastLog) => {
            let response = read_last_log(&log).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
            return Ok(());
        }
        Some(Commands::Serve) | None => {
            // Continue to run server
        }
    }

    info!("🚀 Starting AirQ Bridge v{}", VERSION);
    info!("📋 Configuration loaded:");
    info!("   Device: {}", config.connector().describe());
    info!("   Log file: {:?}", config.log_path);
    info!("   Settle delay: {:?}", config.settle_delay);
    info!("   Retry interval: {:?}", config.retry_interval);
    info!("   CORS origins: {:?}", config.cors_origins);

    let latest = SharedState::new();
    let stats = Arc::new(IngestStats::new());
    let cancel_token = CancellationToken::new();

    // Ingestion runs in the background for the lifetime of the process
    let ingest = IngestLoop::new(
        config.connector(),
        latest.clone(),
        log.clone(),
        stats.clone(),
        config.ingest_config(),
    )
    .spawn(cancel_token.clone());

    let state = Arc::new(AppState::new(latest, log, stats));
    let app = create_router(state, cors_layer(&config.cors_origins));

    let addr: SocketAddr = config.bind_address().parse()?;
    info!("🎧 Listening on http://{}", addr);
    info!("📡 Live endpoint: http://{}/live", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let shutdown = {
        let cancel_token = cancel_token.clone();
        async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("Shutdown signal received"),
                _ = cancel_token.cancelled() => {}
            }
        }
    };
    axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;

    ingest.shutdown().await;
    info!("AirQ Bridge stopped");

    Ok(())
}
