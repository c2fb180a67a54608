use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use duel_client::CardApiClient;
use duel_core::{RefreshPipeline, Scheduler, SchedulerConfig};
use duel_db::CardRepository;
use duel_server::{build_router, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install tracing subscriber")?;

    let config = Config::parse();

    info!("Connecting to database...");
    let pool = duel_db::connect(&config.db_config())
        .await
        .context("Failed to connect to database")?;
    duel_db::migrate(&pool)
        .await
        .context("Failed to run database migrations")?;

    let repo = CardRepository::new(pool);
    let client = CardApiClient::new().context("Failed to build card API client")?;
    let pipeline = RefreshPipeline::new(repo.clone(), client, config.refresh_config());
    let scheduler = Scheduler::new(pipeline, SchedulerConfig::default());

    if config.no_refresh {
        info!("Background refresh disabled");
    } else {
        if config.api_url.is_none() {
            warn!("API is not set; refresh cycles will fail until it is configured");
        }
        scheduler.start();
    }

    let app = build_router(AppState::new(repo));
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;

    info!("Server starting on port {}", config.port);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down refresh scheduler");
    scheduler.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
