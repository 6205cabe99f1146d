use clap::Parser;
use memorai::{MemoraiConfig, MemoraiSystem};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod models;
mod state;

use crate::state::AppState;

#[derive(Parser)]
#[command(name = "memorai-server")]
#[command(about = "HTTP chat surface for Memorai")]
struct Args {
    /// Address to listen on
    #[arg(long, env = "BIND_ADDRESS")]
    bind: Option<String>,

    /// SQLite connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,memorai=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = MemoraiConfig::from_env()?;
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    if let Some(url) = args.database_url {
        config.database_url = url;
    }

    tracing::info!("Initializing Memorai...");
    let system = MemoraiSystem::connect(config).await?;
    let state = Arc::new(AppState::from_system(&system)?);
    if state.research.is_none() {
        tracing::warn!("RESEARCH_API_KEY not set; /chat/research-ai will answer 503");
    }

    let app = api::router(state);

    let addr = system.config().bind_address.clone();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Memorai server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for ctrl-c");
            }
        })
        .await?;

    Ok(())
}
