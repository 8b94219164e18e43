use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::info;

mod config;
mod db;
mod leaderboard;
mod web;

use config::Config;
use db::Database;
use leaderboard::Leaderboard;
use web::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    // Open the sorted-set store; one connection shared by every request
    let db = Database::open(&config.database_path)?;
    info!("Leaderboard store ready: {}", config.database_path);

    let leaderboard = Leaderboard::new(
        Arc::new(db),
        config.leaderboard_name.clone(),
        config.missing_player_policy,
    );
    info!(
        "Serving leaderboard {:?} (missing player policy: {:?})",
        leaderboard.name(),
        config.missing_player_policy
    );

    let app = web::router(AppState { leaderboard });
    let addr = config.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Leaderboard listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
