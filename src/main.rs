use std::sync::Arc;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use dealsense::api::routes::{router, ApiState};
use dealsense::config::Config;
use dealsense::error::Result;
use dealsense::itad::ItadClient;
use dealsense::predict::ScoringEngine;
use dealsense::sync::Syncer;
use dealsense::MIGRATOR;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let options = SqliteConnectOptions::new()
        .filename(&cfg.db_path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    MIGRATOR.run(&pool).await?;
    info!("Database ready at {}", cfg.db_path);

    // --- Scoring engine: trained artifact or heuristic fallback ---
    let engine = Arc::new(ScoringEngine::load(&cfg.model_path));
    info!("Scoring engine ready in {} mode", engine.mode());

    // --- Upstream client, only when a key is configured ---
    let client = match &cfg.itad_api_key {
        Some(key) => Some(Arc::new(ItadClient::new(&cfg, key.clone())?)),
        None => {
            warn!("ITAD_API_KEY not set — sync and search endpoints are disabled");
            None
        }
    };
    let syncer = client
        .as_ref()
        .map(|c| Arc::new(Syncer::new(pool.clone(), Arc::clone(c), cfg.clone())));

    // --- HTTP API server ---
    let state = ApiState {
        pool,
        cfg: cfg.clone(),
        engine,
        client,
        syncer,
    };
    let app = router(state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
