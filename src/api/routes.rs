//! HTTP route layer. Handlers validate input and delegate; no business
//! logic lives here.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::config::Config;
use crate::db::models::{BestPredictionRow, GameListRow, OverviewRow, TopDealRow};
use crate::db::queries;
use crate::error::{AppError, Result};
use crate::itad::ItadClient;
use crate::predict::{service as predict_service, ScoringEngine};
use crate::prices;
use crate::sync::Syncer;
use crate::types::{PredictionResponse, SearchResult, SyncResult};

#[derive(Clone)]
pub struct ApiState {
    pub pool: sqlx::SqlitePool,
    pub cfg: Config,
    pub engine: Arc<ScoringEngine>,
    /// Present only when an API key is configured.
    pub client: Option<Arc<ItadClient>>,
    pub syncer: Option<Arc<Syncer>>,
}

impl ApiState {
    fn syncer(&self) -> Result<&Arc<Syncer>> {
        self.syncer
            .as_ref()
            .ok_or(AppError::ConfigurationMissing("ITAD_API_KEY"))
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/games", get(list_games))
        .route("/games/search", get(search_games))
        .route("/games/:id", get(get_game))
        .route("/games/:id/history", get(get_game_history))
        .route("/predict/:id", get(predict))
        .route("/sync/game/:appid", post(sync_game_by_appid))
        .route("/sync/id/:game_id", post(sync_game_by_id))
        .route("/sync/top", post(sync_top))
        .route("/stats/overview", get(stats_overview))
        .route("/deals/top", get(top_deals))
        .route("/predictions/best", get(best_predictions))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct ListGamesQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    pub q: String,
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    /// Unix seconds, inclusive.
    pub since: Option<i64>,
    pub until: Option<i64>,
}

#[derive(Deserialize)]
pub struct PredictQuery {
    pub force_refresh: Option<bool>,
}

#[derive(Deserialize)]
pub struct SyncTopQuery {
    pub top_n: Option<usize>,
}

#[derive(Deserialize)]
pub struct BestPredictionsQuery {
    pub signal: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct TopDealsQuery {
    pub limit: Option<i64>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health(State(state): State<ApiState>) -> Json<serde_json::Value> {
    let db_status = match sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&state.pool)
        .await
    {
        Ok(_) => "ok",
        Err(_) => "error",
    };

    Json(json!({
        "status": "ok",
        "db": db_status,
        "model": state.engine.mode(),
        "sync_enabled": state.syncer.is_some(),
    }))
}

async fn list_games(
    State(state): State<ApiState>,
    Query(params): Query<ListGamesQuery>,
) -> Result<Json<Vec<GameListRow>>> {
    let limit = params.limit.unwrap_or(50).clamp(1, 200);
    let offset = params.offset.unwrap_or(0).max(0);
    let games = queries::list_games(&state.pool, limit, offset).await?;
    Ok(Json(games))
}

async fn search_games(
    State(state): State<ApiState>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<Vec<SearchResult>>> {
    let client = state
        .client
        .as_ref()
        .ok_or(AppError::ConfigurationMissing("ITAD_API_KEY"))?;
    if params.q.trim().is_empty() {
        return Ok(Json(Vec::new()));
    }
    let limit = params.limit.unwrap_or(20).min(50);
    Ok(Json(client.search(&params.q, limit).await))
}

async fn get_game(
    State(state): State<ApiState>,
    Path(game_id): Path<String>,
) -> Result<Json<prices::GameStatsResponse>> {
    Ok(Json(prices::get_game_stats(&state.pool, &game_id).await?))
}

async fn get_game_history(
    State(state): State<ApiState>,
    Path(game_id): Path<String>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<prices::GameHistoryResponse>> {
    Ok(Json(
        prices::get_game_history(&state.pool, &game_id, params.since, params.until).await?,
    ))
}

async fn predict(
    State(state): State<ApiState>,
    Path(game_id): Path<String>,
    Query(params): Query<PredictQuery>,
) -> Result<Json<PredictionResponse>> {
    let response = predict_service::get_prediction(
        &state.pool,
        &state.engine,
        &state.cfg,
        &game_id,
        params.force_refresh.unwrap_or(false),
    )
    .await?;
    Ok(Json(response))
}

async fn sync_game_by_appid(
    State(state): State<ApiState>,
    Path(appid): Path<i64>,
) -> Result<Json<SyncResult>> {
    let syncer = state.syncer()?;
    Ok(Json(syncer.sync_by_appid(appid).await?))
}

async fn sync_game_by_id(
    State(state): State<ApiState>,
    Path(game_id): Path<String>,
) -> Result<Json<SyncResult>> {
    let syncer = state.syncer()?;
    Ok(Json(syncer.sync_by_game_id(&game_id).await?))
}

/// Kick off a bulk sync of the top N games as a detached background task.
/// Committed batches survive if the task is later aborted.
async fn sync_top(
    State(state): State<ApiState>,
    Query(params): Query<SyncTopQuery>,
) -> Result<Json<serde_json::Value>> {
    let syncer = Arc::clone(state.syncer()?);
    let top_n = params.top_n.unwrap_or(100).clamp(10, 500);

    tokio::spawn(async move {
        match syncer.sync_top(top_n).await {
            Ok(summary) => info!(
                games = summary.total_games,
                inserted = summary.total_inserted,
                errors = summary.errors,
                "background sync finished"
            ),
            Err(e) => error!("background sync failed: {e}"),
        }
    });

    Ok(Json(json!({
        "status": "started",
        "message": format!("syncing top {top_n} games in the background"),
    })))
}

async fn stats_overview(State(state): State<ApiState>) -> Result<Json<OverviewRow>> {
    Ok(Json(queries::get_overview_stats(&state.pool).await?))
}

async fn top_deals(
    State(state): State<ApiState>,
    Query(params): Query<TopDealsQuery>,
) -> Result<Json<Vec<TopDealRow>>> {
    let limit = params.limit.unwrap_or(12).clamp(1, 100);
    Ok(Json(queries::get_top_deals(&state.pool, limit).await?))
}

async fn best_predictions(
    State(state): State<ApiState>,
    Query(params): Query<BestPredictionsQuery>,
) -> Result<Json<Vec<BestPredictionRow>>> {
    let signal = match params.signal.as_deref() {
        None | Some("BUY") => "BUY",
        Some("WAIT") => "WAIT",
        Some(other) => {
            return Err(AppError::BadRequest(format!(
                "signal must be BUY or WAIT, got {other}"
            )))
        }
    };
    let limit = params.limit.unwrap_or(12).clamp(1, 100);
    Ok(Json(
        queries::get_best_predictions(&state.pool, signal, limit).await?,
    ))
}
