//! Read services for game history and stats. Thin: existence checks plus
//! shaping for the route layer.

use serde::Serialize;
use sqlx::SqlitePool;

use crate::db::models::{PriceRow, PriceStatsRow, SeasonalRow};
use crate::db::queries;
use crate::error::{AppError, Result};

#[derive(Debug, Serialize)]
pub struct GameHistoryResponse {
    pub game_id: String,
    pub title: String,
    pub appid: Option<i64>,
    pub count: usize,
    pub history: Vec<PriceRow>,
}

#[derive(Debug, Serialize)]
pub struct GameStatsResponse {
    pub game_id: String,
    pub title: String,
    pub appid: Option<i64>,
    pub stats: PriceStatsRow,
    pub seasonal_patterns: Vec<SeasonalRow>,
}

pub async fn get_game_history(
    pool: &SqlitePool,
    game_id: &str,
    since: Option<i64>,
    until: Option<i64>,
) -> Result<GameHistoryResponse> {
    let game = queries::get_game(pool, game_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("game {game_id}")))?;

    let history = queries::get_price_history(pool, game_id, since, until, None).await?;
    if history.is_empty() {
        return Err(AppError::NotFound(format!("no price history for {game_id}")));
    }

    Ok(GameHistoryResponse {
        game_id: game.id,
        title: game.title,
        appid: game.appid,
        count: history.len(),
        history,
    })
}

pub async fn get_game_stats(pool: &SqlitePool, game_id: &str) -> Result<GameStatsResponse> {
    let game = queries::get_game(pool, game_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("game {game_id}")))?;

    let stats = queries::get_price_stats(pool, game_id).await?;
    if stats.total_records == 0 {
        return Err(AppError::NotFound(format!("no price stats for {game_id}")));
    }
    let seasonal = queries::get_seasonal_patterns(pool, game_id).await?;

    Ok(GameStatsResponse {
        game_id: game.id,
        title: game.title,
        appid: game.appid,
        stats,
        seasonal_patterns: seasonal,
    })
}
