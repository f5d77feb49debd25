//! Prediction orchestration: cache lookup, feature build, scoring, cache
//! write, response formatting. The only module that decides when a score
//! is recomputed.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::config::{Config, MIN_HISTORY_RECORDS};
use crate::db::models::GameRow;
use crate::db::queries;
use crate::error::{AppError, Result};
use crate::predict::features::{self, sanitize, FeatureVector};
use crate::predict::ScoringEngine;
use crate::types::{PredictionBody, PredictionResponse, PriceContext, Signal};

/// Compute or fetch the buy/wait prediction for a game.
///
/// Cache hits inside the TTL are returned as-is with `from_cache = true`;
/// the cache persists only what re-rendering needs, so confidence comes
/// back as 0.0 and the price context empty. On a miss the full pipeline
/// runs and the cache is overwritten — unless the history is too thin, in
/// which case nothing is written and `InsufficientData` is returned.
pub async fn get_prediction(
    pool: &SqlitePool,
    engine: &ScoringEngine,
    cfg: &Config,
    game_id: &str,
    force_refresh: bool,
) -> Result<PredictionResponse> {
    let game = queries::get_game(pool, game_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("game {game_id}")))?;

    if !force_refresh {
        if let Some(cached) = queries::get_cached_prediction(pool, game_id, cfg.cache_ttl_hours).await? {
            debug!("cache hit for game_id={game_id}");
            let signal: Signal = cached.signal.parse().unwrap_or(Signal::Wait);
            return Ok(format_response(
                &game,
                cached.score,
                signal,
                &cached.reason,
                0.0,
                None,
                true,
            ));
        }
    }

    let stats = queries::get_price_stats(pool, game_id).await?;
    let history = queries::get_price_history(pool, game_id, None, None, None).await?;
    let seasonal = queries::get_seasonal_patterns(pool, game_id).await?;

    if history.len() < MIN_HISTORY_RECORDS {
        return Err(AppError::InsufficientData(format!(
            "{} price records for {game_id}, need at least {MIN_HISTORY_RECORDS}",
            history.len()
        )));
    }

    let now = Utc::now();
    let features = features::build(&stats, &history, &seasonal, now).ok_or_else(|| {
        AppError::InsufficientData(format!("could not build features for {game_id}"))
    })?;

    let prediction = engine.predict(&features, now);

    queries::upsert_prediction(
        pool,
        game_id,
        prediction.score,
        &prediction.signal.to_string(),
        &prediction.reason,
        &serde_json::to_string(&features)?,
    )
    .await?;

    Ok(format_response(
        &game,
        prediction.score,
        prediction.signal,
        &prediction.reason,
        prediction.confidence,
        Some(&features),
        false,
    ))
}

/// One place where prediction output crosses the serialization boundary:
/// every float is sanitized here and nowhere else.
fn format_response(
    game: &GameRow,
    score: f64,
    signal: Signal,
    reason: &str,
    confidence: f64,
    features: Option<&FeatureVector>,
    from_cache: bool,
) -> PredictionResponse {
    let price_context = match features {
        Some(f) => PriceContext {
            current_price: sanitize(f.raw_current_price),
            min_price_ever: sanitize(f.raw_min_price),
            avg_price: sanitize(f.raw_avg_price),
            current_discount_pct: sanitize(f.current_discount_pct),
        },
        None => PriceContext {
            current_price: 0.0,
            min_price_ever: 0.0,
            avg_price: 0.0,
            current_discount_pct: 0.0,
        },
    };

    PredictionResponse {
        game_id: game.id.clone(),
        title: game.title.clone(),
        appid: game.appid,
        prediction: PredictionBody {
            score: sanitize(score),
            signal,
            reason: reason.to_string(),
            confidence: (sanitize(confidence) * 100.0).round() / 100.0,
        },
        price_context,
        from_cache,
    }
}
