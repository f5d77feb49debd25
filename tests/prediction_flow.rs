//! End-to-end prediction pipeline tests: cache behavior, thin-history
//! refusal, and response shape, all against an in-memory database.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use dealsense::config::Config;
use dealsense::db::queries;
use dealsense::error::AppError;
use dealsense::predict::service::get_prediction;
use dealsense::predict::ScoringEngine;
use dealsense::types::PriceEvent;
use dealsense::MIGRATOR;

async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory pool");
    MIGRATOR.run(&pool).await.expect("migrations");
    pool
}

fn test_config() -> Config {
    Config {
        itad_api_url: "http://unused.invalid".to_string(),
        itad_api_key: None,
        itad_country: "US".to_string(),
        history_since: "2019-01-01".to_string(),
        request_timeout_secs: 30,
        sync_batch_size: 20,
        sync_batch_delay_secs: 0,
        cache_ttl_hours: 6,
        model_path: "does-not-exist.json".to_string(),
        db_path: ":memory:".to_string(),
        api_port: 0,
        log_level: "info".to_string(),
    }
}

fn record(game_id: &str, ts: i64, price: f64, cut: i64) -> PriceEvent {
    PriceEvent {
        game_id: game_id.to_string(),
        timestamp: ts,
        price_usd: price,
        regular_usd: 59.99,
        cut_pct: cut,
        shop_id: 61,
        shop_name: "Steam".to_string(),
    }
}

async fn seed_game(pool: &SqlitePool, game_id: &str, records: &[PriceEvent]) {
    queries::upsert_game(pool, game_id, game_id, "Seeded Game", Some(10))
        .await
        .unwrap();
    queries::insert_price_records(pool, records).await.unwrap();
}

#[tokio::test]
async fn fresh_prediction_then_cache_hit() {
    let pool = test_pool().await;
    let cfg = test_config();
    let engine = ScoringEngine::heuristic();

    let now = chrono::Utc::now().timestamp();
    seed_game(
        &pool,
        "g1",
        &[
            record("g1", now - 30 * 86_400, 59.99, 0),
            record("g1", now - 15 * 86_400, 29.99, 50),
            record("g1", now - 86_400, 14.99, 75),
        ],
    )
    .await;

    let first = get_prediction(&pool, &engine, &cfg, "g1", false).await.unwrap();
    assert!(!first.from_cache);
    assert!(first.prediction.score >= 0.0 && first.prediction.score <= 100.0);
    assert!(first.prediction.confidence > 0.0);
    assert!((first.price_context.current_discount_pct - 75.0).abs() < 1e-9);
    assert!((first.price_context.current_price - 14.99).abs() < 1e-9);

    let second = get_prediction(&pool, &engine, &cfg, "g1", false).await.unwrap();
    assert!(second.from_cache);
    assert_eq!(second.prediction.score, first.prediction.score);
    assert_eq!(second.prediction.signal, first.prediction.signal);
    assert_eq!(second.prediction.reason, first.prediction.reason);
    // The cache keeps only what re-rendering needs.
    assert_eq!(second.prediction.confidence, 0.0);
    assert_eq!(second.price_context.current_price, 0.0);
}

#[tokio::test]
async fn force_refresh_bypasses_the_cache() {
    let pool = test_pool().await;
    let cfg = test_config();
    let engine = ScoringEngine::heuristic();

    let now = chrono::Utc::now().timestamp();
    seed_game(
        &pool,
        "g1",
        &[
            record("g1", now - 3000, 59.99, 0),
            record("g1", now - 2000, 29.99, 50),
            record("g1", now - 1000, 14.99, 75),
        ],
    )
    .await;

    get_prediction(&pool, &engine, &cfg, "g1", false).await.unwrap();
    let forced = get_prediction(&pool, &engine, &cfg, "g1", true).await.unwrap();
    assert!(!forced.from_cache);
}

#[tokio::test]
async fn stale_cache_entry_triggers_recompute() {
    let pool = test_pool().await;
    let cfg = test_config();
    let engine = ScoringEngine::heuristic();

    let now = chrono::Utc::now().timestamp();
    seed_game(
        &pool,
        "g1",
        &[
            record("g1", now - 3000, 59.99, 0),
            record("g1", now - 2000, 29.99, 50),
            record("g1", now - 1000, 14.99, 75),
        ],
    )
    .await;

    get_prediction(&pool, &engine, &cfg, "g1", false).await.unwrap();
    sqlx::query("UPDATE predictions_cache SET computed_at = ? WHERE game_id = ?")
        .bind(now - 7 * 3600)
        .bind("g1")
        .execute(&pool)
        .await
        .unwrap();

    let refreshed = get_prediction(&pool, &engine, &cfg, "g1", false).await.unwrap();
    assert!(!refreshed.from_cache);
    assert!(refreshed.prediction.confidence > 0.0);
}

#[tokio::test]
async fn two_records_is_refused_three_is_enough() {
    let pool = test_pool().await;
    let cfg = test_config();
    let engine = ScoringEngine::heuristic();

    let now = chrono::Utc::now().timestamp();
    seed_game(
        &pool,
        "thin",
        &[
            record("thin", now - 2000, 29.99, 50),
            record("thin", now - 1000, 14.99, 75),
        ],
    )
    .await;

    let err = get_prediction(&pool, &engine, &cfg, "thin", false).await.unwrap_err();
    assert!(matches!(err, AppError::InsufficientData(_)));

    // The refusal must not leave a cache entry behind.
    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM predictions_cache")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(rows, 0);

    // One more observation crosses the threshold.
    queries::insert_price_records(&pool, &[record("thin", now - 500, 9.99, 83)])
        .await
        .unwrap();
    let resp = get_prediction(&pool, &engine, &cfg, "thin", false).await.unwrap();
    assert!(!resp.from_cache);
}

#[tokio::test]
async fn unknown_game_is_not_found() {
    let pool = test_pool().await;
    let cfg = test_config();
    let engine = ScoringEngine::heuristic();

    let err = get_prediction(&pool, &engine, &cfg, "missing", false).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}
