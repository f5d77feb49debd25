//! Datastore contract tests against an in-memory SQLite database.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use dealsense::db::queries;
use dealsense::types::{PriceEvent, NO_SHOP_ID};
use dealsense::MIGRATOR;

async fn test_pool() -> SqlitePool {
    // Single connection: each :memory: connection is its own database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory pool");
    MIGRATOR.run(&pool).await.expect("migrations");
    pool
}

fn record(game_id: &str, ts: i64, price: f64, cut: i64, shop_id: i64) -> PriceEvent {
    PriceEvent {
        game_id: game_id.to_string(),
        timestamp: ts,
        price_usd: price,
        regular_usd: 59.99,
        cut_pct: cut,
        shop_id,
        shop_name: "Steam".to_string(),
    }
}

#[tokio::test]
async fn insert_is_idempotent() {
    let pool = test_pool().await;
    queries::upsert_game(&pool, "g1", "game-one", "Game One", Some(10)).await.unwrap();

    let records = vec![
        record("g1", 1000, 59.99, 0, 61),
        record("g1", 2000, 29.99, 50, 61),
        record("g1", 3000, 14.99, 75, 61),
    ];
    assert_eq!(queries::insert_price_records(&pool, &records).await.unwrap(), 3);
    // Same key set again: everything deduplicated.
    assert_eq!(queries::insert_price_records(&pool, &records).await.unwrap(), 0);

    // Overlapping batch: only the genuinely new row counts.
    let mut overlap = records.clone();
    overlap.push(record("g1", 4000, 9.99, 83, 61));
    assert_eq!(queries::insert_price_records(&pool, &overlap).await.unwrap(), 1);

    let history = queries::get_price_history(&pool, "g1", None, None, None).await.unwrap();
    assert_eq!(history.len(), 4);
}

#[tokio::test]
async fn same_timestamp_different_shop_is_distinct() {
    let pool = test_pool().await;
    queries::upsert_game(&pool, "g1", "g", "G", None).await.unwrap();

    let records = vec![
        record("g1", 1000, 10.0, 50, 61),
        record("g1", 1000, 11.0, 45, 62),
        record("g1", 1000, 12.0, 40, NO_SHOP_ID),
    ];
    assert_eq!(queries::insert_price_records(&pool, &records).await.unwrap(), 3);
}

#[tokio::test]
async fn empty_batch_inserts_nothing() {
    let pool = test_pool().await;
    assert_eq!(queries::insert_price_records(&pool, &[]).await.unwrap(), 0);
}

#[tokio::test]
async fn out_of_range_cut_is_rejected_by_the_store() {
    let pool = test_pool().await;
    queries::upsert_game(&pool, "g1", "g", "G", None).await.unwrap();
    let bad = vec![record("g1", 1000, 10.0, 150, 61)];
    assert!(queries::insert_price_records(&pool, &bad).await.is_err());
    // The failed transaction must not have committed anything.
    let history = queries::get_price_history(&pool, "g1", None, None, None).await.unwrap();
    assert!(history.is_empty());
}

#[tokio::test]
async fn upsert_game_refreshes_identity_but_never_appid() {
    let pool = test_pool().await;

    queries::upsert_game(&pool, "g1", "old-slug", "Old Title", None).await.unwrap();
    let g = queries::get_game(&pool, "g1").await.unwrap().unwrap();
    assert_eq!(g.appid, None);

    // First non-null assignment sticks.
    queries::upsert_game(&pool, "g1", "new-slug", "New Title", Some(440)).await.unwrap();
    let g = queries::get_game(&pool, "g1").await.unwrap().unwrap();
    assert_eq!(g.slug, "new-slug");
    assert_eq!(g.title, "New Title");
    assert_eq!(g.appid, Some(440));

    // Later writes refresh slug/title only.
    queries::upsert_game(&pool, "g1", "newer-slug", "Newer Title", Some(999)).await.unwrap();
    let g = queries::get_game(&pool, "g1").await.unwrap().unwrap();
    assert_eq!(g.slug, "newer-slug");
    assert_eq!(g.appid, Some(440));

    assert!(queries::get_game_by_appid(&pool, 440).await.unwrap().is_some());
    assert!(queries::get_game_by_appid(&pool, 999).await.unwrap().is_none());
}

#[tokio::test]
async fn price_stats_track_most_recent_minimum() {
    let pool = test_pool().await;
    queries::upsert_game(&pool, "g1", "g", "G", None).await.unwrap();

    let records = vec![
        record("g1", 1000, 10.0, 80, 61),
        record("g1", 2000, 30.0, 0, 61),
        record("g1", 3000, 10.0, 80, 61),
        record("g1", 4000, 20.0, 50, 61),
    ];
    queries::insert_price_records(&pool, &records).await.unwrap();

    let stats = queries::get_price_stats(&pool, "g1").await.unwrap();
    assert_eq!(stats.total_records, 4);
    assert_eq!(stats.min_price, 10.0);
    assert_eq!(stats.max_price, 30.0);
    assert_eq!(stats.max_discount, 80);
    // The minimum recurs; the later occurrence wins.
    assert_eq!(stats.min_price_ts, Some(3000));
    // Mean cut over sale records only: (80 + 80 + 50) / 3.
    assert!((stats.avg_discount_when_on_sale - 70.0).abs() < 1e-9);
}

#[tokio::test]
async fn seasonal_patterns_group_sale_records_by_month() {
    let pool = test_pool().await;
    queries::upsert_game(&pool, "g1", "g", "G", None).await.unwrap();

    // 2023-11-21 and 2023-06-20, plus a full-price row that must not count.
    let records = vec![
        record("g1", 1_700_524_800, 29.99, 50, 61),
        record("g1", 1_687_219_200, 39.99, 33, 61),
        record("g1", 1_690_000_000, 59.99, 0, 61),
    ];
    queries::insert_price_records(&pool, &records).await.unwrap();

    let seasonal = queries::get_seasonal_patterns(&pool, "g1").await.unwrap();
    assert_eq!(seasonal.len(), 2);
    let november = seasonal.iter().find(|r| r.month == 11).unwrap();
    assert_eq!(november.sample_count, 1);
    assert!((november.avg_discount - 50.0).abs() < 1e-9);
    let june = seasonal.iter().find(|r| r.month == 6).unwrap();
    assert!((june.avg_discount - 33.0).abs() < 1e-9);
}

#[tokio::test]
async fn prediction_cache_expires_at_read_time() {
    let pool = test_pool().await;
    queries::upsert_game(&pool, "g1", "g", "G", None).await.unwrap();

    queries::upsert_prediction(&pool, "g1", 72.5, "BUY", "test reason", "{}").await.unwrap();
    let hit = queries::get_cached_prediction(&pool, "g1", 6).await.unwrap();
    assert!(hit.is_some());
    let hit = hit.unwrap();
    assert_eq!(hit.score, 72.5);
    assert_eq!(hit.signal, "BUY");

    // Age the entry past the TTL; it must read as absent, not be deleted.
    let stale = chrono::Utc::now().timestamp() - 7 * 3600;
    sqlx::query("UPDATE predictions_cache SET computed_at = ? WHERE game_id = ?")
        .bind(stale)
        .bind("g1")
        .execute(&pool)
        .await
        .unwrap();
    assert!(queries::get_cached_prediction(&pool, "g1", 6).await.unwrap().is_none());
    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM predictions_cache")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(rows, 1);

    // A fresh computation overwrites the prior entry entirely.
    queries::upsert_prediction(&pool, "g1", 40.0, "WAIT", "other", "{}").await.unwrap();
    let hit = queries::get_cached_prediction(&pool, "g1", 6).await.unwrap().unwrap();
    assert_eq!(hit.score, 40.0);
    assert_eq!(hit.signal, "WAIT");
}

#[tokio::test]
async fn top_deals_pick_the_latest_observation_per_game() {
    let pool = test_pool().await;
    queries::upsert_game(&pool, "g1", "g1", "Discounted", None).await.unwrap();
    queries::upsert_game(&pool, "g2", "g2", "Full Price", None).await.unwrap();

    let records = vec![
        record("g1", 1000, 59.99, 0, 61),
        record("g1", 2000, 14.99, 75, 61),
        record("g2", 1000, 9.99, 80, 61),
        record("g2", 2000, 49.99, 0, 61),
    ];
    queries::insert_price_records(&pool, &records).await.unwrap();

    let deals = queries::get_top_deals(&pool, 10).await.unwrap();
    // g2's latest observation is full price, so only g1 qualifies.
    assert_eq!(deals.len(), 1);
    assert_eq!(deals[0].id, "g1");
    assert_eq!(deals[0].discount_pct, 75);
    assert_eq!(deals[0].current_price, 14.99);
    assert_eq!(deals[0].min_price, 14.99);
}

#[tokio::test]
async fn list_games_aggregates_per_game() {
    let pool = test_pool().await;
    queries::upsert_game(&pool, "g1", "g1", "A", Some(1)).await.unwrap();
    queries::upsert_game(&pool, "g2", "g2", "B", Some(2)).await.unwrap();

    let records = vec![
        record("g1", 1000, 20.0, 50, 61),
        record("g1", 2000, 10.0, 75, 61),
        record("g2", 1000, 5.0, 90, 61),
    ];
    queries::insert_price_records(&pool, &records).await.unwrap();

    let games = queries::list_games(&pool, 50, 0).await.unwrap();
    assert_eq!(games.len(), 2);
    // Ordered by record count descending.
    assert_eq!(games[0].id, "g1");
    assert_eq!(games[0].total_records, 2);
    assert_eq!(games[0].min_price, 10.0);
    assert_eq!(games[0].max_discount, 75);
}
