//! Every SQL statement in the crate lives here. Other modules call these
//! functions; none of them write SQL of their own.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::db::models::{
    BestPredictionRow, CachedPredictionRow, GameListRow, GameRow, OverviewRow, PriceRow,
    PriceStatsRow, SeasonalRow, TopDealRow,
};
use crate::error::Result;
use crate::types::PriceEvent;

// ---------------------------------------------------------------------------
// games
// ---------------------------------------------------------------------------

/// Insert or refresh a game row in one atomic statement. Slug and title are
/// always refreshed; `appid` participates in a unique index and is set at
/// most once — `COALESCE` keeps the first non-null assignment forever.
pub async fn upsert_game(
    pool: &SqlitePool,
    game_id: &str,
    slug: &str,
    title: &str,
    appid: Option<i64>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO games (id, slug, title, appid)
        VALUES (?, ?, ?, ?)
        ON CONFLICT (id) DO UPDATE SET
            slug  = excluded.slug,
            title = excluded.title,
            appid = COALESCE(games.appid, excluded.appid)
        "#,
    )
    .bind(game_id)
    .bind(slug)
    .bind(title)
    .bind(appid)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_game(pool: &SqlitePool, game_id: &str) -> Result<Option<GameRow>> {
    let row = sqlx::query_as::<_, GameRow>(
        "SELECT id, slug, title, appid, created_at FROM games WHERE id = ?",
    )
    .bind(game_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn get_game_by_appid(pool: &SqlitePool, appid: i64) -> Result<Option<GameRow>> {
    let row = sqlx::query_as::<_, GameRow>(
        "SELECT id, slug, title, appid, created_at FROM games WHERE appid = ?",
    )
    .bind(appid)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn list_games(pool: &SqlitePool, limit: i64, offset: i64) -> Result<Vec<GameListRow>> {
    let rows = sqlx::query_as::<_, GameListRow>(
        r#"
        SELECT g.id, g.title, g.appid, g.slug,
               COUNT(ph.id)                               AS total_records,
               CAST(COALESCE(MIN(ph.price_usd), 0) AS REAL) AS min_price,
               COALESCE(MAX(ph.cut_pct), 0)               AS max_discount
        FROM games g
        LEFT JOIN price_history ph ON g.id = ph.game_id
        GROUP BY g.id, g.title, g.appid, g.slug
        ORDER BY total_records DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// price_history
// ---------------------------------------------------------------------------

/// Conflict-safe batch insert. Rows whose `(game_id, timestamp, shop_id)`
/// key already exists are dropped by the store, so the inserted count is
/// derived from the table row-count delta; the counts and the inserts share
/// one transaction so a concurrent writer cannot skew the delta.
pub async fn insert_price_records(pool: &SqlitePool, records: &[PriceEvent]) -> Result<i64> {
    if records.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await?;

    let before: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM price_history")
        .fetch_one(&mut *tx)
        .await?;

    for r in records {
        sqlx::query(
            r#"
            INSERT INTO price_history
                (game_id, timestamp, price_usd, regular_usd, cut_pct, shop_id, shop_name)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (game_id, timestamp, shop_id) DO NOTHING
            "#,
        )
        .bind(&r.game_id)
        .bind(r.timestamp)
        .bind(r.price_usd)
        .bind(r.regular_usd)
        .bind(r.cut_pct)
        .bind(r.shop_id)
        .bind(&r.shop_name)
        .execute(&mut *tx)
        .await?;
    }

    let after: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM price_history")
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;

    let inserted = after - before;
    debug!(
        inserted,
        attempted = records.len(),
        "price batch committed"
    );
    Ok(inserted)
}

/// Price history ordered by timestamp ascending, with optional filters.
pub async fn get_price_history(
    pool: &SqlitePool,
    game_id: &str,
    since: Option<i64>,
    until: Option<i64>,
    shop_id: Option<i64>,
) -> Result<Vec<PriceRow>> {
    let mut sql = String::from(
        "SELECT timestamp, price_usd, regular_usd, cut_pct, shop_name \
         FROM price_history WHERE game_id = ?",
    );
    if since.is_some() {
        sql.push_str(" AND timestamp >= ?");
    }
    if until.is_some() {
        sql.push_str(" AND timestamp <= ?");
    }
    if shop_id.is_some() {
        sql.push_str(" AND shop_id = ?");
    }
    sql.push_str(" ORDER BY timestamp ASC");

    let mut query = sqlx::query_as::<_, PriceRow>(&sql).bind(game_id);
    if let Some(s) = since {
        query = query.bind(s);
    }
    if let Some(u) = until {
        query = query.bind(u);
    }
    if let Some(sid) = shop_id {
        query = query.bind(sid);
    }

    Ok(query.fetch_all(pool).await?)
}

pub async fn get_price_stats(pool: &SqlitePool, game_id: &str) -> Result<PriceStatsRow> {
    let row = sqlx::query_as::<_, PriceStatsRow>(
        r#"
        SELECT
            COUNT(*)                                      AS total_records,
            MIN(timestamp)                                AS first_seen,
            MAX(timestamp)                                AS last_seen,
            CAST(COALESCE(MIN(price_usd), 0) AS REAL)     AS min_price,
            CAST(COALESCE(MAX(price_usd), 0) AS REAL)     AS max_price,
            CAST(COALESCE(AVG(price_usd), 0) AS REAL)     AS avg_price,
            COALESCE(MAX(cut_pct), 0)                     AS max_discount,
            CAST(COALESCE(AVG(CASE WHEN cut_pct > 0 THEN CAST(cut_pct AS REAL) END), 0) AS REAL)
                                                          AS avg_discount_when_on_sale,
            (SELECT MAX(p2.timestamp) FROM price_history p2
             WHERE p2.game_id = p1.game_id
               AND p2.price_usd = (SELECT MIN(p3.price_usd) FROM price_history p3
                                   WHERE p3.game_id = p1.game_id)
            )                                             AS min_price_ts
        FROM price_history p1
        WHERE game_id = ?
        "#,
    )
    .bind(game_id)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Average discount grouped by calendar month, sale records only.
pub async fn get_seasonal_patterns(pool: &SqlitePool, game_id: &str) -> Result<Vec<SeasonalRow>> {
    let rows = sqlx::query_as::<_, SeasonalRow>(
        r#"
        SELECT
            CAST(strftime('%m', timestamp, 'unixepoch') AS INTEGER) AS month,
            CAST(AVG(cut_pct) AS REAL)                              AS avg_discount,
            COUNT(*)                                                AS sample_count
        FROM price_history
        WHERE game_id = ? AND cut_pct > 0
        GROUP BY month
        ORDER BY month
        "#,
    )
    .bind(game_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// predictions_cache
// ---------------------------------------------------------------------------

/// Cached prediction if present and younger than `max_age_hours`. Expired
/// rows are treated as absent, never deleted here.
pub async fn get_cached_prediction(
    pool: &SqlitePool,
    game_id: &str,
    max_age_hours: i64,
) -> Result<Option<CachedPredictionRow>> {
    let cutoff = Utc::now().timestamp() - max_age_hours * 3600;
    let row = sqlx::query_as::<_, CachedPredictionRow>(
        r#"
        SELECT score, signal, reason, features, computed_at
        FROM predictions_cache
        WHERE game_id = ? AND computed_at > ?
        "#,
    )
    .bind(game_id)
    .bind(cutoff)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Full overwrite: a fresh computation replaces the prior entry entirely.
pub async fn upsert_prediction(
    pool: &SqlitePool,
    game_id: &str,
    score: f64,
    signal: &str,
    reason: &str,
    features_json: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO predictions_cache (game_id, score, signal, reason, features, computed_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT (game_id) DO UPDATE SET
            score       = excluded.score,
            signal      = excluded.signal,
            reason      = excluded.reason,
            features    = excluded.features,
            computed_at = excluded.computed_at
        "#,
    )
    .bind(game_id)
    .bind(score)
    .bind(signal)
    .bind(reason)
    .bind(features_json)
    .bind(Utc::now().timestamp())
    .execute(pool)
    .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// dashboard
// ---------------------------------------------------------------------------

pub async fn get_overview_stats(pool: &SqlitePool) -> Result<OverviewRow> {
    let row = sqlx::query_as::<_, OverviewRow>(
        r#"
        SELECT
            (SELECT COUNT(*) FROM games)         AS total_games,
            (SELECT COUNT(*) FROM price_history) AS total_records,
            (SELECT COUNT(DISTINCT game_id) FROM predictions_cache
             WHERE signal = 'BUY')               AS buy_signals,
            (SELECT COUNT(DISTINCT game_id) FROM predictions_cache
             WHERE signal = 'WAIT')              AS wait_signals
        "#,
    )
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Games with the best discount on their latest observation. Latest row per
/// game is picked with `ROW_NUMBER() OVER` since SQLite has no DISTINCT ON.
pub async fn get_top_deals(pool: &SqlitePool, limit: i64) -> Result<Vec<TopDealRow>> {
    let rows = sqlx::query_as::<_, TopDealRow>(
        r#"
        WITH ranked AS (
            SELECT game_id, price_usd, regular_usd, cut_pct, timestamp,
                   ROW_NUMBER() OVER (PARTITION BY game_id ORDER BY timestamp DESC) AS rn
            FROM price_history
        ),
        latest AS (
            SELECT game_id, price_usd, regular_usd, cut_pct, timestamp
            FROM ranked WHERE rn = 1
        ),
        mins AS (
            SELECT game_id, MIN(price_usd) AS min_price
            FROM price_history GROUP BY game_id
        )
        SELECT g.id, g.title, g.appid, g.slug,
               CAST(l.price_usd AS REAL)    AS current_price,
               CAST(l.regular_usd AS REAL)  AS regular_price,
               l.cut_pct                    AS discount_pct,
               l.timestamp                  AS last_seen,
               CAST(COALESCE(m.min_price, l.price_usd) AS REAL) AS min_price
        FROM latest l
        JOIN games g ON g.id = l.game_id
        JOIN mins m ON m.game_id = l.game_id
        WHERE l.cut_pct > 0
        ORDER BY l.cut_pct DESC, l.price_usd ASC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn get_best_predictions(
    pool: &SqlitePool,
    signal: &str,
    limit: i64,
) -> Result<Vec<BestPredictionRow>> {
    let rows = sqlx::query_as::<_, BestPredictionRow>(
        r#"
        WITH ranked_price AS (
            SELECT game_id, price_usd, cut_pct,
                   ROW_NUMBER() OVER (PARTITION BY game_id ORDER BY timestamp DESC) AS rn
            FROM price_history
        ),
        latest_price AS (
            SELECT game_id, price_usd, cut_pct FROM ranked_price WHERE rn = 1
        )
        SELECT g.id, g.title, g.appid,
               pc.score, pc.signal, pc.reason,
               CAST(COALESCE(lp.price_usd, 0) AS REAL) AS current_price,
               COALESCE(lp.cut_pct, 0)                 AS discount_pct
        FROM predictions_cache pc
        JOIN games g ON g.id = pc.game_id
        LEFT JOIN latest_price lp ON lp.game_id = pc.game_id
        WHERE pc.signal = ?
        ORDER BY pc.score DESC
        LIMIT ?
        "#,
    )
    .bind(signal)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
