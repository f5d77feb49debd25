//! Database row types used by sqlx for typed queries.

use serde::Serialize;

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct GameRow {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub appid: Option<i64>,
    pub created_at: i64,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct PriceRow {
    pub timestamp: i64,
    pub price_usd: f64,
    pub regular_usd: f64,
    pub cut_pct: i64,
    pub shop_name: Option<String>,
}

/// Aggregate price stats for one game. `min_price_ts` is the most recent
/// timestamp at which the historical minimum price was observed.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct PriceStatsRow {
    pub total_records: i64,
    pub first_seen: Option<i64>,
    pub last_seen: Option<i64>,
    pub min_price: f64,
    pub max_price: f64,
    pub avg_price: f64,
    pub max_discount: i64,
    pub avg_discount_when_on_sale: f64,
    pub min_price_ts: Option<i64>,
}

/// Average discount per calendar month, sale records only.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct SeasonalRow {
    pub month: i64,
    pub avg_discount: f64,
    pub sample_count: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CachedPredictionRow {
    pub score: f64,
    pub signal: String,
    pub reason: String,
    pub features: String,
    pub computed_at: i64,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct GameListRow {
    pub id: String,
    pub title: String,
    pub appid: Option<i64>,
    pub slug: String,
    pub total_records: i64,
    pub min_price: f64,
    pub max_discount: i64,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct TopDealRow {
    pub id: String,
    pub title: String,
    pub appid: Option<i64>,
    pub slug: String,
    pub current_price: f64,
    pub regular_price: f64,
    pub discount_pct: i64,
    pub last_seen: i64,
    pub min_price: f64,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct BestPredictionRow {
    pub id: String,
    pub title: String,
    pub appid: Option<i64>,
    pub score: f64,
    pub signal: String,
    pub reason: String,
    pub current_price: f64,
    pub discount_pct: i64,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct OverviewRow {
    pub total_games: i64,
    pub total_records: i64,
    pub buy_signals: i64,
    pub wait_signals: i64,
}
