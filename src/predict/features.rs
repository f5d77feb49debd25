//! Feature extraction: price stats + history + seasonal patterns in, one
//! fixed feature vector out. Pure — no clock reads, no I/O; `now` is an
//! argument so results are reproducible.

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;

use crate::config::MIN_HISTORY_RECORDS;
use crate::db::models::{PriceRow, PriceStatsRow, SeasonalRow};

const Q4_MONTHS: [i64; 3] = [10, 11, 12];
const SUMMER_MONTHS: [i64; 3] = [6, 7, 8];

/// Fixed feature vector consumed by the scoring engine. The serialized form
/// is what gets persisted with a cache entry; the `raw_*` fields exist only
/// for response formatting and are skipped.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureVector {
    pub current_price: f64,
    pub min_price: f64,
    pub max_price: f64,
    pub avg_price: f64,
    pub max_discount: f64,
    pub current_discount_pct: f64,
    /// Days since the most recent occurrence of the historical minimum.
    pub days_since_min_price: f64,
    pub avg_discount_when_on_sale: f64,
    /// Mean sale discount across October–December observations.
    pub seasonal_cut_q4: f64,
    /// Mean sale discount across June–August observations.
    pub seasonal_cut_summer: f64,
    #[serde(skip)]
    pub raw_current_price: f64,
    #[serde(skip)]
    pub raw_min_price: f64,
    #[serde(skip)]
    pub raw_avg_price: f64,
}

impl FeatureVector {
    /// Named view of the persisted features, in a stable order. Used by the
    /// trained-model path and for the `features_used` response field.
    pub fn as_map(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("current_price", self.current_price),
            ("min_price", self.min_price),
            ("max_price", self.max_price),
            ("avg_price", self.avg_price),
            ("max_discount", self.max_discount),
            ("current_discount_pct", self.current_discount_pct),
            ("days_since_min_price", self.days_since_min_price),
            ("avg_discount_when_on_sale", self.avg_discount_when_on_sale),
            ("seasonal_cut_q4", self.seasonal_cut_q4),
            ("seasonal_cut_summer", self.seasonal_cut_summer),
        ]
    }
}

/// Map non-finite values to 0.0. Every feature crosses a JSON boundary
/// eventually, and JSON cannot represent NaN or infinity.
pub fn sanitize(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// Build the feature vector, or `None` when the history is too thin to say
/// anything (< 3 observations). `history` must be ordered timestamp
/// ascending, as the history query returns it.
pub fn build(
    stats: &PriceStatsRow,
    history: &[PriceRow],
    seasonal: &[SeasonalRow],
    now: DateTime<Utc>,
) -> Option<FeatureVector> {
    if history.len() < MIN_HISTORY_RECORDS {
        return None;
    }
    let last = history.last()?;

    let current_price = sanitize(last.price_usd);
    let min_price = sanitize(stats.min_price);
    let max_price = sanitize(stats.max_price);
    let avg_price = sanitize(stats.avg_price);

    let days_since_min = stats
        .min_price_ts
        .map(|ts| ((now.timestamp() - ts) as f64 / 86_400.0).max(0.0))
        .unwrap_or(0.0);

    Some(FeatureVector {
        current_price,
        min_price,
        max_price,
        avg_price,
        max_discount: stats.max_discount as f64,
        current_discount_pct: last.cut_pct as f64,
        days_since_min_price: sanitize(days_since_min),
        avg_discount_when_on_sale: sanitize(stats.avg_discount_when_on_sale),
        seasonal_cut_q4: seasonal_mean(seasonal, &Q4_MONTHS),
        seasonal_cut_summer: seasonal_mean(seasonal, &SUMMER_MONTHS),
        raw_current_price: current_price,
        raw_min_price: min_price,
        raw_avg_price: avg_price,
    })
}

/// Sample-weighted mean discount across the given months. Seasonal rows
/// only cover sale observations, so the cut > 0 gate is already applied.
fn seasonal_mean(seasonal: &[SeasonalRow], months: &[i64]) -> f64 {
    let mut sum = 0.0;
    let mut n: i64 = 0;
    for row in seasonal.iter().filter(|r| months.contains(&r.month)) {
        sum += row.avg_discount * row.sample_count as f64;
        n += row.sample_count;
    }
    if n == 0 {
        0.0
    } else {
        sanitize(sum / n as f64)
    }
}

/// Calendar month (1–12, UTC) of the given instant.
pub fn month_of(now: DateTime<Utc>) -> u32 {
    now.month()
}
