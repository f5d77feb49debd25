//! HTTP client for the IsThereAnyDeal (ITAD) API.
//!
//! One instance is built at startup and shared. All transient upstream
//! failures are absorbed here: after the retry budget is spent, callers see
//! "no data" (None / empty), never an error. Absence of data is a normal
//! outcome for every endpoint.

use std::time::Duration;

use chrono::DateTime;
use reqwest::StatusCode;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

use crate::config::{
    Config, API_RETRIES, CONNECT_TIMEOUT_SECS, MAX_CONNECTIONS, MAX_IDLE_CONNECTIONS,
    TIMEOUT_RETRY_WAIT_SECS,
};
use crate::error::Result;
use crate::types::{GameIdentity, PriceEvent, SearchResult, NO_SHOP_ID};

pub struct ItadClient {
    http: reqwest::Client,
    /// Caps in-flight upstream requests at [`MAX_CONNECTIONS`] across
    /// every caller sharing this client.
    permits: Semaphore,
    base_url: String,
    key: String,
    country: String,
}

impl ItadClient {
    pub fn new(cfg: &Config, key: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .pool_max_idle_per_host(MAX_IDLE_CONNECTIONS)
            .build()?;

        Ok(Self {
            http,
            permits: Semaphore::new(MAX_CONNECTIONS),
            base_url: cfg.itad_api_url.clone(),
            key,
            country: cfg.itad_country.clone(),
        })
    }

    /// GET with retry. Up to [`API_RETRIES`] attempts: 429 waits
    /// `2^attempt` seconds, a timeout waits 1 second, anything else gives
    /// up immediately. Exhausted budget or non-retryable failure → `None`.
    async fn get(&self, path: &str, params: &[(&str, String)]) -> Option<Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut query: Vec<(&str, String)> = vec![("key", self.key.clone())];
        query.extend(params.iter().cloned());

        for attempt in 0..API_RETRIES {
            // Permit covers the request and body read, never a backoff wait.
            let permit = self.permits.acquire().await.ok()?;
            let resp = self.http.get(&url).query(&query).send().await;
            match resp {
                Ok(r) if r.status() == StatusCode::OK => match r.json::<Value>().await {
                    Ok(v) => return Some(v),
                    Err(e) => {
                        debug!("unparseable body from {path}: {e}");
                        return None;
                    }
                },
                Ok(r) if r.status() == StatusCode::TOO_MANY_REQUESTS => {
                    drop(permit);
                    let wait = 2u64.pow(attempt);
                    warn!("rate limit hit on {path}, waiting {wait}s");
                    tokio::time::sleep(Duration::from_secs(wait)).await;
                }
                Ok(r) => {
                    debug!("HTTP {} from {path}", r.status());
                    return None;
                }
                Err(e) if e.is_timeout() => {
                    drop(permit);
                    warn!("timeout on {path} (attempt {})", attempt + 1);
                    tokio::time::sleep(Duration::from_secs(TIMEOUT_RETRY_WAIT_SECS)).await;
                }
                Err(e) => {
                    error!("request to {path} failed: {e}");
                    return None;
                }
            }
        }
        None
    }

    // -- Endpoints ----------------------------------------------------------

    /// Resolve a Steam appid to an ITAD game identity.
    pub async fn lookup_appid(&self, appid: i64) -> Option<GameIdentity> {
        let data = self
            .get("/games/lookup/v1", &[("appid", appid.to_string())])
            .await?;
        parse_lookup(&data)
    }

    /// Title and slug for a known ITAD game id. Falls back to the id itself
    /// for any field the response omits.
    pub async fn game_info(&self, game_id: &str) -> Option<GameIdentity> {
        let data = self
            .get("/games/info/v2", &[("id", game_id.to_string())])
            .await?;
        parse_game_info(game_id, &data)
    }

    /// Full price history for a game, oldest first as served upstream.
    /// Entries that fail to normalize are skipped.
    pub async fn price_history(&self, game_id: &str, since: &str) -> Vec<PriceEvent> {
        let params = [
            ("id", game_id.to_string()),
            ("country", self.country.clone()),
            ("since", since.to_string()),
        ];
        let Some(data) = self.get("/games/history/v2", &params).await else {
            warn!("history/v2 returned nothing for game_id={game_id}");
            return Vec::new();
        };
        parse_history(game_id, &data)
    }

    pub async fn search(&self, query: &str, limit: usize) -> Vec<SearchResult> {
        let params = [
            ("title", query.to_string()),
            ("results", limit.to_string()),
        ];
        let Some(data) = self.get("/games/search/v1", &params).await else {
            return Vec::new();
        };
        let Some(items) = data.as_array() else {
            return Vec::new();
        };
        items
            .iter()
            .filter_map(|v| serde_json::from_value(v.clone()).ok())
            .collect()
    }

    /// Current prices for a set of games in one call. Returned raw; the
    /// caller decides what to pick out.
    pub async fn current_prices(&self, game_ids: &[String]) -> Value {
        if game_ids.is_empty() {
            return Value::Null;
        }
        let params = [
            ("id", game_ids.join(",")),
            ("country", self.country.clone()),
        ];
        self.get("/games/prices/v3", &params)
            .await
            .unwrap_or(Value::Null)
    }
}

// ---------------------------------------------------------------------------
// Response normalization — pure functions over the raw JSON
// ---------------------------------------------------------------------------

fn parse_lookup(data: &Value) -> Option<GameIdentity> {
    if !data.get("found").and_then(Value::as_bool).unwrap_or(false) {
        return None;
    }
    let game = data.get("game")?;
    Some(GameIdentity {
        id: game.get("id")?.as_str()?.to_string(),
        slug: game.get("slug").and_then(Value::as_str).unwrap_or_default().to_string(),
        title: game.get("title").and_then(Value::as_str).unwrap_or_default().to_string(),
    })
}

fn parse_game_info(game_id: &str, data: &Value) -> Option<GameIdentity> {
    // Historically both a bare object and a one-element list.
    let item = match data {
        Value::Array(items) => items.first()?,
        Value::Object(_) => data,
        _ => return None,
    };
    let title = item
        .get("title")
        .or_else(|| item.get("name"))
        .and_then(Value::as_str)
        .unwrap_or(game_id);
    let slug = item.get("slug").and_then(Value::as_str).unwrap_or(game_id);
    Some(GameIdentity {
        id: game_id.to_string(),
        slug: slug.to_string(),
        title: title.to_string(),
    })
}

/// Normalize a history response. The endpoint has served two shapes: a bare
/// list of price events, or an object wrapping the same list under
/// `prices`. Price, regular and cut come from a nested `deal` object when
/// present, falling back to the entry root.
pub fn parse_history(game_id: &str, data: &Value) -> Vec<PriceEvent> {
    let entries = match data {
        Value::Array(items) => items.as_slice(),
        Value::Object(_) => data
            .get("prices")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]),
        _ => &[],
    };

    entries
        .iter()
        .filter_map(|entry| parse_history_entry(game_id, entry))
        .collect()
}

fn parse_history_entry(game_id: &str, entry: &Value) -> Option<PriceEvent> {
    let timestamp = parse_timestamp(entry.get("timestamp")?)?;

    let deal = match entry.get("deal") {
        Some(d) if d.is_object() => d,
        _ => entry,
    };
    let price = deal
        .get("price")
        .or_else(|| entry.get("price"))
        .and_then(amount)
        .unwrap_or(0.0);
    let regular = deal
        .get("regular")
        .or_else(|| entry.get("regular"))
        .and_then(amount)
        .unwrap_or(0.0);
    let cut = deal
        .get("cut")
        .or_else(|| entry.get("cut"))
        .and_then(Value::as_i64)
        .unwrap_or(0);
    if !(0..=100).contains(&cut) {
        debug!("dropping history entry with cut_pct={cut} for {game_id}");
        return None;
    }

    let shop = entry.get("shop");
    let shop_id = shop
        .and_then(|s| s.get("id"))
        .and_then(Value::as_i64)
        .unwrap_or(NO_SHOP_ID);
    let shop_name = shop
        .and_then(|s| s.get("name"))
        .and_then(Value::as_str)
        .unwrap_or("Steam")
        .to_string();

    Some(PriceEvent {
        game_id: game_id.to_string(),
        timestamp,
        price_usd: price,
        regular_usd: regular,
        cut_pct: cut,
        shop_id,
        shop_name,
    })
}

fn amount(v: &Value) -> Option<f64> {
    v.get("amount").and_then(Value::as_f64)
}

/// Timestamps arrive as RFC 3339 strings; integer Unix seconds are accepted
/// for robustness.
fn parse_timestamp(v: &Value) -> Option<i64> {
    if let Some(n) = v.as_i64() {
        return Some(n);
    }
    let s = v.as_str()?;
    DateTime::parse_from_rfc3339(s).ok().map(|t| t.timestamp())
}
