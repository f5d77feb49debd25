use serde::{Deserialize, Serialize};

/// `shop_id` value stored when the upstream record carries no shop, so the
/// `(game_id, timestamp, shop_id)` unique key treats "no shop" as one key.
pub const NO_SHOP_ID: i64 = -1;

// ---------------------------------------------------------------------------
// Game identity
// ---------------------------------------------------------------------------

/// Identity of a game as resolved against the ITAD catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameIdentity {
    pub id: String,
    pub slug: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub title: String,
}

// ---------------------------------------------------------------------------
// Price observations
// ---------------------------------------------------------------------------

/// One normalized price observation, ready to insert. Immutable once
/// stored; duplicates on `(game_id, timestamp, shop_id)` are dropped.
#[derive(Debug, Clone, Serialize)]
pub struct PriceEvent {
    pub game_id: String,
    /// Unix seconds, UTC.
    pub timestamp: i64,
    pub price_usd: f64,
    pub regular_usd: f64,
    /// Integer percent off the regular price, always within 0–100.
    pub cut_pct: i64,
    pub shop_id: i64,
    pub shop_name: String,
}

// ---------------------------------------------------------------------------
// Buy/wait signal
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "WAIT")]
    Wait,
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Signal::Buy => write!(f, "BUY"),
            Signal::Wait => write!(f, "WAIT"),
        }
    }
}

impl std::str::FromStr for Signal {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        match s {
            "BUY" => Ok(Signal::Buy),
            "WAIT" => Ok(Signal::Wait),
            _ => Err(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Sync outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Resolved, history fetched, records committed (possibly 0 new).
    Ok,
    /// Identifier unresolvable upstream. A normal response, not a fault.
    NotFound,
    /// Resolved but the history endpoint returned nothing.
    NoHistory,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::Ok => write!(f, "ok"),
            SyncStatus::NotFound => write!(f, "not_found"),
            SyncStatus::NoHistory => write!(f, "no_history"),
        }
    }
}

/// Outcome of a single-item sync.
#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appid: Option<i64>,
    pub status: SyncStatus,
    pub inserted: i64,
}

/// Aggregate outcome of a batch sync run. Ephemeral — logged and returned,
/// never persisted.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncRunSummary {
    pub total_games: u64,
    pub total_inserted: i64,
    pub errors: u64,
    pub synced: Vec<i64>,
}

// ---------------------------------------------------------------------------
// Prediction response — the shape handed to the route layer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct PredictionBody {
    pub score: f64,
    pub signal: Signal,
    pub reason: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PriceContext {
    pub current_price: f64,
    pub min_price_ever: f64,
    pub avg_price: f64,
    pub current_discount_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictionResponse {
    pub game_id: String,
    pub title: String,
    pub appid: Option<i64>,
    pub prediction: PredictionBody,
    pub price_context: PriceContext,
    pub from_cache: bool,
}
