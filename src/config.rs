use crate::error::{AppError, Result};

pub const ITAD_API_URL: &str = "https://api.isthereanydeal.com";
pub const STEAMSPY_API_URL: &str = "https://steamspy.com/api.php";

/// Attempt budget for a single logical upstream call (429s and timeouts
/// consume attempts; other failures abandon immediately).
pub const API_RETRIES: u32 = 3;

/// Flat wait before retrying a timed-out attempt (seconds).
pub const TIMEOUT_RETRY_WAIT_SECS: u64 = 1;

/// Upstream client timeouts (seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 10;
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Hard cap on concurrent upstream connections, shared across every
/// caller of the client.
pub const MAX_CONNECTIONS: usize = 20;

/// Idle connections kept alive in the shared upstream client pool.
pub const MAX_IDLE_CONNECTIONS: usize = 10;

/// Minimum price observations required before a prediction is computed.
pub const MIN_HISTORY_RECORDS: usize = 3;

/// Scores at or above this map to BUY, below to WAIT.
pub const BUY_THRESHOLD: f64 = 60.0;

#[derive(Debug, Clone)]
pub struct Config {
    pub itad_api_url: String,
    /// Missing key disables the sync endpoints but never blocks startup.
    pub itad_api_key: Option<String>,
    /// Country code sent to pricing endpoints (ITAD_COUNTRY).
    pub itad_country: String,
    /// Earliest date requested from the history endpoint (ITAD_HISTORY_SINCE).
    pub history_since: String,
    /// Total per-request timeout for upstream calls (REQUEST_TIMEOUT_SECS).
    pub request_timeout_secs: u64,
    /// Appids per concurrent lookup batch (SYNC_BATCH_SIZE).
    pub sync_batch_size: usize,
    /// Courtesy pause between batches, independent of per-request backoff
    /// (SYNC_BATCH_DELAY_SECS).
    pub sync_batch_delay_secs: u64,
    /// Prediction cache entries older than this are treated as absent
    /// (CACHE_TTL_HOURS).
    pub cache_ttl_hours: i64,
    /// Trained model artifact; absent means heuristic fallback (MODEL_PATH).
    pub model_path: String,
    pub db_path: String,
    pub api_port: u16,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let itad_api_key = std::env::var("ITAD_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());

        Ok(Self {
            itad_api_url: std::env::var("ITAD_API_URL")
                .unwrap_or_else(|_| ITAD_API_URL.to_string()),
            itad_api_key,
            itad_country: std::env::var("ITAD_COUNTRY").unwrap_or_else(|_| "US".to_string()),
            history_since: std::env::var("ITAD_HISTORY_SINCE")
                .unwrap_or_else(|_| "2019-01-01".to_string()),
            request_timeout_secs: std::env::var("REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| REQUEST_TIMEOUT_SECS.to_string())
                .parse::<u64>()
                .unwrap_or(REQUEST_TIMEOUT_SECS),
            sync_batch_size: std::env::var("SYNC_BATCH_SIZE")
                .unwrap_or_else(|_| "20".to_string())
                .parse::<usize>()
                .unwrap_or(20)
                .max(1),
            sync_batch_delay_secs: std::env::var("SYNC_BATCH_DELAY_SECS")
                .unwrap_or_else(|_| "2".to_string())
                .parse::<u64>()
                .unwrap_or(2),
            cache_ttl_hours: std::env::var("CACHE_TTL_HOURS")
                .unwrap_or_else(|_| "6".to_string())
                .parse::<i64>()
                .unwrap_or(6),
            model_path: std::env::var("MODEL_PATH").unwrap_or_else(|_| "model.json".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "dealsense.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}
