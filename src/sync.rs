//! Ingestion orchestration: resolves identifiers against the ITAD catalog,
//! pulls full price history, and bulk-inserts with deduplication.
//!
//! Batch runs commit per record set, so an aborted run leaves every
//! finished batch intact. Per-item failures are counted, never fatal.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use sqlx::SqlitePool;
use tracing::{error, info, warn};

use crate::config::{Config, STEAMSPY_API_URL};
use crate::db::queries;
use crate::error::Result;
use crate::itad::ItadClient;
use crate::types::{GameIdentity, SyncResult, SyncRunSummary, SyncStatus};

pub struct Syncer {
    pool: SqlitePool,
    client: Arc<ItadClient>,
    cfg: Config,
}

impl Syncer {
    pub fn new(pool: SqlitePool, client: Arc<ItadClient>, cfg: Config) -> Self {
        Self { pool, client, cfg }
    }

    /// Sync one game by Steam appid: resolve, upsert the game row, fetch
    /// history since the configured floor, insert deduplicated.
    pub async fn sync_by_appid(&self, appid: i64) -> Result<SyncResult> {
        let Some(identity) = self.client.lookup_appid(appid).await else {
            return Ok(SyncResult {
                game_id: None,
                title: None,
                appid: Some(appid),
                status: SyncStatus::NotFound,
                inserted: 0,
            });
        };

        let (status, inserted) = match self.ingest_history(&identity, Some(appid)).await? {
            Some(n) => (SyncStatus::Ok, n),
            None => (SyncStatus::NoHistory, 0),
        };

        if status == SyncStatus::Ok {
            info!("synced {} ({appid}): {inserted} records", identity.title);
        }
        Ok(SyncResult {
            game_id: Some(identity.id),
            title: Some(identity.title),
            appid: Some(appid),
            status,
            inserted,
        })
    }

    /// Sync one game by ITAD game id. Used when the id is already known
    /// (e.g. picked from a search result) but the game may not exist
    /// locally yet. The identity is refreshed from the info endpoint when
    /// it answers; when it does not, a stored identity is kept as-is and
    /// the id itself stands in only for brand-new rows.
    pub async fn sync_by_game_id(&self, game_id: &str) -> Result<SyncResult> {
        let existing = queries::get_game(&self.pool, game_id).await?;

        let identity = match self.client.game_info(game_id).await {
            Some(fresh) => fresh,
            None => match existing {
                Some(row) => GameIdentity {
                    id: row.id,
                    slug: row.slug,
                    title: row.title,
                },
                None => GameIdentity {
                    id: game_id.to_string(),
                    slug: game_id.to_string(),
                    title: game_id.to_string(),
                },
            },
        };

        let (status, inserted) = match self.ingest_history(&identity, None).await? {
            Some(n) => (SyncStatus::Ok, n),
            None => (SyncStatus::NoHistory, 0),
        };

        Ok(SyncResult {
            game_id: Some(identity.id),
            title: Some(identity.title),
            appid: None,
            status,
            inserted,
        })
    }

    /// Batch sync over many appids. Lookups within a batch run
    /// concurrently (bounded by the batch size, which caps simultaneous
    /// outbound connections); history fetches are sequential per resolved
    /// id. One failed item never aborts its batch — it increments the
    /// error counter and the batch continues. A fixed courtesy delay
    /// separates batches.
    pub async fn sync_many(&self, appids: &[i64]) -> Result<SyncRunSummary> {
        let mut summary = SyncRunSummary::default();
        let total = appids.len();

        for (batch_no, batch) in appids.chunks(self.cfg.sync_batch_size).enumerate() {
            let lookups = join_all(batch.iter().map(|&appid| self.client.lookup_appid(appid))).await;

            for (&appid, lookup) in batch.iter().zip(lookups) {
                let Some(identity) = lookup else {
                    summary.errors += 1;
                    continue;
                };
                match self.ingest_history(&identity, Some(appid)).await {
                    Ok(Some(inserted)) => {
                        summary.total_games += 1;
                        summary.total_inserted += inserted;
                        summary.synced.push(appid);
                        info!("  synced {} ({appid}): {inserted} records", identity.title);
                    }
                    Ok(None) => {
                        summary.errors += 1;
                    }
                    Err(e) => {
                        warn!("sync failed for appid={appid}: {e}");
                        summary.errors += 1;
                    }
                }
            }

            let done = ((batch_no + 1) * self.cfg.sync_batch_size).min(total);
            info!(
                "progress: {done}/{total} | inserted: {}",
                summary.total_inserted
            );
            if done < total {
                tokio::time::sleep(Duration::from_secs(self.cfg.sync_batch_delay_secs)).await;
            }
        }

        info!(
            games = summary.total_games,
            inserted = summary.total_inserted,
            errors = summary.errors,
            "batch sync complete"
        );
        Ok(summary)
    }

    /// Sync the most-owned games per SteamSpy. Intended to run as a
    /// detached background task; aborting between batches loses nothing
    /// already committed.
    pub async fn sync_top(&self, top_n: usize) -> Result<SyncRunSummary> {
        let appids = self.top_appids(top_n).await;
        if appids.is_empty() {
            warn!("SteamSpy returned no appids, nothing to sync");
            return Ok(SyncRunSummary::default());
        }
        info!("starting sync of {} games", appids.len());
        self.sync_many(&appids).await
    }

    /// All-time top list from SteamSpy. Failures are logged and yield an
    /// empty list — the popularity feed is best-effort.
    async fn top_appids(&self, top_n: usize) -> Vec<i64> {
        let http = match reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
        {
            Ok(c) => c,
            Err(e) => {
                error!("failed to build SteamSpy client: {e}");
                return Vec::new();
            }
        };

        let resp = http
            .get(STEAMSPY_API_URL)
            .query(&[("request", "top100forever")])
            .send()
            .await;
        let data: serde_json::Value = match resp {
            Ok(r) if r.status().is_success() => match r.json().await {
                Ok(v) => v,
                Err(e) => {
                    error!("SteamSpy response unparseable: {e}");
                    return Vec::new();
                }
            },
            Ok(r) => {
                error!("SteamSpy returned HTTP {}", r.status());
                return Vec::new();
            }
            Err(e) => {
                error!("SteamSpy request failed: {e}");
                return Vec::new();
            }
        };

        let appids: Vec<i64> = data
            .as_object()
            .map(|obj| obj.keys().filter_map(|k| k.parse().ok()).collect())
            .unwrap_or_default();
        info!("SteamSpy: {} appids fetched", appids.len());
        appids.into_iter().take(top_n).collect()
    }

    /// Shared tail of every sync path: game row upsert, history fetch,
    /// deduplicated insert. `Ok(None)` means the game resolved but has no
    /// history upstream.
    async fn ingest_history(
        &self,
        identity: &GameIdentity,
        appid: Option<i64>,
    ) -> Result<Option<i64>> {
        queries::upsert_game(
            &self.pool,
            &identity.id,
            &identity.slug,
            &identity.title,
            appid,
        )
        .await?;

        let records = self
            .client
            .price_history(&identity.id, &self.cfg.history_since)
            .await;
        if records.is_empty() {
            return Ok(None);
        }

        let inserted = queries::insert_price_records(&self.pool, &records).await?;
        Ok(Some(inserted))
    }
}
