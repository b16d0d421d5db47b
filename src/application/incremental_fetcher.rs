//! 증분 수집기 - incremental fetch for a single query
//!
//! 1. Count what the store already holds for the query.
//! 2. Read page 0; if the stored count covers `totalHits`, stop.
//! 3. Walk pages newest-first. Full mode keeps every hit; daily mode stops
//!    at the first hit whose `item_id` is already stored for this query.
//! 4. After each page stop when a known item was met, the page was short,
//!    or every page implied by `totalHits` has been read.
//!
//! Nothing is persisted here. A transport or store failure abandons the
//! walk and discards what was gathered so far.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::domain::{
    ExistenceOracle, FetchPhase, SearchQuery, SearchSource, StopReason, SyncCursor, SyncMode, SyncOutcome,
    SyncStatus,
};

/// 페이지 수집 설정
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchSettings {
    pub page_size: u32,
    /// Pause between consecutive page requests
    pub page_delay: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            page_size: 50,
            page_delay: Duration::from_millis(500),
        }
    }
}

/// Number of pages needed to cover `total` hits.
#[must_use]
pub fn pages_for(total: u64, page_size: u32) -> u64 {
    total.div_ceil(u64::from(page_size.max(1)))
}

pub struct IncrementalFetcher {
    source: Arc<dyn SearchSource>,
    oracle: Arc<dyn ExistenceOracle>,
    settings: FetchSettings,
}

impl IncrementalFetcher {
    pub fn new(source: Arc<dyn SearchSource>, oracle: Arc<dyn ExistenceOracle>, settings: FetchSettings) -> Self {
        Self {
            source,
            oracle,
            settings,
        }
    }

    /// Walk `query` in `mode` and return the new records it found.
    pub async fn fetch(&self, query: &SearchQuery, mode: SyncMode) -> SyncOutcome {
        let limit = self.settings.page_size.max(1);
        let mut phase = FetchPhase::Init;
        debug!("[{}] {:?} -> Counting ({})", query, phase, mode);

        phase = FetchPhase::Counting;
        let stored_count = match self.oracle.count_for_query(query).await {
            Ok(count) => count,
            Err(e) => {
                warn!("❌ [{}] store count failed: {}", query, e);
                return failed(query, mode, phase, e.to_string(), 0, &SyncCursor::new());
            }
        };

        phase = FetchPhase::Paging;
        let mut cursor = SyncCursor::new();
        let stop = loop {
            if cursor.page > 0 && !self.settings.page_delay.is_zero() {
                tokio::time::sleep(self.settings.page_delay).await;
            }

            let page = match self.source.fetch_page(query, cursor.page, limit).await {
                Ok(page) => page,
                Err(e) => {
                    warn!("❌ [{}] page {} failed: {}", query, cursor.page, e);
                    return failed(query, mode, phase, e.to_string(), stored_count, &cursor);
                }
            };
            cursor.pages_fetched += 1;

            if cursor.page == 0 {
                cursor.remote_total = page.total_hits;
                if stored_count >= page.total_hits {
                    info!("✅ [{}] already complete: stored={}, remote={}", query, stored_count, page.total_hits);
                    return SyncOutcome {
                        query: query.clone(),
                        mode,
                        status: SyncStatus::UpToDate,
                        records: Vec::new(),
                        stored_count,
                        remote_total: page.total_hits,
                        pages_fetched: cursor.pages_fetched,
                        skipped_hits: 0,
                    };
                }
                info!("🔄 [{}] needs processing: stored={}, remote={}", query, stored_count, page.total_hits);
            }

            let hit_count = page.hits.len();
            for hit in page.hits {
                let record = match hit.normalize(query, &page.url) {
                    Ok(record) => record,
                    Err(e) => {
                        debug!("[{}] dropping hit on page {}: {}", query, cursor.page, e);
                        cursor.skipped_hits += 1;
                        continue;
                    }
                };

                if mode == SyncMode::Daily {
                    match self.oracle.exists(query, &record.item_id).await {
                        Ok(true) => {
                            debug!("[{}] reached known item {} on page {}", query, record.item_id, cursor.page);
                            cursor.reached_known = true;
                            break;
                        }
                        Ok(false) => {}
                        Err(e) => {
                            warn!("❌ [{}] existence check failed: {}", query, e);
                            return failed(query, mode, phase, e.to_string(), stored_count, &cursor);
                        }
                    }
                }
                cursor.records.push(record);
            }

            if cursor.reached_known {
                break StopReason::ReachedKnownItem;
            }
            if hit_count < limit as usize {
                break StopReason::ShortPage;
            }
            if u64::from(cursor.pages_fetched) >= pages_for(cursor.remote_total, limit) {
                break StopReason::PageCountReached;
            }
            cursor.page += 1;
        };

        phase = FetchPhase::Done;
        info!(
            "📦 [{}] {:?} after {} page(s): {} new record(s) ({:?})",
            query,
            phase,
            cursor.pages_fetched,
            cursor.records.len(),
            stop
        );
        SyncOutcome {
            query: query.clone(),
            mode,
            status: SyncStatus::Synced { stop },
            records: cursor.records,
            stored_count,
            remote_total: cursor.remote_total,
            pages_fetched: cursor.pages_fetched,
            skipped_hits: cursor.skipped_hits,
        }
    }
}

fn failed(
    query: &SearchQuery,
    mode: SyncMode,
    phase: FetchPhase,
    reason: String,
    stored_count: u64,
    cursor: &SyncCursor,
) -> SyncOutcome {
    SyncOutcome {
        query: query.clone(),
        mode,
        status: SyncStatus::Failed { phase, reason },
        records: Vec::new(),
        stored_count,
        remote_total: cursor.remote_total,
        pages_fetched: cursor.pages_fetched,
        skipped_hits: cursor.skipped_hits,
    }
}
