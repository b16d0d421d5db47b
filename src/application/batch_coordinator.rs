//! 배치 조정자 - runs many queries through the incremental fetcher
//!
//! Queries are taken in outer batches. Inside a batch each query gets its own
//! task, at most `workers` of them in flight, and its records are written the
//! moment its walk completes. A failing or panicking task only costs its own
//! query. Batches are separated by a politeness delay.

use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tracing::{error, info, warn};

use crate::application::incremental_fetcher::IncrementalFetcher;
use crate::domain::{BatchStatistics, SalesSink, SearchQuery, SyncMode, SyncOutcome, SyncStatus};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("no queries to process")]
    NoQueries,
}

/// 배치 설정
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorSettings {
    pub mode: SyncMode,
    pub batch_size: usize,
    pub workers: usize,
    pub batch_delay: Duration,
}

impl CoordinatorSettings {
    /// Defaults for `mode`: 50 queries / 50 workers / 2s for full runs,
    /// 20 / 20 / 1s for daily runs.
    #[must_use]
    pub const fn for_mode(mode: SyncMode) -> Self {
        match mode {
            SyncMode::Full => Self {
                mode,
                batch_size: 50,
                workers: 50,
                batch_delay: Duration::from_secs(2),
            },
            SyncMode::Daily => Self {
                mode,
                batch_size: 20,
                workers: 20,
                batch_delay: Duration::from_secs(1),
            },
        }
    }
}

pub struct BatchCoordinator {
    fetcher: Arc<IncrementalFetcher>,
    sink: Arc<dyn SalesSink>,
    settings: CoordinatorSettings,
}

impl BatchCoordinator {
    pub fn new(fetcher: Arc<IncrementalFetcher>, sink: Arc<dyn SalesSink>, settings: CoordinatorSettings) -> Self {
        Self {
            fetcher,
            sink,
            settings,
        }
    }

    /// Process every query and return the combined statistics.
    pub async fn run(&self, queries: &[SearchQuery]) -> Result<BatchStatistics, CoordinatorError> {
        if queries.is_empty() {
            return Err(CoordinatorError::NoQueries);
        }

        let started = Instant::now();
        let batch_size = self.settings.batch_size.max(1);
        let batch_count = queries.len().div_ceil(batch_size);
        info!(
            "🚀 Starting {} sync: {} queries in {} batch(es) of up to {} ({} workers)",
            self.settings.mode,
            queries.len(),
            batch_count,
            batch_size,
            self.settings.workers
        );

        let mut totals = BatchStatistics {
            total_queries: queries.len() as u64,
            ..BatchStatistics::default()
        };

        for (index, batch) in queries.chunks(batch_size).enumerate() {
            info!("📦 Batch {}/{} ({} queries)", index + 1, batch_count, batch.len());
            let stats = self.run_batch(batch).await;
            info!(
                "✅ Batch {}/{} done: {} updated, {} up to date, {} failed, {} inserted",
                index + 1,
                batch_count,
                stats.queries_updated,
                stats.queries_up_to_date,
                stats.queries_failed,
                stats.inserted
            );
            totals.merge(stats);

            if index + 1 < batch_count && !self.settings.batch_delay.is_zero() {
                tokio::time::sleep(self.settings.batch_delay).await;
            }
        }

        info!("🏁 {} sync finished in {:.1?}", self.settings.mode, started.elapsed());
        Ok(totals)
    }

    /// Run one batch with a pool of `min(len, workers)` concurrent tasks.
    async fn run_batch(&self, batch: &[SearchQuery]) -> BatchStatistics {
        let stats = Arc::new(Mutex::new(BatchStatistics::default()));
        let pool_size = self.settings.workers.clamp(1, batch.len().max(1));
        let semaphore = Arc::new(Semaphore::new(pool_size));
        let mode = self.settings.mode;

        let mut handles = Vec::with_capacity(batch.len());
        for query in batch {
            let semaphore = Arc::clone(&semaphore);
            let fetcher = Arc::clone(&self.fetcher);
            let sink = Arc::clone(&self.sink);
            let stats = Arc::clone(&stats);
            let task_query = query.clone();

            let handle = tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    stats.lock().await.record_failure(task_query);
                    return;
                };
                let outcome = fetcher.fetch(&task_query, mode).await;
                persist_outcome(outcome, sink.as_ref(), &stats).await;
            });
            handles.push(handle);
        }

        let results = join_all(handles).await;
        for (query, result) in batch.iter().zip(results) {
            if let Err(e) = result {
                error!("💥 Task for '{}' aborted: {}", query, e);
                stats.lock().await.record_failure(query.clone());
            }
        }

        let guard = stats.lock().await;
        guard.clone()
    }
}

async fn persist_outcome(outcome: SyncOutcome, sink: &dyn SalesSink, stats: &Mutex<BatchStatistics>) {
    match outcome.status {
        SyncStatus::UpToDate => stats.lock().await.record_up_to_date(),
        SyncStatus::Failed { phase, reason } => {
            warn!("⚠️ '{}' failed during {:?}: {}", outcome.query, phase, reason);
            stats.lock().await.record_failure(outcome.query);
        }
        SyncStatus::Synced { .. } => {
            let fetched = outcome.records.len();
            let summary = if fetched == 0 {
                Default::default()
            } else {
                sink.insert_batch(&outcome.records).await
            };
            if fetched > 0 {
                info!(
                    "💾 '{}': {} fetched, {} inserted, {} duplicates, {} errors",
                    outcome.query, fetched, summary.inserted, summary.duplicates, summary.errors
                );
            }
            stats
                .lock()
                .await
                .record_synced(fetched, outcome.skipped_hits, summary);
        }
    }
}
