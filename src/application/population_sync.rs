//! Population report sync for cards referenced by stored sales.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::domain::{PopulationSource, PopulationStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopulationSettings {
    pub request_delay: Duration,
    /// Leave gemrate ids that already have rows untouched
    pub skip_existing: bool,
}

impl Default for PopulationSettings {
    fn default() -> Self {
        Self {
            request_delay: Duration::from_secs(1),
            skip_existing: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulationStatistics {
    pub targets: u64,
    pub already_present: u64,
    pub processed: u64,
    pub entries_written: u64,
    pub entries_refreshed: u64,
    pub errors: u64,
}

impl fmt::Display for PopulationStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Gemrate ids found:      {}", self.targets)?;
        writeln!(f, "Already present:        {}", self.already_present)?;
        writeln!(f, "Processed:              {}", self.processed)?;
        writeln!(f, "Rows written:           {}", self.entries_written)?;
        writeln!(f, "Rows refreshed:         {}", self.entries_refreshed)?;
        write!(f, "Errors:                 {}", self.errors)
    }
}

pub struct PopulationSync {
    source: Arc<dyn PopulationSource>,
    store: Arc<dyn PopulationStore>,
    settings: PopulationSettings,
}

impl PopulationSync {
    pub fn new(
        source: Arc<dyn PopulationSource>,
        store: Arc<dyn PopulationStore>,
        settings: PopulationSettings,
    ) -> Self {
        Self {
            source,
            store,
            settings,
        }
    }

    /// Fetch and store population rows for every target.
    ///
    /// Only listing the targets can fail the run; per-id problems are counted.
    pub async fn run(&self) -> Result<PopulationStatistics, StoreError> {
        let targets = self.store.population_targets().await?;
        let mut stats = PopulationStatistics {
            targets: targets.len() as u64,
            ..PopulationStatistics::default()
        };
        info!("📊 {} gemrate id(s) referenced by stored sales", targets.len());

        let mut requested_any = false;
        for (index, target) in targets.iter().enumerate() {
            if self.settings.skip_existing {
                match self.store.has_population(&target.gemrate_id).await {
                    Ok(true) => {
                        debug!("⏭️ {} already has population rows", target.gemrate_id);
                        stats.already_present += 1;
                        continue;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!("❌ Could not check {}: {}", target.gemrate_id, e);
                        stats.errors += 1;
                        continue;
                    }
                }
            }

            if requested_any && !self.settings.request_delay.is_zero() {
                tokio::time::sleep(self.settings.request_delay).await;
            }
            requested_any = true;

            info!("[{}/{}] Fetching population for {}", index + 1, targets.len(), target.gemrate_id);
            stats.processed += 1;
            let report = match self.source.fetch_population(&target.gemrate_id).await {
                Ok(report) => report,
                Err(e) => {
                    warn!("❌ Population fetch failed for {}: {}", target.gemrate_id, e);
                    stats.errors += 1;
                    continue;
                }
            };

            let entries = report.into_entries(&target.gemrate_id, target.search_query.as_deref());
            if entries.is_empty() {
                debug!("No graded population for {}", target.gemrate_id);
                continue;
            }
            let summary = self.store.upsert_entries(&entries).await;
            stats.entries_written += summary.written;
            stats.entries_refreshed += summary.refreshed;
            stats.errors += summary.errors;
        }

        info!(
            "🏁 Population sync done: {} processed, {} rows written, {} refreshed, {} errors",
            stats.processed, stats.entries_written, stats.entries_refreshed, stats.errors
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PopulationReport, SalesSink, SearchQuery};
    use crate::infrastructure::{PopulationRepository, SalesRepository};
    use crate::test_utils::{ScriptedPopulationSource, TestDatabase, sale_record};
    use serde_json::json;

    fn report(g10: i64) -> PopulationReport {
        serde_json::from_value(json!({
            "gemrate_id": "echo",
            "description": "1984 Star Michael Jordan #101",
            "population_data": [
                { "grader": "psa", "grades": { "g10": g10, "g9": 20, "auth": 0 }, "name": "Michael Jordan" },
                { "grader": "beckett", "grades": { "g9_5": 3, "g10p": 1 } }
            ]
        }))
        .expect("report")
    }

    async fn seed_sales(db: &TestDatabase, ids: &[(&str, Option<&str>)]) {
        let sales = SalesRepository::new(db.pool().clone());
        let query = SearchQuery::new("1984 Star Michael Jordan 101");
        let records: Vec<_> = ids
            .iter()
            .map(|(item, gemrate)| {
                let mut record = sale_record(&query, item);
                record.universal_gem_rate_id = gemrate.map(str::to_string);
                record
            })
            .collect();
        sales.insert_batch(&records).await;
    }

    fn settings(skip_existing: bool) -> PopulationSettings {
        PopulationSettings {
            request_delay: Duration::ZERO,
            skip_existing,
        }
    }

    #[tokio::test]
    async fn test_population_rows_written_and_existing_skipped() -> anyhow::Result<()> {
        let db = TestDatabase::new().await?;
        seed_sales(&db, &[("1", Some("gr-1")), ("2", Some("gr-1")), ("3", Some("gr-2")), ("4", None)]).await;
        let store = Arc::new(PopulationRepository::new(db.pool().clone()));
        let source = Arc::new(ScriptedPopulationSource::new().with_report("gr-1", report(12)));

        let sync = PopulationSync::new(source.clone(), store.clone(), settings(true));
        let stats = sync.run().await?;
        assert_eq!(stats.targets, 2);
        assert_eq!(stats.processed, 2);
        assert_eq!(stats.entries_written, 4);
        // gr-2 has no report upstream
        assert_eq!(stats.errors, 1);
        assert_eq!(store.grade_count("gr-1", "BGS", "pristine", 10.0).await?, Some(1));

        let again = sync.run().await?;
        assert_eq!(again.already_present, 1);
        assert_eq!(again.processed, 1);
        assert_eq!(source.requested(), vec!["gr-1", "gr-2", "gr-2"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_refresh_updates_counts() -> anyhow::Result<()> {
        let db = TestDatabase::new().await?;
        seed_sales(&db, &[("1", Some("gr-1"))]).await;
        let store = Arc::new(PopulationRepository::new(db.pool().clone()));

        let first = ScriptedPopulationSource::new().with_report("gr-1", report(12));
        PopulationSync::new(Arc::new(first), store.clone(), settings(true)).run().await?;

        let second = ScriptedPopulationSource::new().with_report("gr-1", report(15));
        let stats = PopulationSync::new(Arc::new(second), store.clone(), settings(false)).run().await?;
        assert_eq!(stats.entries_refreshed, 4);
        assert_eq!(stats.entries_written, 0);
        assert_eq!(store.grade_count("gr-1", "PSA", "numeric", 10.0).await?, Some(15));
        Ok(())
    }
}
