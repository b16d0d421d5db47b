//! SQLite-backed store for population report rows.

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::{debug, error, warn};

use crate::domain::{PopulationEntry, PopulationStore, PopulationTarget, StoreError, UpsertSummary};

// Both insert and update report one affected row, so refreshed rows are
// detected with ENTRY_EXISTS before the upsert.
const UPSERT_ENTRY: &str = r"
    INSERT INTO population (
        gemrate_id, search_query, grading_company, grade_type, grade_value, grade_count,
        card_description, card_name, card_number, card_year, set_name, parallel, category,
        card_gem_rate, card_gems, card_total_grades, last_population_change
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(gemrate_id, grading_company, grade_type, grade_value) DO UPDATE SET
        search_query = COALESCE(excluded.search_query, population.search_query),
        grade_count = excluded.grade_count,
        card_description = excluded.card_description,
        card_name = excluded.card_name,
        card_number = excluded.card_number,
        card_year = excluded.card_year,
        set_name = excluded.set_name,
        parallel = excluded.parallel,
        category = excluded.category,
        card_gem_rate = excluded.card_gem_rate,
        card_gems = excluded.card_gems,
        card_total_grades = excluded.card_total_grades,
        last_population_change = excluded.last_population_change,
        date_fetched = date('now'),
        updated_at = CURRENT_TIMESTAMP
";

const ENTRY_EXISTS: &str = r"
    SELECT EXISTS(
        SELECT 1 FROM population
        WHERE gemrate_id = ? AND grading_company = ? AND grade_type = ? AND grade_value = ?
    )
";

#[derive(Clone)]
pub struct PopulationRepository {
    pool: SqlitePool,
}

impl PopulationRepository {
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn count_for_gemrate(&self, gemrate_id: &str) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM population WHERE gemrate_id = ?")
            .bind(gemrate_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.unsigned_abs())
    }

    pub async fn grade_count(
        &self,
        gemrate_id: &str,
        grading_company: &str,
        grade_type: &str,
        grade_value: f64,
    ) -> Result<Option<i64>, StoreError> {
        let count = sqlx::query_scalar(
            "SELECT grade_count FROM population \
             WHERE gemrate_id = ? AND grading_company = ? AND grade_type = ? AND grade_value = ?",
        )
        .bind(gemrate_id)
        .bind(grading_company)
        .bind(grade_type)
        .bind(grade_value)
        .fetch_optional(&self.pool)
        .await?;
        Ok(count)
    }

    async fn upsert_all(&self, entries: &[PopulationEntry]) -> Result<UpsertSummary, sqlx::Error> {
        let mut summary = UpsertSummary::default();
        let mut tx = self.pool.begin().await?;

        for entry in entries {
            let existed: Result<i64, _> = sqlx::query_scalar(ENTRY_EXISTS)
                .bind(&entry.gemrate_id)
                .bind(&entry.grading_company)
                .bind(entry.grade_type.as_str())
                .bind(entry.grade_value)
                .fetch_one(&mut *tx)
                .await;

            let result = sqlx::query(UPSERT_ENTRY)
                .bind(&entry.gemrate_id)
                .bind(&entry.search_query)
                .bind(&entry.grading_company)
                .bind(entry.grade_type.as_str())
                .bind(entry.grade_value)
                .bind(entry.grade_count)
                .bind(&entry.card_description)
                .bind(&entry.card_name)
                .bind(&entry.card_number)
                .bind(&entry.card_year)
                .bind(&entry.set_name)
                .bind(&entry.parallel)
                .bind(&entry.category)
                .bind(entry.card_gem_rate)
                .bind(entry.card_gems)
                .bind(entry.card_total_grades)
                .bind(&entry.last_population_change)
                .execute(&mut *tx)
                .await;

            match (result, existed) {
                (Ok(_), Ok(found)) if found != 0 => summary.refreshed += 1,
                (Ok(_), _) => summary.written += 1,
                (Err(e), _) => {
                    warn!(
                        "Failed to upsert population {} {} {} {}: {}",
                        entry.gemrate_id, entry.grading_company, entry.grade_type, entry.grade_value, e
                    );
                    summary.errors += 1;
                }
            }
        }

        tx.commit().await?;
        Ok(summary)
    }
}

#[async_trait]
impl PopulationStore for PopulationRepository {
    async fn population_targets(&self) -> Result<Vec<PopulationTarget>, StoreError> {
        let rows: Vec<(String, Option<String>)> = sqlx::query_as(
            r"
            SELECT universal_gem_rate_id, MIN(search_query)
            FROM sales
            WHERE universal_gem_rate_id IS NOT NULL
              AND universal_gem_rate_id != ''
              AND lower(universal_gem_rate_id) != 'null'
            GROUP BY universal_gem_rate_id
            ORDER BY universal_gem_rate_id
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(gemrate_id, search_query)| PopulationTarget {
                gemrate_id,
                search_query,
            })
            .collect())
    }

    async fn has_population(&self, gemrate_id: &str) -> Result<bool, StoreError> {
        Ok(self.count_for_gemrate(gemrate_id).await? > 0)
    }

    async fn upsert_entries(&self, entries: &[PopulationEntry]) -> UpsertSummary {
        if entries.is_empty() {
            return UpsertSummary::default();
        }
        match self.upsert_all(entries).await {
            Ok(summary) => {
                debug!(
                    "💾 Population upsert: {} new, {} refreshed, {} errors",
                    summary.written, summary.refreshed, summary.errors
                );
                summary
            }
            Err(e) => {
                error!("❌ Population batch of {} could not be written: {}", entries.len(), e);
                UpsertSummary {
                    errors: entries.len() as u64,
                    ..UpsertSummary::default()
                }
            }
        }
    }
}
