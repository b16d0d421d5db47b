//! SQLite-backed store for sale records.
//!
//! `item_id` carries a UNIQUE constraint; inserts use `ON CONFLICT DO NOTHING`
//! so an existing record is never overwritten and a zero row count means
//! "duplicate".

use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::error::ErrorKind;
use tracing::{debug, error, warn};

use crate::domain::{
    ExistenceOracle, InsertSummary, SaleRecord, SalesSink, SearchQuery, StoreError,
};

const INSERT_SALE: &str = r"
    INSERT INTO sales (
        item_id, search_query, tier, search_url, verified, card_id, sale_date, date_normal,
        title, price, platform, grader, grade, universal_gem_rate_id, document
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(item_id) DO NOTHING
";

#[derive(Clone)]
pub struct SalesRepository {
    pool: SqlitePool,
}

impl SalesRepository {
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Total rows in the `sales` table.
    pub async fn total_records(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.unsigned_abs())
    }

    /// Item ids stored for a query, newest sale first.
    #[cfg(test)]
    pub async fn item_ids_for_query(&self, query: &SearchQuery) -> Result<Vec<String>, StoreError> {
        let ids = sqlx::query_scalar(
            "SELECT item_id FROM sales WHERE search_query = ? ORDER BY sale_date DESC, id ASC",
        )
        .bind(query.canonical())
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn insert_all(&self, records: &[SaleRecord]) -> Result<InsertSummary, sqlx::Error> {
        let mut summary = InsertSummary::default();
        let mut tx = self.pool.begin().await?;

        for (index, record) in records.iter().enumerate() {
            let document = record.document.to_string();
            let result = sqlx::query(INSERT_SALE)
                .bind(&record.item_id)
                .bind(&record.search_query)
                .bind(&record.tier)
                .bind(&record.search_url)
                .bind(record.verified)
                .bind(&record.card_id)
                .bind(&record.sale_date)
                .bind(&record.date_normal)
                .bind(&record.title)
                .bind(record.price)
                .bind(&record.platform)
                .bind(&record.grader)
                .bind(&record.grade)
                .bind(&record.universal_gem_rate_id)
                .bind(document)
                .execute(&mut *tx)
                .await;

            match result {
                Ok(done) if done.rows_affected() == 0 => summary.duplicates += 1,
                Ok(_) => summary.inserted += 1,
                Err(e) if aborts_transaction(&e) => {
                    // Nothing written in this transaction survives; stop before
                    // later statements fall back to autocommit.
                    error!("❌ Sale {} aborted the batch transaction: {}", record.item_id, e);
                    if let Err(rollback) = tx.rollback().await {
                        debug!("Rollback after aborted batch: {}", rollback);
                    }
                    let remaining = (records.len() - index) as u64;
                    summary.errors += summary.inserted + remaining;
                    summary.inserted = 0;
                    return Ok(summary);
                }
                Err(e) => {
                    warn!("Failed to insert sale {}: {}", record.item_id, e);
                    summary.errors += 1;
                }
            }
        }

        tx.commit().await?;
        Ok(summary)
    }
}

/// Whether a failed statement leaves the enclosing transaction unusable.
///
/// Constraint, type and size errors fail only their own row. Anything else
/// (disk full, I/O, busy, lost connection) may have rolled the transaction
/// back already.
fn aborts_transaction(err: &sqlx::Error) -> bool {
    let Some(db) = err.as_database_error() else {
        return true;
    };
    if !matches!(db.kind(), ErrorKind::Other) {
        return false;
    }
    // SQLite primary codes: TOOBIG 18, CONSTRAINT 19, MISMATCH 20, RANGE 25
    let primary = db.code().and_then(|code| code.parse::<i32>().ok()).map(|code| code & 0xff);
    !matches!(primary, Some(18 | 19 | 20 | 25))
}

#[async_trait]
impl ExistenceOracle for SalesRepository {
    async fn count_for_query(&self, query: &SearchQuery) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales WHERE search_query = ?")
            .bind(query.canonical())
            .fetch_one(&self.pool)
            .await?;
        Ok(count.unsigned_abs())
    }

    async fn exists(&self, query: &SearchQuery, item_id: &str) -> Result<bool, StoreError> {
        let found: i64 =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM sales WHERE search_query = ? AND item_id = ?)")
                .bind(query.canonical())
                .bind(item_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(found != 0)
    }
}

#[async_trait]
impl SalesSink for SalesRepository {
    async fn insert_batch(&self, records: &[SaleRecord]) -> InsertSummary {
        if records.is_empty() {
            return InsertSummary::default();
        }
        match self.insert_all(records).await {
            Ok(summary) => {
                debug!(
                    "💾 Saved batch of {}: {} inserted, {} duplicates, {} errors",
                    records.len(),
                    summary.inserted,
                    summary.duplicates,
                    summary.errors
                );
                summary
            }
            Err(e) => {
                error!("❌ Sales batch of {} could not be written: {}", records.len(), e);
                InsertSummary::all_failed(records.len())
            }
        }
    }
}
