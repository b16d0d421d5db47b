//! Test utilities
//!
//! Scripted remote sources, an in-memory store and a throwaway SQLite
//! database, so sync logic can be exercised without the network.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::TempDir;

use crate::domain::{
    ExistenceOracle, GradeType, InsertSummary, PopulationEntry, PopulationReport, PopulationSource, SaleHit,
    SaleRecord, SalesSink, SearchPage, SearchQuery, SearchSource, StoreError, TransportError,
};
use crate::infrastructure::DatabaseConnection;

/// File-backed test database in a temporary directory.
///
/// A file (not `sqlite::memory:`) so every pooled connection sees the same data.
pub struct TestDatabase {
    pub connection: DatabaseConnection,
    pub url: String,
    _dir: TempDir,
}

impl TestDatabase {
    pub async fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let url = format!("sqlite:{}", dir.path().join("test.db").display());
        let connection = DatabaseConnection::new(&url).await?;
        connection.migrate().await?;
        Ok(Self {
            connection,
            url,
            _dir: dir,
        })
    }

    pub fn pool(&self) -> &sqlx::SqlitePool {
        self.connection.pool()
    }
}

/// `count` hits newest first: `{prefix}-0`, `{prefix}-1`, ...
pub fn feed(prefix: &str, count: usize) -> Vec<SaleHit> {
    (0..count)
        .map(|i| {
            let day = 28 - (i % 28);
            serde_json::from_value(json!({
                "itemId": format!("{prefix}-{i}"),
                "cardId": if i % 2 == 0 { json!(format!("card-{i}")) } else { json!("") },
                "date": format!("2024-{:02}-{:02}T12:00:00.000Z", 12 - (i / 28) % 12, day),
                "title": format!("{prefix} sale {i}"),
                "price": 100 + i,
            }))
            .unwrap_or_default()
        })
        .collect()
}

pub fn sale_record(query: &SearchQuery, item_id: &str) -> SaleRecord {
    SaleRecord {
        item_id: item_id.to_string(),
        search_query: query.canonical().to_string(),
        tier: query.tier().map(str::to_string),
        search_url: format!("scripted://{}", query.canonical()),
        verified: false,
        card_id: None,
        sale_date: Some("2024-01-01T00:00:00.000Z".to_string()),
        date_normal: Some("2024-01-01".to_string()),
        title: None,
        price: Some(1.0),
        platform: None,
        grader: None,
        grade: None,
        universal_gem_rate_id: None,
        document: json!({ "itemId": item_id }),
    }
}

pub fn population_entry(
    gemrate_id: &str,
    company: &str,
    grade_type: GradeType,
    grade_value: f64,
    count: i64,
) -> PopulationEntry {
    PopulationEntry {
        gemrate_id: gemrate_id.to_string(),
        search_query: None,
        grading_company: company.to_string(),
        grade_type,
        grade_value,
        grade_count: count,
        card_description: None,
        card_name: Some("Michael Jordan".to_string()),
        card_number: Some("101".to_string()),
        card_year: Some("1984".to_string()),
        set_name: Some("Star".to_string()),
        parallel: None,
        category: Some("basketball".to_string()),
        card_gem_rate: None,
        card_gems: None,
        card_total_grades: None,
        last_population_change: None,
    }
}

/// Serves fixed feeds page by page and records every request.
#[derive(Default)]
pub struct ScriptedSearchSource {
    feeds: HashMap<String, Vec<SaleHit>>,
    failing_pages: HashMap<String, HashSet<u32>>,
    failing_queries: HashSet<String>,
    panicking_queries: HashSet<String>,
    requests: Mutex<Vec<(String, u32)>>,
}

impl ScriptedSearchSource {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_feed(mut self, query: &SearchQuery, hits: Vec<SaleHit>) -> Self {
        self.feeds.insert(query.canonical().to_string(), hits);
        self
    }

    #[must_use]
    pub fn failing_on_page(mut self, query: &SearchQuery, page: u32) -> Self {
        self.failing_pages
            .entry(query.canonical().to_string())
            .or_default()
            .insert(page);
        self
    }

    #[must_use]
    pub fn failing_query(mut self, query: &SearchQuery) -> Self {
        self.failing_queries.insert(query.canonical().to_string());
        self
    }

    #[must_use]
    pub fn panicking_query(mut self, query: &SearchQuery) -> Self {
        self.panicking_queries.insert(query.canonical().to_string());
        self
    }

    /// Pages requested for `query`, in request order.
    pub fn requests_for(&self, query: &SearchQuery) -> Vec<u32> {
        self.requests
            .lock()
            .map(|log| {
                log.iter()
                    .filter(|(q, _)| q == query.canonical())
                    .map(|(_, page)| *page)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn total_requests(&self) -> usize {
        self.requests.lock().map(|log| log.len()).unwrap_or_default()
    }
}

#[async_trait]
impl SearchSource for ScriptedSearchSource {
    async fn fetch_page(&self, query: &SearchQuery, page: u32, limit: u32) -> Result<SearchPage, TransportError> {
        let key = query.canonical().to_string();
        if let Ok(mut log) = self.requests.lock() {
            log.push((key.clone(), page));
        }

        assert!(!self.panicking_queries.contains(&key), "scripted panic for '{key}'");
        let page_fails = self.failing_pages.get(&key).is_some_and(|pages| pages.contains(&page));
        if page_fails || self.failing_queries.contains(&key) {
            return Err(TransportError::RetriesExhausted {
                attempts: 3,
                last_error: format!("scripted failure for '{key}' page {page}"),
            });
        }

        let hits = self.feeds.get(&key).map(Vec::as_slice).unwrap_or_default();
        let start = (page as usize * limit as usize).min(hits.len());
        let end = (start + limit as usize).min(hits.len());
        Ok(SearchPage {
            hits: hits[start..end].to_vec(),
            total_hits: hits.len() as u64,
            url: format!("scripted://search?query={key}&page={page}"),
        })
    }
}

/// In-memory oracle + sink keyed by item id.
#[derive(Default)]
pub struct MemoryStore {
    items: Mutex<HashMap<String, String>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend `count` unrelated records are already stored for `query`.
    pub fn seed(&self, query: &SearchQuery, count: usize) {
        if let Ok(mut items) = self.items.lock() {
            for i in 0..count {
                items.insert(format!("seed-{}-{i}", query.canonical()), query.canonical().to_string());
            }
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.items.lock().map(|items| items.len()).unwrap_or_default()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("scripted outage".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ExistenceOracle for MemoryStore {
    async fn count_for_query(&self, query: &SearchQuery) -> Result<u64, StoreError> {
        self.check()?;
        let items = self.items.lock().map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(items.values().filter(|q| q.as_str() == query.canonical()).count() as u64)
    }

    async fn exists(&self, query: &SearchQuery, item_id: &str) -> Result<bool, StoreError> {
        self.check()?;
        let items = self.items.lock().map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(items.get(item_id).is_some_and(|q| q.as_str() == query.canonical()))
    }
}

#[async_trait]
impl SalesSink for MemoryStore {
    async fn insert_batch(&self, records: &[SaleRecord]) -> InsertSummary {
        if self.check().is_err() {
            return InsertSummary::all_failed(records.len());
        }
        let Ok(mut items) = self.items.lock() else {
            return InsertSummary::all_failed(records.len());
        };
        let mut summary = InsertSummary::default();
        for record in records {
            if record.item_id.is_empty() {
                summary.errors += 1;
            } else if items.contains_key(&record.item_id) {
                summary.duplicates += 1;
            } else {
                items.insert(record.item_id.clone(), record.search_query.clone());
                summary.inserted += 1;
            }
        }
        summary
    }
}

/// Population reports keyed by gemrate id; unknown ids fail with HTTP 404.
#[derive(Default)]
pub struct ScriptedPopulationSource {
    reports: HashMap<String, PopulationReport>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedPopulationSource {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_report(mut self, gemrate_id: &str, report: PopulationReport) -> Self {
        self.reports.insert(gemrate_id.to_string(), report);
        self
    }

    pub fn requested(&self) -> Vec<String> {
        self.requests.lock().map(|log| log.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PopulationSource for ScriptedPopulationSource {
    async fn fetch_population(&self, gemrate_id: &str) -> Result<PopulationReport, TransportError> {
        if let Ok(mut log) = self.requests.lock() {
            log.push(gemrate_id.to_string());
        }
        self.reports.get(gemrate_id).cloned().ok_or_else(|| TransportError::Http {
            status: 404,
            url: format!("scripted://population?gemrate_id={gemrate_id}"),
        })
    }
}
