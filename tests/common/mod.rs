//! Shared fixtures for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

use card_sales_sync::application::{BatchCoordinator, CoordinatorSettings, FetchSettings, IncrementalFetcher};
use card_sales_sync::domain::{SaleHit, SearchPage, SearchQuery, SearchSource, SyncMode, TransportError};
use card_sales_sync::infrastructure::{DatabaseConnection, SalesRepository};
use std::sync::Arc;

/// SQLite store in a temporary directory
pub struct Store {
    pub connection: DatabaseConnection,
    pub sales: Arc<SalesRepository>,
    pub dir: TempDir,
}

pub async fn open_store() -> anyhow::Result<Store> {
    let dir = tempfile::tempdir()?;
    let url = format!("sqlite:{}", dir.path().join("sales.db").display());
    let connection = DatabaseConnection::new(&url).await?;
    connection.migrate().await?;
    let sales = Arc::new(SalesRepository::new(connection.pool().clone()));
    Ok(Store { connection, sales, dir })
}

pub fn hit(item_id: &str, date: &str, price: f64) -> SaleHit {
    serde_json::from_value(json!({
        "itemId": item_id,
        "cardId": format!("card-{item_id}"),
        "date": date,
        "title": format!("Sale {item_id}"),
        "price": price,
        "platform": "eBay",
        "grader": "PSA",
        "grade": "g9",
        "universalGemRateId": "null",
    }))
    .unwrap_or_default()
}

/// `count` hits newest first with ids `{prefix}-{n}` counting down from `count - 1`
pub fn hits(prefix: &str, count: usize) -> Vec<SaleHit> {
    (0..count)
        .rev()
        .map(|n| hit(&format!("{prefix}-{n}"), "2024-06-01T00:00:00.000Z", 10.0 + n as f64))
        .collect()
}

/// Remote archive whose feeds can grow between runs
#[derive(Default)]
pub struct Archive {
    feeds: Mutex<HashMap<String, Vec<SaleHit>>>,
    failing: Mutex<HashSet<String>>,
    requests: Mutex<Vec<(String, u32)>>,
}

impl Archive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, query: &SearchQuery, hits: Vec<SaleHit>) {
        self.feeds.lock().unwrap().insert(query.canonical().to_string(), hits);
    }

    /// Newer sales go to the front, the archive sorts newest first
    pub fn prepend(&self, query: &SearchQuery, newer: Vec<SaleHit>) {
        let mut feeds = self.feeds.lock().unwrap();
        let feed = feeds.entry(query.canonical().to_string()).or_default();
        let mut merged = newer;
        merged.append(feed);
        *feed = merged;
    }

    pub fn fail(&self, query: &SearchQuery) {
        self.failing.lock().unwrap().insert(query.canonical().to_string());
    }

    pub fn pages_requested(&self, query: &SearchQuery) -> Vec<u32> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(q, _)| q == query.canonical())
            .map(|(_, page)| *page)
            .collect()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().unwrap().clear();
    }
}

#[async_trait]
impl SearchSource for Archive {
    async fn fetch_page(&self, query: &SearchQuery, page: u32, limit: u32) -> Result<SearchPage, TransportError> {
        let key = query.canonical().to_string();
        self.requests.lock().unwrap().push((key.clone(), page));
        if self.failing.lock().unwrap().contains(&key) {
            return Err(TransportError::Http {
                status: 503,
                url: format!("archive://{key}"),
            });
        }

        let feeds = self.feeds.lock().unwrap();
        let feed = feeds.get(&key).map(Vec::as_slice).unwrap_or_default();
        let start = (page as usize * limit as usize).min(feed.len());
        let end = (start + limit as usize).min(feed.len());
        Ok(SearchPage {
            hits: feed[start..end].to_vec(),
            total_hits: feed.len() as u64,
            url: format!("archive://{key}?page={page}"),
        })
    }
}

pub fn coordinator(archive: Arc<Archive>, store: &Store, mode: SyncMode, workers: usize) -> BatchCoordinator {
    let fetcher = IncrementalFetcher::new(
        archive,
        store.sales.clone(),
        FetchSettings {
            page_size: 50,
            page_delay: Duration::ZERO,
        },
    );
    let settings = CoordinatorSettings {
        workers,
        batch_delay: Duration::ZERO,
        ..CoordinatorSettings::for_mode(mode)
    };
    BatchCoordinator::new(Arc::new(fetcher), store.sales.clone(), settings)
}
