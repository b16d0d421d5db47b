//! Ports between the sync logic and the outside world.
//!
//! Contains trait definitions for the remote sources and the local store.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::{StoreError, TransportError};
use crate::domain::population::{PopulationEntry, PopulationReport};
use crate::domain::query::SearchQuery;
use crate::domain::sale::{SaleHit, SaleRecord};
use crate::domain::sync::InsertSummary;

/// One page of the sales archive, newest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchPage {
    #[serde(default)]
    pub hits: Vec<SaleHit>,
    #[serde(rename = "totalHits", default)]
    pub total_hits: u64,
    /// URL the page was fetched from; not part of the response body.
    #[serde(skip)]
    pub url: String,
}

/// Remote sales archive.
#[async_trait]
pub trait SearchSource: Send + Sync {
    /// Fetch `page` (zero-based) of `limit` hits sorted by date descending.
    async fn fetch_page(&self, query: &SearchQuery, page: u32, limit: u32) -> Result<SearchPage, TransportError>;
}

/// Remote population report service.
#[async_trait]
pub trait PopulationSource: Send + Sync {
    async fn fetch_population(&self, gemrate_id: &str) -> Result<PopulationReport, TransportError>;
}

/// Read-only view of what the store already holds.
#[async_trait]
pub trait ExistenceOracle: Send + Sync {
    /// Stored records attributed to the canonical form of `query`.
    async fn count_for_query(&self, query: &SearchQuery) -> Result<u64, StoreError>;

    /// Whether a record with this identity key is stored for the canonical form of `query`.
    ///
    /// A sale first stored under another query does not count: it must not
    /// end this query's daily walk.
    async fn exists(&self, query: &SearchQuery, item_id: &str) -> Result<bool, StoreError>;
}

/// Write side for sale records.
#[async_trait]
pub trait SalesSink: Send + Sync {
    /// Insert each record independently. Duplicates by identity key are
    /// skipped and counted, never overwritten. Never fails as a whole: an
    /// unreachable store reports every record as an error.
    async fn insert_batch(&self, records: &[SaleRecord]) -> InsertSummary;
}

/// A card referenced by stored sales that may need a population report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulationTarget {
    pub gemrate_id: String,
    pub search_query: Option<String>,
}

/// Counts reported by one population upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertSummary {
    pub written: u64,
    pub refreshed: u64,
    pub errors: u64,
}

#[async_trait]
pub trait PopulationStore: Send + Sync {
    /// Distinct gemrate ids referenced by stored sales, with one query each.
    async fn population_targets(&self) -> Result<Vec<PopulationTarget>, StoreError>;

    async fn has_population(&self, gemrate_id: &str) -> Result<bool, StoreError>;

    /// Insert or update on (gemrate id, company, grade type, grade value).
    async fn upsert_entries(&self, entries: &[PopulationEntry]) -> UpsertSummary;
}
