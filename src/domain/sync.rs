//! Sync run vocabulary: modes, per-query outcomes and batch statistics.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::AddAssign;

use super::query::SearchQuery;
use super::sale::SaleRecord;

/// How far back a walk goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Walk every page the count gate lets through.
    Full,
    /// Stop at the first already-stored item.
    Daily,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => f.write_str("full"),
            Self::Daily => f.write_str("daily"),
        }
    }
}

/// Lifecycle of a single incremental fetch.
///
/// `Init -> Counting -> Paging -> {Done, NoUpdateNeeded, Failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchPhase {
    Init,
    Counting,
    Paging,
    Done,
    NoUpdateNeeded,
    Failed,
}

/// Why the paging loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Daily mode met an item already in the store.
    ReachedKnownItem,
    /// A page came back with fewer hits than requested.
    ShortPage,
    /// Every page implied by `totalHits` has been read.
    PageCountReached,
}

/// Terminal status of one query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
    /// Walk completed; records (possibly none) are ready to persist.
    Synced { stop: StopReason },
    /// Stored count already covers the remote total.
    UpToDate,
    /// Walk abandoned; nothing from it is persisted.
    Failed { phase: FetchPhase, reason: String },
}

/// Result of walking one query.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOutcome {
    pub query: SearchQuery,
    pub mode: SyncMode,
    pub status: SyncStatus,
    pub records: Vec<SaleRecord>,
    pub stored_count: u64,
    pub remote_total: u64,
    pub pages_fetched: u32,
    /// Hits dropped because they could not be normalized.
    pub skipped_hits: u32,
}

impl SyncOutcome {
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self.status, SyncStatus::Failed { .. })
    }
}

/// Per-walk scratch state. Lives only for the duration of one fetch call.
#[derive(Debug, Default)]
pub struct SyncCursor {
    pub page: u32,
    pub pages_fetched: u32,
    pub remote_total: u64,
    pub records: Vec<SaleRecord>,
    pub skipped_hits: u32,
    pub reached_known: bool,
}

impl SyncCursor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Counts reported by one `insert_batch` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertSummary {
    pub inserted: u64,
    pub duplicates: u64,
    pub errors: u64,
}

impl InsertSummary {
    /// Every record in a batch that could not be attempted at all.
    #[must_use]
    pub const fn all_failed(records: usize) -> Self {
        Self {
            inserted: 0,
            duplicates: 0,
            errors: records as u64,
        }
    }

    #[must_use]
    pub const fn attempted(&self) -> u64 {
        self.inserted + self.duplicates + self.errors
    }
}

impl AddAssign for InsertSummary {
    fn add_assign(&mut self, rhs: Self) {
        self.inserted += rhs.inserted;
        self.duplicates += rhs.duplicates;
        self.errors += rhs.errors;
    }
}

/// Aggregate counters for a coordinator run.
///
/// `errors` counts failed queries and per-record insert failures alike.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStatistics {
    pub total_queries: u64,
    pub queries_processed: u64,
    pub queries_up_to_date: u64,
    pub queries_updated: u64,
    pub queries_failed: u64,
    pub records_fetched: u64,
    pub records_skipped: u64,
    pub inserted: u64,
    pub duplicates: u64,
    pub errors: u64,
    pub failed_queries: Vec<SearchQuery>,
}

impl BatchStatistics {
    pub fn record_up_to_date(&mut self) {
        self.queries_processed += 1;
        self.queries_up_to_date += 1;
    }

    /// A completed walk whose records went through `insert_batch`.
    pub fn record_synced(&mut self, fetched: usize, skipped: u32, summary: InsertSummary) {
        self.queries_processed += 1;
        if fetched == 0 {
            self.queries_up_to_date += 1;
        } else {
            self.queries_updated += 1;
        }
        self.records_fetched += fetched as u64;
        self.records_skipped += u64::from(skipped);
        self.inserted += summary.inserted;
        self.duplicates += summary.duplicates;
        self.errors += summary.errors;
    }

    pub fn record_failure(&mut self, query: SearchQuery) {
        self.queries_processed += 1;
        self.queries_failed += 1;
        self.errors += 1;
        self.failed_queries.push(query);
    }

    pub fn merge(&mut self, other: Self) {
        self.total_queries += other.total_queries;
        self.queries_processed += other.queries_processed;
        self.queries_up_to_date += other.queries_up_to_date;
        self.queries_updated += other.queries_updated;
        self.queries_failed += other.queries_failed;
        self.records_fetched += other.records_fetched;
        self.records_skipped += other.records_skipped;
        self.inserted += other.inserted;
        self.duplicates += other.duplicates;
        self.errors += other.errors;
        self.failed_queries.extend(other.failed_queries);
    }
}

impl fmt::Display for BatchStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total queries:          {}", self.total_queries)?;
        writeln!(f, "Queries processed:      {}", self.queries_processed)?;
        writeln!(f, "Queries up to date:     {}", self.queries_up_to_date)?;
        writeln!(f, "Queries updated:        {}", self.queries_updated)?;
        writeln!(f, "Queries failed:         {}", self.queries_failed)?;
        writeln!(f, "Records fetched:        {}", self.records_fetched)?;
        if self.records_skipped > 0 {
            writeln!(f, "Records skipped:        {}", self.records_skipped)?;
        }
        writeln!(f, "Records inserted:       {}", self.inserted)?;
        writeln!(f, "Duplicates skipped:     {}", self.duplicates)?;
        write!(f, "Errors:                 {}", self.errors)
    }
}
