//! 정합성 점검 - compare remote totals with stored counts per query
//!
//! The count gate trusts `stored >= remote` as "complete". This audit makes
//! the comparison explicit and lists the queries worth re-running.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::domain::{ExistenceOracle, SearchQuery, SearchSource};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditStatus {
    Match,
    Mismatch { api_total: u64, stored: u64 },
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub query: SearchQuery,
    pub status: AuditStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    pub entries: Vec<AuditEntry>,
}

impl AuditReport {
    #[must_use]
    pub fn matched(&self) -> usize {
        self.count(|s| matches!(s, AuditStatus::Match))
    }

    #[must_use]
    pub fn mismatched(&self) -> usize {
        self.count(|s| matches!(s, AuditStatus::Mismatch { .. }))
    }

    #[must_use]
    pub fn errors(&self) -> usize {
        self.count(|s| matches!(s, AuditStatus::Error(_)))
    }

    /// Queries that did not match, in audit order.
    #[must_use]
    pub fn needs_reprocessing(&self) -> Vec<SearchQuery> {
        self.entries
            .iter()
            .filter(|e| e.status != AuditStatus::Match)
            .map(|e| e.query.clone())
            .collect()
    }

    fn count(&self, predicate: impl Fn(&AuditStatus) -> bool) -> usize {
        self.entries.iter().filter(|e| predicate(&e.status)).count()
    }
}

impl fmt::Display for AuditReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.entries.len();
        let rate = if total == 0 {
            100.0
        } else {
            self.matched() as f64 * 100.0 / total as f64
        };
        writeln!(f, "Queries audited:        {total}")?;
        writeln!(f, "Matched:                {}", self.matched())?;
        writeln!(f, "Mismatched:             {}", self.mismatched())?;
        writeln!(f, "Errors:                 {}", self.errors())?;
        write!(f, "Match rate:             {rate:.1}%")
    }
}

pub struct IntegrityAudit {
    source: Arc<dyn SearchSource>,
    oracle: Arc<dyn ExistenceOracle>,
    request_delay: Duration,
}

impl IntegrityAudit {
    pub fn new(source: Arc<dyn SearchSource>, oracle: Arc<dyn ExistenceOracle>, request_delay: Duration) -> Self {
        Self {
            source,
            oracle,
            request_delay,
        }
    }

    pub async fn check(&self, query: &SearchQuery) -> AuditStatus {
        let api_total = match self.source.fetch_page(query, 0, 1).await {
            Ok(page) => page.total_hits,
            Err(e) => return AuditStatus::Error(format!("remote: {e}")),
        };
        let stored = match self.oracle.count_for_query(query).await {
            Ok(count) => count,
            Err(e) => return AuditStatus::Error(format!("store: {e}")),
        };
        if api_total == stored {
            AuditStatus::Match
        } else {
            AuditStatus::Mismatch { api_total, stored }
        }
    }

    pub async fn run(&self, queries: &[SearchQuery]) -> AuditReport {
        let mut report = AuditReport::default();
        for (index, query) in queries.iter().enumerate() {
            if index > 0 && !self.request_delay.is_zero() {
                tokio::time::sleep(self.request_delay).await;
            }
            let status = self.check(query).await;
            match &status {
                AuditStatus::Match => info!("[{}/{}] ✅ {}", index + 1, queries.len(), query),
                AuditStatus::Mismatch { api_total, stored } => warn!(
                    "[{}/{}] ❌ {}: remote={}, stored={}",
                    index + 1,
                    queries.len(),
                    query,
                    api_total,
                    stored
                ),
                AuditStatus::Error(reason) => warn!("[{}/{}] ⚠️ {}: {}", index + 1, queries.len(), query, reason),
            }
            report.entries.push(AuditEntry {
                query: query.clone(),
                status,
            });
        }
        report
    }
}
