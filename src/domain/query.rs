//! Search query input value.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One search term plus its optional tier label, as read from the input file.
///
/// The identity used for counting and persistence is [`SearchQuery::canonical`]:
/// surrounding whitespace trimmed and inner runs collapsed to a single space,
/// so `" 1984  Star Jordan "` and `"1984 Star Jordan"` address the same rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchQuery {
    query: String,
    tier: Option<String>,
}

impl SearchQuery {
    pub fn new(query: impl AsRef<str>) -> Self {
        Self {
            query: canonicalize(query.as_ref()),
            tier: None,
        }
    }

    #[must_use]
    pub fn with_tier(mut self, tier: impl AsRef<str>) -> Self {
        let tier = tier.as_ref().trim();
        self.tier = (!tier.is_empty()).then(|| tier.to_string());
        self
    }

    /// Canonical query text.
    #[must_use]
    pub fn canonical(&self) -> &str {
        &self.query
    }

    #[must_use]
    pub fn tier(&self) -> Option<&str> {
        self.tier.as_deref()
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.query.is_empty()
    }
}

impl fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.query)
    }
}

/// Trim and collapse whitespace runs.
#[must_use]
pub fn canonicalize(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}
