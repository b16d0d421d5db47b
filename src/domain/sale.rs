//! Sales archive hits and their canonical, persisted shape.

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::errors::NormalizeError;
use super::query::SearchQuery;

/// One raw hit as returned by the search endpoint.
///
/// Held as the untouched JSON object so every field survives into the store,
/// with typed accessors for the few fields the sync logic reads.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SaleHit(Map<String, Value>);

impl SaleHit {
    #[must_use]
    pub const fn from_map(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// `itemId`, accepting numeric ids as well as strings.
    #[must_use]
    pub fn item_id(&self) -> Option<String> {
        text_field(&self.0, "itemId")
    }

    #[must_use]
    pub fn card_id(&self) -> Option<String> {
        text_field(&self.0, "cardId")
    }

    #[must_use]
    pub fn date(&self) -> Option<String> {
        text_field(&self.0, "date")
    }

    #[must_use]
    pub const fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Shape this hit into a [`SaleRecord`] attributed to `query`, fetched from `search_url`.
    pub fn normalize(self, query: &SearchQuery, search_url: &str) -> Result<SaleRecord, NormalizeError> {
        let item_id = self.item_id().ok_or(NormalizeError::MissingItemId)?;
        let card_id = self.card_id();
        let sale_date = self.date();
        let date_normal = sale_date.as_deref().and_then(date_portion);

        Ok(SaleRecord {
            item_id,
            search_query: query.canonical().to_string(),
            tier: query.tier().map(str::to_string),
            search_url: search_url.to_string(),
            verified: card_id.is_some(),
            card_id,
            sale_date,
            date_normal,
            title: text_field(&self.0, "title"),
            price: number_field(&self.0, "price"),
            platform: text_field(&self.0, "platform"),
            grader: text_field(&self.0, "grader"),
            grade: text_field(&self.0, "grade"),
            universal_gem_rate_id: text_field(&self.0, "universalGemRateId")
                .filter(|id| !id.eq_ignore_ascii_case("null")),
            document: Value::Object(self.0),
        })
    }
}

/// Canonical sale record as written to the `sales` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleRecord {
    pub item_id: String,
    pub search_query: String,
    pub tier: Option<String>,
    pub search_url: String,
    /// True when the hit carried a non-empty `cardId`.
    pub verified: bool,
    pub card_id: Option<String>,
    pub sale_date: Option<String>,
    /// Calendar date of `sale_date` as `YYYY-MM-DD`; `None` when it is not a date.
    pub date_normal: Option<String>,
    pub title: Option<String>,
    pub price: Option<f64>,
    pub platform: Option<String>,
    pub grader: Option<String>,
    pub grade: Option<String>,
    pub universal_gem_rate_id: Option<String>,
    /// Original hit, kept verbatim.
    pub document: Value,
}

/// `YYYY-MM-DD` of an RFC 3339 timestamp (in its own offset), or of any value
/// whose leading part before `T`/space is a valid date.
fn date_portion(date: &str) -> Option<String> {
    let date = date.trim();
    let day = match DateTime::parse_from_rfc3339(date) {
        Ok(timestamp) => timestamp.date_naive(),
        Err(_) => {
            let prefix = date.split(['T', ' ']).next().unwrap_or(date);
            NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()?
        }
    };
    Some(day.format("%Y-%m-%d").to_string())
}

/// Non-empty string, or a number rendered as text.
pub(crate) fn text_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    match fields.get(key)? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Number, or a string such as `"$1,250.00"` that parses as one.
pub(crate) fn number_field(fields: &Map<String, Value>, key: &str) -> Option<f64> {
    match fields.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_lenient_f64(s),
        _ => None,
    }
}

pub(crate) fn parse_lenient_f64(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | '%' | ' '))
        .collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}
