//! Grading population reports.
//!
//! A report lists, per grading company, how many copies of a card received
//! each grade. Reports are flattened into one [`PopulationEntry`] per
//! (gemrate id, company, grade type, grade value) with a non-zero count.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use super::sale::parse_lenient_f64;

/// Population endpoint response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct PopulationReport {
    #[serde(default, deserialize_with = "lenient_string")]
    pub gemrate_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub population_data: Vec<GraderPopulation>,
}

/// One grading company's slice of a report.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct GraderPopulation {
    #[serde(default, deserialize_with = "lenient_string")]
    pub grader: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub grades: BTreeMap<String, Option<i64>>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub card_number: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub year: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub set_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub parallel: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub card_total_grades: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub card_gems: Option<i64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub card_gem_rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub last_population_change: Option<String>,
}

/// Kind of grade a population bucket counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradeType {
    Numeric,
    Auth,
    GemMint,
    Pristine,
    Perfect,
    BlackLabel,
}

impl GradeType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Numeric => "numeric",
            Self::Auth => "auth",
            Self::GemMint => "gem_mint",
            Self::Pristine => "pristine",
            Self::Perfect => "perfect",
            Self::BlackLabel => "black_label",
        }
    }
}

impl fmt::Display for GradeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the `population` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationEntry {
    pub gemrate_id: String,
    pub search_query: Option<String>,
    pub grading_company: String,
    pub grade_type: GradeType,
    /// `0.0` for authentic-only buckets.
    pub grade_value: f64,
    pub grade_count: i64,
    pub card_description: Option<String>,
    pub card_name: Option<String>,
    pub card_number: Option<String>,
    pub card_year: Option<String>,
    pub set_name: Option<String>,
    pub parallel: Option<String>,
    pub category: Option<String>,
    pub card_gem_rate: Option<f64>,
    pub card_gems: Option<i64>,
    pub card_total_grades: Option<i64>,
    pub last_population_change: Option<String>,
}

/// Display name for a grading company as stored.
#[must_use]
pub fn grading_company_name(grader: &str) -> String {
    match grader.trim().to_ascii_lowercase().as_str() {
        "psa" => "PSA".to_string(),
        "beckett" | "bgs" => "BGS".to_string(),
        "sgc" => "SGC".to_string(),
        other => other.to_ascii_uppercase(),
    }
}

/// Map a report grade key (`g9`, `g8_5`, `auth`, `g10p`, ...) to its bucket.
///
/// `company` is the already-mapped company name. Returns `None` for keys
/// that do not name a grade.
#[must_use]
pub fn parse_grade_key(key: &str, company: &str) -> Option<(GradeType, f64)> {
    let key = key.trim();
    let lower = key.to_ascii_lowercase();
    match lower.as_str() {
        "auth" | "ga" => return Some((GradeType::Auth, 0.0)),
        "g10p" if company == "BGS" => return Some((GradeType::Pristine, 10.0)),
        "g10p" => return Some((GradeType::Perfect, 10.0)),
        "perfect" => return Some((GradeType::Perfect, 10.0)),
        "pristine" => return Some((GradeType::Pristine, 10.0)),
        "g10b" => return Some((GradeType::BlackLabel, 10.0)),
        "gem_mint" | "gemmint" => {
            let value = if company == "PSA" { 10.0 } else { 9.5 };
            return Some((GradeType::GemMint, value));
        }
        _ => {}
    }

    let digits = lower.strip_prefix('g')?;
    let (whole, fraction) = match digits.split_once('_') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (digits, None),
    };
    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let text = match fraction {
        Some(f) if !f.is_empty() && f.bytes().all(|b| b.is_ascii_digit()) => format!("{whole}.{f}"),
        Some(_) => return None,
        None => whole.to_string(),
    };
    text.parse::<f64>().ok().map(|value| (GradeType::Numeric, value))
}

impl PopulationReport {
    /// Flatten into table rows, keeping only grades with a positive count.
    ///
    /// `gemrate_id` is the id the report was requested for; it wins over the
    /// id echoed in the body.
    #[must_use]
    pub fn into_entries(self, gemrate_id: &str, search_query: Option<&str>) -> Vec<PopulationEntry> {
        let mut entries = Vec::new();
        for card in self.population_data {
            let Some(grader) = card.grader.as_deref() else {
                debug!("Skipping population slice without grader for {}", gemrate_id);
                continue;
            };
            let company = grading_company_name(grader);
            for (key, count) in &card.grades {
                let Some(count) = (*count).filter(|c| *c > 0) else {
                    continue;
                };
                let Some((grade_type, grade_value)) = parse_grade_key(key, &company) else {
                    debug!("Unrecognized grade key '{}' for {} ({})", key, gemrate_id, company);
                    continue;
                };
                entries.push(PopulationEntry {
                    gemrate_id: gemrate_id.to_string(),
                    search_query: search_query.map(str::to_string),
                    grading_company: company.clone(),
                    grade_type,
                    grade_value,
                    grade_count: count,
                    card_description: self.description.clone(),
                    card_name: card.name.clone(),
                    card_number: card.card_number.clone(),
                    card_year: card.year.clone(),
                    set_name: card.set_name.clone(),
                    parallel: card.parallel.clone(),
                    category: card.category.clone(),
                    card_gem_rate: card.card_gem_rate,
                    card_gems: card.card_gems,
                    card_total_grades: card.card_total_grades,
                    last_population_change: card.last_population_change.clone(),
                });
            }
        }
        entries
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().replace(',', "").parse().ok(),
        _ => None,
    })
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_lenient_f64(&s),
        _ => None,
    })
}
