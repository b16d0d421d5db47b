//! Configuration infrastructure
//!
//! Settings are layered, later sources winning:
//! 1. Compiled defaults (`AppConfig::default()`, values from [`defaults`])
//! 2. A TOML/JSON/YAML file (`--config`, else `config/default.*` if present)
//! 3. Environment variables prefixed `CARDSYNC__`, nested with `__`
//!    (e.g. `CARDSYNC__API__BEARER_TOKEN`, `CARDSYNC__SYNC__FULL__WORKERS`)
//!
//! Credentials are only ever read from these sources, never compiled in.

#![allow(clippy::uninlined_format_args)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::domain::SyncMode;

pub const ENV_PREFIX: &str = "CARDSYNC";
pub const DEFAULT_CONFIG_FILE: &str = "config/default";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {source}")]
    Load {
        #[from]
        source: config::ConfigError,
    },

    #[error("Invalid configuration: {message}")]
    Validation { message: String },
}

/// Credential string that never prints itself.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretString(***)")
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub sync: SyncConfig,
    pub population: PopulationConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

/// Remote endpoints and transport behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub search_base_url: String,
    pub search_index: String,
    pub population_base_url: String,
    pub timeout_seconds: u64,
    /// Attempts per request including the first one
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// 0 disables client-side rate limiting
    pub max_requests_per_second: u32,
    pub user_agent: String,
    /// Extra headers sent with every request
    pub headers: BTreeMap<String, String>,
    /// Sent as `Authorization: Bearer <token>` when present
    pub bearer_token: Option<SecretString>,
}

/// Batch shape for one sync mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProfile {
    pub batch_size: usize,
    pub workers: usize,
    pub batch_delay_ms: u64,
}

impl BatchProfile {
    #[must_use]
    pub const fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub page_size: u32,
    /// Pause between consecutive page requests of one query
    pub page_delay_ms: u64,
    /// Pause between integrity audit requests
    pub audit_delay_ms: u64,
    pub full: BatchProfile,
    pub daily: BatchProfile,
}

impl SyncConfig {
    #[must_use]
    pub const fn profile(&self, mode: SyncMode) -> BatchProfile {
        match mode {
            SyncMode::Full => self.full,
            SyncMode::Daily => self.daily,
        }
    }

    #[must_use]
    pub const fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    #[must_use]
    pub const fn audit_delay(&self) -> Duration {
        Duration::from_millis(self.audit_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PopulationConfig {
    pub request_delay_ms: u64,
    /// Skip gemrate ids that already have population rows
    pub skip_existing: bool,
}

impl PopulationConfig {
    #[must_use]
    pub const fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub busy_timeout_seconds: u64,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json_format: bool,
    pub console_output: bool,
    pub file_output: bool,
    /// Defaults to `<data dir>/card-sales-sync/logs`
    pub log_dir: Option<PathBuf>,
    pub file_name: String,
    /// Per-target levels applied unless `level` is `trace`
    pub module_filters: BTreeMap<String, String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("accept".to_string(), defaults::ACCEPT.to_string());
        headers.insert("accept-language".to_string(), defaults::ACCEPT_LANGUAGE.to_string());
        headers.insert("origin".to_string(), defaults::ORIGIN.to_string());
        headers.insert("referer".to_string(), defaults::REFERER.to_string());
        Self {
            search_base_url: defaults::SEARCH_BASE_URL.to_string(),
            search_index: defaults::SEARCH_INDEX.to_string(),
            population_base_url: defaults::POPULATION_BASE_URL.to_string(),
            timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
            max_attempts: defaults::MAX_ATTEMPTS,
            backoff_base_ms: defaults::BACKOFF_BASE_MS,
            backoff_max_ms: defaults::BACKOFF_MAX_MS,
            max_requests_per_second: defaults::MAX_REQUESTS_PER_SECOND,
            user_agent: defaults::USER_AGENT.to_string(),
            headers,
            bearer_token: None,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: defaults::PAGE_SIZE,
            page_delay_ms: defaults::PAGE_DELAY_MS,
            audit_delay_ms: defaults::AUDIT_DELAY_MS,
            full: BatchProfile {
                batch_size: defaults::FULL_BATCH_SIZE,
                workers: defaults::FULL_WORKERS,
                batch_delay_ms: defaults::FULL_BATCH_DELAY_MS,
            },
            daily: BatchProfile {
                batch_size: defaults::DAILY_BATCH_SIZE,
                workers: defaults::DAILY_WORKERS,
                batch_delay_ms: defaults::DAILY_BATCH_DELAY_MS,
            },
        }
    }
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            request_delay_ms: defaults::POPULATION_DELAY_MS,
            skip_existing: true,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: defaults::DATABASE_URL.to_string(),
            max_connections: defaults::DB_MAX_CONNECTIONS,
            busy_timeout_seconds: defaults::DB_BUSY_TIMEOUT_SECONDS,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: false,
            console_output: true,
            file_output: false,
            log_dir: None,
            file_name: defaults::LOG_FILE_NAME.to_string(),
            module_filters: {
                let mut filters = BTreeMap::new();
                filters.insert("sqlx".to_string(), "warn".to_string());
                filters.insert("reqwest".to_string(), "info".to_string());
                filters.insert("hyper".to_string(), "warn".to_string());
                filters.insert("h2".to_string(), "warn".to_string());
                filters.insert("tokio".to_string(), "info".to_string());
                filters
            },
        }
    }
}

impl AppConfig {
    /// Load defaults, then `path` (or the optional default file), then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?)
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |message: String| Err(ConfigError::Validation { message });

        if self.sync.page_size == 0 {
            return fail("sync.page_size must be greater than 0".into());
        }
        for (name, profile) in [("full", &self.sync.full), ("daily", &self.sync.daily)] {
            if profile.batch_size == 0 {
                return fail(format!("sync.{}.batch_size must be greater than 0", name));
            }
            if profile.workers == 0 {
                return fail(format!("sync.{}.workers must be greater than 0", name));
            }
        }
        if self.api.max_attempts == 0 {
            return fail("api.max_attempts must be at least 1".into());
        }
        if self.api.backoff_base_ms > self.api.backoff_max_ms {
            return fail(format!(
                "api.backoff_base_ms ({}) exceeds api.backoff_max_ms ({})",
                self.api.backoff_base_ms, self.api.backoff_max_ms
            ));
        }
        if self.api.search_base_url.trim().is_empty() {
            return fail("api.search_base_url must not be empty".into());
        }
        if self.database.url.trim().is_empty() {
            return fail("database.url must not be empty".into());
        }
        if self.database.max_connections == 0 {
            return fail("database.max_connections must be greater than 0".into());
        }
        Ok(())
    }
}

/// Default configuration values
pub mod defaults {
    pub const SEARCH_BASE_URL: &str = "https://search-zzvl7ri3bq-uc.a.run.app/search";
    pub const SEARCH_INDEX: &str = "salesarchive";
    pub const POPULATION_BASE_URL: &str = "https://www.gemrate.com/card-details";

    pub const REQUEST_TIMEOUT_SECONDS: u64 = 30;
    pub const MAX_ATTEMPTS: u32 = 3;
    pub const BACKOFF_BASE_MS: u64 = 2_000;
    pub const BACKOFF_MAX_MS: u64 = 30_000;
    pub const MAX_REQUESTS_PER_SECOND: u32 = 0;

    pub const ACCEPT: &str = "application/json, text/plain, */*";
    pub const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";
    pub const ORIGIN: &str = "https://app.cardladder.com";
    pub const REFERER: &str = "https://app.cardladder.com/";
    pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                                  (KHTML, like Gecko) Chrome/140.0.0.0 Safari/537.36";

    pub const PAGE_SIZE: u32 = 50;
    pub const PAGE_DELAY_MS: u64 = 500;
    pub const AUDIT_DELAY_MS: u64 = 100;

    pub const FULL_BATCH_SIZE: usize = 50;
    pub const FULL_WORKERS: usize = 50;
    pub const FULL_BATCH_DELAY_MS: u64 = 2_000;

    pub const DAILY_BATCH_SIZE: usize = 20;
    pub const DAILY_WORKERS: usize = 20;
    pub const DAILY_BATCH_DELAY_MS: u64 = 1_000;

    pub const POPULATION_DELAY_MS: u64 = 1_000;

    pub const DATABASE_URL: &str = "sqlite://data/card_sales.db";
    /// Comfortably above the largest worker pool
    pub const DB_MAX_CONNECTIONS: u32 = 60;
    pub const DB_BUSY_TIMEOUT_SECONDS: u64 = 30;

    pub const LOG_LEVEL: &str = "info";
    pub const LOG_FILE_NAME: &str = "card-sales-sync.log";
}
