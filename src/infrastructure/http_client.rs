//! HTTP client for the sales search and population endpoints
//!
//! Wraps `reqwest` with the configured headers, an optional `governor` rate
//! limiter and a retry policy for transient failures (timeouts, connection
//! errors, 408/429/5xx). `Retry-After` is honoured up to the backoff cap.

#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use async_trait::async_trait;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, direct::NotKeyed},
};
use reqwest::{
    Client,
    header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue, RETRY_AFTER},
};
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::domain::{
    PopulationReport, PopulationSource, SearchPage, SearchQuery, SearchSource, TransportError,
};
use crate::infrastructure::config::ApiConfig;

/// Retry/backoff knobs, split out so the schedule can be reasoned about on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub fn from_config(config: &ApiConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.backoff_base_ms),
            max_delay: Duration::from_millis(config.backoff_max_ms),
        }
    }

    /// Delay after failed attempt number `attempt` (1-based).
    ///
    /// `base * 2^(attempt-1)`, raised to `retry_after` when the server asked
    /// for longer, never above `max_delay`.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let exponential = self.base_delay.saturating_mul(2_u32.pow(exponent));
        let delay = retry_after.map_or(exponential, |hint| hint.max(exponential));
        delay.min(self.max_delay)
    }
}

/// Client for both remote JSON APIs
pub struct ApiClient {
    client: Client,
    rate_limiter: Option<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    retry: RetryPolicy,
    search_base: Url,
    search_index: String,
    population_base: Url,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(&config.user_agent)
            .default_headers(build_headers(config)?)
            .gzip(true)
            .brotli(true)
            .build()
            .context("Failed to create HTTP client")?;

        let rate_limiter = NonZeroU32::new(config.max_requests_per_second)
            .map(|rps| RateLimiter::direct(Quota::per_second(rps)));

        let search_base = Url::parse(&config.search_base_url)
            .with_context(|| format!("Invalid search_base_url: {}", config.search_base_url))?;
        let population_base = Url::parse(&config.population_base_url)
            .with_context(|| format!("Invalid population_base_url: {}", config.population_base_url))?;

        info!(
            "🌐 API client ready (timeout {}s, {} attempts, rate limit: {})",
            config.timeout_seconds,
            config.max_attempts,
            if config.max_requests_per_second == 0 {
                "off".to_string()
            } else {
                format!("{} rps", config.max_requests_per_second)
            }
        );
        if config.bearer_token.is_none() {
            debug!("No bearer token configured; requests are sent unauthenticated");
        }

        Ok(Self {
            client,
            rate_limiter,
            retry: RetryPolicy::from_config(config),
            search_base,
            search_index: config.search_index.clone(),
            population_base,
        })
    }

    /// Search URL for one page. Page 0 carries no `page` parameter.
    #[must_use]
    pub fn search_url(&self, query: &SearchQuery, page: u32, limit: u32) -> String {
        let mut url = self.search_base.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("index", &self.search_index);
            pairs.append_pair("query", query.canonical());
            if page > 0 {
                pairs.append_pair("page", &page.to_string());
            }
            pairs
                .append_pair("limit", &limit.to_string())
                .append_pair("filters", "")
                .append_pair("sort", "date")
                .append_pair("direction", "desc");
        }
        url.into()
    }

    #[must_use]
    pub fn population_url(&self, gemrate_id: &str) -> String {
        let mut url = self.population_base.clone();
        url.query_pairs_mut().append_pair("gemrate_id", gemrate_id);
        url.into()
    }

    /// GET `url` and decode the JSON body, retrying transient failures.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, TransportError> {
        let max_attempts = self.retry.max_attempts;
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            if let Some(limiter) = &self.rate_limiter {
                limiter.until_ready().await;
            }

            debug!("🌐 HTTP GET (attempt {}/{}) : {}", attempt, max_attempts, url);
            let mut retry_after = None;
            let error = match self.client.get(url).send().await {
                Ok(response) if response.status().is_success() => match response.bytes().await {
                    Ok(body) => {
                        return serde_json::from_slice(&body).map_err(|e| TransportError::Decode {
                            url: url.to_string(),
                            message: e.to_string(),
                        });
                    }
                    Err(e) => classify_reqwest_error(&e),
                },
                Ok(response) => {
                    retry_after = parse_retry_after(response.headers());
                    TransportError::Http {
                        status: response.status().as_u16(),
                        url: url.to_string(),
                    }
                }
                Err(e) => classify_reqwest_error(&e),
            };

            if !error.is_transient() {
                warn!("❌ {} (not retryable)", error);
                return Err(error);
            }
            if attempt < max_attempts {
                let delay = self.retry.backoff_delay(attempt, retry_after);
                warn!("⚠️ {} on attempt {}/{}; retrying in {:?}", error, attempt, max_attempts, delay);
                tokio::time::sleep(delay).await;
            } else {
                warn!("❌ {} on final attempt {}/{}", error, attempt, max_attempts);
            }
            last_error = Some(error);
        }

        Err(TransportError::RetriesExhausted {
            attempts: max_attempts,
            last_error: last_error.map_or_else(|| "no attempt made".to_string(), |e| e.to_string()),
        })
    }
}

#[async_trait]
impl SearchSource for ApiClient {
    async fn fetch_page(&self, query: &SearchQuery, page: u32, limit: u32) -> Result<SearchPage, TransportError> {
        let url = self.search_url(query, page, limit);
        let mut search_page: SearchPage = self.get_json(&url).await?;
        search_page.url = url;
        Ok(search_page)
    }
}

#[async_trait]
impl PopulationSource for ApiClient {
    async fn fetch_population(&self, gemrate_id: &str) -> Result<PopulationReport, TransportError> {
        if gemrate_id.trim().is_empty() {
            return Err(TransportError::InvalidRequest("empty gemrate id".to_string()));
        }
        self.get_json(&self.population_url(gemrate_id)).await
    }
}

fn build_headers(config: &ApiConfig) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (name, value) in &config.headers {
        let name = HeaderName::from_bytes(name.as_bytes()).with_context(|| format!("Invalid header name: {}", name))?;
        let value = HeaderValue::from_str(value).with_context(|| format!("Invalid value for header {}", name))?;
        headers.insert(name, value);
    }
    if let Some(token) = &config.bearer_token {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose()))
            .context("Bearer token contains characters not allowed in a header")?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }
    Ok(headers)
}

fn classify_reqwest_error(err: &reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(err.to_string())
    } else if err.is_builder() {
        TransportError::InvalidRequest(err.to_string())
    } else {
        TransportError::Network(err.to_string())
    }
}

/// Delta-seconds form only; HTTP-date values are ignored.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
