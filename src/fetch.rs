//! Rate-limited HTTP client for the sports data provider.
//!
//! All calls are serialized through one direct rate limiter because the
//! provider's request budget is shared across the whole process, not per
//! endpoint. Identical (endpoint, params) requests within a run are answered
//! from an instance-owned cache without waiting or spending budget.
//!
//! The provider reports parameter-level errors in-band: an HTTP 200 whose
//! body carries a non-empty `errors` field. Those are surfaced as
//! `RemoteApi` so the orchestrator never retries them, unlike transport
//! failures.

use crate::error::IngestError;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Exact request shape: endpoint plus sorted query parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    url: String,
    params: Vec<(String, String)>,
}

impl RequestKey {
    pub fn new(url: &str, params: &[(String, String)]) -> Self {
        let mut params = params.to_vec();
        params.sort();
        Self { url: url.to_string(), params }
    }
}

/// Inspect a parsed provider envelope and pull out any API-level errors.
/// The provider uses an empty array or empty object when the call was clean,
/// and either a list of messages or a field→message map when it was not.
pub fn envelope_errors(body: &Value) -> Vec<String> {
    match body.get("errors") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        Some(Value::Object(map)) => map
            .iter()
            .map(|(field, msg)| match msg {
                Value::String(s) => format!("{field}: {s}"),
                other => format!("{field}: {other}"),
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// The entity list inside a provider envelope. Bodies without a `response`
/// array yield an empty slice rather than an error; the normalizer decides
/// what an empty payload means.
pub fn response_items(body: &Value) -> Vec<Value> {
    body.get("response")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Seam for the orchestrator so tests can run without a network.
#[async_trait]
pub trait PayloadFetcher: Send + Sync {
    async fn get(&self, url: &str, params: &[(String, String)]) -> Result<Arc<Value>, IngestError>;

    /// Monotonic count of requests actually issued (cache hits excluded).
    fn requests_made(&self) -> u64;
}

type DirectLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

pub struct FetchClient {
    http: reqwest::Client,
    api_key: String,
    limiter: DirectLimiter,
    cache: RwLock<HashMap<RequestKey, Arc<Value>>>,
    requests: AtomicU64,
}

impl FetchClient {
    pub fn new(api_key: String, min_interval: Duration, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(5)
            .build()
            .context("Failed to create HTTP client")?;

        let quota = Quota::with_period(min_interval)
            .ok_or_else(|| anyhow!("fetch interval must be non-zero"))?;

        Ok(Self {
            http,
            api_key,
            limiter: RateLimiter::direct(quota),
            cache: RwLock::new(HashMap::new()),
            requests: AtomicU64::new(0),
        })
    }

    async fn issue(&self, url: &str, params: &[(String, String)]) -> Result<Value, IngestError> {
        // Wait for rate limit; one outstanding request at a time.
        self.limiter.until_ready().await;
        self.requests.fetch_add(1, Ordering::Relaxed);

        let response = self
            .http
            .get(url)
            .header("x-apisports-key", &self.api_key)
            .query(params)
            .send()
            .await
            .map_err(|e| IngestError::Transport(format!("request to {url} failed: {e}")))?;

        if let Some(remaining) = response.headers().get("x-ratelimit-requests-remaining") {
            debug!("API requests remaining: {}", remaining.to_str().unwrap_or("?"));
        }

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| IngestError::Transport(format!("failed to read body from {url}: {e}")))?;

        if !status.is_success() {
            return Err(IngestError::Transport(format!(
                "{url} returned status {status}: {body}"
            )));
        }

        let parsed: Value = serde_json::from_str(&body)
            .map_err(|e| IngestError::Transport(format!("invalid JSON from {url}: {e}")))?;

        let errors = envelope_errors(&parsed);
        if !errors.is_empty() {
            warn!("API rejected {} with {} error(s)", url, errors.len());
            return Err(IngestError::RemoteApi { errors });
        }

        Ok(parsed)
    }
}

#[async_trait]
impl PayloadFetcher for FetchClient {
    async fn get(&self, url: &str, params: &[(String, String)]) -> Result<Arc<Value>, IngestError> {
        let key = RequestKey::new(url, params);
        {
            let cache = self.cache.read().await;
            if let Some(hit) = cache.get(&key) {
                debug!("cache hit for {}", url);
                return Ok(Arc::clone(hit));
            }
        }

        let body = Arc::new(self.issue(url, params).await?);

        let mut cache = self.cache.write().await;
        cache.insert(key, Arc::clone(&body));
        Ok(body)
    }

    fn requests_made(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }
}
