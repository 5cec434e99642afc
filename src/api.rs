//! Provider HTTP interaction with exponential backoff retry logic.
//!
//! # Architecture
//!
//! The module uses a trait-based design so retry behavior can wrap any request:
//! - [`GetAsync`]: Core trait defining one async GET that yields JSON
//! - [`JsonGet`]: A single `reqwest` GET with status and body checks
//! - [`RetryGet`]: Decorator that adds retry logic to any `GetAsync` implementation
//!
//! # Retry Strategy
//!
//! - Only transient failures are retried (transport errors, 429, 5xx)
//! - Exponential backoff starting at `base_delay`
//! - Maximum delay capped at 30 seconds
//! - Random jitter (0-250ms) added to prevent thundering herd

use crate::error::ProviderErrorKind;
use crate::utils::truncate_for_log;
use rand::{Rng, rng};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

/// Retry knobs shared by every provider client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Extra attempts after the first one.
    pub max_retries: usize,
    /// Initial delay between retries (doubles with each attempt).
    #[serde(with = "secs")]
    pub base_delay: StdDuration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: StdDuration::from_secs(1),
        }
    }
}

mod secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// Build the HTTP client shared by all provider and sink calls.
///
/// The client-side timeout bounds every single request so a slow provider
/// can never hang a fetch cycle.
pub fn build_client(timeout: StdDuration) -> reqwest::Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Trait for a single async GET returning a parsed body.
pub trait GetAsync {
    /// The type of response returned on success.
    type Response;

    /// Issue the request once.
    async fn get(&self) -> Result<Self::Response, ProviderErrorKind>;
}

/// One GET against a provider endpoint, decoded as JSON.
///
/// Non-success statuses are turned into [`ProviderErrorKind::Status`] with
/// the provider's `message` field (or a body excerpt) attached.
pub struct JsonGet<'a> {
    pub client: &'a Client,
    pub url: &'a str,
    pub query: &'a [(&'a str, String)],
}

impl fmt::Debug for JsonGet<'_> {
    // The query carries API credentials; keep it out of logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonGet").field("url", &self.url).finish()
    }
}

impl GetAsync for JsonGet<'_> {
    type Response = Value;

    async fn get(&self) -> Result<Value, ProviderErrorKind> {
        let t0 = Instant::now();
        let resp = self.client.get(self.url).query(self.query).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        debug!(
            url = self.url,
            status = status.as_u16(),
            bytes = body.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Provider responded"
        );

        if !status.is_success() {
            return Err(ProviderErrorKind::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            ProviderErrorKind::Response(format!(
                "invalid JSON ({e}): {}",
                truncate_for_log(&body, 200)
            ))
        })
    }
}

/// Pull a human-readable message out of an error body.
fn error_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.pointer("/response/message"))
                .or_else(|| v.pointer("/errors/0"))
        })
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| truncate_for_log(body.trim(), 200))
}

/// Wrapper that adds exponential backoff retry logic to any [`GetAsync`] implementation.
///
/// The delay between retries follows this formula:
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryGet<T> {
    /// The underlying request to repeat.
    inner: T,
    /// Maximum number of retry attempts before giving up.
    max_retries: usize,
    /// Initial delay between retries (doubles with each attempt).
    base_delay: StdDuration,
    /// Maximum delay cap to prevent excessive waiting.
    max_delay: StdDuration,
}

impl<T> RetryGet<T>
where
    T: GetAsync,
{
    /// Create a new retry wrapper around an existing [`GetAsync`] implementation.
    ///
    /// # Arguments
    ///
    /// * `inner` - The single request to repeat
    /// * `retry` - Attempt count and initial delay (2 retries from 1 second by default)
    ///
    /// # Example
    ///
    /// ```ignore
    /// let request = JsonGet { client: &http, url: &url, query: &query };
    /// let value = RetryGet::new(request, RetryConfig::default()).get().await?;
    /// ```
    pub fn new(inner: T, retry: RetryConfig) -> Self {
        Self {
            inner,
            max_retries: retry.max_retries,
            base_delay: retry.base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }

    fn backoff(&self, attempt: usize) -> StdDuration {
        let shift = (attempt - 1).min(16) as u32;
        let delay = self.base_delay.saturating_mul(1 << shift).min(self.max_delay);
        let jitter_ms: u64 = rng().random_range(0..=250);
        delay + StdDuration::from_millis(jitter_ms)
    }
}

impl<T> fmt::Debug for RetryGet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryGet")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> GetAsync for RetryGet<T>
where
    T: GetAsync,
{
    type Response = T::Response;

    async fn get(&self) -> Result<Self::Response, ProviderErrorKind> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            match self.inner.get().await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    attempt += 1;
                    if !e.is_transient() || attempt > self.max_retries {
                        return Err(e);
                    }

                    let delay = self.backoff(attempt);
                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                        ?delay,
                        error = %e,
                        "Provider request failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// GET a provider endpoint as JSON with exponential backoff retry logic.
///
/// This is the entry point every news provider client uses. Credentials
/// travel in `query` and are never logged.
///
/// # Arguments
///
/// * `client` - The shared HTTP client (carries the per-request timeout)
/// * `url` - Endpoint URL without query string
/// * `query` - Query parameters, API key included
/// * `retry` - Retry policy for transient failures
///
/// # Returns
///
/// The decoded JSON body, or the last error once retries are exhausted.
/// Non-transient errors (4xx other than 429, malformed JSON) return at once.
///
/// # Retry Behavior
///
/// - Exponential backoff: `base_delay`, then doubling (capped at 30s)
/// - Random jitter of up to 250ms per delay
#[instrument(level = "debug", skip(client, query, retry))]
pub async fn get_json_with_backoff(
    client: &Client,
    url: &str,
    query: &[(&str, String)],
    retry: RetryConfig,
) -> Result<Value, ProviderErrorKind> {
    RetryGet::new(JsonGet { client, url, query }, retry).get().await
}
