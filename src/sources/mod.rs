//! News provider clients.
//!
//! Each client turns a topic keyword into one provider-specific HTTP request
//! and normalizes the provider's response into [`Article`]s.
//!
//! # Supported Providers
//!
//! | Provider | Module | Credential | Recency filter |
//! |----------|--------|------------|----------------|
//! | NewsAPI | [`newsapi`] | `apiKey` query param | `from` (RFC 3339) |
//! | GNews | [`gnews`] | `token` query param | `from` (RFC 3339) |
//! | The Guardian | [`guardian`] | `api-key` query param | `from-date` (date) |
//!
//! # Common Patterns
//!
//! Clients implement [`NewsSource`], whose `fetch` returns a
//! [`ProviderError`] on failure. The aggregator goes through
//! [`fetch_or_empty`], which logs the error and degrades that provider's
//! contribution to an empty list so one outage never aborts a cycle.

pub mod gnews;
pub mod guardian;
pub mod newsapi;

use crate::api::RetryConfig;
use crate::error::ProviderError;
use crate::models::Article;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, instrument, warn};

pub use gnews::GNewsClient;
pub use guardian::GuardianClient;
pub use newsapi::NewsApiClient;

/// A news provider queried by keyword.
#[async_trait]
pub trait NewsSource: Send + Sync {
    /// Short stable identifier used in logs and errors.
    fn name(&self) -> &'static str;

    /// Fetch recent articles for one keyword, most-recent-first.
    async fn fetch(&self, keyword: &str) -> Result<Vec<Article>, ProviderError>;
}

/// Request settings shared by all provider clients.
#[derive(Debug, Clone)]
pub struct SourceSettings {
    /// ISO 639-1 language filter.
    pub language: String,
    /// Result-count cap per request.
    pub page_size: usize,
    /// Only articles published within this window are requested.
    pub recency: Option<Duration>,
    pub retry: RetryConfig,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            page_size: 5,
            recency: Some(Duration::hours(24)),
            retry: RetryConfig::default(),
        }
    }
}

impl SourceSettings {
    /// Lower bound for the recency filter, if any.
    pub fn published_after(&self) -> Option<DateTime<Utc>> {
        self.recency.map(|window| Utc::now() - window)
    }
}

/// Fetch from one provider, logging and swallowing any [`ProviderError`].
#[instrument(level = "debug", skip(source), fields(provider = source.name()))]
pub async fn fetch_or_empty(source: &dyn NewsSource, topic: &str, keyword: &str) -> Vec<Article> {
    match source.fetch(keyword).await {
        Ok(articles) => {
            debug!(count = articles.len(), "Provider returned articles");
            articles
        }
        Err(e) => {
            warn!(
                provider = e.provider,
                topic,
                keyword = %e.keyword,
                error = %e.cause,
                "Provider fetch failed; contributing no articles"
            );
            Vec::new()
        }
    }
}

/// Parse an RFC 3339 timestamp as returned by all three providers.
pub(crate) fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory provider double for aggregator tests.

    use super::*;
    use crate::error::ProviderErrorKind;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration as StdDuration;

    pub struct StaticSource {
        pub name: &'static str,
        pub by_keyword: HashMap<String, Vec<Article>>,
        pub fail: bool,
        pub delay: Option<StdDuration>,
        pub calls: Mutex<Vec<String>>,
    }

    impl StaticSource {
        pub fn new(name: &'static str) -> Self {
            Self {
                name,
                by_keyword: HashMap::new(),
                fail: false,
                delay: None,
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn with(mut self, keyword: &str, urls: &[&str]) -> Self {
            let articles = urls
                .iter()
                .map(|u| article(&format!("{} {u}", self.name), u, self.name))
                .collect();
            self.by_keyword.insert(keyword.to_string(), articles);
            self
        }

        pub fn failing(mut self) -> Self {
            self.fail = true;
            self
        }

        pub fn slow(mut self, delay: StdDuration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NewsSource for StaticSource {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn fetch(&self, keyword: &str) -> Result<Vec<Article>, ProviderError> {
            self.calls.lock().unwrap().push(keyword.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(ProviderError::new(
                    self.name,
                    keyword,
                    ProviderErrorKind::Transport("connection refused".into()),
                ));
            }
            Ok(self.by_keyword.get(keyword).cloned().unwrap_or_default())
        }
    }

    pub fn article(title: &str, url: &str, source: &str) -> Article {
        Article::new(Some(title), Some(url), Some(source), None).unwrap()
    }
}
