//! Topic fan-out, merge and deduplication.
//!
//! For one topic the aggregator queries every provider for each of the
//! topic's first `keywords_per_topic` keywords, all concurrently. Results are
//! then reduced on a single task, in provider-then-keyword order:
//!
//! 1. Concatenate each call's (already most-recent-first) articles
//! 2. Drop any article whose normalized URL was already seen (first-seen wins)
//! 3. Truncate to `max_articles_per_topic`
//!
//! Truncation happens after the merge, never per provider. A topic whose
//! providers all fail yields an empty list, which downstream treats as
//! "nothing to post".

use crate::error::ConfigError;
use crate::models::{Article, NewsSet, TopicConfig};
use crate::sources::{NewsSource, fetch_or_empty};
use futures::future::join_all;
use itertools::Itertools;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

/// Request-volume and output-size knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AggregationPolicy {
    /// How many of a topic's keywords are queried, from the front.
    pub keywords_per_topic: usize,
    /// Upper bound on articles per topic after merge.
    pub max_articles_per_topic: usize,
}

impl Default for AggregationPolicy {
    fn default() -> Self {
        Self {
            keywords_per_topic: 2,
            max_articles_per_topic: 5,
        }
    }
}

pub struct Aggregator {
    sources: Vec<Arc<dyn NewsSource>>,
    topics: Vec<TopicConfig>,
    policy: AggregationPolicy,
    /// Hard bound on one provider call including its retries.
    call_timeout: Duration,
}

impl Aggregator {
    pub fn new(
        sources: Vec<Arc<dyn NewsSource>>,
        topics: Vec<TopicConfig>,
        policy: AggregationPolicy,
        call_timeout: Duration,
    ) -> Self {
        Self {
            sources,
            topics,
            policy,
            call_timeout,
        }
    }

    pub fn topics(&self) -> &[TopicConfig] {
        &self.topics
    }

    pub fn topic(&self, name: &str) -> Option<&TopicConfig> {
        self.topics.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// Fetch one configured topic by name.
    pub async fn fetch_topic_named(&self, name: &str) -> Result<Vec<Article>, ConfigError> {
        let topic = self
            .topic(name)
            .ok_or_else(|| ConfigError::UnknownTopic(name.to_string()))?;
        Ok(self.fetch_topic(topic).await)
    }

    /// Fetch, merge and bound the articles for one topic.
    #[instrument(level = "info", skip_all, fields(topic = %topic.name))]
    pub async fn fetch_topic(&self, topic: &TopicConfig) -> Vec<Article> {
        let keywords = topic.keyword_prefix(self.policy.keywords_per_topic);

        let calls = self.sources.iter().flat_map(move |source| {
            keywords
                .iter()
                .map(move |keyword| self.bounded_fetch(source.as_ref(), &topic.name, keyword))
        });
        let batches = join_all(calls).await;

        let fetched: usize = batches.iter().map(Vec::len).sum();
        let articles = merge(batches, self.policy.max_articles_per_topic);
        info!(
            fetched,
            kept = articles.len(),
            providers = self.sources.len(),
            keywords = keywords.len(),
            "Merged topic articles"
        );
        articles
    }

    /// Fetch every configured topic concurrently.
    ///
    /// Topics are independent: a full outage for one leaves the others intact.
    #[instrument(level = "info", skip_all)]
    pub async fn get_all_news(&self) -> NewsSet {
        let results = join_all(self.topics.iter().map(|topic| self.fetch_topic(topic))).await;

        let mut news = NewsSet::new();
        for (topic, articles) in self.topics.iter().zip(results) {
            news.insert(topic.name.clone(), articles);
        }
        info!(total = news.article_count(), "Fetched all topics");
        news
    }

    async fn bounded_fetch(&self, source: &dyn NewsSource, topic: &str, keyword: &str) -> Vec<Article> {
        match timeout(self.call_timeout, fetch_or_empty(source, topic, keyword)).await {
            Ok(articles) => articles,
            Err(_) => {
                warn!(
                    provider = source.name(),
                    topic,
                    keyword,
                    timeout = ?self.call_timeout,
                    "Provider call timed out; contributing no articles"
                );
                Vec::new()
            }
        }
    }
}

/// Reduce per-call batches into one deduplicated, bounded list.
///
/// Batches are consumed in the order given; the first article seen for a
/// normalized URL wins.
pub fn merge(batches: Vec<Vec<Article>>, max: usize) -> Vec<Article> {
    let merged: Vec<Article> = batches
        .into_iter()
        .flatten()
        .unique_by(|a| a.url().to_string())
        .take(max)
        .collect();
    debug!(count = merged.len(), max, "Merged batches");
    merged
}
