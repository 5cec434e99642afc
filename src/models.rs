//! Data models shared by the fetch, format and dispatch stages.
//!
//! - [`Article`]: a provider-normalized news item
//! - [`TopicConfig`]: a named topic with its ordered provider keywords
//! - [`NewsSet`]: topic → articles for one fetch cycle
//! - [`Platform`]: the two messaging destinations
//!
//! Article identity for deduplication is the normalized URL (scheme, host and
//! path; query string and fragment discarded), see [`normalize_url`].

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::Deserialize;
use std::fmt;
use url::Url;

/// A news article normalized from any provider's response shape.
///
/// Fields are private so an `Article` cannot be mutated after construction;
/// the URL is always stored in normalized form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    title: String,
    url: String,
    source: String,
    published_at: Option<DateTime<Utc>>,
}

impl Article {
    /// Placeholder used when a provider omits the title.
    pub const NO_TITLE: &'static str = "No Title";
    /// Placeholder used when a provider omits the source name.
    pub const UNKNOWN_SOURCE: &'static str = "Unknown";

    /// Build an article, applying placeholder and URL normalization rules.
    ///
    /// Returns `None` when `url` is absent or blank, since every rendered
    /// entry needs a link.
    pub fn new(
        title: Option<&str>,
        url: Option<&str>,
        source: Option<&str>,
        published_at: Option<DateTime<Utc>>,
    ) -> Option<Self> {
        let url = url.map(str::trim).filter(|u| !u.is_empty())?;
        let title = title
            .map(crate::utils::plain_text)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| Self::NO_TITLE.to_string());
        let source = source
            .map(crate::utils::plain_text)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| Self::UNKNOWN_SOURCE.to_string());

        Some(Self {
            title,
            url: normalize_url(url),
            source,
            published_at,
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// The normalized link, also the deduplication key.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        self.published_at
    }
}

/// Strip query string and fragment from a URL.
///
/// Unparseable input is returned with everything from the first `?` or `#`
/// removed, so the function stays total. Idempotent.
pub fn normalize_url(raw: &str) -> String {
    let raw = raw.trim();
    match Url::parse(raw) {
        Ok(mut parsed) if parsed.has_host() => {
            parsed.set_query(None);
            parsed.set_fragment(None);
            parsed.to_string()
        }
        _ => raw
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    }
}

/// Sort articles most-recent-first. Stable; undated articles sink to the end
/// while keeping their relative order.
pub fn sort_recent_first(articles: &mut [Article]) {
    articles.sort_by_key(|a| std::cmp::Reverse(a.published_at()));
}

/// A named category and the ordered keywords used to query providers for it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TopicConfig {
    pub name: String,
    pub keywords: Vec<String>,
}

impl TopicConfig {
    pub fn new(name: &str, keywords: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    /// The first `n` keywords, the request-volume bound applied per topic.
    pub fn keyword_prefix(&self, n: usize) -> &[String] {
        &self.keywords[..n.min(self.keywords.len())]
    }
}

/// The built-in topic table.
pub fn default_topics() -> Vec<TopicConfig> {
    vec![
        TopicConfig::new("cybersecurity", &["cybersecurity", "data breach", "ransomware"]),
        TopicConfig::new("cryptocurrency", &["cryptocurrency", "bitcoin", "ethereum"]),
        TopicConfig::new("forex", &["forex", "currency exchange", "exchange rates"]),
    ]
}

/// Topic → articles for a single fetch cycle, kept in configured topic order.
///
/// Built fresh every cycle; nothing is carried over between cycles, so an
/// article seen last hour can be posted again.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewsSet {
    topics: Vec<(String, Vec<Article>)>,
}

impl NewsSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a topic. A topic inserted twice replaces the earlier entry in place.
    pub fn insert(&mut self, topic: impl Into<String>, articles: Vec<Article>) {
        let topic = topic.into();
        if let Some(slot) = self.topics.iter_mut().find(|(t, _)| *t == topic) {
            slot.1 = articles;
        } else {
            self.topics.push((topic, articles));
        }
    }

    #[cfg(test)]
    pub fn get(&self, topic: &str) -> Option<&[Article]> {
        self.topics
            .iter()
            .find(|(t, _)| t == topic)
            .map(|(_, a)| a.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Article])> {
        self.topics.iter().map(|(t, a)| (t.as_str(), a.as_slice()))
    }

    pub fn article_count(&self) -> usize {
        self.topics.iter().map(|(_, a)| a.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.article_count() == 0
    }
}

/// Messaging destinations. Telegram renders markdown links, Discord gets raw links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum Platform {
    Telegram,
    Discord,
}

impl Platform {
    pub const ALL: [Platform; 2] = [Platform::Telegram, Platform::Discord];

    /// Hard per-message character cap enforced by the platform.
    pub fn max_message_len(self) -> usize {
        match self {
            Platform::Telegram => 4096,
            Platform::Discord => 2000,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Telegram => f.write_str("telegram"),
            Platform::Discord => f.write_str("discord"),
        }
    }
}
