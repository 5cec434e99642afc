//! Runtime configuration.
//!
//! Three layers, highest precedence first:
//! 1. CLI flags / environment variables ([`Cli`])
//! 2. Optional YAML file (`--config`)
//! 3. Built-in defaults
//!
//! Credentials only come from layer 1. A provider without a key is skipped;
//! a platform without both token and channel is skipped. Posting modes need
//! at least one of each, checked by [`Config::validate_for_posting`].
//!
//! # Example file
//!
//! ```yaml
//! fetch_interval_secs: 7200
//! request_timeout_secs: 12
//! policy:
//!   keywords_per_topic: 2
//!   max_articles_per_topic: 3
//! topics:
//!   - name: cybersecurity
//!     keywords: [cybersecurity, "data breach"]
//! ```

use crate::aggregator::AggregationPolicy;
use crate::api::RetryConfig;
use crate::cli::Cli;
use crate::error::ConfigError;
use crate::models::{TopicConfig, default_topics};
use crate::sources::{SourceSettings, gnews, guardian, newsapi};
use crate::sinks::{discord, telegram};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, instrument};
use twilight_model::id::Id;
use twilight_model::id::marker::ChannelMarker;

/// Provider and platform base URLs; overridable for proxies and tests.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub newsapi: String,
    pub gnews: String,
    pub guardian: String,
    pub telegram: String,
    pub discord: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            newsapi: newsapi::DEFAULT_BASE_URL.to_string(),
            gnews: gnews::DEFAULT_BASE_URL.to_string(),
            guardian: guardian::DEFAULT_BASE_URL.to_string(),
            telegram: telegram::DEFAULT_BASE_URL.to_string(),
            discord: discord::DEFAULT_BASE_URL.to_string(),
        }
    }
}

/// The YAML file shape. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub topics: Option<Vec<TopicConfig>>,
    pub policy: Option<AggregationPolicy>,
    pub fetch_interval_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub message_delay_ms: Option<u64>,
    pub language: Option<String>,
    pub recency_hours: Option<i64>,
    pub retry: Option<RetryConfig>,
    pub endpoints: Option<Endpoints>,
}

impl FileConfig {
    #[instrument(level = "info")]
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::File {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        let parsed = serde_yaml::from_str(&raw).map_err(|e| ConfigError::File {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        info!("Loaded config file");
        Ok(parsed)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderKeys {
    pub newsapi: Option<String>,
    pub gnews: Option<String>,
    pub guardian: Option<String>,
}

impl ProviderKeys {
    pub fn configured(&self) -> usize {
        [&self.newsapi, &self.gnews, &self.guardian]
            .iter()
            .filter(|k| k.is_some())
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramTarget {
    pub token: String,
    pub chat_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscordTarget {
    pub token: String,
    pub channel_id: Id<ChannelMarker>,
}

/// Fully resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub providers: ProviderKeys,
    pub telegram: Option<TelegramTarget>,
    pub discord: Option<DiscordTarget>,
    pub topics: Vec<TopicConfig>,
    pub policy: AggregationPolicy,
    pub fetch_interval: Duration,
    pub request_timeout: Duration,
    pub message_delay: Duration,
    pub source_settings: SourceSettings,
    pub endpoints: Endpoints,
}

impl Config {
    /// Resolve configuration from the CLI and the optional config file.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::from_parts(cli, file)
    }

    pub fn from_parts(cli: &Cli, file: FileConfig) -> Result<Self, ConfigError> {
        let providers = ProviderKeys {
            newsapi: non_empty(&cli.news_api_key),
            gnews: non_empty(&cli.gnews_api_key),
            guardian: non_empty(&cli.guardian_api_key),
        };

        let telegram = match (non_empty(&cli.telegram_bot_token), non_empty(&cli.telegram_channel_id)) {
            (Some(token), Some(id)) => Some(TelegramTarget {
                token,
                chat_id: parse_id("TELEGRAM_CHANNEL_ID", &id)?,
            }),
            (Some(_), None) => {
                return Err(ConfigError::Incomplete {
                    name: "TELEGRAM_BOT_TOKEN",
                    missing: "TELEGRAM_CHANNEL_ID",
                });
            }
            (None, Some(_)) => {
                return Err(ConfigError::Incomplete {
                    name: "TELEGRAM_CHANNEL_ID",
                    missing: "TELEGRAM_BOT_TOKEN",
                });
            }
            (None, None) => None,
        };

        let discord = match (non_empty(&cli.discord_bot_token), non_empty(&cli.discord_channel_id)) {
            (Some(token), Some(id)) => {
                let raw: u64 = parse_id("DISCORD_CHANNEL_ID", &id)?;
                let channel_id = Id::new_checked(raw).ok_or_else(|| ConfigError::Invalid {
                    name: "DISCORD_CHANNEL_ID",
                    reason: "must be non-zero".to_string(),
                })?;
                Some(DiscordTarget { token, channel_id })
            }
            (Some(_), None) => {
                return Err(ConfigError::Incomplete {
                    name: "DISCORD_BOT_TOKEN",
                    missing: "DISCORD_CHANNEL_ID",
                });
            }
            (None, Some(_)) => {
                return Err(ConfigError::Incomplete {
                    name: "DISCORD_CHANNEL_ID",
                    missing: "DISCORD_BOT_TOKEN",
                });
            }
            (None, None) => None,
        };

        let topics = file.topics.unwrap_or_else(default_topics);
        if topics.is_empty() {
            return Err(ConfigError::Invalid {
                name: "topics",
                reason: "at least one topic is required".to_string(),
            });
        }
        if let Some(topic) = topics.iter().find(|t| t.keywords.is_empty()) {
            return Err(ConfigError::Invalid {
                name: "topics",
                reason: format!("topic {:?} has no keywords", topic.name),
            });
        }

        let mut policy = file.policy.unwrap_or_default();
        if let Some(max) = cli.max_articles_per_topic {
            policy.max_articles_per_topic = max;
        }
        if policy.max_articles_per_topic == 0 || policy.keywords_per_topic == 0 {
            return Err(ConfigError::Invalid {
                name: "policy",
                reason: "keywords_per_topic and max_articles_per_topic must be positive".to_string(),
            });
        }

        let fetch_interval_secs = cli.fetch_interval_secs.or(file.fetch_interval_secs).unwrap_or(3600);
        if fetch_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "FETCH_INTERVAL_SECS",
                reason: "must be positive".to_string(),
            });
        }

        let defaults = SourceSettings::default();
        let source_settings = SourceSettings {
            language: file.language.unwrap_or(defaults.language),
            page_size: policy.max_articles_per_topic,
            recency: file.recency_hours.map_or(defaults.recency, |h| {
                (h > 0).then(|| chrono::Duration::hours(h))
            }),
            retry: file.retry.unwrap_or(defaults.retry),
        };

        let config = Self {
            providers,
            telegram,
            discord,
            topics,
            policy,
            fetch_interval: Duration::from_secs(fetch_interval_secs),
            request_timeout: Duration::from_secs(file.request_timeout_secs.unwrap_or(12)),
            message_delay: Duration::from_millis(file.message_delay_ms.unwrap_or(1000)),
            source_settings,
            endpoints: file.endpoints.unwrap_or_default(),
        };
        debug!(
            providers = config.providers.configured(),
            telegram = config.telegram.is_some(),
            discord = config.discord.is_some(),
            topics = config.topics.len(),
            "Resolved configuration"
        );
        Ok(config)
    }

    pub fn require_providers(&self) -> Result<(), ConfigError> {
        if self.providers.configured() == 0 {
            return Err(ConfigError::NoProviders);
        }
        Ok(())
    }

    /// Posting modes need a provider and a destination.
    pub fn validate_for_posting(&self) -> Result<(), ConfigError> {
        self.require_providers()?;
        if self.telegram.is_none() && self.discord.is_none() {
            return Err(ConfigError::NoPlatforms);
        }
        Ok(())
    }

    /// Upper bound on one provider call, covering every retry and its backoff.
    pub fn provider_call_timeout(&self) -> Duration {
        let retry = self.source_settings.retry;
        let backoff: Duration = (0..retry.max_retries)
            .map(|i| {
                let shift = i.min(16) as u32;
                retry.base_delay.saturating_mul(1 << shift).min(Duration::from_secs(30))
                    + Duration::from_millis(250)
            })
            .sum();
        self.request_timeout.saturating_mul(retry.max_retries as u32 + 1) + backoff
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_id<T: std::str::FromStr>(name: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| ConfigError::Invalid {
        name,
        reason: format!("{raw:?} is not a numeric ID"),
    })
}
