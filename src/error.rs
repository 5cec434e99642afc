//! Error types for each boundary of the pipeline.
//!
//! - [`ProviderError`]: a news provider call failed; logged and degraded to an
//!   empty result, never returned past the source client boundary
//! - [`PlatformSendError`]: a messaging sink rejected a message
//! - [`ConfigError`]: startup configuration is unusable (fatal)

use std::time::Duration;
use thiserror::Error;

/// Why a provider call failed.
#[derive(Debug, Error)]
pub enum ProviderErrorKind {
    /// Network failure or timeout before a response arrived.
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-success status from the provider.
    #[error("HTTP status {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Error message or body excerpt from the provider
        message: String,
    },

    /// The provider answered but the payload was not what we expect.
    #[error("unexpected response: {0}")]
    Response(String),
}

impl ProviderErrorKind {
    /// Transport failures, rate limiting and server errors are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderErrorKind::Transport(_) => true,
            ProviderErrorKind::Status { status, .. } => *status == 429 || *status >= 500,
            ProviderErrorKind::Response(_) => false,
        }
    }
}

impl From<reqwest::Error> for ProviderErrorKind {
    // reqwest includes the request URL in its message, and provider URLs
    // carry the API key as a query parameter.
    fn from(e: reqwest::Error) -> Self {
        let e = e.without_url();
        if e.is_decode() {
            ProviderErrorKind::Response(e.to_string())
        } else {
            ProviderErrorKind::Transport(e.to_string())
        }
    }
}

/// A failed provider call, with enough context to log it.
#[derive(Debug, Error)]
#[error("{provider} failed for {keyword:?}: {cause}")]
pub struct ProviderError {
    pub provider: &'static str,
    pub keyword: String,
    #[source]
    pub cause: ProviderErrorKind,
}

impl ProviderError {
    pub fn new(provider: &'static str, keyword: &str, cause: ProviderErrorKind) -> Self {
        Self {
            provider,
            keyword: keyword.to_string(),
            cause,
        }
    }
}

/// Errors raised by a messaging sink for a single message.
#[derive(Debug, Error)]
pub enum PlatformSendError {
    #[error("channel not found")]
    ChannelNotFound,

    #[error("bot lacks permission to post in channel")]
    Forbidden,

    #[error("rate limited; retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("HTTP status {status}: {message}")]
    Http { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("platform not configured")]
    NotConfigured,

    #[error("not sent: an earlier message hit a terminal error")]
    Aborted,
}

impl PlatformSendError {
    /// Terminal errors end the whole post attempt for that platform.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PlatformSendError::ChannelNotFound
                | PlatformSendError::Forbidden
                | PlatformSendError::NotConfigured
        )
    }
}

impl From<reqwest::Error> for PlatformSendError {
    // Telegram puts the bot token in the URL path.
    fn from(e: reqwest::Error) -> Self {
        PlatformSendError::Transport(e.without_url().to_string())
    }
}

/// Startup configuration problems. These are the only fatal errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no news provider configured (set NEWS_API_KEY, GNEWS_API_KEY or GUARDIAN_API_KEY)")]
    NoProviders,

    #[error("no messaging platform configured (set TELEGRAM_* or DISCORD_* variables)")]
    NoPlatforms,

    #[error("{name} is set but {missing} is missing")]
    Incomplete {
        name: &'static str,
        missing: &'static str,
    },

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("failed to read config file {path}: {reason}")]
    File { path: String, reason: String },

    #[error("unknown topic {0:?}")]
    UnknownTopic(String),
}
