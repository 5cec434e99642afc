//! Discord REST sink.
//!
//! Posts through `twilight-http` with a bot token; no gateway connection is
//! needed to send to a known channel.

use super::MessageSink;
use crate::error::PlatformSendError;
use crate::models::Platform;
use crate::utils::truncate_for_log;
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument};
use twilight_http::Client as HttpClient;
use twilight_http::error::ErrorType;
use twilight_model::channel::message::{AllowedMentions, MessageFlags};
use twilight_model::id::Id;
use twilight_model::id::marker::ChannelMarker;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://discord.com";

pub struct DiscordSink {
    http: HttpClient,
    channel_id: Id<ChannelMarker>,
    /// Empty `parse` list: nothing in a headline may ping anyone.
    no_mentions: AllowedMentions,
}

impl fmt::Debug for DiscordSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscordSink")
            .field("channel_id", &self.channel_id)
            .finish_non_exhaustive()
    }
}

impl DiscordSink {
    /// `base_url` other than the default routes requests through that host,
    /// over plain HTTP when its scheme is `http`.
    pub fn new(base_url: &str, token: &str, channel_id: Id<ChannelMarker>, timeout: Duration) -> Self {
        // Rate limits are handled per message by the dispatcher.
        let mut builder = HttpClient::builder()
            .token(token.to_string())
            .ratelimiter(None)
            .timeout(timeout);
        if let Some((host, use_http)) = proxy_host(base_url) {
            builder = builder.proxy(host, use_http);
        }
        Self {
            http: builder.build(),
            channel_id,
            no_mentions: AllowedMentions::default(),
        }
    }
}

fn proxy_host(base_url: &str) -> Option<(String, bool)> {
    let url = Url::parse(base_url).ok()?;
    let host = url.host_str()?;
    if host == "discord.com" && url.port().is_none() {
        return None;
    }
    let authority = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    Some((authority, url.scheme() == "http"))
}

#[async_trait]
impl MessageSink for DiscordSink {
    fn platform(&self) -> Platform {
        Platform::Discord
    }

    #[instrument(level = "debug", skip_all, fields(bytes = text.len()))]
    async fn send(&self, text: &str) -> Result<(), PlatformSendError> {
        self.http
            .create_message(self.channel_id)
            .content(text)
            .flags(MessageFlags::SUPPRESS_EMBEDS)
            .allowed_mentions(Some(&self.no_mentions))
            .await
            .map_err(|e| classify(&e))?;
        debug!(channel_id = self.channel_id.get(), "Discord message sent");
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    retry_after: Option<f64>,
}

fn classify(error: &twilight_http::Error) -> PlatformSendError {
    match error.kind() {
        ErrorType::Response { status, body, .. } => {
            let parsed: ErrorBody = serde_json::from_slice(body).unwrap_or_default();
            match status.get() {
                404 => PlatformSendError::ChannelNotFound,
                403 => PlatformSendError::Forbidden,
                429 => PlatformSendError::RateLimited {
                    retry_after: parsed.retry_after.map_or(Duration::from_secs(1), retry_after),
                },
                code => PlatformSendError::Http {
                    status: code,
                    message: parsed.message.unwrap_or_else(|| {
                        truncate_for_log(&String::from_utf8_lossy(body), 200)
                    }),
                },
            }
        }
        ErrorType::Unauthorized => PlatformSendError::Forbidden,
        _ => PlatformSendError::Transport(error.to_string()),
    }
}

/// Discord reports fractional seconds; anything unrepresentable falls back to 1s.
fn retry_after(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::from_secs(1))
}
