//! Telegram Bot API client.
//!
//! [`TelegramApi`] wraps the two Bot API methods this service needs:
//! `sendMessage` for posting and `getUpdates` for long-polling commands.
//! [`TelegramSink`] binds it to the destination channel.

use super::MessageSink;
use crate::error::PlatformSendError;
use crate::models::Platform;
use crate::utils::truncate_for_log;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.telegram.org";

/// Generic Bot API response envelope.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<u16>,
    description: Option<String>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

/// One entry from `getUpdates`; only text messages are of interest.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Clone)]
pub struct TelegramApi {
    http: Client,
    base_url: String,
    token: String,
}

impl fmt::Debug for TelegramApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramApi")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl TelegramApi {
    pub fn new(http: Client, base_url: &str, token: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    /// Send a Markdown message, falling back to plain text if Telegram
    /// rejects the markup.
    #[instrument(level = "debug", skip(self, text), fields(bytes = text.len()))]
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), PlatformSendError> {
        match self.send_raw(chat_id, text, Some("Markdown")).await {
            Err(PlatformSendError::Http { status: 400, message })
                if message.contains("can't parse entities") =>
            {
                warn!(chat_id, %message, "Telegram rejected Markdown; resending as plain text");
                self.send_raw(chat_id, text, None).await
            }
            other => other,
        }
    }

    async fn send_raw(
        &self,
        chat_id: i64,
        text: &str,
        parse_mode: Option<&str>,
    ) -> Result<(), PlatformSendError> {
        let mut body = json!({
            "chat_id": chat_id,
            "text": text,
            "disable_web_page_preview": true,
        });
        if let Some(mode) = parse_mode {
            body["parse_mode"] = json!(mode);
        }

        let resp = self
            .http
            .post(self.method_url("sendMessage"))
            .json(&body)
            .send()
            .await?;
        let status = resp.status().as_u16();
        let text = resp.text().await?;
        let envelope: Envelope<serde_json::Value> =
            serde_json::from_str(&text).map_err(|_| PlatformSendError::Http {
                status,
                message: truncate_for_log(&text, 200),
            })?;

        if envelope.ok {
            debug!(chat_id, "Telegram message sent");
            Ok(())
        } else {
            Err(classify(status, envelope))
        }
    }

    /// Long-poll for updates after `offset`.
    #[instrument(level = "debug", skip(self))]
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        poll_timeout: Duration,
    ) -> Result<Vec<Update>, PlatformSendError> {
        let mut query = vec![
            ("timeout", poll_timeout.as_secs().to_string()),
            ("allowed_updates", r#"["message"]"#.to_string()),
        ];
        if let Some(offset) = offset {
            query.push(("offset", offset.to_string()));
        }

        let resp = self
            .http
            .get(self.method_url("getUpdates"))
            .query(&query)
            // The server holds the request open for up to `poll_timeout`.
            .timeout(poll_timeout + Duration::from_secs(10))
            .send()
            .await?;
        let status = resp.status().as_u16();
        let envelope: Envelope<Vec<Update>> = resp.json().await?;

        if envelope.ok {
            Ok(envelope.result.unwrap_or_default())
        } else {
            Err(classify(status, envelope))
        }
    }
}

fn classify<T>(status: u16, envelope: Envelope<T>) -> PlatformSendError {
    let code = envelope.error_code.unwrap_or(status);
    let description = envelope.description.unwrap_or_default();
    match code {
        403 => PlatformSendError::Forbidden,
        404 => PlatformSendError::ChannelNotFound,
        400 if description.contains("chat not found") => PlatformSendError::ChannelNotFound,
        429 => PlatformSendError::RateLimited {
            retry_after: Duration::from_secs(
                envelope
                    .parameters
                    .and_then(|p| p.retry_after)
                    .unwrap_or(1),
            ),
        },
        _ => PlatformSendError::Http {
            status: code,
            message: description,
        },
    }
}

/// Posts to one Telegram chat or channel.
#[derive(Debug, Clone)]
pub struct TelegramSink {
    api: TelegramApi,
    chat_id: i64,
}

impl TelegramSink {
    pub fn new(api: TelegramApi, chat_id: i64) -> Self {
        Self { api, chat_id }
    }
}

#[async_trait]
impl MessageSink for TelegramSink {
    fn platform(&self) -> Platform {
        Platform::Telegram
    }

    async fn send(&self, text: &str) -> Result<(), PlatformSendError> {
        self.api.send_message(self.chat_id, text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::{GET, POST};
    use httpmock::MockServer;

    fn api(server: &MockServer) -> TelegramApi {
        let http = crate::api::build_client(Duration::from_secs(5)).unwrap();
        TelegramApi::new(http, &server.base_url(), "123:abc")
    }

    #[tokio::test]
    async fn test_send_message_posts_markdown() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/bot123:abc/sendMessage")
                .json_body_includes(r#"{"chat_id": -10042, "parse_mode": "Markdown", "disable_web_page_preview": true}"#);
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"ok":true,"result":{"message_id":7}}"#);
        });

        let sink = TelegramSink::new(api(&server), -10042);
        sink.send("📰 *Latest Forex News*").await.unwrap();
        mock.assert();
    }

    #[tokio::test]
    async fn test_chat_not_found_is_terminal() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/bot123:abc/sendMessage");
            then.status(400)
                .header("content-type", "application/json")
                .body(r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#);
        });

        let err = TelegramSink::new(api(&server), 1).send("hi").await.unwrap_err();
        assert!(matches!(err, PlatformSendError::ChannelNotFound));
        assert!(err.is_terminal());
    }

    #[tokio::test]
    async fn test_rate_limit_carries_retry_after() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/bot123:abc/sendMessage");
            then.status(429)
                .header("content-type", "application/json")
                .body(r#"{"ok":false,"error_code":429,"description":"Too Many Requests: retry after 5","parameters":{"retry_after":5}}"#);
        });

        let err = TelegramSink::new(api(&server), 1).send("hi").await.unwrap_err();
        match err {
            PlatformSendError::RateLimited { retry_after } => assert_eq!(retry_after, Duration::from_secs(5)),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_get_updates_parses_messages() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/bot123:abc/getUpdates")
                .query_param("offset", "11")
                .query_param("timeout", "0");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"ok":true,"result":[
                    {"update_id": 11, "message": {"message_id": 1, "chat": {"id": 99, "type": "private"}, "text": "/forex"}},
                    {"update_id": 12, "edited_message": {"message_id": 2, "chat": {"id": 99}}}
                ]}"#);
        });

        let updates = api(&server).get_updates(Some(11), Duration::ZERO).await.unwrap();
        mock.assert();
        assert_eq!(updates.len(), 2);
        let msg = updates[0].message.as_ref().unwrap();
        assert_eq!(msg.chat.id, 99);
        assert_eq!(msg.text.as_deref(), Some("/forex"));
        assert!(updates[1].message.is_none());
    }

    #[tokio::test]
    async fn test_transport_error_hides_token() {
        let http = crate::api::build_client(Duration::from_secs(5)).unwrap();
        let api = TelegramApi::new(http, "http://127.0.0.1:1", "123:SECRET-BOT-TOKEN");

        let err = api.send_message(1, "hi").await.unwrap_err();
        assert!(matches!(err, PlatformSendError::Transport(_)));
        assert!(!err.to_string().contains("SECRET-BOT-TOKEN"), "token in error: {err}");

        let err = api.get_updates(None, Duration::ZERO).await.unwrap_err();
        assert!(!err.to_string().contains("SECRET-BOT-TOKEN"), "token in error: {err}");
    }

    #[test]
    fn test_classify_forbidden() {
        let envelope: Envelope<()> = serde_json::from_str(
            r#"{"ok":false,"error_code":403,"description":"Forbidden: bot is not a member of the channel chat"}"#,
        )
        .unwrap();
        assert!(matches!(classify(403, envelope), PlatformSendError::Forbidden));
    }
}
