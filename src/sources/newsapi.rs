//! [NewsAPI](https://newsapi.org) `/everything` search client.
//!
//! NewsAPI reports failures in the body (`"status": "error"`) even when the
//! HTTP status is 200, so both are checked.

use super::{NewsSource, SourceSettings, parse_timestamp};
use crate::api::get_json_with_backoff;
use crate::error::{ProviderError, ProviderErrorKind};
use crate::models::{Article, sort_recent_first};
use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, instrument};

pub const DEFAULT_BASE_URL: &str = "https://newsapi.org/v2";

#[derive(Deserialize)]
struct Envelope {
    status: Option<String>,
    message: Option<String>,
    articles: Option<Vec<WireArticle>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireArticle {
    title: Option<String>,
    url: Option<String>,
    source: Option<WireSource>,
    published_at: Option<String>,
}

#[derive(Deserialize)]
struct WireSource {
    name: Option<String>,
}

pub struct NewsApiClient {
    http: Client,
    base_url: String,
    api_key: String,
    settings: SourceSettings,
}

impl NewsApiClient {
    pub fn new(http: Client, base_url: &str, api_key: &str, settings: SourceSettings) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            settings,
        }
    }

    fn query(&self, keyword: &str) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("q", keyword.to_string()),
            ("apiKey", self.api_key.clone()),
            ("language", self.settings.language.clone()),
            ("sortBy", "publishedAt".to_string()),
            ("pageSize", self.settings.page_size.to_string()),
        ];
        if let Some(after) = self.settings.published_after() {
            query.push(("from", after.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }
        query
    }
}

#[async_trait]
impl NewsSource for NewsApiClient {
    fn name(&self) -> &'static str {
        "newsapi"
    }

    #[instrument(level = "info", skip(self), fields(provider = "newsapi"))]
    async fn fetch(&self, keyword: &str) -> Result<Vec<Article>, ProviderError> {
        let url = format!("{}/everything", self.base_url);
        let err = |cause| ProviderError::new(self.name(), keyword, cause);

        let value = get_json_with_backoff(&self.http, &url, &self.query(keyword), self.settings.retry)
            .await
            .map_err(err)?;
        let envelope: Envelope = serde_json::from_value(value)
            .map_err(|e| err(ProviderErrorKind::Response(e.to_string())))?;

        if envelope.status.as_deref() != Some("ok") {
            return Err(err(ProviderErrorKind::Response(
                envelope.message.unwrap_or_else(|| "status is not ok".to_string()),
            )));
        }
        let wire = envelope
            .articles
            .ok_or_else(|| err(ProviderErrorKind::Response("missing articles".to_string())))?;

        let mut articles: Vec<Article> = wire
            .into_iter()
            .filter_map(|a| {
                Article::new(
                    a.title.as_deref(),
                    a.url.as_deref(),
                    a.source.as_ref().and_then(|s| s.name.as_deref()),
                    parse_timestamp(a.published_at.as_deref()),
                )
            })
            .collect();
        sort_recent_first(&mut articles);

        info!(count = articles.len(), "Fetched NewsAPI articles");
        Ok(articles)
    }
}
