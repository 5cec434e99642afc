//! [GNews](https://gnews.io) `/search` client.

use super::{NewsSource, SourceSettings, parse_timestamp};
use crate::api::get_json_with_backoff;
use crate::error::{ProviderError, ProviderErrorKind};
use crate::models::{Article, sort_recent_first};
use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, instrument};

pub const DEFAULT_BASE_URL: &str = "https://gnews.io/api/v4";

#[derive(Deserialize)]
struct Envelope {
    articles: Option<Vec<WireArticle>>,
    errors: Option<serde_json::Value>,
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

pub struct GNewsClient {
    http: Client,
    base_url: String,
    token: String,
    settings: SourceSettings,
}

impl GNewsClient {
    pub fn new(http: Client, base_url: &str, token: &str, settings: SourceSettings) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            settings,
        }
    }

    fn query(&self, keyword: &str) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("q", keyword.to_string()),
            ("token", self.token.clone()),
            ("lang", self.settings.language.clone()),
            ("max", self.settings.page_size.to_string()),
            ("sortby", "publishedAt".to_string()),
        ];
        if let Some(after) = self.settings.published_after() {
            query.push(("from", after.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }
        query
    }
}

#[async_trait]
impl NewsSource for GNewsClient {
    fn name(&self) -> &'static str {
        "gnews"
    }

    #[instrument(level = "info", skip(self), fields(provider = "gnews"))]
    async fn fetch(&self, keyword: &str) -> Result<Vec<Article>, ProviderError> {
        let url = format!("{}/search", self.base_url);
        let err = |cause| ProviderError::new(self.name(), keyword, cause);

        let value = get_json_with_backoff(&self.http, &url, &self.query(keyword), self.settings.retry)
            .await
            .map_err(err)?;
        let envelope: Envelope = serde_json::from_value(value)
            .map_err(|e| err(ProviderErrorKind::Response(e.to_string())))?;

        if let Some(errors) = envelope.errors {
            return Err(err(ProviderErrorKind::Response(errors.to_string())));
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

        info!(count = articles.len(), "Fetched GNews articles");
        Ok(articles)
    }
}
