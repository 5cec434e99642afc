//! [The Guardian Open Platform](https://open-platform.theguardian.com) content search client.
//!
//! Results carry no per-article source name; every article is attributed to
//! the Guardian itself.

use super::{NewsSource, SourceSettings, parse_timestamp};
use crate::api::get_json_with_backoff;
use crate::error::{ProviderError, ProviderErrorKind};
use crate::models::{Article, sort_recent_first};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, instrument};

pub const DEFAULT_BASE_URL: &str = "https://content.guardianapis.com";
const SOURCE_NAME: &str = "The Guardian";

#[derive(Deserialize)]
struct Envelope {
    response: Option<WireResponse>,
}

#[derive(Deserialize)]
struct WireResponse {
    status: Option<String>,
    message: Option<String>,
    results: Option<Vec<WireResult>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResult {
    web_title: Option<String>,
    web_url: Option<String>,
    web_publication_date: Option<String>,
}

pub struct GuardianClient {
    http: Client,
    base_url: String,
    api_key: String,
    settings: SourceSettings,
}

impl GuardianClient {
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
            ("api-key", self.api_key.clone()),
            ("lang", self.settings.language.clone()),
            ("page-size", self.settings.page_size.to_string()),
            ("order-by", "newest".to_string()),
        ];
        if let Some(after) = self.settings.published_after() {
            query.push(("from-date", after.date_naive().to_string()));
        }
        query
    }
}

#[async_trait]
impl NewsSource for GuardianClient {
    fn name(&self) -> &'static str {
        "guardian"
    }

    #[instrument(level = "info", skip(self), fields(provider = "guardian"))]
    async fn fetch(&self, keyword: &str) -> Result<Vec<Article>, ProviderError> {
        let url = format!("{}/search", self.base_url);
        let err = |cause| ProviderError::new(self.name(), keyword, cause);

        let value = get_json_with_backoff(&self.http, &url, &self.query(keyword), self.settings.retry)
            .await
            .map_err(err)?;
        let envelope: Envelope = serde_json::from_value(value)
            .map_err(|e| err(ProviderErrorKind::Response(e.to_string())))?;
        let response = envelope
            .response
            .ok_or_else(|| err(ProviderErrorKind::Response("missing response".to_string())))?;

        if response.status.as_deref() != Some("ok") {
            return Err(err(ProviderErrorKind::Response(
                response.message.unwrap_or_else(|| "status is not ok".to_string()),
            )));
        }
        let results = response
            .results
            .ok_or_else(|| err(ProviderErrorKind::Response("missing results".to_string())))?;

        let mut articles: Vec<Article> = results
            .into_iter()
            .filter_map(|r| {
                Article::new(
                    r.web_title.as_deref(),
                    r.web_url.as_deref(),
                    Some(SOURCE_NAME),
                    parse_timestamp(r.web_publication_date.as_deref()),
                )
            })
            .collect();
        sort_recent_first(&mut articles);

        info!(count = articles.len(), "Fetched Guardian articles");
        Ok(articles)
    }
}
