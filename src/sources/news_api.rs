use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use super::{normalize_text, ContentItem, SourceClient};

const NEWS_API_BASE: &str = "https://newsapi.org";

#[derive(Debug, Deserialize)]
struct Everything {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    articles: Vec<Article>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Article {
    #[serde(default)]
    source: Option<ArticleSource>,
    title: Option<String>,
    description: Option<String>,
    content: Option<String>,
    url: Option<String>,
    published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ArticleSource {
    name: Option<String>,
}

/// NewsAPI `/v2/everything` search, newest first.
pub struct NewsApiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    language: String,
    max_results: usize,
}

impl NewsApiClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("dream-oracle/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(15))
            .build()
            .context("building NewsAPI http client")?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: NEWS_API_BASE.to_string(),
            language: "en".to_string(),
            max_results: 3,
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_max_results(mut self, n: usize) -> Self {
        self.max_results = n;
        self
    }

    /// Parse an `/v2/everything` JSON body into at most `max` items.
    pub fn parse_response(body: &str, max: usize) -> Result<Vec<ContentItem>> {
        let resp: Everything = serde_json::from_str(body).context("parsing NewsAPI json")?;
        if resp.status != "ok" {
            bail!(
                "NewsAPI status '{}': {}",
                resp.status,
                resp.message.unwrap_or_default()
            );
        }

        let items = resp
            .articles
            .into_iter()
            .take(max)
            .map(|a| {
                let source = a
                    .source
                    .and_then(|s| s.name)
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| "NewsAPI".to_string());
                let published_at = a
                    .published_at
                    .as_deref()
                    .and_then(|ts| OffsetDateTime::parse(ts, &Rfc3339).ok())
                    .map(|dt| dt.unix_timestamp());
                ContentItem::new(
                    source,
                    normalize_text(a.title.as_deref().unwrap_or_default()),
                    normalize_text(a.description.as_deref().unwrap_or_default()),
                    a.url.unwrap_or_default(),
                )
                .with_body(a.content.as_deref().map(normalize_text))
                .with_published_at(published_at)
            })
            .collect();
        Ok(items)
    }
}

#[async_trait]
impl SourceClient for NewsApiClient {
    async fn fetch(&self, topic: &str) -> Result<Vec<ContentItem>> {
        tracing::debug!(source = self.name(), topic, "searching");
        let page_size = self.max_results.to_string();
        let resp = self
            .http
            .get(format!("{}/v2/everything", self.base_url))
            .header("X-Api-Key", &self.api_key)
            .query(&[
                ("q", topic),
                ("language", self.language.as_str()),
                ("sortBy", "publishedAt"),
                ("pageSize", page_size.as_str()),
            ])
            .send()
            .await
            .context("NewsAPI request")?;
        // Error bodies carry a JSON message, so parse before checking status.
        let body = resp.text().await.context("NewsAPI body")?;
        Self::parse_response(&body, self.max_results)
    }

    fn name(&self) -> &'static str {
        "NewsAPI"
    }
}
