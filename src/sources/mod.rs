// src/sources/mod.rs
pub mod duckduckgo;
pub mod news_api;
pub mod rss;

use anyhow::Result;
use once_cell::sync::OnceCell;

/// One piece of source material a post can be written from.
///
/// Build it with [`ContentItem::new`] so `body` always falls back to
/// `description`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentItem {
    pub title: String,
    pub description: String,
    pub body: String,
    pub url: String,
    /// Provenance label, e.g. "NewsAPI", "DuckDuckGo" or a feed title.
    pub source: String,
    /// Unix seconds, when the source reports one.
    pub published_at: Option<i64>,
}

impl ContentItem {
    pub fn new(
        source: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        let description = description.into();
        Self {
            title: title.into(),
            body: description.clone(),
            description,
            url: url.into(),
            source: source.into(),
            published_at: None,
        }
    }

    /// Full text when the source has one; blank bodies keep the description.
    pub fn with_body(mut self, body: Option<String>) -> Self {
        if let Some(b) = body.filter(|b| !b.trim().is_empty()) {
            self.body = b;
        }
        self
    }

    pub fn with_published_at(mut self, ts: Option<i64>) -> Self {
        self.published_at = ts;
        self
    }
}

/// Uniform contract over the external content sources.
///
/// Implementations return `Err` on transport/parse failures; the aggregator
/// is the one that isolates and swallows them.
#[async_trait::async_trait]
pub trait SourceClient: Send + Sync {
    async fn fetch(&self, topic: &str) -> Result<Vec<ContentItem>>;
    fn name(&self) -> &'static str;
}

/// Normalize a source snippet: decode entities, strip tags, fold smart
/// quotes and collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();

    out.trim().to_string()
}
