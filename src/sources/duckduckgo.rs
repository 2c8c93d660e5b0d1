use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Url;
use scraper::{Html, Selector};

use super::{normalize_text, ContentItem, SourceClient};

const DDG_HTML_ENDPOINT: &str = "https://html.duckduckgo.com/html/";

/// Web search through DuckDuckGo's keyless HTML endpoint.
pub struct DuckDuckGoClient {
    http: reqwest::Client,
    endpoint: String,
    max_results: usize,
}

impl DuckDuckGoClient {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            // The HTML endpoint rejects clients without a browser-like agent.
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) dream-oracle")
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(15))
            .build()
            .context("building DuckDuckGo http client")?;
        Ok(Self {
            http,
            endpoint: DDG_HTML_ENDPOINT.to_string(),
            max_results: 5,
        })
    }

    pub fn with_endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = url.into();
        self
    }

    pub fn with_max_results(mut self, n: usize) -> Self {
        self.max_results = n;
        self
    }

    /// Extract organic results from a results page. Ads are skipped.
    pub fn parse_results(html: &str, max: usize) -> Result<Vec<ContentItem>> {
        let doc = Html::parse_document(html);
        let result_sel = selector("div.result")?;
        let title_sel = selector("a.result__a")?;
        let snippet_sel = selector(".result__snippet")?;

        let mut out = Vec::new();
        for result in doc.select(&result_sel) {
            if out.len() >= max {
                break;
            }
            if result.value().classes().any(|c| c == "result--ad") {
                continue;
            }
            let Some(link) = result.select(&title_sel).next() else {
                continue;
            };
            let title = normalize_text(&link.text().collect::<String>());
            let url = link
                .value()
                .attr("href")
                .map(resolve_redirect)
                .unwrap_or_default();
            if title.is_empty() || url.is_empty() {
                continue;
            }
            let body = result
                .select(&snippet_sel)
                .next()
                .map(|s| normalize_text(&s.text().collect::<String>()))
                .unwrap_or_default();

            out.push(ContentItem::new("DuckDuckGo", title, body, url));
        }
        Ok(out)
    }
}

fn selector(css: &'static str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("bad selector {css}: {e:?}"))
}

/// Result links go through `//duckduckgo.com/l/?uddg=<target>`; unwrap them.
fn resolve_redirect(href: &str) -> String {
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.to_string()
    };
    match Url::parse(&absolute) {
        Ok(u) if u.path() == "/l/" => u
            .query_pairs()
            .find(|(k, _)| k == "uddg")
            .map(|(_, v)| v.into_owned())
            .unwrap_or(absolute),
        _ => absolute,
    }
}

#[async_trait]
impl SourceClient for DuckDuckGoClient {
    async fn fetch(&self, topic: &str) -> Result<Vec<ContentItem>> {
        tracing::debug!(source = self.name(), topic, "searching");
        let html = self
            .http
            .post(&self.endpoint)
            .form(&[("q", topic)])
            .send()
            .await
            .context("DuckDuckGo request")?
            .error_for_status()
            .context("DuckDuckGo non-2xx")?
            .text()
            .await
            .context("DuckDuckGo body")?;
        Self::parse_results(&html, self.max_results)
    }

    fn name(&self) -> &'static str {
        "DuckDuckGo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
    <html><body>
      <div class="result results_links result--ad">
        <h2><a class="result__a" href="https://ads.test/">Buy pillows</a></h2>
        <a class="result__snippet">Sponsored</a>
      </div>
      <div class="result results_links">
        <h2><a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fsleep.test%2Flucid&amp;rut=abc">Lucid <b>dreaming</b> guide</a></h2>
        <a class="result__snippet">How to become <b>aware</b> in a dream.</a>
      </div>
      <div class="result results_links">
        <h2><a class="result__a" href="https://direct.test/rem">REM cycles</a></h2>
      </div>
      <div class="result results_links">
        <h2><a class="result__a" href="https://third.test/">Third</a></h2>
      </div>
    </body></html>"#;

    #[test]
    fn parses_organic_results_and_unwraps_redirects() {
        let items = DuckDuckGoClient::parse_results(PAGE, 2).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Lucid dreaming guide");
        assert_eq!(items[0].url, "https://sleep.test/lucid");
        assert_eq!(items[0].body, "How to become aware in a dream.");
        assert_eq!(items[0].source, "DuckDuckGo");
        assert_eq!(items[1].url, "https://direct.test/rem");
        assert_eq!(items[1].body, "");
    }

    #[test]
    fn empty_page_yields_nothing() {
        assert!(DuckDuckGoClient::parse_results("<html></html>", 5)
            .unwrap()
            .is_empty());
    }
}
