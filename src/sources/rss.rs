use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use metrics::counter;
use quick_xml::de::from_str;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Deserialize;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;

use super::{normalize_text, ContentItem, SourceClient};

// RSS 2.0: <rss><channel><item>...
#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    title: Option<String>,
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

// RSS 1.0: <rdf:RDF><channel/><item/>... with items beside the channel.
#[derive(Debug, Deserialize)]
struct Rdf {
    channel: Option<RdfChannel>,
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct RdfChannel {
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    /// `dc:date`, used by RDF feeds.
    date: Option<String>,
    description: Option<String>,
}

// Atom: <feed><entry>...
#[derive(Debug, Deserialize)]
struct AtomFeed {
    title: Option<String>,
    #[serde(rename = "entry", default)]
    entry: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<String>,
    #[serde(rename = "link", default)]
    link: Vec<AtomLink>,
    summary: Option<AtomText>,
    content: Option<AtomText>,
    updated: Option<String>,
    published: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

/// Text construct; child markup of xhtml content is ignored.
#[derive(Debug, Deserialize)]
struct AtomText {
    #[serde(rename = "$text", default)]
    text: Option<String>,
}

impl AtomEntry {
    fn alternate_link(&self) -> Option<&str> {
        self.link
            .iter()
            .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
            .or_else(|| self.link.first())
            .and_then(|l| l.href.as_deref())
    }
}

/// One feed, whatever its dialect.
struct ParsedFeed {
    title: Option<String>,
    entries: Vec<Entry>,
}

struct Entry {
    title: Option<String>,
    link: Option<String>,
    summary: Option<String>,
    published_at: Option<i64>,
}

impl ParsedFeed {
    fn from_rss(rss: Rss) -> Self {
        Self {
            title: rss.channel.title,
            entries: rss.channel.item.into_iter().map(Entry::from_item).collect(),
        }
    }

    fn from_rdf(rdf: Rdf) -> Self {
        Self {
            title: rdf.channel.and_then(|c| c.title),
            entries: rdf.item.into_iter().map(Entry::from_item).collect(),
        }
    }

    fn from_atom(atom: AtomFeed) -> Self {
        let entries = atom
            .entry
            .into_iter()
            .map(|e| {
                let link = e.alternate_link().map(str::to_string);
                let published_at = e
                    .published
                    .as_deref()
                    .or(e.updated.as_deref())
                    .and_then(parse_rfc3339_to_unix);
                let summary = e
                    .summary
                    .and_then(|t| t.text)
                    .filter(|t| !t.trim().is_empty())
                    .or_else(|| e.content.and_then(|t| t.text));
                Entry {
                    title: e.title,
                    link,
                    summary,
                    published_at,
                }
            })
            .collect();
        Self {
            title: atom.title,
            entries,
        }
    }
}

impl Entry {
    fn from_item(it: Item) -> Self {
        let published_at = it
            .pub_date
            .as_deref()
            .and_then(parse_rfc2822_to_unix)
            .or_else(|| it.date.as_deref().and_then(parse_rfc3339_to_unix));
        Self {
            title: it.title,
            link: it.link,
            summary: it.description,
            published_at,
        }
    }
}

fn parse_rfc2822_to_unix(ts: &str) -> Option<i64> {
    OffsetDateTime::parse(ts.trim(), &Rfc2822)
        .ok()
        .map(|dt| dt.unix_timestamp())
}

fn parse_rfc3339_to_unix(ts: &str) -> Option<i64> {
    OffsetDateTime::parse(ts.trim(), &Rfc3339)
        .ok()
        .map(|dt| dt.unix_timestamp())
}

/// Local name of the document element (`rss`, `RDF`, `feed`).
fn root_element(xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event().context("reading feed root")? {
            Event::Start(e) | Event::Empty(e) => {
                return Ok(String::from_utf8_lossy(e.local_name().as_ref()).into_owned())
            }
            Event::Eof => bail!("feed document has no root element"),
            _ => {}
        }
    }
}

/// Reads a fixed list of feeds, taking the first few entries of each.
/// The search topic does not narrow the feeds.
pub struct RssFeedReader {
    mode: Mode,
    max_per_feed: usize,
}

enum Mode {
    /// (label, xml) pairs parsed as-is; used by tests and offline runs.
    Fixture(Vec<(String, String)>),
    Http {
        urls: Vec<String>,
        client: reqwest::Client,
    },
}

impl RssFeedReader {
    pub fn from_urls(urls: Vec<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("dream-oracle/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(15))
            .build()
            .context("building RSS http client")?;
        Ok(Self {
            mode: Mode::Http { urls, client },
            max_per_feed: 2,
        })
    }

    pub fn from_fixtures(feeds: Vec<(String, String)>) -> Self {
        Self {
            mode: Mode::Fixture(feeds),
            max_per_feed: 2,
        }
    }

    pub fn with_max_per_feed(mut self, n: usize) -> Self {
        self.max_per_feed = n;
        self
    }

    /// Parse one feed document (RSS 2.0, RSS 1.0/RDF or Atom) into at most
    /// `max` items. Entries without a title are skipped; the feed title
    /// becomes the item source.
    pub fn parse_feed(xml: &str, max: usize) -> Result<Vec<ContentItem>> {
        let xml_clean = scrub_html_entities_for_xml(xml);
        let root = root_element(&xml_clean)?;
        let feed = match root.as_str() {
            "rss" => ParsedFeed::from_rss(from_str(&xml_clean).context("parsing rss xml")?),
            "RDF" => ParsedFeed::from_rdf(from_str(&xml_clean).context("parsing rdf xml")?),
            "feed" => ParsedFeed::from_atom(from_str(&xml_clean).context("parsing atom xml")?),
            other => bail!("unsupported feed root <{other}>"),
        };

        let feed_title = feed
            .title
            .as_deref()
            .map(normalize_text)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "RSS Feed".to_string());

        let mut out = Vec::with_capacity(max.min(feed.entries.len()));
        for entry in feed.entries {
            if out.len() >= max {
                break;
            }
            let title = normalize_text(entry.title.as_deref().unwrap_or_default());
            if title.is_empty() {
                continue;
            }
            out.push(
                ContentItem::new(
                    feed_title.clone(),
                    title,
                    normalize_text(entry.summary.as_deref().unwrap_or_default()),
                    entry.link.map(|l| l.trim().to_string()).unwrap_or_default(),
                )
                .with_published_at(entry.published_at),
            );
        }

        if out.is_empty() {
            tracing::warn!(format = %root, feed = %feed_title, "feed parsed but yielded no items");
        }
        Ok(out)
    }

    async fn fetch_one(
        client: &reqwest::Client,
        url: &str,
        max: usize,
    ) -> Result<Vec<ContentItem>> {
        let body = client
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?
            .error_for_status()
            .with_context(|| format!("GET {url} non-2xx"))?
            .text()
            .await
            .with_context(|| format!("reading {url}"))?;
        Self::parse_feed(&body, max)
    }
}

#[async_trait]
impl SourceClient for RssFeedReader {
    async fn fetch(&self, _topic: &str) -> Result<Vec<ContentItem>> {
        let mut all = Vec::new();
        match &self.mode {
            Mode::Fixture(feeds) => {
                for (label, xml) in feeds {
                    match Self::parse_feed(xml, self.max_per_feed) {
                        Ok(mut v) => all.append(&mut v),
                        Err(e) => {
                            tracing::warn!(
                                feed = %label,
                                error = %format!("{e:#}"),
                                "feed skipped"
                            );
                            counter!("feed_errors_total").increment(1);
                        }
                    }
                }
            }
            Mode::Http { urls, client } => {
                tracing::debug!(feeds = urls.len(), "reading feeds");
                // One broken feed must not hide the others.
                for url in urls {
                    match Self::fetch_one(client, url, self.max_per_feed).await {
                        Ok(mut v) => all.append(&mut v),
                        Err(e) => {
                            tracing::warn!(
                                feed = %url,
                                error = %format!("{e:#}"),
                                "feed skipped"
                            );
                            counter!("feed_errors_total").increment(1);
                        }
                    }
                }
            }
        }
        Ok(all)
    }

    fn name(&self) -> &'static str {
        "RSS"
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
