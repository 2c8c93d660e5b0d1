// src/config/feeds.rs
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Science feeds used when no `RSS_FEEDS_PATH` is configured.
pub const DEFAULT_FEEDS: &[&str] = &[
    "https://www.sciencedaily.com/rss/mind_brain/sleep.xml",
    "https://www.sciencedaily.com/rss/mind_brain/dreams.xml",
    "http://feeds.feedburner.com/PsychologyToday/blog/dream-factory",
];

pub fn default_feeds() -> Vec<String> {
    DEFAULT_FEEDS.iter().map(|s| s.to_string()).collect()
}

/// `feeds = [...]` in a `.toml` file.
#[derive(Deserialize)]
struct FeedFile {
    feeds: Vec<String>,
}

/// Load a feed list. The extension picks the format: `.toml` holds
/// `feeds = [...]`, `.json` a bare array of urls.
pub fn load_feeds_from(path: &Path) -> Result<Vec<String>> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(str::to_ascii_lowercase);
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading feed list from {}", path.display()))?;

    let urls = match ext.as_deref() {
        Some("toml") => toml::from_str::<FeedFile>(&content)
            .context("feed list toml")?
            .feeds,
        Some("json") => {
            serde_json::from_str::<Vec<String>>(&content).context("feed list json")?
        }
        other => bail!(
            "unsupported feed list extension {:?} (expected .toml or .json)",
            other.unwrap_or("")
        ),
    };
    Ok(clean_list(urls))
}

/// Trim, drop blanks and duplicates. Keeps first-seen order so the feed
/// order in the file is the fetch order.
fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for it in items {
        let t = it.trim();
        if !t.is_empty() && !out.iter().any(|o| o == t) {
            out.push(t.to_string());
        }
    }
    out
}
