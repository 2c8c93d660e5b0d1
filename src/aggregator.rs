//! Content aggregation: fan out to every source at once, merge whatever came
//! back, pick one item at random.
//!
//! Each source runs in its own task, so an error, a panic or an empty answer
//! from one of them only costs that source's share of the pool. Only a fully
//! empty pool is reported, as [`PostError::NoContentFound`].

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use rand::seq::IndexedRandom;
use rand::Rng;
use tokio::task::JoinSet;

use crate::error::PostError;
use crate::sources::{ContentItem, SourceClient};

/// Used when neither the caller nor the config supplies a topic.
pub const DEFAULT_TOPIC: &str = "dreams and sleep science";

/// A selected item together with the topic it was found for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundContent {
    pub topic: String,
    pub item: ContentItem,
}

pub struct ContentAggregator {
    sources: Vec<Arc<dyn SourceClient>>,
    topics: Vec<String>,
}

impl ContentAggregator {
    pub fn new(sources: Vec<Arc<dyn SourceClient>>, topics: Vec<String>) -> Self {
        let topics = topics
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        Self { sources, topics }
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    pub async fn find_content(&self, topic: Option<&str>) -> Result<FoundContent, PostError> {
        let topic = {
            let mut rng = rand::rng();
            resolve_topic(topic, &self.topics, &mut rng)
        };
        tracing::info!(topic = %topic, sources = self.sources.len(), "searching for content");

        let pool = self.gather(&topic).await;
        if pool.is_empty() {
            tracing::warn!(topic = %topic, "no content found in any source");
            return Err(PostError::NoContentFound { topic });
        }

        let picked = {
            let mut rng = rand::rng();
            pool.choose(&mut rng).cloned()
        };
        let Some(item) = picked else {
            return Err(PostError::NoContentFound { topic });
        };
        tracing::info!(
            pool = pool.len(),
            source = %item.source,
            title = %item.title,
            published_at = ?item.published_at,
            "content selected"
        );
        Ok(FoundContent { topic, item })
    }

    /// Run every source concurrently and concatenate what succeeded.
    async fn gather(&self, topic: &str) -> Vec<ContentItem> {
        let mut set = JoinSet::new();
        for source in &self.sources {
            let source = Arc::clone(source);
            let topic = topic.to_string();
            set.spawn(async move {
                let name = source.name();
                let t0 = Instant::now();
                let res = source.fetch(&topic).await;
                histogram!("source_fetch_ms", "source" => name)
                    .record(t0.elapsed().as_secs_f64() * 1_000.0);
                (name, res)
            });
        }

        let mut pool = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((name, Ok(mut items))) => {
                    tracing::info!(source = name, found = items.len(), "source done");
                    counter!("source_items_total", "source" => name)
                        .increment(items.len() as u64);
                    pool.append(&mut items);
                }
                Ok((name, Err(e))) => {
                    tracing::warn!(source = name, error = %format!("{e:#}"), "source failed");
                    counter!("source_errors_total", "source" => name).increment(1);
                }
                Err(e) => {
                    tracing::error!(error = %e, "source task aborted");
                    counter!("source_errors_total", "source" => "panic").increment(1);
                }
            }
        }
        pool
    }
}

/// Explicit non-blank topic, else a uniform pick from `topics`, else
/// [`DEFAULT_TOPIC`].
pub fn resolve_topic<R: Rng + ?Sized>(
    explicit: Option<&str>,
    topics: &[String],
    rng: &mut R,
) -> String {
    if let Some(t) = explicit.map(str::trim).filter(|t| !t.is_empty()) {
        return t.to_string();
    }
    topics
        .choose(rng)
        .cloned()
        .unwrap_or_else(|| DEFAULT_TOPIC.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn explicit_topic_wins() {
        let mut rng = StdRng::seed_from_u64(7);
        let topics = vec!["a".to_string()];
        assert_eq!(resolve_topic(Some("  water  "), &topics, &mut rng), "water");
    }

    #[test]
    fn blank_topic_falls_through_to_list() {
        let mut rng = StdRng::seed_from_u64(7);
        let topics = vec!["a".to_string(), "b".to_string()];
        for _ in 0..50 {
            let t = resolve_topic(Some("   "), &topics, &mut rng);
            assert!(topics.contains(&t));
        }
    }

    #[test]
    fn default_when_no_list() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(resolve_topic(None, &[], &mut rng), DEFAULT_TOPIC);
    }

    #[test]
    fn blank_configured_topics_are_dropped() {
        let agg = ContentAggregator::new(vec![], vec![" ".into(), " x ".into()]);
        assert_eq!(agg.topics, vec!["x".to_string()]);
    }
}
