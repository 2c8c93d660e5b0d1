// src/orchestrator.rs
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use metrics::counter;

use crate::aggregator::ContentAggregator;
use crate::error::PostError;
use crate::generation::GenerationClient;
use crate::publisher::{PublishedPost, Publisher};
use crate::scheduler::ScheduledJob;

/// Runs the find → generate → publish pipeline. No stage is retried and
/// nothing is published unless every earlier stage succeeded.
///
/// Manual and scheduled runs are not serialized against each other: if they
/// overlap, both complete and both publish.
pub struct PostOrchestrator {
    aggregator: ContentAggregator,
    generator: GenerationClient,
    publisher: Publisher,
}

impl PostOrchestrator {
    pub fn new(
        aggregator: ContentAggregator,
        generator: GenerationClient,
        publisher: Publisher,
    ) -> Self {
        Self {
            aggregator,
            generator,
            publisher,
        }
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    /// Post from aggregated content. `topic` overrides the configured list.
    pub async fn produce_auto_post(&self, topic: Option<&str>) -> Result<PublishedPost, PostError> {
        tracing::info!(topic = topic.unwrap_or("<auto>"), "auto post started");
        let res = async {
            let found = self.aggregator.find_content(topic).await?;
            let post = self.generator.generate_post(&found).await?;
            self.publisher.publish(&post).await
        }
        .await;
        record_outcome("auto", &res);
        res
    }

    /// Post written straight from a user request; sources are not queried.
    pub async fn produce_post(&self, request: &str) -> Result<PublishedPost, PostError> {
        tracing::info!(request = %request, "custom post started");
        let res = async {
            let post = self.generator.generate_custom_post(request).await?;
            self.publisher.publish(&post).await
        }
        .await;
        record_outcome("custom", &res);
        res
    }
}

fn record_outcome(kind: &'static str, res: &Result<PublishedPost, PostError>) {
    match res {
        Ok(p) => tracing::info!(kind, message_id = p.message_id, "post pipeline finished"),
        Err(e @ PostError::NoContentFound { .. }) => {
            counter!("posts_failed_total", "stage" => e.stage()).increment(1);
            tracing::warn!(kind, error = %e, "post pipeline skipped");
        }
        Err(e) => {
            counter!("posts_failed_total", "stage" => e.stage()).increment(1);
            tracing::error!(kind, stage = e.stage(), error = %e, "post pipeline failed");
        }
    }
}

/// The scheduled job: one auto post per fire. Failures are logged by the
/// pipeline and never reach the scheduler.
pub struct AutoPostJob {
    orchestrator: Arc<PostOrchestrator>,
}

impl AutoPostJob {
    pub fn new(orchestrator: Arc<PostOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

impl ScheduledJob for AutoPostJob {
    fn run(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            tracing::info!("scheduled auto post");
            let _ = self.orchestrator.produce_auto_post(None).await;
        })
    }
}
