// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod aggregator;
pub mod bot;
pub mod commands;
pub mod config;
pub mod error;
pub mod generation;
pub mod metrics;
pub mod orchestrator;
pub mod publisher;
pub mod scheduler;
pub mod sources;
pub mod telegram;

use std::sync::Arc;

pub use crate::aggregator::{ContentAggregator, FoundContent};
pub use crate::commands::{AdminPolicy, Command, CommandContext};
pub use crate::config::AppConfig;
pub use crate::error::{ConfigError, PostError, TransportError};
pub use crate::orchestrator::{AutoPostJob, PostOrchestrator};
pub use crate::scheduler::ScheduleController;

use crate::generation::{GenerationClient, GroqBackend};
use crate::publisher::Publisher;
use crate::sources::duckduckgo::DuckDuckGoClient;
use crate::sources::news_api::NewsApiClient;
use crate::sources::rss::RssFeedReader;
use crate::sources::SourceClient;
use crate::telegram::TelegramClient;

/// Everything the binary runs, wired from one [`AppConfig`].
pub struct App {
    pub telegram: TelegramClient,
    pub orchestrator: Arc<PostOrchestrator>,
    pub schedule: Arc<ScheduleController>,
    pub commands: CommandContext,
}

/// Build the source list. NewsAPI joins only when a key is configured.
pub fn build_sources(cfg: &AppConfig) -> anyhow::Result<Vec<Arc<dyn SourceClient>>> {
    let mut sources: Vec<Arc<dyn SourceClient>> = Vec::new();
    match &cfg.news_api_key {
        Some(key) => sources.push(Arc::new(NewsApiClient::new(key.clone())?)),
        None => tracing::info!("NEWS_API_KEY not set; NewsAPI source disabled"),
    }
    sources.push(Arc::new(DuckDuckGoClient::new()?));
    sources.push(Arc::new(RssFeedReader::from_urls(cfg.rss_feeds.clone())?));
    Ok(sources)
}

impl App {
    pub fn build(cfg: &AppConfig) -> anyhow::Result<Self> {
        let telegram = TelegramClient::new(cfg.bot_token.clone());

        let aggregator = ContentAggregator::new(build_sources(cfg)?, cfg.search_topics.clone());
        tracing::info!(
            sources = ?aggregator.source_names(),
            topics = cfg.search_topics.len(),
            "content sources ready"
        );

        let generator = GenerationClient::new(
            Arc::new(GroqBackend::new(cfg.groq_api_key.clone())?),
            cfg.groq_model.clone(),
            cfg.style_prompt.clone(),
            cfg.content_language.clone(),
        );
        let publisher = Publisher::new(Arc::new(telegram.clone()), cfg.channel_id.clone())
            .with_channel_username(cfg.channel_username.clone());

        let orchestrator = Arc::new(PostOrchestrator::new(aggregator, generator, publisher));
        let schedule = Arc::new(
            ScheduleController::new(
                Arc::new(AutoPostJob::new(Arc::clone(&orchestrator))),
                cfg.post_interval_hours,
            )
            .with_display_offset(cfg.schedule_utc_offset_hours),
        );

        let commands = CommandContext {
            orchestrator: Arc::clone(&orchestrator),
            schedule: Arc::clone(&schedule),
            policy: AdminPolicy::new(cfg.admin_user_id),
            channel_label: cfg.channel_label().to_string(),
        };

        Ok(Self {
            telegram,
            orchestrator,
            schedule,
            commands,
        })
    }
}
