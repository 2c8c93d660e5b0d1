//! Runtime configuration, read from the process environment (and `.env` via
//! `dotenvy` in the binary).
//!
//! Only `BOT_TOKEN`, `CHANNEL_ID` and `GROQ_API_KEY` are required; everything
//! else has a default. A missing required key is a [`ConfigError`] and the
//! process does not start.

pub mod feeds;

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::ConfigError;

pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";
pub const DEFAULT_INTERVAL_HOURS: u64 = 8;
pub const DEFAULT_LANGUAGE: &str = "ru";
/// Europe/Moscow, the channel's home timezone.
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = 3;

pub const DEFAULT_STYLE_PROMPT: &str = "You are the Dream Oracle, a mystical guide to the world of dreams. \
Your style blends scientific facts with esoteric wisdom. \
Use emoji, build an atmosphere of mystery, but rely on real research. \
Make posts engaging and easy to read.";

#[derive(Clone)]
pub struct AppConfig {
    pub bot_token: String,
    pub channel_id: String,
    /// Public `@username` of the channel, used for permalinks and help text.
    pub channel_username: Option<String>,
    /// `0` allows every user to run admin commands.
    pub admin_user_id: i64,
    pub groq_api_key: String,
    pub groq_model: String,
    /// News search is skipped when absent.
    pub news_api_key: Option<String>,
    pub auto_post_enabled: bool,
    pub post_interval_hours: u64,
    pub search_topics: Vec<String>,
    pub content_language: String,
    pub rss_feeds: Vec<String>,
    pub style_prompt: String,
    pub schedule_utc_offset_hours: i32,
    pub metrics_addr: Option<SocketAddr>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("bot_token", &"<redacted>")
            .field("channel_id", &self.channel_id)
            .field("channel_username", &self.channel_username)
            .field("admin_user_id", &self.admin_user_id)
            .field("groq_api_key", &"<redacted>")
            .field("groq_model", &self.groq_model)
            .field("news_api_key", &self.news_api_key.as_ref().map(|_| "<redacted>"))
            .field("auto_post_enabled", &self.auto_post_enabled)
            .field("post_interval_hours", &self.post_interval_hours)
            .field("search_topics", &self.search_topics)
            .field("content_language", &self.content_language)
            .field("rss_feeds", &self.rss_feeds)
            .field("schedule_utc_offset_hours", &self.schedule_utc_offset_hours)
            .field("metrics_addr", &self.metrics_addr)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as absent.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let bot_token = get("BOT_TOKEN");
        let channel_id = get("CHANNEL_ID");
        let groq_api_key = get("GROQ_API_KEY");

        let mut missing = Vec::new();
        if bot_token.is_none() {
            missing.push("BOT_TOKEN");
        }
        if channel_id.is_none() {
            missing.push("CHANNEL_ID");
        }
        if groq_api_key.is_none() {
            missing.push("GROQ_API_KEY");
        }
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let admin_user_id = match get("ADMIN_USER_ID") {
            Some(v) => v.parse::<i64>().map_err(|e| ConfigError::Invalid {
                key: "ADMIN_USER_ID",
                reason: e.to_string(),
            })?,
            None => 0,
        };

        let post_interval_hours = match get("POST_INTERVAL_HOURS") {
            Some(v) => match v.parse::<u64>() {
                Ok(h) if h > 0 => h,
                Ok(_) => {
                    return Err(ConfigError::Invalid {
                        key: "POST_INTERVAL_HOURS",
                        reason: "must be a positive number of hours".into(),
                    })
                }
                Err(e) => {
                    return Err(ConfigError::Invalid {
                        key: "POST_INTERVAL_HOURS",
                        reason: e.to_string(),
                    })
                }
            },
            None => DEFAULT_INTERVAL_HOURS,
        };

        let auto_post_enabled = get("AUTO_POST_ENABLED")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(true);

        let search_topics = get("SEARCH_TOPICS")
            .map(|v| split_topics(&v))
            .unwrap_or_default();

        let rss_feeds = match get("RSS_FEEDS_PATH") {
            Some(p) => {
                let path = PathBuf::from(&p);
                feeds::load_feeds_from(&path).map_err(|e| ConfigError::FeedList {
                    path: p.clone(),
                    reason: format!("{e:#}"),
                })?
            }
            None => feeds::default_feeds(),
        };

        let schedule_utc_offset_hours = match get("SCHEDULE_UTC_OFFSET_HOURS") {
            Some(v) => match v.parse::<i32>() {
                Ok(h) if (-23..=23).contains(&h) => h,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "SCHEDULE_UTC_OFFSET_HOURS",
                        reason: format!("'{v}' is not an hour offset in -23..=23"),
                    })
                }
            },
            None => DEFAULT_UTC_OFFSET_HOURS,
        };

        let metrics_addr = match get("METRICS_ADDR") {
            Some(v) => Some(v.parse::<SocketAddr>().map_err(|e| ConfigError::Invalid {
                key: "METRICS_ADDR",
                reason: e.to_string(),
            })?),
            None => None,
        };

        Ok(Self {
            bot_token: bot_token.unwrap_or_default(),
            channel_id: channel_id.unwrap_or_default(),
            channel_username: get("CHANNEL_USERNAME"),
            admin_user_id,
            groq_api_key: groq_api_key.unwrap_or_default(),
            groq_model: get("GROQ_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            news_api_key: get("NEWS_API_KEY"),
            auto_post_enabled,
            post_interval_hours,
            search_topics,
            content_language: get("CONTENT_LANGUAGE")
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            rss_feeds,
            style_prompt: get("POST_STYLE_PROMPT")
                .unwrap_or_else(|| DEFAULT_STYLE_PROMPT.to_string()),
            schedule_utc_offset_hours,
            metrics_addr,
        })
    }

    /// How the channel is shown to users: `@username` when known, the raw id otherwise.
    pub fn channel_label(&self) -> &str {
        self.channel_username.as_deref().unwrap_or(&self.channel_id)
    }
}

/// `"a, b,,c "` -> `["a", "b", "c"]`
pub fn split_topics(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}
