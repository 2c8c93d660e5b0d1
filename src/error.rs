// src/error.rs
use thiserror::Error;

/// Failure of one post-production attempt. None of these stop the schedule
/// or the process; they are reported to whoever asked for the post.
#[derive(Debug, Error)]
pub enum PostError {
    /// Every source came back empty (offline, rate-limited, nothing matched).
    #[error("no content found for topic '{topic}'")]
    NoContentFound { topic: String },

    #[error("generation failed: {0}")]
    GenerationFailure(String),

    #[error("delivery failed: {0}")]
    DeliveryError(String),
}

impl PostError {
    /// Pipeline stage label used in logs and the `posts_failed_total` counter.
    pub fn stage(&self) -> &'static str {
        match self {
            PostError::NoContentFound { .. } => "aggregate",
            PostError::GenerationFailure(_) => "generate",
            PostError::DeliveryError(_) => "publish",
        }
    }
}

/// Messaging transport failure (HTTP, API refusal or undecodable reply).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("api error {code}: {description}")]
    Api { code: i64, description: String },

    #[error("unexpected reply: {0}")]
    Decode(String),
}

/// Settings missing or malformed at startup. Fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required variables: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("reading feed list from {path}: {reason}")]
    FeedList { path: String, reason: String },
}
