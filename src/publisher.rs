// src/publisher.rs
use std::sync::Arc;

use metrics::counter;
use serde::{Deserialize, Serialize};

use crate::error::{PostError, TransportError};
use crate::generation::GeneratedPost;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessage {
    pub message_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotIdentity {
    pub id: i64,
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatInfo {
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMember {
    /// "creator" | "administrator" | "member" | "restricted" | "left" | "kicked"
    pub status: String,
}

impl ChatMember {
    pub fn is_admin(&self) -> bool {
        matches!(self.status.as_str(), "administrator" | "creator")
    }
}

/// What the publisher needs from a messaging service.
#[async_trait::async_trait]
pub trait MessagingTransport: Send + Sync {
    /// Plain text, no markup parsing, link previews on.
    async fn send_message(&self, chat: &str, text: &str) -> Result<SentMessage, TransportError>;
    async fn get_me(&self) -> Result<BotIdentity, TransportError>;
    async fn get_chat(&self, chat: &str) -> Result<ChatInfo, TransportError>;
    async fn get_chat_member(&self, chat: &str, user_id: i64) -> Result<ChatMember, TransportError>;
}

pub type DynTransport = Arc<dyn MessagingTransport>;

/// Receipt for a post that reached the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedPost {
    pub message_id: i64,
    /// `https://t.me/<channel>/<id>` for public channels.
    pub link: Option<String>,
}

/// Result of [`Publisher::verify_access`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessReport {
    pub bot: BotIdentity,
    pub chat_title: Option<String>,
    pub member_status: String,
    pub is_admin: bool,
}

pub struct Publisher {
    transport: DynTransport,
    channel_id: String,
    channel_username: Option<String>,
}

impl Publisher {
    pub fn new(transport: DynTransport, channel_id: impl Into<String>) -> Self {
        Self {
            transport,
            channel_id: channel_id.into(),
            channel_username: None,
        }
    }

    pub fn with_channel_username(mut self, username: Option<String>) -> Self {
        self.channel_username = username
            .map(|u| u.trim().trim_start_matches('@').to_string())
            .filter(|u| !u.is_empty());
        self
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Send one post to the channel. Single attempt.
    pub async fn publish(&self, post: &GeneratedPost) -> Result<PublishedPost, PostError> {
        if post.text.trim().is_empty() {
            return Err(PostError::GenerationFailure("refusing to publish empty text".into()));
        }

        let sent = self
            .transport
            .send_message(&self.channel_id, &post.text)
            .await
            .map_err(|e| {
                tracing::error!(channel = %self.channel_id, error = %e, "publish failed");
                PostError::DeliveryError(e.to_string())
            })?;

        let link = self
            .channel_username
            .as_ref()
            .map(|u| format!("https://t.me/{u}/{}", sent.message_id));
        counter!("posts_published_total").increment(1);
        tracing::info!(
            channel = %self.channel_id,
            message_id = sent.message_id,
            link = link.as_deref().unwrap_or("-"),
            "post published"
        );
        Ok(PublishedPost {
            message_id: sent.message_id,
            link,
        })
    }

    /// Confirm the bot exists, the channel is reachable, and report whether
    /// the bot is an admin there. Missing admin rights only warn.
    pub async fn verify_access(&self) -> Result<AccessReport, TransportError> {
        let bot = self.transport.get_me().await?;
        tracing::info!(bot_id = bot.id, username = ?bot.username, "bot connected");

        let chat = self.transport.get_chat(&self.channel_id).await?;
        tracing::info!(channel = %self.channel_id, title = ?chat.title, "channel found");

        let member = self
            .transport
            .get_chat_member(&self.channel_id, bot.id)
            .await?;
        let is_admin = member.is_admin();
        if is_admin {
            tracing::info!(status = %member.status, "bot is a channel administrator");
        } else {
            tracing::warn!(
                status = %member.status,
                "bot is not a channel administrator; posting may fail"
            );
        }

        Ok(AccessReport {
            bot,
            chat_title: chat.title,
            member_status: member.status,
            is_admin,
        })
    }
}
