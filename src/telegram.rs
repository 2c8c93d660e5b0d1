//! Minimal Telegram Bot API client over reqwest: just the methods the
//! publisher and the command loop use.

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::TransportError;
use crate::publisher::{BotIdentity, ChatInfo, ChatMember, MessagingTransport, SentMessage};

const API_BASE: &str = "https://api.telegram.org";

#[derive(Clone)]
pub struct TelegramClient {
    client: Client,
    base: String,
    token: String,
    timeout: Duration,
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramClient")
            .field("base", &self.base)
            .field("token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct ApiReply<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<User>,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct RawMember {
    status: String,
}

#[derive(Serialize)]
struct SendMessageReq<'a> {
    chat_id: &'a str,
    text: &'a str,
    link_preview_options: LinkPreview,
}

#[derive(Serialize)]
struct LinkPreview {
    is_disabled: bool,
}

impl TelegramClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base: API_BASE.to_string(),
            token: token.into(),
            timeout: Duration::from_secs(15),
        }
    }

    pub fn with_base_url(mut self, base: impl Into<String>) -> Self {
        self.base = base.into();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &impl Serialize,
        timeout: Duration,
    ) -> Result<T, TransportError> {
        let url = format!("{}/bot{}/{}", self.base, self.token, method);
        let rsp = self
            .client
            .post(url)
            .timeout(timeout)
            .json(body)
            .send()
            .await
            // reqwest puts the full URL (token included) into its errors.
            .map_err(|e| TransportError::Http(e.without_url()))?;
        let reply: ApiReply<T> = rsp
            .json()
            .await
            .map_err(|e| TransportError::Http(e.without_url()))?;
        decode_reply(method, reply)
    }

    /// Long-poll for new updates after `offset`.
    pub async fn get_updates(
        &self,
        offset: i64,
        poll_secs: u64,
    ) -> Result<Vec<Update>, TransportError> {
        let body = json!({
            "offset": offset,
            "timeout": poll_secs,
            "allowed_updates": ["message"],
        });
        self.call(
            "getUpdates",
            &body,
            Duration::from_secs(poll_secs) + self.timeout,
        )
        .await
    }

    /// Reply to a private chat or group by numeric id.
    pub async fn send_to_chat(
        &self,
        chat_id: i64,
        text: &str,
    ) -> Result<SentMessage, TransportError> {
        self.send_message(&chat_id.to_string(), text).await
    }
}

fn decode_reply<T>(method: &str, reply: ApiReply<T>) -> Result<T, TransportError> {
    if !reply.ok {
        return Err(TransportError::Api {
            code: reply.error_code.unwrap_or_default(),
            description: reply.description.unwrap_or_default(),
        });
    }
    reply
        .result
        .ok_or_else(|| TransportError::Decode(format!("{method}: ok reply without result")))
}

#[async_trait::async_trait]
impl MessagingTransport for TelegramClient {
    async fn send_message(&self, chat: &str, text: &str) -> Result<SentMessage, TransportError> {
        let req = SendMessageReq {
            chat_id: chat,
            text,
            link_preview_options: LinkPreview { is_disabled: false },
        };
        let msg: Message = self.call("sendMessage", &req, self.timeout).await?;
        Ok(SentMessage {
            message_id: msg.message_id,
        })
    }

    async fn get_me(&self) -> Result<BotIdentity, TransportError> {
        let me: User = self.call("getMe", &json!({}), self.timeout).await?;
        Ok(BotIdentity {
            id: me.id,
            username: me.username,
        })
    }

    async fn get_chat(&self, chat: &str) -> Result<ChatInfo, TransportError> {
        let c: Chat = self
            .call("getChat", &json!({ "chat_id": chat }), self.timeout)
            .await?;
        Ok(ChatInfo { title: c.title })
    }

    async fn get_chat_member(
        &self,
        chat: &str,
        user_id: i64,
    ) -> Result<ChatMember, TransportError> {
        let m: RawMember = self
            .call(
                "getChatMember",
                &json!({ "chat_id": chat, "user_id": user_id }),
                self.timeout,
            )
            .await?;
        Ok(ChatMember { status: m.status })
    }
}
