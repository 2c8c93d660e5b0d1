// tests/common/mod.rs
//
// In-process doubles for sources and the messaging transport.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use async_trait::async_trait;

use dream_oracle::aggregator::ContentAggregator;
use dream_oracle::error::TransportError;
use dream_oracle::generation::{GenerationClient, MockBackend};
use dream_oracle::orchestrator::PostOrchestrator;
use dream_oracle::publisher::{
    BotIdentity, ChatInfo, ChatMember, MessagingTransport, Publisher, SentMessage,
};
use dream_oracle::sources::{ContentItem, SourceClient};

pub enum Outcome {
    Items(Vec<ContentItem>),
    Fail,
    Panic,
}

/// Source returning a fixed outcome and recording every topic it was asked for.
pub struct StubSource {
    name: &'static str,
    outcome: Outcome,
    topics: Mutex<Vec<String>>,
}

impl StubSource {
    pub fn new(name: &'static str, outcome: Outcome) -> Arc<Self> {
        Arc::new(Self {
            name,
            outcome,
            topics: Mutex::new(Vec::new()),
        })
    }

    pub fn one(name: &'static str, url: &str) -> Arc<Self> {
        Self::new(
            name,
            Outcome::Items(vec![item(name, &format!("{name} story"), url)]),
        )
    }

    pub fn calls(&self) -> usize {
        self.topics.lock().unwrap().len()
    }

    pub fn topics(&self) -> Vec<String> {
        self.topics.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceClient for StubSource {
    async fn fetch(&self, topic: &str) -> anyhow::Result<Vec<ContentItem>> {
        self.topics.lock().unwrap().push(topic.to_string());
        match &self.outcome {
            Outcome::Items(v) => Ok(v.clone()),
            Outcome::Fail => Err(anyhow!("{} unavailable", self.name)),
            Outcome::Panic => panic!("{} exploded", self.name),
        }
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

pub fn item(source: &str, title: &str, url: &str) -> ContentItem {
    ContentItem::new(source, title, format!("{title} in detail"), url)
}

/// Transport that records sent messages and hands out increasing ids.
#[derive(Default)]
pub struct RecordingTransport {
    pub fail_send: bool,
    pub sent: Mutex<Vec<(String, String)>>,
}

impl RecordingTransport {
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessagingTransport for RecordingTransport {
    async fn send_message(&self, chat: &str, text: &str) -> Result<SentMessage, TransportError> {
        if self.fail_send {
            return Err(TransportError::Api {
                code: 400,
                description: "Bad Request: chat not found".into(),
            });
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push((chat.to_string(), text.to_string()));
        Ok(SentMessage {
            message_id: sent.len() as i64,
        })
    }

    async fn get_me(&self) -> Result<BotIdentity, TransportError> {
        Ok(BotIdentity {
            id: 7,
            username: Some("oracle_bot".into()),
        })
    }

    async fn get_chat(&self, _chat: &str) -> Result<ChatInfo, TransportError> {
        Ok(ChatInfo {
            title: Some("Dream Oracle".into()),
        })
    }

    async fn get_chat_member(
        &self,
        _chat: &str,
        _user_id: i64,
    ) -> Result<ChatMember, TransportError> {
        Ok(ChatMember {
            status: "administrator".into(),
        })
    }
}

pub const CHANNEL: &str = "@dream_channel";

pub struct Harness {
    pub orchestrator: Arc<PostOrchestrator>,
    pub backend: Arc<MockBackend>,
    pub transport: Arc<RecordingTransport>,
}

pub fn harness(
    sources: Vec<Arc<dyn SourceClient>>,
    topics: &[&str],
    backend: MockBackend,
) -> Harness {
    harness_with(sources, topics, backend, RecordingTransport::default())
}

pub fn harness_with(
    sources: Vec<Arc<dyn SourceClient>>,
    topics: &[&str],
    backend: MockBackend,
    transport: RecordingTransport,
) -> Harness {
    let backend = Arc::new(backend);
    let transport = Arc::new(transport);
    let topics = topics.iter().map(|t| t.to_string()).collect();
    let aggregator = ContentAggregator::new(sources, topics);
    let generator = GenerationClient::new(
        backend.clone(),
        "test-model",
        "You are the Dream Oracle.",
        "en",
    );
    let publisher = Publisher::new(transport.clone(), CHANNEL)
        .with_channel_username(Some("@dream_channel".into()));
    Harness {
        orchestrator: Arc::new(PostOrchestrator::new(aggregator, generator, publisher)),
        backend,
        transport,
    }
}
