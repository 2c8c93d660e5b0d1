//! Post generation: backend abstraction + Groq provider + prompt building.
//!
//! One backend request per post, no retries. Any backend failure or an empty
//! completion becomes [`PostError::GenerationFailure`].

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context};
use metrics::histogram;
use serde::{Deserialize, Serialize};

use crate::aggregator::FoundContent;
use crate::error::PostError;

const GROQ_CHAT_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

/// Longest slice of source body embedded in a prompt, in characters.
pub const MAX_BODY_CHARS: usize = 1500;

/// Prefix of the trailing line that credits the source.
pub const SOURCE_LINE_PREFIX: &str = "🔗 Source: ";

// ------------------------------------------------------------
// Backend surface
// ------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SamplingParams {
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.9,
            max_tokens: 800,
            top_p: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub sampling: SamplingParams,
}

/// Low-level text backend: one request, one completion.
pub trait TextBackend: Send + Sync {
    fn complete<'a>(
        &'a self,
        req: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + 'a>>;
    fn name(&self) -> &'static str;
}

pub type DynTextBackend = Arc<dyn TextBackend>;

/// Groq chat completions (OpenAI-compatible wire format).
pub struct GroqBackend {
    http: reqwest::Client,
    api_key: String,
    url: String,
}

impl GroqBackend {
    pub fn new(api_key: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("dream-oracle/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(60))
            .build()
            .context("building groq http client")?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            url: GROQ_CHAT_URL.to_string(),
        })
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatReq<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
}

#[derive(Deserialize)]
struct ChatResp {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    #[serde(default)]
    content: Option<String>,
}

impl TextBackend for GroqBackend {
    fn complete<'a>(
        &'a self,
        req: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + 'a>> {
        Box::pin(async move {
            let body = ChatReq {
                model: &req.model,
                messages: vec![
                    Msg {
                        role: "system",
                        content: &req.system_prompt,
                    },
                    Msg {
                        role: "user",
                        content: &req.user_prompt,
                    },
                ],
                temperature: req.sampling.temperature,
                max_tokens: req.sampling.max_tokens,
                top_p: req.sampling.top_p,
            };

            let resp = self
                .http
                .post(&self.url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await
                .context("groq request")?;

            let status = resp.status();
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                return Err(anyhow!("groq HTTP {status}: {}", text.trim()));
            }

            let parsed: ChatResp = resp.json().await.context("groq response json")?;
            Ok(parsed
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .unwrap_or_default())
        })
    }

    fn name(&self) -> &'static str {
        "groq"
    }
}

/// Scripted backend for tests and dry runs. Returns `reply` and records
/// every request it saw.
pub struct MockBackend {
    reply: Result<String, String>,
    seen: Mutex<Vec<CompletionRequest>>,
}

impl MockBackend {
    pub fn replying(text: impl Into<String>) -> Self {
        Self {
            reply: Ok(text.into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(msg: impl Into<String>) -> Self {
        Self {
            reply: Err(msg.into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.seen.lock().expect("mock backend mutex poisoned").clone()
    }
}

impl TextBackend for MockBackend {
    fn complete<'a>(
        &'a self,
        req: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + 'a>> {
        self.seen
            .lock()
            .expect("mock backend mutex poisoned")
            .push(req.clone());
        let out = self.reply.clone().map_err(|e| anyhow!(e));
        Box::pin(async move { out })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

// ------------------------------------------------------------
// Generation client
// ------------------------------------------------------------

/// A finished post, ready for the publisher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedPost {
    pub text: String,
    pub source_url: Option<String>,
}

pub struct GenerationClient {
    backend: DynTextBackend,
    model: String,
    style_prompt: String,
    language: String,
    sampling: SamplingParams,
}

impl GenerationClient {
    pub fn new(
        backend: DynTextBackend,
        model: impl Into<String>,
        style_prompt: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            model: model.into(),
            style_prompt: style_prompt.into(),
            language: language.into(),
            sampling: SamplingParams::default(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Write a post from found content, crediting the item's url on a
    /// trailing line when it has one.
    pub async fn generate_post(&self, found: &FoundContent) -> Result<GeneratedPost, PostError> {
        let prompt = content_prompt(found, &self.language);
        let mut text = self.complete(prompt).await?;

        let url = found.item.url.trim();
        let source_url = if url.is_empty() {
            None
        } else {
            text.push_str("\n\n");
            text.push_str(SOURCE_LINE_PREFIX);
            text.push_str(url);
            Some(url.to_string())
        };

        tracing::info!(chars = text.chars().count(), "post generated");
        Ok(GeneratedPost { text, source_url })
    }

    /// Write a post straight from a user's request, no source material.
    pub async fn generate_custom_post(&self, request: &str) -> Result<GeneratedPost, PostError> {
        let request = request.trim();
        if request.is_empty() {
            return Err(PostError::GenerationFailure("empty request".into()));
        }
        let text = self.complete(custom_prompt(request, &self.language)).await?;
        tracing::info!(chars = text.chars().count(), "custom post generated");
        Ok(GeneratedPost {
            text,
            source_url: None,
        })
    }

    async fn complete(&self, user_prompt: String) -> Result<String, PostError> {
        let req = CompletionRequest {
            model: self.model.clone(),
            system_prompt: self.style_prompt.clone(),
            user_prompt,
            sampling: self.sampling,
        };

        tracing::debug!(backend = self.backend.name(), model = %self.model, "generation request");
        let t0 = Instant::now();
        let res = self.backend.complete(&req).await;
        histogram!("generation_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        let raw = res.map_err(|e| {
            tracing::error!(
                backend = self.backend.name(),
                error = %format!("{e:#}"),
                "generation failed"
            );
            PostError::GenerationFailure(format!("{e:#}"))
        })?;

        let text = raw.trim().to_string();
        if text.is_empty() {
            tracing::error!(backend = self.backend.name(), "backend returned empty text");
            return Err(PostError::GenerationFailure("backend returned empty text".into()));
        }
        Ok(text)
    }
}

/// First `max` characters of `s` (char-safe).
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn content_prompt(found: &FoundContent, language: &str) -> String {
    let item = &found.item;
    let body = if item.body.trim().is_empty() {
        item.description.as_str()
    } else {
        item.body.as_str()
    };
    format!(
        "Using this material, write an engaging post for the \"Dream Oracle\" channel.\n\n\
TOPIC: {topic}\n\n\
TITLE: {title}\n\n\
CONTENT:\n{body}\n\n\
TASK:\n\
1. Write a captivating post in language '{language}' (200-400 words)\n\
2. Open with a mystical introduction and an emoji\n\
3. Explain the scientific facts in plain words\n\
4. Add an esoteric interpretation\n\
5. Finish with practical advice or a question to reflect on\n\
6. Use emoji to structure the text: 🌙 💭 🔮 ✨ 🧠 📚\n\n\
STYLE: blend science and mysticism, keep it captivating!\n\n\
Do NOT mention the source in the post; the link is added automatically.",
        topic = found.topic,
        title = item.title,
        body = truncate_chars(body, MAX_BODY_CHARS),
    )
}

fn custom_prompt(request: &str, language: &str) -> String {
    format!(
        "Write a post for the \"Dream Oracle\" channel on this topic:\n\n\
{request}\n\n\
Requirements:\n\
- 200-400 words in language '{language}'\n\
- Use emoji\n\
- Blend scientific facts and esoterics\n\
- Be engaging and informative"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::ContentItem;

    fn found(url: &str, body: &str) -> FoundContent {
        FoundContent {
            topic: "lucid dreaming".into(),
            item: ContentItem::new("RSS", "Lucid study", "short desc", url)
                .with_body(Some(body.into())),
        }
    }

    fn client(backend: Arc<MockBackend>) -> GenerationClient {
        GenerationClient::new(backend, "test-model", "STYLE", "en")
    }

    #[tokio::test]
    async fn appends_source_url_once_and_trims() {
        let backend = Arc::new(MockBackend::replying("  Hello dreamers  \n"));
        let post = client(backend.clone())
            .generate_post(&found("https://x.test/a", "body"))
            .await
            .unwrap();
        assert_eq!(post.text, "Hello dreamers\n\n🔗 Source: https://x.test/a");
        assert_eq!(post.text.matches("https://x.test/a").count(), 1);
        assert_eq!(post.source_url.as_deref(), Some("https://x.test/a"));

        let reqs = backend.requests();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].system_prompt, "STYLE");
        assert_eq!(reqs[0].model, "test-model");
        assert_eq!(reqs[0].sampling, SamplingParams::default());
        assert!(reqs[0].user_prompt.contains("TOPIC: lucid dreaming"));
        assert!(reqs[0].user_prompt.contains("TITLE: Lucid study"));
    }

    #[tokio::test]
    async fn no_source_line_without_url() {
        let backend = Arc::new(MockBackend::replying("text"));
        let post = client(backend).generate_post(&found("  ", "b")).await.unwrap();
        assert_eq!(post.text, "text");
        assert!(post.source_url.is_none());
        assert!(!post.text.contains(SOURCE_LINE_PREFIX));
    }

    #[tokio::test]
    async fn body_is_truncated_in_prompt() {
        let long = "ж".repeat(MAX_BODY_CHARS + 200);
        let backend = Arc::new(MockBackend::replying("ok"));
        client(backend.clone())
            .generate_post(&found("", &long))
            .await
            .unwrap();
        let prompt = &backend.requests()[0].user_prompt;
        assert!(prompt.contains(&"ж".repeat(MAX_BODY_CHARS)));
        assert!(!prompt.contains(&"ж".repeat(MAX_BODY_CHARS + 1)));
    }

    #[tokio::test]
    async fn empty_completion_is_a_failure() {
        let backend = Arc::new(MockBackend::replying("   \n "));
        let err = client(backend).generate_post(&found("u", "b")).await.unwrap_err();
        assert!(matches!(err, PostError::GenerationFailure(_)));
    }

    #[tokio::test]
    async fn backend_error_propagates() {
        let backend = Arc::new(MockBackend::failing("503 upstream"));
        let err = client(backend)
            .generate_custom_post("water symbolism")
            .await
            .unwrap_err();
        match err {
            PostError::GenerationFailure(msg) => assert!(msg.contains("503 upstream")),
            other => panic!("unexpected: {other}"),
        }
    }

    #[tokio::test]
    async fn custom_prompt_embeds_request() {
        let backend = Arc::new(MockBackend::replying(" custom "));
        let post = client(backend.clone())
            .generate_custom_post("water symbolism")
            .await
            .unwrap();
        assert_eq!(post.text, "custom");
        assert!(backend.requests()[0].user_prompt.contains("water symbolism"));
    }

    #[test]
    fn truncate_is_char_safe() {
        assert_eq!(truncate_chars("сон", 2), "со");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
