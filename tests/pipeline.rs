// tests/pipeline.rs
//
// End-to-end post production with stub sources, a scripted LLM backend and a
// recording transport.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use common::{harness, harness_with, Outcome, RecordingTransport, StubSource, CHANNEL};
use dream_oracle::error::PostError;
use dream_oracle::generation::{MockBackend, SOURCE_LINE_PREFIX};
use dream_oracle::sources::SourceClient;

#[tokio::test]
async fn empty_pool_skips_generation_and_publish() {
    let a = StubSource::new("A", Outcome::Items(vec![]));
    let b = StubSource::new("B", Outcome::Fail);
    let h = harness(
        vec![a.clone() as Arc<dyn SourceClient>, b.clone()],
        &["nightmares"],
        MockBackend::replying("unused"),
    );

    let err = h.orchestrator.produce_auto_post(None).await.unwrap_err();
    match err {
        PostError::NoContentFound { topic } => assert_eq!(topic, "nightmares"),
        other => panic!("unexpected: {other:?}"),
    }
    assert_eq!(a.calls(), 1);
    assert_eq!(b.calls(), 1);
    assert!(h.backend.requests().is_empty());
    assert!(h.transport.sent().is_empty());
}

#[tokio::test]
async fn failing_and_panicking_sources_leave_the_healthy_one() {
    let good = StubSource::one("Good", "https://good.example/1");
    let h = harness(
        vec![
            StubSource::new("Down", Outcome::Fail) as Arc<dyn SourceClient>,
            good.clone(),
            StubSource::new("Boom", Outcome::Panic),
        ],
        &["sleep paralysis"],
        MockBackend::replying("A post."),
    );

    for _ in 0..20 {
        h.orchestrator.produce_auto_post(None).await.unwrap();
    }
    let sent = h.transport.sent();
    assert_eq!(sent.len(), 20);
    assert!(sent
        .iter()
        .all(|(_, text)| text.ends_with("https://good.example/1")));
}

#[tokio::test]
async fn topics_come_from_the_configured_list() {
    let topics = ["lucid dreaming", "nightmares", "dream symbols"];
    let src = StubSource::one("A", "https://a.example/");
    let h = harness(
        vec![src.clone() as Arc<dyn SourceClient>],
        &topics,
        MockBackend::replying("A post."),
    );

    for _ in 0..30 {
        h.orchestrator.produce_auto_post(None).await.unwrap();
    }
    let seen = src.topics();
    assert_eq!(seen.len(), 30);
    assert!(seen.iter().all(|t| topics.contains(&t.as_str())));
}

#[tokio::test]
async fn explicit_topic_overrides_the_list() {
    let src = StubSource::one("A", "https://a.example/");
    let h = harness(
        vec![src.clone() as Arc<dyn SourceClient>],
        &["lucid dreaming"],
        MockBackend::replying("A post."),
    );
    h.orchestrator
        .produce_auto_post(Some("prophetic dreams"))
        .await
        .unwrap();
    assert_eq!(src.topics(), vec!["prophetic dreams".to_string()]);
}

#[tokio::test]
async fn selection_is_uniform_over_the_merged_pool() {
    let a = StubSource::one("A", "https://a.example/");
    let b = StubSource::one("B", "https://b.example/");
    let c = StubSource::one("C", "https://c.example/");
    let h = harness(
        vec![a.clone() as Arc<dyn SourceClient>, b.clone(), c.clone()],
        &["lucid dreaming"],
        MockBackend::replying("Dreams, explained."),
    );

    // One full run: published once, url on a trailing line.
    let published = h.orchestrator.produce_auto_post(None).await.unwrap();
    let sent = h.transport.sent();
    assert_eq!(sent.len(), 1);
    let (chat, text) = &sent[0];
    assert_eq!(chat, CHANNEL);
    let last = text.lines().last().unwrap();
    assert!(last.starts_with(SOURCE_LINE_PREFIX), "{text}");
    assert!(
        ["https://a.example/", "https://b.example/", "https://c.example/"]
            .iter()
            .any(|u| last.ends_with(u)),
        "{text}"
    );
    assert_eq!(
        published.link.as_deref(),
        Some("https://t.me/dream_channel/1")
    );

    // Selection frequency, aggregation only.
    let trials = 3000;
    let mut hits: HashMap<String, usize> = HashMap::new();
    let aggregator = dream_oracle::aggregator::ContentAggregator::new(
        vec![a as Arc<dyn SourceClient>, b, c],
        vec!["lucid dreaming".to_string()],
    );
    for _ in 0..trials {
        let found = aggregator.find_content(None).await.unwrap();
        assert_eq!(found.topic, "lucid dreaming");
        *hits.entry(found.item.source).or_default() += 1;
    }
    assert_eq!(hits.len(), 3);
    for (source, n) in hits {
        let share = n as f64 / trials as f64;
        assert!(
            (0.28..=0.39).contains(&share),
            "{source} picked {share:.3} of the time"
        );
    }
}

#[tokio::test]
async fn custom_post_never_queries_sources() {
    let src = StubSource::one("A", "https://a.example/");
    let h = harness(
        vec![src.clone() as Arc<dyn SourceClient>],
        &["lucid dreaming"],
        MockBackend::replying("Water is the oldest dream symbol."),
    );

    let published = h.orchestrator.produce_post("water symbolism").await.unwrap();
    assert_eq!(published.message_id, 1);
    assert_eq!(src.calls(), 0);

    let reqs = h.backend.requests();
    assert_eq!(reqs.len(), 1);
    assert!(reqs[0].user_prompt.contains("water symbolism"));

    let sent = h.transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1, "Water is the oldest dream symbol.");
    assert!(!sent[0].1.contains(SOURCE_LINE_PREFIX));
}

#[tokio::test]
async fn generation_failure_publishes_nothing() {
    let h = harness(
        vec![StubSource::one("A", "https://a.example/") as Arc<dyn SourceClient>],
        &["lucid dreaming"],
        MockBackend::failing("rate limited"),
    );
    let err = h.orchestrator.produce_auto_post(None).await.unwrap_err();
    assert!(matches!(err, PostError::GenerationFailure(_)));
    assert!(h.transport.sent().is_empty());

    let blank = harness(
        vec![StubSource::one("A", "https://a.example/") as Arc<dyn SourceClient>],
        &["lucid dreaming"],
        MockBackend::replying("   \n "),
    );
    let err = blank.orchestrator.produce_post("sleep").await.unwrap_err();
    assert!(matches!(err, PostError::GenerationFailure(_)));
    assert!(blank.transport.sent().is_empty());
}

#[tokio::test]
async fn delivery_failure_is_reported() {
    let h = harness_with(
        vec![StubSource::one("A", "https://a.example/") as Arc<dyn SourceClient>],
        &["lucid dreaming"],
        MockBackend::replying("A post."),
        RecordingTransport {
            fail_send: true,
            ..Default::default()
        },
    );
    let err = h.orchestrator.produce_auto_post(None).await.unwrap_err();
    match err {
        PostError::DeliveryError(msg) => assert!(msg.contains("chat not found")),
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn verify_access_reports_admin_bot() {
    let h = harness(vec![], &[], MockBackend::replying("x"));
    let report = h.orchestrator.publisher().verify_access().await.unwrap();
    assert!(report.is_admin);
    assert_eq!(report.bot.username.as_deref(), Some("oracle_bot"));
    assert_eq!(report.chat_title.as_deref(), Some("Dream Oracle"));
}
