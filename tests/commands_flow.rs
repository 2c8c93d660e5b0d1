// tests/commands_flow.rs
//
// Command handling against a real schedule and a stubbed pipeline.

mod common;

use std::sync::Arc;

use common::{harness, StubSource};
use dream_oracle::commands::{AdminPolicy, Command, CommandContext, DENIED};
use dream_oracle::generation::MockBackend;
use dream_oracle::orchestrator::AutoPostJob;
use dream_oracle::scheduler::{ScheduleController, NOT_RUNNING};
use dream_oracle::sources::SourceClient;

const ADMIN: i64 = 1001;
const STRANGER: i64 = 2002;

struct Fixture {
    ctx: CommandContext,
    source: Arc<StubSource>,
    transport: Arc<common::RecordingTransport>,
}

fn fixture(policy: AdminPolicy) -> Fixture {
    let source = StubSource::one("A", "https://a.example/dream");
    let h = harness(
        vec![source.clone() as Arc<dyn SourceClient>],
        &["lucid dreaming"],
        MockBackend::replying("A dream post."),
    );
    let schedule = Arc::new(
        ScheduleController::new(Arc::new(AutoPostJob::new(h.orchestrator.clone())), 8)
            .with_display_offset(3),
    );
    Fixture {
        ctx: CommandContext {
            orchestrator: h.orchestrator,
            schedule,
            policy,
            channel_label: "@dream_channel".into(),
        },
        source,
        transport: h.transport,
    }
}

#[tokio::test]
async fn non_admin_gets_help_but_nothing_else() {
    let f = fixture(AdminPolicy::new(ADMIN));

    let help = f.ctx.handle(STRANGER, &Command::Start).await;
    assert!(help.contains("@dream_channel"));
    assert!(!help.contains("/post_now"));

    for cmd in [
        Command::PostNow,
        Command::PostCustom("water".into()),
        Command::Status,
        Command::NextPost,
        Command::EnableAuto,
        Command::DisableAuto,
    ] {
        assert_eq!(f.ctx.handle(STRANGER, &cmd).await, DENIED, "{cmd:?}");
    }
    assert!(!f.ctx.schedule.is_running());
    assert_eq!(f.source.calls(), 0);
    assert!(f.transport.sent().is_empty());
}

#[tokio::test]
async fn admin_help_lists_commands_and_interval() {
    let f = fixture(AdminPolicy::new(ADMIN));
    let help = f.ctx.handle(ADMIN, &Command::Start).await;
    assert!(help.contains("/post_now"));
    assert!(help.contains("/disable_auto"));
    assert!(help.contains("every 8 hours"));
}

#[tokio::test]
async fn enable_disable_cycle_updates_status() {
    let f = fixture(AdminPolicy::new(ADMIN));

    let status = f.ctx.handle(ADMIN, &Command::Status).await;
    assert!(status.contains("OFF"));
    assert!(f.ctx.handle(ADMIN, &Command::NextPost).await.contains("off"));

    let on = f.ctx.handle(ADMIN, &Command::EnableAuto).await;
    assert!(on.contains("enabled"));
    assert!(f.ctx.schedule.is_running());
    assert_ne!(f.ctx.schedule.next_run_time(), NOT_RUNNING);

    let again = f.ctx.handle(ADMIN, &Command::EnableAuto).await;
    assert!(again.contains("already on"));

    let status = f.ctx.handle(ADMIN, &Command::Status).await;
    assert!(status.contains("ON"));
    assert!(status.contains(&f.ctx.schedule.next_run_time()));

    let next = f.ctx.handle(ADMIN, &Command::NextPost).await;
    assert!(next.contains(&f.ctx.schedule.next_run_time()));

    assert!(f.ctx.handle(ADMIN, &Command::DisableAuto).await.contains("disabled"));
    assert!(f
        .ctx
        .handle(ADMIN, &Command::DisableAuto)
        .await
        .contains("already off"));
    assert!(!f.ctx.schedule.is_running());
}

#[tokio::test]
async fn post_now_and_custom_publish_with_link() {
    let f = fixture(AdminPolicy::new(ADMIN));

    let reply = f.ctx.handle(ADMIN, &Command::PostNow).await;
    assert!(reply.contains("https://t.me/dream_channel/1"), "{reply}");
    assert_eq!(f.source.calls(), 1);

    let reply = f
        .ctx
        .handle(ADMIN, &Command::PostCustom("water symbolism".into()))
        .await;
    assert!(reply.contains("https://t.me/dream_channel/2"), "{reply}");
    assert_eq!(f.source.calls(), 1);
    assert_eq!(f.transport.sent().len(), 2);
}

#[tokio::test]
async fn empty_custom_request_returns_usage() {
    let f = fixture(AdminPolicy::allow_all());
    let reply = f
        .ctx
        .handle(STRANGER, &Command::parse("/post_custom").unwrap())
        .await;
    assert!(reply.contains("Usage"));
    assert!(f.transport.sent().is_empty());
}
