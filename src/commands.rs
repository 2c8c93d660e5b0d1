//! Bot command surface: parsing, authorization and dispatch onto the
//! orchestrator and the schedule.
//!
//! Handlers get everything through an explicit [`CommandContext`] built at
//! startup; there is no process-wide bot or scheduler instance.

use std::sync::Arc;

use crate::error::PostError;
use crate::orchestrator::PostOrchestrator;
use crate::publisher::PublishedPost;
use crate::scheduler::{ScheduleController, StartOutcome};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Help text.
    Start,
    PostNow,
    /// Free-form request; may be empty, in which case usage is returned.
    PostCustom(String),
    Status,
    NextPost,
    EnableAuto,
    DisableAuto,
}

impl Command {
    /// Parse `/name[@bot] args...`. Returns `None` for plain text and unknown commands.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let rest = text.strip_prefix('/')?;
        let (head, args) = match rest.split_once(char::is_whitespace) {
            Some((h, a)) => (h, a.trim()),
            None => (rest, ""),
        };
        let name = head.split('@').next().unwrap_or(head).to_ascii_lowercase();
        let cmd = match name.as_str() {
            "start" | "help" => Command::Start,
            "post_now" => Command::PostNow,
            "post_custom" => Command::PostCustom(args.to_string()),
            "status" => Command::Status,
            "next_post" => Command::NextPost,
            "enable_auto" => Command::EnableAuto,
            "disable_auto" => Command::DisableAuto,
            _ => return None,
        };
        Some(cmd)
    }

    /// Progress note sent before commands that take a network round-trip or three.
    pub fn ack(&self) -> Option<String> {
        match self {
            Command::PostNow => Some("⏳ Creating a post... this takes about 30 seconds".into()),
            Command::PostCustom(topic) if !topic.is_empty() => Some(format!(
                "⏳ Creating a post on: {topic}...\nThis takes about 30 seconds"
            )),
            _ => None,
        }
    }
}

/// Who may run management commands. `admin_id == 0` lets everyone in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminPolicy {
    admin_id: i64,
}

impl AdminPolicy {
    pub fn new(admin_id: i64) -> Self {
        Self { admin_id }
    }

    pub fn allow_all() -> Self {
        Self { admin_id: 0 }
    }

    pub fn is_open(&self) -> bool {
        self.admin_id == 0
    }

    pub fn allows(&self, user_id: i64) -> bool {
        self.is_open() || user_id == self.admin_id
    }
}

pub const DENIED: &str = "❌ You are not allowed to run this command";

#[derive(Clone)]
pub struct CommandContext {
    pub orchestrator: Arc<PostOrchestrator>,
    pub schedule: Arc<ScheduleController>,
    pub policy: AdminPolicy,
    /// `@channel` or raw id, for display only.
    pub channel_label: String,
}

impl CommandContext {
    /// Run `cmd` on behalf of `user_id` and return the reply text.
    pub async fn handle(&self, user_id: i64, cmd: &Command) -> String {
        let allowed = self.policy.allows(user_id);
        tracing::info!(user_id, ?cmd, allowed, "command received");

        if *cmd == Command::Start {
            return self.help(allowed);
        }
        if !allowed {
            return DENIED.to_string();
        }

        match cmd {
            Command::Start => self.help(true),
            Command::PostNow => {
                post_reply(self.orchestrator.produce_auto_post(None).await)
            }
            Command::PostCustom(request) if request.trim().is_empty() => {
                "ℹ️ Usage: /post_custom <topic>\nExample: /post_custom Jung and archetypes in dreams"
                    .to_string()
            }
            Command::PostCustom(request) => {
                post_reply(self.orchestrator.produce_post(request).await)
            }
            Command::Status => self.status(),
            Command::NextPost => {
                if self.schedule.is_running() {
                    format!("📅 Next automatic post: {}", self.schedule.next_run_time())
                } else {
                    "ℹ️ Auto-posting is off".to_string()
                }
            }
            Command::EnableAuto => match self.schedule.start() {
                StartOutcome::AlreadyRunning { .. } => {
                    "ℹ️ Auto-posting is already on".to_string()
                }
                StartOutcome::Started { .. } => format!(
                    "✅ Auto-posting enabled!\n📅 Next post: {}",
                    self.schedule.next_run_time()
                ),
            },
            Command::DisableAuto => {
                if self.schedule.stop() {
                    "✅ Auto-posting disabled".to_string()
                } else {
                    "ℹ️ Auto-posting is already off".to_string()
                }
            }
        }
    }

    fn help(&self, admin: bool) -> String {
        let mut text = format!(
            "🌙 DREAM ORACLE - autoposting bot\n\n\
I publish posts about dreams and sleep to {}\n",
            self.channel_label
        );
        if admin {
            text.push_str(&format!(
                "\n📋 Commands:\n\
/post_now - create a post now (random topic)\n\
/post_custom <topic> - create a post on a topic\n\
/status - system status\n\
/next_post - when the next post goes out\n\
/enable_auto - turn auto-posting on\n\
/disable_auto - turn auto-posting off\n\n\
⏰ Auto-posting: every {} hours",
                self.schedule.interval_hours()
            ));
        } else {
            text.push_str(&format!(
                "\nℹ️ You cannot manage this bot.\n📱 Subscribe to the channel: {}",
                self.channel_label
            ));
        }
        text
    }

    fn status(&self) -> String {
        let mut text = format!(
            "📊 SYSTEM STATUS\n\n📱 Channel: {}\n⏰ Post interval: every {} h\n",
            self.channel_label,
            self.schedule.interval_hours()
        );
        if self.schedule.is_running() {
            text.push_str(&format!(
                "🟢 Auto-posting: ON\n📅 Next post: {}",
                self.schedule.next_run_time()
            ));
        } else {
            text.push_str("🔴 Auto-posting: OFF");
        }
        text
    }
}

fn post_reply(res: Result<PublishedPost, PostError>) -> String {
    match res {
        Ok(PublishedPost { link: Some(link), .. }) => format!("✅ Post published!\n🔗 {link}"),
        Ok(_) => "✅ Post published!".to_string(),
        Err(PostError::NoContentFound { topic }) => {
            format!("❌ No content found for '{topic}', nothing was published")
        }
        Err(e) => format!("❌ Failed to create the post: {e}"),
    }
}
