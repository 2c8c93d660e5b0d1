// src/bot.rs
use std::future::Future;
use std::time::Duration;

use crate::commands::{Command, CommandContext};
use crate::telegram::{TelegramClient, Update};

const POLL_SECS: u64 = 30;
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Long-polls the Bot API for commands and answers them.
///
/// Each command runs in its own task, so a slow `/post_now` does not hold up
/// `/status` from the same or another user.
pub struct BotLoop {
    client: TelegramClient,
    ctx: CommandContext,
}

/// A command addressed to the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incoming {
    pub chat_id: i64,
    pub user_id: i64,
    pub command: Command,
}

impl BotLoop {
    pub fn new(client: TelegramClient, ctx: CommandContext) -> Self {
        Self { client, ctx }
    }

    /// Poll until `shutdown` resolves. Updates queued before startup are dropped.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut offset = self.skip_pending().await;
        tracing::info!(offset, "command loop started");

        loop {
            let batch = tokio::select! {
                _ = &mut shutdown => break,
                res = self.client.get_updates(offset, POLL_SECS) => res,
            };

            match batch {
                Ok(updates) => {
                    for up in updates {
                        offset = offset.max(up.update_id + 1);
                        if let Some(incoming) = incoming_command(&up) {
                            self.dispatch(incoming);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "getUpdates failed");
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = tokio::time::sleep(ERROR_BACKOFF) => {}
                    }
                }
            }
        }
        tracing::info!("command loop stopped");
    }

    async fn skip_pending(&self) -> i64 {
        match self.client.get_updates(-1, 0).await {
            Ok(ups) => ups.last().map(|u| u.update_id + 1).unwrap_or(0),
            Err(e) => {
                tracing::warn!(error = %e, "could not drop pending updates");
                0
            }
        }
    }

    fn dispatch(&self, incoming: Incoming) {
        let client = self.client.clone();
        let ctx = self.ctx.clone();
        tokio::spawn(async move {
            let Incoming {
                chat_id,
                user_id,
                command,
            } = incoming;
            if ctx.policy.allows(user_id) {
                if let Some(ack) = command.ack() {
                    reply(&client, chat_id, &ack).await;
                }
            }
            let text = ctx.handle(user_id, &command).await;
            reply(&client, chat_id, &text).await;
        });
    }
}

async fn reply(client: &TelegramClient, chat_id: i64, text: &str) {
    if let Err(e) = client.send_to_chat(chat_id, text).await {
        tracing::warn!(chat_id, error = %e, "reply failed");
    }
}

/// Extract a known command from an update. Messages without a sender or
/// text, and unknown commands, are ignored.
pub fn incoming_command(up: &Update) -> Option<Incoming> {
    let msg = up.message.as_ref()?;
    let user_id = msg.from.as_ref()?.id;
    let command = Command::parse(msg.text.as_deref()?)?;
    Some(Incoming {
        chat_id: msg.chat.id,
        user_id,
        command,
    })
}
