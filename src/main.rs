//! Dream Oracle binary entrypoint.
//! Loads config, checks channel access, then runs the schedule and the
//! command loop until Ctrl-C.

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dream_oracle::bot::BotLoop;
use dream_oracle::metrics::{self, Metrics};
use dream_oracle::{App, AppConfig};

/// Compact logs by default, JSON lines with `LOG_FORMAT=json`.
/// `RUST_LOG` overrides the filter.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("dream_oracle=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when the file is absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::from_env().context("configuration")?;
    tracing::info!(config = ?cfg, "starting");

    let app = App::build(&cfg)?;

    let access = app
        .orchestrator
        .publisher()
        .verify_access()
        .await
        .context("channel access check failed; check BOT_TOKEN and CHANNEL_ID")?;
    tracing::info!(
        bot = ?access.bot.username,
        channel = ?access.chat_title,
        admin = access.is_admin,
        "channel access verified"
    );

    if cfg.admin_user_id == 0 {
        tracing::warn!("ADMIN_USER_ID not set; every user can manage the bot");
    }

    let metrics_task = match cfg.metrics_addr {
        Some(addr) => {
            let m = Metrics::init(cfg.post_interval_hours)?;
            let router = m.router(app.schedule.clone());
            Some(tokio::spawn(async move {
                if let Err(e) = metrics::serve(addr, router).await {
                    tracing::error!(error = ?e, "metrics endpoint stopped");
                }
            }))
        }
        None => None,
    };

    if cfg.auto_post_enabled {
        let outcome = app.schedule.start();
        tracing::info!(next_run = %app.schedule.next_run_time(), ?outcome, "auto-posting enabled");
    } else {
        tracing::info!("auto-posting disabled at startup; use /enable_auto");
    }

    let schedule = app.schedule.clone();
    BotLoop::new(app.telegram.clone(), app.commands.clone())
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "ctrl-c handler failed");
            }
        })
        .await;

    schedule.stop();
    if let Some(t) = metrics_task {
        t.abort();
    }
    tracing::info!("shutdown complete");
    Ok(())
}
