use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{extract::State, routing::get, Json, Router};
use metrics::{describe_counter, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;

use crate::scheduler::{ScheduleController, JOB_ID};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

#[derive(Clone)]
struct StatusState {
    handle: PrometheusHandle,
    schedule: Arc<ScheduleController>,
}

#[derive(Debug, Serialize)]
pub struct ScheduleStatus {
    pub job: &'static str,
    pub running: bool,
    pub interval_hours: u64,
    pub next_run: Option<String>,
}

impl Metrics {
    /// Install the global Prometheus recorder and describe the pipeline series.
    /// Fails if a recorder is already installed.
    pub fn init(interval_hours: u64) -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        describe();
        gauge!("schedule_interval_hours").set(interval_hours as f64);
        Ok(Self { handle })
    }

    /// A handle that is not wired to the global recorder. Renders an empty
    /// exposition; used where the process-wide recorder is already taken.
    pub fn detached() -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        Self {
            handle: recorder.handle(),
        }
    }

    /// `/metrics`, `/health` and `/status` (schedule state as JSON).
    pub fn router(&self, schedule: Arc<ScheduleController>) -> Router {
        let state = StatusState {
            handle: self.handle.clone(),
            schedule,
        };
        Router::new()
            .route("/health", get(|| async { "OK" }))
            .route("/metrics", get(render))
            .route("/status", get(status))
            .with_state(state)
    }
}

fn describe() {
    describe_counter!("posts_published_total", "Posts delivered to the channel");
    describe_counter!("posts_failed_total", "Pipeline runs that failed, by stage");
    describe_counter!("source_items_total", "Items returned per content source");
    describe_counter!("source_errors_total", "Failed source fetches");
    describe_counter!("feed_errors_total", "RSS feeds skipped on error");
    describe_counter!("schedule_fires_total", "Auto-post schedule fires");
    describe_histogram!("source_fetch_ms", "Source fetch latency in milliseconds");
    describe_histogram!("generation_ms", "LLM completion latency in milliseconds");
}

async fn render(State(st): State<StatusState>) -> String {
    st.handle.render()
}

async fn status(State(st): State<StatusState>) -> Json<ScheduleStatus> {
    Json(schedule_status(&st.schedule))
}

pub fn schedule_status(schedule: &ScheduleController) -> ScheduleStatus {
    let running = schedule.is_running();
    ScheduleStatus {
        job: JOB_ID,
        running,
        interval_hours: schedule.interval_hours(),
        next_run: running.then(|| schedule.next_run_time()),
    }
}

/// Serve `router` on `addr` until the task is aborted.
pub async fn serve(addr: SocketAddr, router: Router) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind metrics listener on {addr}"))?;
    tracing::info!(%addr, "metrics endpoint listening");
    axum::serve(listener, router)
        .await
        .context("metrics server")?;
    Ok(())
}
