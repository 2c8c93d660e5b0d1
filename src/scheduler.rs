//! Recurring auto-post schedule.
//!
//! One job (`"auto_post"`) at a fixed interval, modelled as a two-state
//! machine (`Stopped` / `Running`) behind a mutex so that concurrent
//! start/stop calls from commands and from the timer itself cannot leave a
//! half-registered job behind.
//!
//! Each fire runs the job in its own task: a failing or panicking run is
//! logged and the next fire still happens on the original grid, and `stop()`
//! cancels only the timer, never a run that is already in flight.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use metrics::counter;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Name of the single recurring job.
pub const JOB_ID: &str = "auto_post";

/// Returned by [`ScheduleController::next_run_time`] while stopped.
pub const NOT_RUNNING: &str = "not running";

const TIME_FORMAT: &str = "%d.%m.%Y %H:%M:%S";

/// Work executed on every fire.
pub trait ScheduledJob: Send + Sync + 'static {
    fn run(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started { next_run: DateTime<Utc> },
    AlreadyRunning { next_run: DateTime<Utc> },
}

impl StartOutcome {
    pub fn next_run(&self) -> DateTime<Utc> {
        match self {
            StartOutcome::Started { next_run } | StartOutcome::AlreadyRunning { next_run } => {
                *next_run
            }
        }
    }
}

enum ScheduleState {
    Stopped,
    Running {
        timer: JoinHandle<()>,
        next_run: Arc<Mutex<DateTime<Utc>>>,
    },
}

pub struct ScheduleController {
    job: Arc<dyn ScheduledJob>,
    period: Duration,
    display_offset: FixedOffset,
    state: Mutex<ScheduleState>,
}

impl ScheduleController {
    /// Schedule that fires every `interval_hours` (clamped to at least 1).
    pub fn new(job: Arc<dyn ScheduledJob>, interval_hours: u64) -> Self {
        Self::with_period(job, Duration::from_secs(interval_hours.max(1) * 3600))
    }

    pub fn with_period(job: Arc<dyn ScheduledJob>, period: Duration) -> Self {
        Self {
            job,
            period: period.max(Duration::from_secs(1)),
            display_offset: utc_offset(0),
            state: Mutex::new(ScheduleState::Stopped),
        }
    }

    /// Timezone used by [`next_run_time`](Self::next_run_time), in whole hours from UTC.
    pub fn with_display_offset(mut self, hours: i32) -> Self {
        self.display_offset = utc_offset(hours);
        self
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn interval_hours(&self) -> u64 {
        self.period.as_secs() / 3600
    }

    /// Register the recurring job. A second call while running changes
    /// nothing and reports the existing next run.
    pub fn start(&self) -> StartOutcome {
        let mut state = self.state.lock().expect("schedule mutex poisoned");
        if let ScheduleState::Running { next_run, .. } = &*state {
            let next_run = *next_run.lock().expect("next_run mutex poisoned");
            tracing::warn!(job = JOB_ID, "schedule already running");
            return StartOutcome::AlreadyRunning { next_run };
        }

        let period = chrono_period(self.period);
        let first = Utc::now() + period;
        let next_run = Arc::new(Mutex::new(first));
        let timer = tokio::spawn(run_timer(
            Arc::clone(&self.job),
            self.period,
            Arc::clone(&next_run),
        ));

        // Replace, never duplicate, the registration.
        if let ScheduleState::Running { timer: old, .. } =
            std::mem::replace(&mut *state, ScheduleState::Running { timer, next_run })
        {
            old.abort();
        }

        counter!("schedule_starts_total").increment(1);
        tracing::info!(
            job = JOB_ID,
            interval_secs = self.period.as_secs(),
            next_run = %self.format(first),
            "schedule started"
        );
        StartOutcome::Started { next_run: first }
    }

    /// Cancel the recurring job. Returns `false` if it was not running.
    pub fn stop(&self) -> bool {
        let mut state = self.state.lock().expect("schedule mutex poisoned");
        match std::mem::replace(&mut *state, ScheduleState::Stopped) {
            ScheduleState::Running { timer, .. } => {
                timer.abort();
                tracing::info!(job = JOB_ID, "schedule stopped");
                true
            }
            ScheduleState::Stopped => false,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(
            *self.state.lock().expect("schedule mutex poisoned"),
            ScheduleState::Running { .. }
        )
    }

    pub fn next_run(&self) -> Option<DateTime<Utc>> {
        match &*self.state.lock().expect("schedule mutex poisoned") {
            ScheduleState::Running { next_run, .. } => {
                Some(*next_run.lock().expect("next_run mutex poisoned"))
            }
            ScheduleState::Stopped => None,
        }
    }

    /// Human-readable next fire time, or [`NOT_RUNNING`].
    pub fn next_run_time(&self) -> String {
        match self.next_run() {
            Some(at) => self.format(at),
            None => NOT_RUNNING.to_string(),
        }
    }

    fn format(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.display_offset)
            .format(TIME_FORMAT)
            .to_string()
    }
}

impl Drop for ScheduleController {
    fn drop(&mut self) {
        if let Ok(state) = self.state.get_mut() {
            if let ScheduleState::Running { timer, .. } = state {
                timer.abort();
            }
        }
    }
}

async fn run_timer(
    job: Arc<dyn ScheduledJob>,
    period: Duration,
    next_run: Arc<Mutex<DateTime<Utc>>>,
) {
    let step = chrono_period(period);
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let fired = Utc::now();
        if let Ok(mut n) = next_run.lock() {
            *n = fired + step;
        }
        counter!("schedule_fires_total").increment(1);
        tracing::info!(job = JOB_ID, "schedule fired");

        let job = Arc::clone(&job);
        let run = tokio::spawn(async move { job.run().await });
        if let Err(e) = run.await {
            tracing::error!(job = JOB_ID, error = %e, "scheduled run aborted");
        }

        // A run longer than the period skips the missed fires; keep the
        // reported time on the grid.
        if let Ok(mut n) = next_run.lock() {
            let now = Utc::now();
            while *n <= now {
                *n += step;
            }
        }
    }
}

fn chrono_period(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::hours(1))
}

fn utc_offset(hours: i32) -> FixedOffset {
    FixedOffset::east_opt(hours.clamp(-23, 23) * 3600).unwrap_or_else(|| Utc.fix())
}
