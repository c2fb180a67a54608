//! Periodic refresh scheduling.
//!
//! One cycle runs right after [`Scheduler::start`], then one per configured
//! interval. [`Scheduler::stop`] ends the timer loop at its next wait boundary;
//! a cycle that is already running is left to finish.

use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::config::SchedulerConfig;
use crate::error::AppError;
use crate::refresh::RefreshPipeline;
use crate::traits::{CardSource, CardStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Waiting,
    Stopped,
}

/// Drives a [`RefreshPipeline`] on a fixed interval.
pub struct Scheduler<S, F> {
    pipeline: RefreshPipeline<S, F>,
    config: SchedulerConfig,
    state: Arc<watch::Sender<SchedulerState>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl<S: CardStore, F: CardSource> Scheduler<S, F> {
    pub fn new(pipeline: RefreshPipeline<S, F>, config: SchedulerConfig) -> Self {
        let (state, _) = watch::channel(SchedulerState::Idle);
        Self {
            pipeline,
            config,
            state: Arc::new(state),
            timer: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    /// Spawns the initial cycle and arms the periodic timer. Must be called
    /// from within a Tokio runtime. Calling it again is a no-op.
    pub fn start(&self) {
        let mut timer = self.timer.lock().unwrap_or_else(|p| p.into_inner());
        if timer.is_some() || self.state() == SchedulerState::Stopped {
            warn!("Card refresh scheduler already started");
            return;
        }

        spawn_cycle(self.pipeline.clone(), Arc::clone(&self.state), "initial");

        let pipeline = self.pipeline.clone();
        let state = Arc::clone(&self.state);
        let mut state_rx = self.state.subscribe();
        let period = self.config.interval;

        *timer = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        spawn_cycle(pipeline.clone(), Arc::clone(&state), "periodic");
                    }
                    changed = state_rx.changed() => {
                        if changed.is_err() || *state_rx.borrow_and_update() == SchedulerState::Stopped {
                            break;
                        }
                    }
                }
            }

            info!("Card refresh scheduler stopped");
        }));

        info!(
            "Card refresh scheduler started (every {} hours)",
            period.as_secs() / 3600
        );
    }

    /// Stops the timer loop. Running cycles are not interrupted.
    pub fn stop(&self) {
        self.state.send_replace(SchedulerState::Stopped);
    }

    /// Stops the timer loop and waits for it to exit.
    pub async fn shutdown(&self) {
        self.stop();
        let handle = self
            .timer
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Card refresh scheduler task failed: {}", e);
            }
        }
    }
}

fn spawn_cycle<S: CardStore, F: CardSource>(
    pipeline: RefreshPipeline<S, F>,
    state: Arc<watch::Sender<SchedulerState>>,
    label: &'static str,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        state.send_if_modified(|s| set_unless_stopped(s, SchedulerState::Running));
        info!("Running {} card refresh...", label);

        match pipeline.refresh_all().await {
            Ok(report) => {
                info!(
                    "{} card refresh completed: {} stored, {} failed",
                    label, report.stats.stored, report.stats.failed
                );
            }
            Err(AppError::RefreshInProgress) => {
                warn!("Skipping {} card refresh: previous cycle still running", label);
                return;
            }
            Err(e) => error!("Error during {} card refresh: {}", label, e.user_message()),
        }

        state.send_if_modified(|s| set_unless_stopped(s, SchedulerState::Waiting));
    })
}

fn set_unless_stopped(current: &mut SchedulerState, next: SchedulerState) -> bool {
    if *current == SchedulerState::Stopped || *current == next {
        return false;
    }
    *current = next;
    true
}
