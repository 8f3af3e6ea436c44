//! Per-step timer controller
//!
//! A controller is bound to one `(recipeId, stepId)` pair. It never keeps its
//! own countdown: every read goes through the latest value of the recipe's
//! `watch` cell and remaining time is recomputed from wall-clock fields, so a
//! controller created after a reload, or one whose ticks were not delivered
//! while the process was suspended, reports the correct value on its next
//! recompute.
//!
//! ```text
//! Idle --start--> Running --pause--> Paused --resume--> Running
//!                    |                                     |
//!                    +-------- remaining reaches 0 --------+--> Finished
//! any --reset--> Idle
//! ```
//!
//! Transitions that are not valid from the current state are ignored.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::{sync::watch, time::MissedTickBehavior};
use tracing::{debug, info};

use super::{StepInfo, StepTimers, TimerPhase, TimerRecord, TimerRegistry};
use crate::{
    error::TimerError,
    services::Notifier,
    tasks::{TickerHandle, TICK_INTERVAL},
    utils::Clock,
};

/// What the UI renders for one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerDisplay {
    pub remaining_seconds: u64,
    pub is_running: bool,
    pub is_paused: bool,
    pub is_finished: bool,
}

impl TimerDisplay {
    pub fn idle(duration_seconds: u64) -> Self {
        Self {
            remaining_seconds: duration_seconds,
            is_running: false,
            is_paused: false,
            is_finished: false,
        }
    }

    pub fn phase(&self) -> TimerPhase {
        if self.is_running {
            TimerPhase::Running
        } else if self.is_paused {
            TimerPhase::Paused
        } else if self.is_finished {
            TimerPhase::Finished
        } else {
            TimerPhase::Idle
        }
    }
}

/// Outcome of one write attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Applied,
    Completed,
    Ignored,
}

/// Controller for one step's countdown
pub struct StepTimer {
    step: StepInfo,
    registry: Arc<TimerRegistry>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    latest: watch::Receiver<StepTimers>,
    display_tx: watch::Sender<TimerDisplay>,
}

impl std::fmt::Debug for StepTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepTimer")
            .field("step", &self.step)
            .field("display", &*self.display_tx.borrow())
            .finish_non_exhaustive()
    }
}

impl StepTimer {
    pub fn new(
        step: StepInfo,
        registry: Arc<TimerRegistry>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, TimerError> {
        if step.duration_seconds == 0 {
            return Err(TimerError::InvalidDuration {
                recipe_id: step.recipe_id,
                step_id: step.step_id,
            });
        }

        let latest = registry.subscribe(&step.recipe_id);
        let (display_tx, _) = watch::channel(TimerDisplay::idle(step.duration_seconds));
        let timer = Self {
            step,
            registry,
            clock,
            notifier,
            latest,
            display_tx,
        };
        timer.refresh();
        Ok(timer)
    }

    pub fn step(&self) -> &StepInfo {
        &self.step
    }

    /// The persisted record for this step, as of now
    pub fn record(&self) -> Option<TimerRecord> {
        self.latest.borrow().get(&self.step.step_id).cloned()
    }

    pub fn phase(&self) -> TimerPhase {
        self.display().phase()
    }

    /// Recompute the display from the latest record without writing anything
    pub fn display(&self) -> TimerDisplay {
        let now = self.clock.now_ms();
        match self.record() {
            None => TimerDisplay::idle(self.step.duration_seconds),
            Some(record) => {
                let phase = record.phase_at(now);
                TimerDisplay {
                    remaining_seconds: record.remaining_seconds(now),
                    is_running: phase == TimerPhase::Running,
                    is_paused: phase == TimerPhase::Paused,
                    is_finished: phase == TimerPhase::Finished,
                }
            }
        }
    }

    /// Receiver for display updates published by operations and ticks
    pub fn watch(&self) -> watch::Receiver<TimerDisplay> {
        self.display_tx.subscribe()
    }

    fn refresh(&self) -> TimerDisplay {
        let display = self.display();
        self.display_tx.send_replace(display.clone());
        display
    }

    /// Idle → Running
    pub fn start(&self) -> TimerDisplay {
        if self.record().is_some() {
            debug!("Ignoring start for step {}, timer exists", self.step.step_id);
            return self.refresh();
        }

        self.notifier.request_permission();

        let now = self.clock.now_ms();
        let step = &self.step;
        let started = self.registry.modify(&step.recipe_id, |timers| {
            if timers.contains_key(&step.step_id) {
                return false;
            }
            timers.insert(step.step_id.clone(), TimerRecord::started(step, now));
            true
        });

        if started {
            info!(
                "Started {}s timer for recipe {} step {}",
                step.duration_seconds, step.recipe_id, step.step_number
            );
        }
        self.refresh()
    }

    /// Running → Paused. Completes instead if nothing is left to pause.
    pub fn pause(&self) -> TimerDisplay {
        let now = self.clock.now_ms();
        let transition = self.write(|record| {
            if record.needs_completion(now) {
                Some((record.finished(), Transition::Completed))
            } else if record.is_running() {
                Some((record.paused(now), Transition::Applied))
            } else {
                None
            }
        });

        match transition {
            Transition::Applied => debug!("Paused step {}", self.step.step_id),
            Transition::Completed => self.announce_completion(),
            Transition::Ignored => debug!("Ignoring pause for step {}", self.step.step_id),
        }
        self.refresh()
    }

    /// Paused → Running
    pub fn resume(&self) -> TimerDisplay {
        let now = self.clock.now_ms();
        let transition = self.write(|record| {
            (record.stored_phase() == TimerPhase::Paused)
                .then(|| (record.resumed(now), Transition::Applied))
        });

        match transition {
            Transition::Ignored => debug!("Ignoring resume for step {}", self.step.step_id),
            _ => debug!("Resumed step {}", self.step.step_id),
        }
        self.refresh()
    }

    /// Any state → Idle
    pub fn reset(&self) -> TimerDisplay {
        let step_id = &self.step.step_id;
        let removed = self
            .registry
            .modify(&self.step.recipe_id, |timers| timers.remove(step_id).is_some());

        if removed {
            info!("Reset timer for recipe {} step {}", self.step.recipe_id, step_id);
        }
        self.refresh()
    }

    /// Recompute remaining time, finishing the timer if it ran out
    pub fn tick(&self) -> TimerDisplay {
        let now = self.clock.now_ms();
        let transition = self.write(|record| {
            record
                .needs_completion(now)
                .then(|| (record.finished(), Transition::Completed))
        });

        if transition == Transition::Completed {
            self.announce_completion();
        }
        self.refresh()
    }

    /// Replace this step's record with whatever `f` derives from the latest one
    fn write(&self, f: impl FnOnce(&TimerRecord) -> Option<(TimerRecord, Transition)>) -> Transition {
        let step_id = &self.step.step_id;
        self.registry.modify(&self.step.recipe_id, |timers| {
            let Some(current) = timers.get(step_id) else {
                return Transition::Ignored;
            };
            match f(current) {
                Some((replacement, transition)) => {
                    timers.insert(step_id.clone(), replacement);
                    transition
                }
                None => Transition::Ignored,
            }
        })
    }

    fn announce_completion(&self) {
        info!(
            "Timer finished for recipe {} step {}",
            self.step.recipe_id, self.step.step_number
        );
        let instruction = self
            .record()
            .map(|record| record.instruction)
            .unwrap_or_else(|| self.step.instruction.clone());
        self.notifier
            .notify_finished(self.step.step_number, &instruction);
    }

    /// Tick once per second and on every external change, until the handle is dropped
    pub fn spawn_ticker(self: &Arc<Self>) -> TickerHandle {
        let timer = Arc::clone(self);
        let mut changes = self.latest.clone();

        TickerHandle::new(tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK_INTERVAL);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        timer.tick();
                    }
                    changed = changes.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        timer.tick();
                    }
                }
            }
        }))
    }
}
