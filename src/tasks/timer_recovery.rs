//! Timer recovery after a restart

use tracing::{info, warn};

use crate::{
    state::{AppState, StepInfo, TimerPhase},
    utils::Clock,
};

/// Remount a controller for every persisted timer.
///
/// Remaining time comes straight from the persisted wall-clock fields, so a
/// timer that ran out while the process was down finishes (and notifies) on
/// the first tick of its remounted controller. Returns the number remounted.
///
/// Notification permission belongs to the process, not to the persisted
/// timer, so it is requested again whenever something can still finish.
pub fn recover_timers(state: &AppState) -> usize {
    let now = state.clock.now_ms();
    let mut recovered = 0;

    let snapshot = state.registry.snapshot();
    let pending = snapshot
        .values()
        .flat_map(|timers| timers.values())
        .any(|record| record.stored_phase() != TimerPhase::Finished);
    if pending {
        state.notifier.request_permission();
    }

    for (recipe_id, timers) in snapshot {
        for record in timers.values() {
            match state.mount(StepInfo::from_record(record)) {
                Ok(timer) => {
                    let shown = timer.tick();
                    info!(
                        "Recovered timer for recipe {} step {}: {:?}, {}s left",
                        recipe_id,
                        record.step_number,
                        record.phase_at(now),
                        shown.remaining_seconds
                    );
                    recovered += 1;
                }
                Err(e) => warn!("Skipping unrecoverable timer: {}", e),
            }
        }
    }

    if recovered == 0 {
        info!("No timers to recover");
    }
    recovered
}

/// Count of persisted timers per phase, for startup logging
pub fn phase_counts(state: &AppState) -> [(TimerPhase, usize); 3] {
    let now = state.clock.now_ms();
    let mut counts = [
        (TimerPhase::Running, 0),
        (TimerPhase::Paused, 0),
        (TimerPhase::Finished, 0),
    ];
    for timers in state.registry.snapshot().values() {
        for record in timers.values() {
            let phase = record.phase_at(now);
            if let Some((_, count)) = counts.iter_mut().find(|(p, _)| *p == phase) {
                *count += 1;
            }
        }
    }
    counts
}
