//! Stale timer sweeper

use std::{sync::Arc, time::Duration};

use tokio::time::interval;
use tracing::{debug, info};

use crate::state::{AppState, TimerRegistry};

/// Timers started this long ago or earlier are removed
pub const RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Remove every timer whose `startedAt` is at least [`RETENTION`] before `now_ms`.
///
/// Each recipe is swept on its own: fresh timers stay, and a recipe left with
/// nothing is removed entirely. Returns how many timers were removed.
pub fn sweep_stale_timers(registry: &TimerRegistry, now_ms: i64) -> usize {
    let retention_ms = RETENTION.as_millis() as i64;
    let mut removed = 0;

    for recipe_id in registry.recipe_ids() {
        let swept = registry.modify(&recipe_id, |timers| {
            let before = timers.len();
            timers.retain(|_, record| now_ms.saturating_sub(record.started_at) < retention_ms);
            before - timers.len()
        });

        // An emptied map drops the recipe's entry inside `modify`.
        if swept > 0 {
            debug!("Swept {} stale timers from recipe {}", swept, recipe_id);
        }
        removed += swept;
    }

    if removed > 0 {
        info!("Removed {} stale timers", removed);
    }
    removed
}

/// Background task that sweeps on a fixed cadence
pub async fn stale_sweeper_task(state: Arc<AppState>, every: Duration) {
    info!("Starting stale timer sweeper, every {}s", every.as_secs());

    let mut interval = interval(every);
    // The first tick completes immediately; startup already swept.
    interval.tick().await;

    loop {
        interval.tick().await;
        state.sweep_stale_timers();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        state::{StepInfo, StepTimers, TimerMapUpdate, TimerRecord},
        storage::{KeyValueStorage, MemoryStorage, TimerStore},
    };

    const NOW: i64 = 1_700_000_000_000;
    const DAY_MS: i64 = 24 * 60 * 60 * 1000;

    fn record(recipe_id: &str, step_id: &str, started_at: i64) -> TimerRecord {
        TimerRecord::started(
            &StepInfo {
                recipe_id: recipe_id.to_string(),
                step_id: step_id.to_string(),
                step_number: 1,
                instruction: "Marinate".to_string(),
                duration_seconds: 60,
            },
            started_at,
        )
    }

    fn put(registry: &TimerRegistry, recipe_id: &str, records: &[(&str, i64)]) {
        let timers: StepTimers = records
            .iter()
            .map(|(step_id, started_at)| (step_id.to_string(), record(recipe_id, step_id, *started_at)))
            .collect();
        registry.set(recipe_id, TimerMapUpdate::Replace(timers));
    }

    #[test]
    fn sweep_on_empty_registry_is_a_no_op() {
        let registry = TimerRegistry::load(TimerStore::detached());
        assert_eq!(sweep_stale_timers(&registry, NOW), 0);
    }

    #[test]
    fn retention_boundary_is_inclusive() {
        let registry = TimerRegistry::load(TimerStore::detached());
        put(
            &registry,
            "ribs",
            &[("exact", NOW - DAY_MS), ("fresh", NOW - DAY_MS + 1_000)],
        );

        assert_eq!(sweep_stale_timers(&registry, NOW), 1);

        let remaining = registry.get("ribs");
        assert!(!remaining.contains_key("exact"));
        assert!(remaining.contains_key("fresh"));
    }

    #[test]
    fn recipes_are_swept_independently() {
        let storage = std::sync::Arc::new(MemoryStorage::new());
        let registry = TimerRegistry::load(TimerStore::new(storage.clone()));
        put(&registry, "a", &[("old1", NOW - 2 * DAY_MS), ("old2", NOW - DAY_MS)]);
        put(&registry, "b", &[("new", NOW - 60_000)]);

        assert_eq!(sweep_stale_timers(&registry, NOW), 2);

        assert_eq!(registry.recipe_ids(), vec!["b"]);
        assert_eq!(registry.get("b").len(), 1);
        assert_eq!(storage.keys().unwrap(), vec!["cooking-timers-b"]);
    }

    #[test]
    fn mixed_recipe_keeps_fresh_timers() {
        let registry = TimerRegistry::load(TimerStore::detached());
        put(&registry, "a", &[("old", NOW - 3 * DAY_MS), ("new", NOW)]);

        sweep_stale_timers(&registry, NOW);

        assert_eq!(registry.get("a").keys().collect::<Vec<_>>(), vec!["new"]);
    }
}
