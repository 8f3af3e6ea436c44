//! Main application state management

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Instant,
};

use tracing::{debug, info, warn};

use super::{
    active_recipes, ActiveRecipe, RecipeTimers, RecipeTitles, StepInfo, StepTimer, TimerPhase,
    TimerRegistry, TimerSummary,
};
use crate::{
    error::TimerError,
    services::Notifier,
    tasks::{sweep_stale_timers, TickerHandle},
    utils::Clock,
};

/// A controller kept alive together with its ticker
#[derive(Debug)]
struct MountedTimer {
    timer: Arc<StepTimer>,
    _ticker: TickerHandle,
}

type StepKey = (String, String);

/// Process-wide state shared by the HTTP handlers and background tasks
pub struct AppState {
    /// Recipe-scoped timer maps, persisted on every write
    pub registry: Arc<TimerRegistry>,
    pub clock: Arc<dyn Clock>,
    pub notifier: Arc<dyn Notifier>,
    /// Titles for the global banner
    pub titles: RecipeTitles,
    /// Controllers currently mounted, keyed by (recipe id, step id)
    mounted: Mutex<HashMap<StepKey, MountedTimer>>,
    /// Server metadata
    pub start_time: Instant,
    pub port: u16,
    pub host: String,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("registry", &self.registry)
            .field("port", &self.port)
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(
        registry: Arc<TimerRegistry>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        port: u16,
        host: String,
    ) -> Self {
        Self {
            registry,
            clock,
            notifier,
            titles: RecipeTitles::new(),
            mounted: Mutex::new(HashMap::new()),
            start_time: Instant::now(),
            port,
            host,
        }
    }

    fn mounted(&self) -> MutexGuard<'_, HashMap<StepKey, MountedTimer>> {
        self.mounted.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mount a controller for `step`, or return the one already mounted.
    ///
    /// Must be called from within a tokio runtime: the controller's ticker is
    /// spawned here.
    pub fn mount(&self, step: StepInfo) -> Result<Arc<StepTimer>, TimerError> {
        let key = (step.recipe_id.clone(), step.step_id.clone());
        let mut mounted = self.mounted();
        if let Some(existing) = mounted.get(&key) {
            return Ok(Arc::clone(&existing.timer));
        }

        let timer = Arc::new(StepTimer::new(
            step,
            Arc::clone(&self.registry),
            Arc::clone(&self.clock),
            Arc::clone(&self.notifier),
        )?);
        let ticker = timer.spawn_ticker();
        debug!("Mounted timer for recipe {} step {}", key.0, key.1);
        mounted.insert(
            key,
            MountedTimer {
                timer: Arc::clone(&timer),
                _ticker: ticker,
            },
        );
        Ok(timer)
    }

    /// The mounted controller for a step, mounting one from its persisted
    /// record if there is a record but no controller yet
    pub fn timer_for(&self, recipe_id: &str, step_id: &str) -> Option<Arc<StepTimer>> {
        let key = (recipe_id.to_string(), step_id.to_string());
        if let Some(existing) = self.mounted().get(&key) {
            return Some(Arc::clone(&existing.timer));
        }

        let record = self.registry.get(recipe_id).remove(step_id)?;
        if record.stored_phase() != TimerPhase::Finished {
            self.notifier.request_permission();
        }
        match self.mount(StepInfo::from_record(&record)) {
            Ok(timer) => Some(timer),
            Err(e) => {
                warn!("Cannot mount persisted timer: {}", e);
                None
            }
        }
    }

    /// Stop the ticker of a step's controller; its record is left untouched.
    ///
    /// The aborted ticker releases its cell receiver asynchronously, so a cell
    /// emptied here is collected by a later prune.
    pub fn unmount(&self, recipe_id: &str, step_id: &str) {
        let key = (recipe_id.to_string(), step_id.to_string());
        if self.mounted().remove(&key).is_some() {
            debug!("Unmounted timer for recipe {} step {}", recipe_id, step_id);
        }
        self.registry.prune();
    }

    pub fn mounted_count(&self) -> usize {
        self.mounted().len()
    }

    /// Aggregated view of one recipe
    pub fn recipe_timers(&self, recipe_id: &str) -> RecipeTimers {
        RecipeTimers::new(recipe_id, Arc::clone(&self.registry), Arc::clone(&self.clock))
    }

    pub fn list_recipe_timers(&self, recipe_id: &str) -> Vec<TimerSummary> {
        self.recipe_timers(recipe_id).entries()
    }

    /// Clear every timer of a recipe and unmount its controllers
    pub fn stop_all(&self, recipe_id: &str) {
        self.recipe_timers(recipe_id).stop_all();
        self.mounted().retain(|(mounted_recipe, _), _| mounted_recipe != recipe_id);
        self.registry.prune();
    }

    pub fn active_recipes(&self) -> Vec<ActiveRecipe> {
        active_recipes(&self.registry, &self.titles, self.clock.now_ms())
    }

    /// Run the sweeper now, unmount controllers whose records it removed and
    /// collect the cells nobody watches anymore
    pub fn sweep_stale_timers(&self) -> usize {
        let removed = sweep_stale_timers(&self.registry, self.clock.now_ms());
        if removed > 0 {
            let registry = &self.registry;
            self.mounted().retain(|(recipe_id, step_id), _| {
                registry.get(recipe_id).contains_key(step_id)
            });
            info!("Sweep removed {} timers", removed);
        }
        self.registry.prune();
        removed
    }

    /// Calculate server uptime as a formatted string
    pub fn get_uptime(&self) -> String {
        let duration = self.start_time.elapsed();
        let hours = duration.as_secs() / 3600;
        let minutes = (duration.as_secs() % 3600) / 60;
        let seconds = duration.as_secs() % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        services::LogNotifier,
        storage::{MemoryStorage, TimerStore},
        utils::ManualClock,
    };

    fn state() -> (Arc<ManualClock>, AppState) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let registry = Arc::new(TimerRegistry::load(TimerStore::new(Arc::new(
            MemoryStorage::new(),
        ))));
        let state = AppState::new(
            registry,
            clock.clone(),
            Arc::new(LogNotifier),
            20554,
            "127.0.0.1".to_string(),
        );
        (clock, state)
    }

    fn step(recipe_id: &str, step_id: &str) -> StepInfo {
        StepInfo {
            recipe_id: recipe_id.to_string(),
            step_id: step_id.to_string(),
            step_number: 1,
            instruction: "Proof the dough".to_string(),
            duration_seconds: 900,
        }
    }

    #[tokio::test]
    async fn mounting_twice_returns_same_controller() {
        let (_, state) = state();
        let first = state.mount(step("bread", "proof")).unwrap();
        let second = state.mount(step("bread", "proof")).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(state.mounted_count(), 1);
    }

    #[tokio::test]
    async fn timer_for_remounts_from_persisted_record() {
        let (clock, state) = state();
        state.mount(step("bread", "proof")).unwrap().start();
        state.unmount("bread", "proof");
        assert_eq!(state.mounted_count(), 0);

        clock.advance_secs(100);
        let timer = state.timer_for("bread", "proof").unwrap();
        assert_eq!(timer.display().remaining_seconds, 800);
        assert!(state.timer_for("bread", "unknown").is_none());
    }

    #[tokio::test]
    async fn stop_all_unmounts_recipe_controllers() {
        let (_, state) = state();
        state.mount(step("bread", "proof")).unwrap().start();
        state.mount(step("bread", "bake")).unwrap().start();
        state.mount(step("soup", "simmer")).unwrap().start();

        state.stop_all("bread");

        assert!(state.list_recipe_timers("bread").is_empty());
        assert_eq!(state.mounted_count(), 1);
        assert_eq!(state.active_recipes().len(), 1);
    }

    #[tokio::test]
    async fn mount_reset_cycles_leave_no_cells_behind() {
        let (_, state) = state();
        for i in 0..1_000 {
            let recipe_id = format!("recipe-{}", i);
            let timer = state.mount(step(&recipe_id, "proof")).unwrap();
            timer.start();
            timer.reset();
            drop(timer);
            state.unmount(&recipe_id, "proof");
        }

        // Aborted tickers release their controllers once the runtime drops them.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        state.sweep_stale_timers();

        assert_eq!(state.registry.cell_count(), 0);
        assert_eq!(state.mounted_count(), 0);
    }

    #[tokio::test]
    async fn sweep_unmounts_removed_timers() {
        let (clock, state) = state();
        state.mount(step("bread", "proof")).unwrap().start();
        clock.advance_secs(24 * 60 * 60);

        assert_eq!(state.sweep_stale_timers(), 1);
        assert_eq!(state.mounted_count(), 0);
        assert!(state.registry.snapshot().is_empty());
    }
}
