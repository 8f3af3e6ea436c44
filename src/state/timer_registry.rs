//! Recipe-scoped timer map
//!
//! One `watch` cell per recipe holds that recipe's step timers. Every write is
//! visible to subscribers of the same recipe immediately and is persisted
//! through the [`TimerStore`] before the call returns.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use tokio::sync::watch;
use tracing::{debug, warn};

use super::StepTimers;
use crate::storage::{TimerCollection, TimerStore};

/// Write applied to one recipe's map
#[derive(Debug, Clone, PartialEq)]
pub enum TimerMapUpdate {
    /// Replace the whole map; an empty map clears the recipe
    Replace(StepTimers),
    /// Delete the recipe's entry
    Clear,
}

/// Keyed registry of per-recipe timer cells backed by a persistent store
#[derive(Debug)]
pub struct TimerRegistry {
    cells: Mutex<HashMap<String, watch::Sender<StepTimers>>>,
    store: TimerStore,
}

impl TimerRegistry {
    /// Build the registry from whatever the store holds
    pub fn load(store: TimerStore) -> Self {
        let collection = store.load();
        let recovered: usize = collection.values().map(|timers| timers.len()).sum();
        if recovered > 0 {
            debug!(
                "Recovered {} timers across {} recipes",
                recovered,
                collection.len()
            );
        }

        let cells = collection
            .into_iter()
            .map(|(recipe_id, timers)| (recipe_id, watch::Sender::new(timers)))
            .collect();

        Self {
            cells: Mutex::new(cells),
            store,
        }
    }

    fn cells(&self) -> MutexGuard<'_, HashMap<String, watch::Sender<StepTimers>>> {
        // A panic while holding the lock cannot leave a half-applied write:
        // every write replaces a whole map.
        self.cells.lock().unwrap_or_else(|poisoned| {
            warn!("Timer registry lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Current timers of a recipe, empty if it has none
    pub fn get(&self, recipe_id: &str) -> StepTimers {
        self.cells()
            .get(recipe_id)
            .map(|cell| cell.borrow().clone())
            .unwrap_or_default()
    }

    /// Receiver that always sees the latest timers of a recipe
    pub fn subscribe(&self, recipe_id: &str) -> watch::Receiver<StepTimers> {
        self.cells()
            .entry(recipe_id.to_string())
            .or_insert_with(|| watch::Sender::new(StepTimers::new()))
            .subscribe()
    }

    /// Replace or clear a recipe's map
    pub fn set(&self, recipe_id: &str, update: TimerMapUpdate) {
        let timers = match update {
            TimerMapUpdate::Replace(timers) => timers,
            TimerMapUpdate::Clear => StepTimers::new(),
        };
        self.modify(recipe_id, |current| *current = timers);
    }

    /// Read-modify-write of one recipe's map under the registry lock.
    ///
    /// `f` always sees the latest map. Subscribers are notified and the
    /// collection is persisted only when the map actually changed.
    pub fn modify<R>(&self, recipe_id: &str, f: impl FnOnce(&mut StepTimers) -> R) -> R {
        let mut cells = self.cells();

        let mut timers = cells
            .get(recipe_id)
            .map(|cell| cell.borrow().clone())
            .unwrap_or_default();
        let before = timers.clone();
        let result = f(&mut timers);

        if timers == before {
            return result;
        }

        let cleared = timers.is_empty();
        match cells.get(recipe_id) {
            Some(cell) => {
                cell.send_replace(timers);
            }
            None => {
                cells.insert(recipe_id.to_string(), watch::Sender::new(timers));
            }
        }

        if cleared {
            debug!("Cleared timers for recipe {}", recipe_id);
        }
        prune_cells(&mut cells);

        self.store.save(&collect(&cells));
        result
    }

    /// Drop every cell that is empty and no longer observed.
    ///
    /// Emptied cells outlive their last write while a controller still holds a
    /// receiver; they are collected here once those receivers are gone.
    /// Returns how many cells were dropped.
    pub fn prune(&self) -> usize {
        let dropped = prune_cells(&mut self.cells());
        if dropped > 0 {
            debug!("Pruned {} idle timer cells", dropped);
        }
        dropped
    }

    /// Number of live cells, observed or not
    pub fn cell_count(&self) -> usize {
        self.cells().len()
    }

    /// Every recipe that currently has at least one timer
    pub fn snapshot(&self) -> TimerCollection {
        collect(&self.cells())
    }

    /// Ids of recipes that currently have at least one timer
    pub fn recipe_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.snapshot().into_keys().collect();
        ids.sort();
        ids
    }
}

fn prune_cells(cells: &mut HashMap<String, watch::Sender<StepTimers>>) -> usize {
    let before = cells.len();
    cells.retain(|_, cell| !cell.borrow().is_empty() || cell.receiver_count() > 0);
    before - cells.len()
}

fn collect(cells: &HashMap<String, watch::Sender<StepTimers>>) -> TimerCollection {
    cells
        .iter()
        .filter_map(|(recipe_id, cell)| {
            let timers = cell.borrow();
            (!timers.is_empty()).then(|| (recipe_id.clone(), timers.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        state::{StepInfo, TimerRecord},
        storage::{KeyValueStorage, MemoryStorage},
    };

    fn record(recipe_id: &str, step_id: &str) -> TimerRecord {
        TimerRecord::started(
            &StepInfo {
                recipe_id: recipe_id.to_string(),
                step_id: step_id.to_string(),
                step_number: 1,
                instruction: "Knead".to_string(),
                duration_seconds: 600,
            },
            0,
        )
    }

    fn timers(recipe_id: &str, step_ids: &[&str]) -> StepTimers {
        step_ids
            .iter()
            .map(|step_id| (step_id.to_string(), record(recipe_id, step_id)))
            .collect()
    }

    fn registry() -> (Arc<MemoryStorage>, TimerRegistry) {
        let storage = Arc::new(MemoryStorage::new());
        let registry = TimerRegistry::load(TimerStore::new(storage.clone()));
        (storage, registry)
    }

    #[test]
    fn unknown_recipe_reads_as_empty() {
        let (_, registry) = registry();
        assert!(registry.get("nothing").is_empty());
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn writes_are_persisted_immediately() {
        let (storage, registry) = registry();
        registry.set("bread", TimerMapUpdate::Replace(timers("bread", &["b1"])));

        assert_eq!(storage.keys().unwrap(), vec!["cooking-timers-bread"]);

        let reloaded = TimerRegistry::load(TimerStore::new(storage.clone()));
        assert_eq!(reloaded.get("bread"), timers("bread", &["b1"]));
    }

    #[test]
    fn clear_deletes_the_recipe_entry() {
        let (storage, registry) = registry();
        registry.set("bread", TimerMapUpdate::Replace(timers("bread", &["b1"])));
        registry.set("soup", TimerMapUpdate::Replace(timers("soup", &["s1"])));

        registry.set("bread", TimerMapUpdate::Clear);

        assert!(registry.get("bread").is_empty());
        assert_eq!(registry.recipe_ids(), vec!["soup"]);
        assert_eq!(storage.keys().unwrap(), vec!["cooking-timers-soup"]);
    }

    #[test]
    fn replacing_with_empty_map_acts_as_clear() {
        let (storage, registry) = registry();
        registry.set("bread", TimerMapUpdate::Replace(timers("bread", &["b1"])));
        registry.set("bread", TimerMapUpdate::Replace(StepTimers::new()));

        assert!(registry.snapshot().is_empty());
        assert!(storage.keys().unwrap().is_empty());
    }

    #[test]
    fn subscribers_see_writes_for_their_recipe() {
        let (_, registry) = registry();
        let mut bread = registry.subscribe("bread");
        let mut soup = registry.subscribe("soup");

        registry.set("bread", TimerMapUpdate::Replace(timers("bread", &["b1"])));

        assert!(bread.has_changed().unwrap());
        assert_eq!(bread.borrow_and_update().len(), 1);
        assert!(!soup.has_changed().unwrap());

        registry.set("bread", TimerMapUpdate::Clear);
        assert!(bread.has_changed().unwrap());
        assert!(bread.borrow_and_update().is_empty());
    }

    #[test]
    fn unchanged_writes_do_not_notify() {
        let (_, registry) = registry();
        registry.set("bread", TimerMapUpdate::Replace(timers("bread", &["b1"])));
        let mut rx = registry.subscribe("bread");

        registry.modify("bread", |_| ());
        registry.set("bread", TimerMapUpdate::Replace(timers("bread", &["b1"])));

        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn emptied_cell_is_pruned_once_unobserved() {
        let (_, registry) = registry();
        let rx = registry.subscribe("bread");
        registry.set("bread", TimerMapUpdate::Replace(timers("bread", &["b1"])));
        registry.set("bread", TimerMapUpdate::Clear);

        // Still observed: the subscriber must keep seeing writes.
        assert_eq!(registry.prune(), 0);
        assert_eq!(registry.cell_count(), 1);

        drop(rx);
        assert_eq!(registry.prune(), 1);
        assert_eq!(registry.cell_count(), 0);
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn writes_collect_idle_cells_of_other_recipes() {
        let (_, registry) = registry();
        for i in 0..50 {
            drop(registry.subscribe(&format!("recipe-{}", i)));
        }
        assert_eq!(registry.cell_count(), 50);

        registry.set("soup", TimerMapUpdate::Replace(timers("soup", &["s1"])));
        assert_eq!(registry.cell_count(), 1);
    }

    #[test]
    fn modify_returns_closure_result() {
        let (_, registry) = registry();
        let inserted = registry.modify("bread", |map| {
            map.insert("b1".to_string(), record("bread", "b1")).is_none()
        });
        assert!(inserted);
        assert_eq!(registry.get("bread").len(), 1);
    }
}
