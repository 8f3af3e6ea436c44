//! Persistent store adapter for the cross-recipe timer collection
//!
//! On-disk layout, kept for compatibility with earlier sessions: one key per
//! recipe, `"<prefix>-<recipeId>"`, whose value is a JSON array of
//! `[stepId, TimerRecord]` pairs. A recipe without a key has no timers.
//!
//! Nothing here ever fails outward. If the substrate refuses a sentinel write the
//! store behaves as if it were empty, and write failures are logged and dropped.

use std::{collections::HashMap, sync::Arc};

use tracing::{debug, warn};

use super::KeyValueStorage;
use crate::{
    error::StorageError,
    state::{StepTimers, TimerRecord},
};

/// Recipe id → that recipe's timers
pub type TimerCollection = HashMap<String, StepTimers>;

/// Key prefix shared by every per-recipe entry
pub const STORAGE_KEY_PREFIX: &str = "cooking-timers";

const SENTINEL_KEY: &str = "__cooking_timers_sentinel__";

/// Full-collection load/save over a [`KeyValueStorage`]
#[derive(Clone)]
pub struct TimerStore {
    storage: Option<Arc<dyn KeyValueStorage>>,
    prefix: String,
}

impl std::fmt::Debug for TimerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerStore")
            .field("prefix", &self.prefix)
            .field("has_storage", &self.storage.is_some())
            .finish()
    }
}

impl TimerStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self {
            storage: Some(storage),
            prefix: STORAGE_KEY_PREFIX.to_string(),
        }
    }

    /// A store with no substrate at all; every operation is a no-op
    pub fn detached() -> Self {
        Self {
            storage: None,
            prefix: STORAGE_KEY_PREFIX.to_string(),
        }
    }

    pub fn storage_key(&self, recipe_id: &str) -> String {
        format!("{}-{}", self.prefix, recipe_id)
    }

    fn recipe_id_from_key<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(self.prefix.as_str())?.strip_prefix('-')
    }

    /// The substrate, if it currently accepts a write-then-delete of a sentinel key
    fn available(&self) -> Option<&dyn KeyValueStorage> {
        let storage = self.storage.as_deref()?;
        let writable = storage
            .set(SENTINEL_KEY, SENTINEL_KEY)
            .and_then(|()| storage.remove(SENTINEL_KEY));
        match writable {
            Ok(()) => Some(storage),
            Err(e) => {
                warn!("Timer storage unavailable, running in memory only: {}", e);
                None
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.available().is_some()
    }

    /// Read every recipe's timers. Corrupt keys are deleted and skipped.
    pub fn load(&self) -> TimerCollection {
        let Some(storage) = self.available() else {
            return TimerCollection::new();
        };

        let keys = match storage.keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Failed to list timer storage keys: {}", e);
                return TimerCollection::new();
            }
        };

        let mut collection = TimerCollection::new();
        for key in keys {
            let Some(recipe_id) = self.recipe_id_from_key(&key) else {
                continue;
            };

            match self.load_recipe(storage, &key) {
                Ok(timers) if !timers.is_empty() => {
                    debug!("Loaded {} timers for recipe {}", timers.len(), recipe_id);
                    collection.insert(recipe_id.to_string(), timers);
                }
                Ok(_) => {
                    debug!("Removing empty timer key {}", key);
                    remove_quietly(storage, &key);
                }
                Err(e) => {
                    warn!("Dropping corrupt timer key {}: {}", key, e);
                    remove_quietly(storage, &key);
                }
            }
        }
        collection
    }

    fn load_recipe(
        &self,
        storage: &dyn KeyValueStorage,
        key: &str,
    ) -> Result<StepTimers, StorageError> {
        let Some(raw) = storage.get(key)? else {
            return Ok(StepTimers::new());
        };

        let pairs: Vec<(String, TimerRecord)> = serde_json::from_str(&raw)?;
        let mut timers = StepTimers::new();
        for (step_id, record) in pairs {
            if record.total_seconds == 0 {
                warn!("Skipping timer {} in {} with zero duration", step_id, key);
                continue;
            }
            timers.insert(step_id, record);
        }
        Ok(timers)
    }

    /// Replace on-disk state with `collection`.
    ///
    /// Every prefixed key is deleted first, then one key is written per recipe
    /// that still has timers, so emptied recipes leave nothing behind.
    pub fn save(&self, collection: &TimerCollection) {
        let Some(storage) = self.available() else {
            return;
        };

        if let Err(e) = self.rewrite(storage, collection) {
            warn!("Failed to persist timers: {}", e);
        }
    }

    fn rewrite(
        &self,
        storage: &dyn KeyValueStorage,
        collection: &TimerCollection,
    ) -> Result<(), StorageError> {
        self.remove_all(storage)?;

        for (recipe_id, timers) in collection {
            if timers.is_empty() {
                continue;
            }
            let pairs: Vec<(&String, &TimerRecord)> = timers.iter().collect();
            let value = serde_json::to_string(&pairs)?;
            storage.set(&self.storage_key(recipe_id), &value)?;
        }
        Ok(())
    }

    /// Remove every prefixed key
    pub fn clear(&self) {
        let Some(storage) = self.available() else {
            return;
        };

        if let Err(e) = self.remove_all(storage) {
            warn!("Failed to clear timer storage: {}", e);
        }
    }

    fn remove_all(&self, storage: &dyn KeyValueStorage) -> Result<(), StorageError> {
        for key in storage.keys()? {
            if self.recipe_id_from_key(&key).is_some() {
                storage.remove(&key)?;
            }
        }
        Ok(())
    }
}

fn remove_quietly(storage: &dyn KeyValueStorage, key: &str) {
    if let Err(e) = storage.remove(key) {
        warn!("Failed to remove timer key {}: {}", key, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{state::StepInfo, storage::MemoryStorage};

    /// Storage that refuses every call, like a browser in private mode
    struct DeniedStorage;

    impl KeyValueStorage for DeniedStorage {
        fn keys(&self) -> Result<Vec<String>, StorageError> {
            Err(StorageError::Unavailable("denied".into()))
        }
        fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Unavailable("denied".into()))
        }
        fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("quota exceeded".into()))
        }
        fn remove(&self, _key: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("denied".into()))
        }
    }

    fn record(recipe_id: &str, step_id: &str, now_ms: i64) -> TimerRecord {
        TimerRecord::started(
            &StepInfo {
                recipe_id: recipe_id.to_string(),
                step_id: step_id.to_string(),
                step_number: 1,
                instruction: "Simmer".to_string(),
                duration_seconds: 120,
            },
            now_ms,
        )
    }

    fn collection_with(entries: &[(&str, &str)]) -> TimerCollection {
        let mut collection = TimerCollection::new();
        for (recipe_id, step_id) in entries {
            collection
                .entry(recipe_id.to_string())
                .or_default()
                .insert(step_id.to_string(), record(recipe_id, step_id, 1_000));
        }
        collection
    }

    #[test]
    fn save_then_load_restores_collection() {
        let storage = Arc::new(MemoryStorage::new());
        let store = TimerStore::new(storage.clone());
        let collection = collection_with(&[("soup", "s1"), ("soup", "s2"), ("bread", "b1")]);

        store.save(&collection);

        assert_eq!(
            storage.keys().unwrap(),
            vec!["cooking-timers-bread", "cooking-timers-soup"]
        );
        assert_eq!(store.load(), collection);
    }

    #[test]
    fn persisted_value_is_array_of_pairs() {
        let storage = Arc::new(MemoryStorage::new());
        let store = TimerStore::new(storage.clone());
        store.save(&collection_with(&[("soup", "s1")]));

        let raw = storage.get("cooking-timers-soup").unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value[0][0], "s1");
        assert_eq!(value[0][1]["stepId"], "s1");
        assert_eq!(value[0][1]["runningSinceSeconds"], 1_000);
    }

    #[test]
    fn save_removes_keys_of_emptied_recipes() {
        let storage = Arc::new(MemoryStorage::new());
        let store = TimerStore::new(storage.clone());
        store.save(&collection_with(&[("soup", "s1"), ("bread", "b1")]));

        let mut collection = collection_with(&[("soup", "s1")]);
        collection.insert("bread".to_string(), StepTimers::new());
        store.save(&collection);

        assert_eq!(storage.keys().unwrap(), vec!["cooking-timers-soup"]);
    }

    #[test]
    fn corrupt_key_is_dropped_and_others_survive() {
        let storage = Arc::new(MemoryStorage::new());
        let store = TimerStore::new(storage.clone());
        store.save(&collection_with(&[("soup", "s1")]));
        storage.set("cooking-timers-broken", "{not json").unwrap();
        storage.set("unrelated", "{not json either").unwrap();

        let loaded = store.load();

        assert_eq!(loaded.len(), 1);
        assert!(loaded.contains_key("soup"));
        assert_eq!(storage.get("cooking-timers-broken").unwrap(), None);
        assert!(storage.get("unrelated").unwrap().is_some());
    }

    #[test]
    fn zero_duration_records_and_empty_keys_are_skipped() {
        let storage = Arc::new(MemoryStorage::new());
        let store = TimerStore::new(storage.clone());
        let mut bad = record("soup", "s1", 0);
        bad.total_seconds = 0;
        let value = serde_json::to_string(&vec![("s1", bad)]).unwrap();
        storage.set("cooking-timers-soup", &value).unwrap();
        storage.set("cooking-timers-empty", "[]").unwrap();

        assert!(store.load().is_empty());
        assert_eq!(storage.get("cooking-timers-empty").unwrap(), None);
    }

    #[test]
    fn clear_removes_only_prefixed_keys() {
        let storage = Arc::new(MemoryStorage::new());
        let store = TimerStore::new(storage.clone());
        store.save(&collection_with(&[("soup", "s1"), ("bread", "b1")]));
        storage.set("theme", "dark").unwrap();

        store.clear();

        assert_eq!(storage.keys().unwrap(), vec!["theme"]);
    }

    #[test]
    fn unavailable_storage_degrades_to_no_ops() {
        let store = TimerStore::new(Arc::new(DeniedStorage));
        assert!(!store.is_available());

        store.save(&collection_with(&[("soup", "s1")]));
        store.clear();
        assert!(store.load().is_empty());
    }

    #[test]
    fn detached_store_is_empty() {
        let store = TimerStore::detached();
        store.save(&collection_with(&[("soup", "s1")]));
        assert!(store.load().is_empty());
    }

    #[test]
    fn sentinel_key_is_not_left_behind() {
        let storage = Arc::new(MemoryStorage::new());
        let store = TimerStore::new(storage.clone());
        assert!(store.is_available());
        assert!(storage.keys().unwrap().is_empty());
    }
}
