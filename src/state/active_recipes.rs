//! Cross-recipe active-timer indicator

use std::{collections::HashMap, sync::RwLock};

use serde::{Deserialize, Serialize};

use super::{TimerPhase, TimerRegistry};

/// Source of recipe titles, owned by the recipe store
pub trait RecipeDirectory: Send + Sync {
    fn title(&self, recipe_id: &str) -> Option<String>;
}

/// Titles remembered from the requests that started timers
#[derive(Debug, Default)]
pub struct RecipeTitles {
    titles: RwLock<HashMap<String, String>>,
}

impl RecipeTitles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remember(&self, recipe_id: &str, title: &str) {
        if let Ok(mut titles) = self.titles.write() {
            titles.insert(recipe_id.to_string(), title.to_string());
        }
    }
}

impl RecipeDirectory for RecipeTitles {
    fn title(&self, recipe_id: &str) -> Option<String> {
        self.titles.read().ok()?.get(recipe_id).cloned()
    }
}

/// One line of the global "timers running" banner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveRecipe {
    pub recipe_id: String,
    pub recipe_title: String,
    pub timer_count: usize,
}

/// Recipes with at least one running or paused timer, ordered by recipe id.
///
/// Finished timers do not count. Unknown titles fall back to the recipe id.
pub fn active_recipes(
    registry: &TimerRegistry,
    directory: &dyn RecipeDirectory,
    now_ms: i64,
) -> Vec<ActiveRecipe> {
    let mut active: Vec<ActiveRecipe> = registry
        .snapshot()
        .into_iter()
        .filter_map(|(recipe_id, timers)| {
            let timer_count = timers
                .values()
                .filter(|record| {
                    matches!(
                        record.phase_at(now_ms),
                        TimerPhase::Running | TimerPhase::Paused
                    )
                })
                .count();
            if timer_count == 0 {
                return None;
            }
            let recipe_title = directory
                .title(&recipe_id)
                .unwrap_or_else(|| recipe_id.clone());
            Some(ActiveRecipe {
                recipe_id,
                recipe_title,
                timer_count,
            })
        })
        .collect();
    active.sort_by(|a, b| a.recipe_id.cmp(&b.recipe_id));
    active
}
