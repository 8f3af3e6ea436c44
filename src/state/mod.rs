//! State management module
//! 
//! Timer records, the recipe-scoped registry that owns them, and the
//! controllers and read models built on top of it.

pub mod active_recipes;
pub mod app_state;
pub mod recipe_timers;
pub mod step_timer;
pub mod timer_record;
pub mod timer_registry;

// Re-export main types
pub use active_recipes::{active_recipes, ActiveRecipe, RecipeDirectory, RecipeTitles};
pub use app_state::AppState;
pub use recipe_timers::{RecipeTimers, TimerSummary};
pub use step_timer::{StepTimer, TimerDisplay};
pub use timer_record::{StepInfo, StepTimers, TimerPhase, TimerRecord};
pub use timer_registry::{TimerMapUpdate, TimerRegistry};
