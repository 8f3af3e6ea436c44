//! Cooking Timers - a local timer engine for recipe steps
//! 
//! Timers are scoped to recipe → step, persisted on every change, and always
//! derive remaining time from wall-clock fields, so they survive reloads,
//! restarts and suspended processes without losing elapsed time.

pub mod config;
pub mod error;
pub mod state;
pub mod storage;
pub mod api;
pub mod services;
pub mod tasks;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use error::{StorageError, TimerError};
pub use state::{AppState, StepInfo, StepTimer, TimerRecord, TimerRegistry};
pub use storage::TimerStore;
pub use api::create_router;
pub use utils::signals::shutdown_signal;
