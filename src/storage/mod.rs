//! Persistence module
//! 
//! Storage substrates and the adapter that maps timer state onto them.

pub mod key_value;
pub mod timer_store;

// Re-export main types
pub use key_value::{FileStorage, KeyValueStorage, MemoryStorage};
pub use timer_store::{TimerCollection, TimerStore, STORAGE_KEY_PREFIX};
