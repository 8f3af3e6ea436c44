//! Background tasks module
//! 
//! This module contains background tasks that run alongside the HTTP server.

pub mod stale_sweeper;
pub mod ticker;
pub mod timer_recovery;

// Re-export main items
pub use stale_sweeper::{stale_sweeper_task, sweep_stale_timers, RETENTION};
pub use ticker::{watch_stream, TickerHandle, TICK_INTERVAL};
pub use timer_recovery::{phase_counts, recover_timers};
