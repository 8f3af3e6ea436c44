//! External service module
//! 
//! Side channels the timer engine talks to, currently desktop notifications.

pub mod notifications;

// Re-export main types
pub use notifications::{DesktopNotifier, LogNotifier, Notifier};
