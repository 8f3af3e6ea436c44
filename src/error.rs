//! Error types for the timer engine

use thiserror::Error;

/// Failures raised by a storage substrate.
///
/// These never reach UI code: the timer store logs them and degrades to
/// in-memory behaviour.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("json failure: {0}")]
    Json(#[from] serde_json::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Failures raised when binding a controller to a step.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimerError {
    #[error("step `{step_id}` of recipe `{recipe_id}` has a non-positive duration")]
    InvalidDuration { recipe_id: String, step_id: String },
}
