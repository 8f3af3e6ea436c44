//! API request and response structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::{ActiveRecipe, TimerDisplay, TimerPhase, TimerSummary};

/// Body of a start request: the step identity the UI mounts a timer with
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTimerRequest {
    pub step_number: u32,
    pub instruction: String,
    pub duration_seconds: u64,
    #[serde(default)]
    pub recipe_title: Option<String>,
}

/// State of one step's timer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepTimerResponse {
    pub recipe_id: String,
    pub step_id: String,
    pub phase: TimerPhase,
    #[serde(flatten)]
    pub display: TimerDisplay,
    pub timestamp: DateTime<Utc>,
}

impl StepTimerResponse {
    pub fn new(recipe_id: String, step_id: String, display: TimerDisplay) -> Self {
        Self {
            recipe_id,
            step_id,
            phase: display.phase(),
            display,
            timestamp: Utc::now(),
        }
    }
}

/// Every timer of one recipe
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeTimersResponse {
    pub recipe_id: String,
    pub timers: Vec<TimerSummary>,
    pub timestamp: DateTime<Utc>,
}

/// Recipes that have timers running or paused
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveRecipesResponse {
    pub recipes: Vec<ActiveRecipe>,
    pub timestamp: DateTime<Utc>,
}

/// Result of a manual sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepResponse {
    pub removed: usize,
    pub timestamp: DateTime<Utc>,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub uptime: String,
}

impl HealthResponse {
    pub fn ok(uptime: String) -> Self {
        Self {
            status: "ok".to_string(),
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime,
        }
    }
}
