//! HTTP endpoint handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Json,
    },
};
use chrono::Utc;
use futures::{Stream, StreamExt};
use tracing::{debug, info, warn};

use super::responses::{
    ActiveRecipesResponse, HealthResponse, RecipeTimersResponse, StartTimerRequest,
    StepTimerResponse, SweepResponse,
};
use crate::{
    state::{AppState, StepInfo, StepTimer, TimerDisplay},
    tasks::watch_stream,
};

fn respond(recipe_id: String, step_id: String, display: TimerDisplay) -> Json<StepTimerResponse> {
    Json(StepTimerResponse::new(recipe_id, step_id, display))
}

fn find_timer(state: &AppState, recipe_id: &str, step_id: &str) -> Result<Arc<StepTimer>, StatusCode> {
    state.timer_for(recipe_id, step_id).ok_or_else(|| {
        warn!("No timer for recipe {} step {}", recipe_id, step_id);
        StatusCode::NOT_FOUND
    })
}

/// Handle POST /recipes/:recipe_id/steps/:step_id/start
pub async fn start_handler(
    State(state): State<Arc<AppState>>,
    Path((recipe_id, step_id)): Path<(String, String)>,
    Json(request): Json<StartTimerRequest>,
) -> Result<Json<StepTimerResponse>, StatusCode> {
    let step = StepInfo {
        recipe_id: recipe_id.clone(),
        step_id: step_id.clone(),
        step_number: request.step_number,
        instruction: request.instruction,
        duration_seconds: request.duration_seconds,
    };

    let timer = state.mount(step).map_err(|e| {
        warn!("Rejected start: {}", e);
        StatusCode::BAD_REQUEST
    })?;

    if let Some(title) = request.recipe_title.as_deref() {
        state.titles.remember(&recipe_id, title);
    }

    let display = timer.start();
    info!("Start endpoint called for recipe {} step {}", recipe_id, step_id);
    Ok(respond(recipe_id, step_id, display))
}

/// Handle POST /recipes/:recipe_id/steps/:step_id/pause
pub async fn pause_handler(
    State(state): State<Arc<AppState>>,
    Path((recipe_id, step_id)): Path<(String, String)>,
) -> Result<Json<StepTimerResponse>, StatusCode> {
    let display = find_timer(&state, &recipe_id, &step_id)?.pause();
    Ok(respond(recipe_id, step_id, display))
}

/// Handle POST /recipes/:recipe_id/steps/:step_id/resume
pub async fn resume_handler(
    State(state): State<Arc<AppState>>,
    Path((recipe_id, step_id)): Path<(String, String)>,
) -> Result<Json<StepTimerResponse>, StatusCode> {
    let display = find_timer(&state, &recipe_id, &step_id)?.resume();
    Ok(respond(recipe_id, step_id, display))
}

/// Handle POST /recipes/:recipe_id/steps/:step_id/reset
pub async fn reset_handler(
    State(state): State<Arc<AppState>>,
    Path((recipe_id, step_id)): Path<(String, String)>,
) -> Result<Json<StepTimerResponse>, StatusCode> {
    let display = find_timer(&state, &recipe_id, &step_id)?.reset();
    state.unmount(&recipe_id, &step_id);
    Ok(respond(recipe_id, step_id, display))
}

/// Handle GET /recipes/:recipe_id/steps/:step_id
pub async fn step_status_handler(
    State(state): State<Arc<AppState>>,
    Path((recipe_id, step_id)): Path<(String, String)>,
) -> Result<Json<StepTimerResponse>, StatusCode> {
    let display = find_timer(&state, &recipe_id, &step_id)?.tick();
    Ok(respond(recipe_id, step_id, display))
}

/// Handle GET /recipes/:recipe_id/timers
pub async fn recipe_timers_handler(
    State(state): State<Arc<AppState>>,
    Path(recipe_id): Path<String>,
) -> Json<RecipeTimersResponse> {
    let timers = state.list_recipe_timers(&recipe_id);
    Json(RecipeTimersResponse {
        recipe_id,
        timers,
        timestamp: Utc::now(),
    })
}

/// Handle GET /recipes/:recipe_id/steps/:step_id/stream
///
/// Server-sent events carrying the step's display, once now and again on
/// every tick. The stream ends when the step is reset.
pub async fn step_stream_handler(
    State(state): State<Arc<AppState>>,
    Path((recipe_id, step_id)): Path<(String, String)>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, StatusCode> {
    let timer = find_timer(&state, &recipe_id, &step_id)?;
    debug!("Streaming timer for recipe {} step {}", recipe_id, step_id);

    let events = watch_stream(timer.watch(), None).map(move |display| {
        Event::default()
            .event("timer")
            .json_data(StepTimerResponse::new(recipe_id.clone(), step_id.clone(), display))
    });
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// Handle GET /recipes/:recipe_id/timers/stream
pub async fn recipe_timers_stream_handler(
    State(state): State<Arc<AppState>>,
    Path(recipe_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    debug!("Streaming timers for recipe {}", recipe_id);
    let updates = Arc::new(state.recipe_timers(&recipe_id)).updates();

    let events = updates.map(move |timers| {
        Event::default().event("timers").json_data(RecipeTimersResponse {
            recipe_id: recipe_id.clone(),
            timers,
            timestamp: Utc::now(),
        })
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}

/// Handle POST /recipes/:recipe_id/stop-all
pub async fn stop_all_handler(
    State(state): State<Arc<AppState>>,
    Path(recipe_id): Path<String>,
) -> Json<RecipeTimersResponse> {
    state.stop_all(&recipe_id);
    info!("Stop-all endpoint called for recipe {}", recipe_id);
    Json(RecipeTimersResponse {
        recipe_id,
        timers: Vec::new(),
        timestamp: Utc::now(),
    })
}

/// Handle GET /active
pub async fn active_handler(State(state): State<Arc<AppState>>) -> Json<ActiveRecipesResponse> {
    Json(ActiveRecipesResponse {
        recipes: state.active_recipes(),
        timestamp: Utc::now(),
    })
}

/// Handle POST /sweep
pub async fn sweep_handler(State(state): State<Arc<AppState>>) -> Json<SweepResponse> {
    Json(SweepResponse {
        removed: state.sweep_stale_timers(),
        timestamp: Utc::now(),
    })
}

/// Handle GET /health - Health check endpoint
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse::ok(state.get_uptime()))
}
