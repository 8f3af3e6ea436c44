//! Cooking Timers - a local timer engine for recipe steps
//! 
//! This is the main entry point for the cooking-timers application.

use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

use cooking_timers::{
    api::create_router,
    config::Config,
    services::{DesktopNotifier, LogNotifier, Notifier},
    state::{AppState, TimerRegistry},
    storage::{FileStorage, TimerStore},
    tasks::{phase_counts, recover_timers, stale_sweeper_task},
    utils::{shutdown_signal, SystemClock},
};

fn open_store(config: &Config) -> TimerStore {
    if config.memory_only {
        info!("Running with in-memory timers only");
        return TimerStore::detached();
    }

    match FileStorage::open(&config.data_dir) {
        Ok(storage) => {
            info!("Persisting timers in {}", storage.dir().display());
            TimerStore::new(Arc::new(storage))
        }
        Err(e) => {
            warn!(
                "Cannot open {}, timers will not survive a restart: {}",
                config.data_dir.display(),
                e
            );
            TimerStore::detached()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing with appropriate log level
    tracing_subscriber::fmt()
        .with_env_filter(format!("cooking_timers={},tower_http=info", config.log_level()))
        .init();

    info!("Starting cooking-timers v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration: host={}, port={}, sweep every {}min",
          config.host, config.port, config.sweep_interval);

    let notifier: Arc<dyn Notifier> = if config.desktop_notifications {
        Arc::new(DesktopNotifier::new())
    } else {
        Arc::new(LogNotifier)
    };

    // Create application state from whatever survived the last run
    let registry = Arc::new(TimerRegistry::load(open_store(&config)));
    let state = Arc::new(AppState::new(
        registry,
        Arc::new(SystemClock),
        notifier,
        config.port,
        config.host.clone(),
    ));

    state.sweep_stale_timers();
    for (phase, count) in phase_counts(&state) {
        info!("Persisted {:?} timers: {}", phase, count);
    }
    recover_timers(&state);

    // Start the stale timer sweeper background task
    let sweeper_state = Arc::clone(&state);
    let sweep_every = config.sweep_every();
    tokio::spawn(async move {
        stale_sweeper_task(sweeper_state, sweep_every).await;
    });

    // Create HTTP router with all endpoints
    let app = create_router(state);

    // Bind to the specified address
    let addr = config.address();
    let listener = TcpListener::bind(&addr).await?;

    info!("Server running on http://{}", addr);
    info!("Endpoints:");
    info!("  POST /recipes/:recipe/steps/:step/start   - Start a step timer");
    info!("  POST /recipes/:recipe/steps/:step/pause   - Pause a step timer");
    info!("  POST /recipes/:recipe/steps/:step/resume  - Resume a step timer");
    info!("  POST /recipes/:recipe/steps/:step/reset   - Reset a step timer");
    info!("  GET  /recipes/:recipe/steps/:step         - Step timer state");
    info!("  GET  /recipes/:recipe/steps/:step/stream  - Step timer events");
    info!("  GET  /recipes/:recipe/timers              - All timers of a recipe");
    info!("  GET  /recipes/:recipe/timers/stream       - Recipe timer events");
    info!("  POST /recipes/:recipe/stop-all            - Stop every timer of a recipe");
    info!("  GET  /active                              - Recipes with active timers");
    info!("  POST /sweep                               - Remove stale timers now");
    info!("  GET  /health                              - Health check");

    // Setup graceful shutdown
    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!("Server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}
