//! Per-recipe timer aggregator

use std::sync::Arc;

use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::{sync::watch, time::MissedTickBehavior};
use tracing::{debug, info};

use super::{TimerMapUpdate, TimerPhase, TimerRegistry};
use crate::{
    tasks::{watch_stream, TickerHandle, TICK_INTERVAL},
    utils::Clock,
};

/// One row of a recipe's timer list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSummary {
    pub step_id: String,
    pub step_number: u32,
    pub instruction: String,
    pub remaining_seconds: u64,
    pub total_seconds: u64,
    pub phase: TimerPhase,
}

/// All timers of one recipe, ordered by step number
pub struct RecipeTimers {
    recipe_id: String,
    registry: Arc<TimerRegistry>,
    clock: Arc<dyn Clock>,
    list_tx: watch::Sender<Vec<TimerSummary>>,
}

impl RecipeTimers {
    pub fn new(recipe_id: impl Into<String>, registry: Arc<TimerRegistry>, clock: Arc<dyn Clock>) -> Self {
        let (list_tx, _) = watch::channel(Vec::new());
        let aggregator = Self {
            recipe_id: recipe_id.into(),
            registry,
            clock,
            list_tx,
        };
        aggregator.refresh();
        aggregator
    }

    pub fn recipe_id(&self) -> &str {
        &self.recipe_id
    }

    /// Recompute every entry from the latest records
    pub fn entries(&self) -> Vec<TimerSummary> {
        let now = self.clock.now_ms();
        let mut entries: Vec<TimerSummary> = self
            .registry
            .get(&self.recipe_id)
            .into_values()
            .map(|record| TimerSummary {
                remaining_seconds: record.remaining_seconds(now),
                phase: record.phase_at(now),
                step_id: record.step_id,
                step_number: record.step_number,
                instruction: record.instruction,
                total_seconds: record.total_seconds,
            })
            .collect();
        entries.sort_by(|a, b| {
            a.step_number
                .cmp(&b.step_number)
                .then_with(|| a.step_id.cmp(&b.step_id))
        });
        entries
    }

    /// Receiver for the list published by the poller
    pub fn watch(&self) -> watch::Receiver<Vec<TimerSummary>> {
        self.list_tx.subscribe()
    }

    fn refresh(&self) -> Vec<TimerSummary> {
        let entries = self.entries();
        self.list_tx.send_replace(entries.clone());
        entries
    }

    /// Drop every timer of this recipe in a single write
    pub fn stop_all(&self) {
        let count = self.registry.get(&self.recipe_id).len();
        if count == 0 {
            debug!("No timers to stop for recipe {}", self.recipe_id);
            return;
        }

        self.registry.set(&self.recipe_id, TimerMapUpdate::Clear);
        info!("Stopped all {} timers for recipe {}", count, self.recipe_id);
        self.refresh();
    }

    /// Refresh once per second while the recipe has timers.
    ///
    /// With no timers the poller parks on the recipe's cell and wakes on the
    /// next write instead of ticking.
    pub fn spawn_poller(self: &Arc<Self>) -> TickerHandle {
        let aggregator = Arc::clone(self);
        let mut changes = self.registry.subscribe(&self.recipe_id);

        TickerHandle::new(tokio::spawn(async move {
            loop {
                aggregator.refresh();

                if changes.borrow_and_update().is_empty() {
                    debug!("Poller for recipe {} idle", aggregator.recipe_id);
                    if changes.changed().await.is_err() {
                        break;
                    }
                    continue;
                }

                let mut interval = tokio::time::interval(TICK_INTERVAL);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            aggregator.refresh();
                        }
                        changed = changes.changed() => {
                            if changed.is_err() {
                                return;
                            }
                            if changes.borrow().is_empty() {
                                break;
                            }
                            aggregator.refresh();
                        }
                    }
                }
            }
        }))
    }

    /// The current list followed by every refresh, for as long as the
    /// stream is held. The poller runs only while someone consumes it.
    pub fn updates(self: Arc<Self>) -> impl Stream<Item = Vec<TimerSummary>> + Send + 'static {
        let poller = self.spawn_poller();
        watch_stream(self.watch(), Some(poller))
    }
}
