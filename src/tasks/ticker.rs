//! Cancellable display-refresh tasks

use std::time::Duration;

use futures::{stream, Stream};
use tokio::{sync::watch, task::JoinHandle};

/// Cadence of every display refresh
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Owns a spawned polling task and aborts it when dropped.
///
/// Dropping the handle only stops the polling. Persisted timer state is left
/// untouched, so a timer keeps counting while nothing displays it.
#[derive(Debug)]
pub struct TickerHandle {
    task: JoinHandle<()>,
}

impl TickerHandle {
    pub fn new(task: JoinHandle<()>) -> Self {
        Self { task }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for TickerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Every value published on `rx`, starting with the current one.
///
/// The stream ends when the sender goes away. `guard` lives as long as the
/// stream, so a ticker feeding the channel stops with its last consumer.
pub fn watch_stream<T>(
    rx: watch::Receiver<T>,
    guard: Option<TickerHandle>,
) -> impl Stream<Item = T> + Send + 'static
where
    T: Clone + Send + Sync + 'static,
{
    stream::unfold((rx, guard, true), |(mut rx, guard, first)| async move {
        if !first && rx.changed().await.is_err() {
            return None;
        }
        let value = rx.borrow_and_update().clone();
        Some((value, (rx, guard, false)))
    })
}
