//! Completion notifications
//!
//! Notification delivery is a side channel: a missing permission or a failed
//! delivery never affects the timer itself.

use std::sync::{
    atomic::{AtomicU8, Ordering},
    Arc,
};

use tokio::{process::Command, runtime::Handle};
use tracing::{debug, info, warn};

/// Delivers "step finished" notifications
pub trait Notifier: Send + Sync {
    /// Ask for permission to notify. Fire-and-forget; must not block.
    fn request_permission(&self);

    /// Announce that a step's countdown reached zero
    fn notify_finished(&self, step_number: u32, instruction: &str);
}

/// Notifier that only writes to the log
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn request_permission(&self) {}

    fn notify_finished(&self, step_number: u32, instruction: &str) {
        info!("Timer finished for step {}: {}", step_number, instruction);
    }
}

const PERMISSION_UNKNOWN: u8 = 0;
const PERMISSION_PENDING: u8 = 1;
const PERMISSION_GRANTED: u8 = 2;
const PERMISSION_DENIED: u8 = 3;

/// Desktop notifications through `notify-send`.
///
/// Permission is granted once `notify-send --version` has run successfully.
#[derive(Debug)]
pub struct DesktopNotifier {
    program: String,
    permission: Arc<AtomicU8>,
}

impl DesktopNotifier {
    pub fn new() -> Self {
        Self::with_program("notify-send")
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            permission: Arc::new(AtomicU8::new(PERMISSION_UNKNOWN)),
        }
    }

    pub fn is_permitted(&self) -> bool {
        self.permission.load(Ordering::SeqCst) == PERMISSION_GRANTED
    }
}

impl Default for DesktopNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for DesktopNotifier {
    fn request_permission(&self) {
        let claimed = self.permission.compare_exchange(
            PERMISSION_UNKNOWN,
            PERMISSION_PENDING,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        if claimed.is_err() {
            return;
        }

        let Ok(handle) = Handle::try_current() else {
            debug!("No runtime available to check {}", self.program);
            self.permission.store(PERMISSION_UNKNOWN, Ordering::SeqCst);
            return;
        };

        let program = self.program.clone();
        let permission = Arc::clone(&self.permission);
        handle.spawn(async move {
            let granted = check_notifier_available(&program).await;
            let state = match granted {
                Ok(()) => PERMISSION_GRANTED,
                Err(e) => {
                    warn!("Desktop notifications disabled: {}", e);
                    PERMISSION_DENIED
                }
            };
            permission.store(state, Ordering::SeqCst);
        });
    }

    fn notify_finished(&self, step_number: u32, instruction: &str) {
        info!("Timer finished for step {}: {}", step_number, instruction);

        if !self.is_permitted() {
            debug!("Skipping desktop notification, permission not granted");
            return;
        }
        let Ok(handle) = Handle::try_current() else {
            return;
        };

        let program = self.program.clone();
        let title = format!("Step {} is done", step_number);
        let body = instruction.to_string();
        handle.spawn(async move {
            if let Err(e) = send_desktop_notification(&program, &title, &body).await {
                warn!("Failed to deliver notification: {}", e);
            }
        });
    }
}

/// Check that the notification program can be executed
pub async fn check_notifier_available(program: &str) -> Result<(), String> {
    Command::new(program)
        .arg("--version")
        .output()
        .await
        .map_err(|_| format!("{} is not available", program))?;

    debug!("{} is available", program);
    Ok(())
}

async fn send_desktop_notification(program: &str, title: &str, body: &str) -> Result<(), String> {
    let output = Command::new(program)
        .args([title, body])
        .output()
        .await
        .map_err(|e| format!("Failed to execute {}: {}", program, e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("{} failed: {}", program, stderr));
    }
    Ok(())
}
