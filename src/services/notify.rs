//! Delayed desktop notifications

use std::{collections::HashMap, sync::Mutex, time::Duration};
use tokio::{process::Command, task::JoinHandle, time::sleep};
use tracing::{debug, info, warn};

/// Identifier of the primary "workout complete" notification
pub const TERMINAL_NOTIFICATION_ID: &str = "workout-complete";
/// Identifier of the optional follow-up notification
pub const BACKUP_NOTIFICATION_ID: &str = "workout-complete-backup";

/// Delivers notifications after a delay. Delivery guarantees belong to the implementation.
pub trait NotificationGateway: Send + Sync {
    fn schedule_at(&self, id: &str, delay: Duration, title: &str, body: &str) -> Result<(), String>;
    fn cancel(&self, id: &str);
    fn cancel_all(&self);
}

/// Gateway that runs `notify-send` (or a compatible command) once the delay elapses
#[derive(Debug)]
pub struct DesktopNotifier {
    command: String,
    pending: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl DesktopNotifier {
    pub fn new(command: String) -> Self {
        Self {
            command,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Number of notifications still waiting for their delay
    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .map(|pending| pending.values().filter(|handle| !handle.is_finished()).count())
            .unwrap_or(0)
    }
}

/// Run the notification command once
pub async fn send_notification(command: &str, title: &str, body: &str) -> Result<(), String> {
    let output = Command::new(command)
        .args([title, body])
        .output()
        .await
        .map_err(|e| format!("Failed to execute {}: {}", command, e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("{} failed: {}", command, stderr));
    }

    Ok(())
}

impl NotificationGateway for DesktopNotifier {
    fn schedule_at(&self, id: &str, delay: Duration, title: &str, body: &str) -> Result<(), String> {
        let mut pending = self
            .pending
            .lock()
            .map_err(|e| format!("Failed to lock pending notifications: {}", e))?;

        if let Some(previous) = pending.remove(id) {
            debug!("Replacing pending notification {}", id);
            previous.abort();
        }

        let command = self.command.clone();
        let (notification_id, title, body) = (id.to_string(), title.to_string(), body.to_string());
        let handle = tokio::spawn(async move {
            sleep(delay).await;
            match send_notification(&command, &title, &body).await {
                Ok(()) => info!("Notification {} delivered", notification_id),
                Err(e) => warn!("Notification {} failed: {}", notification_id, e),
            }
        });
        pending.insert(id.to_string(), handle);

        info!("Notification {} scheduled in {}s", id, delay.as_secs());
        Ok(())
    }

    fn cancel(&self, id: &str) {
        if let Ok(mut pending) = self.pending.lock() {
            if let Some(handle) = pending.remove(id) {
                handle.abort();
                debug!("Cancelled notification {}", id);
            }
        }
    }

    fn cancel_all(&self) {
        if let Ok(mut pending) = self.pending.lock() {
            for (id, handle) in pending.drain() {
                handle.abort();
                debug!("Cancelled notification {}", id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn cancelled_notification_never_runs() {
        let notifier = DesktopNotifier::new("/nonexistent/notify".to_string());
        notifier
            .schedule_at(TERMINAL_NOTIFICATION_ID, Duration::from_secs(30), "Done", "Workout complete")
            .unwrap();
        notifier
            .schedule_at(BACKUP_NOTIFICATION_ID, Duration::from_secs(45), "Done", "Still done")
            .unwrap();
        assert_eq!(notifier.pending_count(), 2);

        notifier.cancel(TERMINAL_NOTIFICATION_ID);
        assert_eq!(notifier.pending_count(), 1);
        notifier.cancel_all();
        assert_eq!(notifier.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_replaces_previous() {
        let notifier = DesktopNotifier::new("/nonexistent/notify".to_string());
        for delay in [10, 20] {
            notifier
                .schedule_at(TERMINAL_NOTIFICATION_ID, Duration::from_secs(delay), "Done", "")
                .unwrap();
        }
        assert_eq!(notifier.pending_count(), 1);
    }

    #[tokio::test]
    async fn missing_command_is_an_error() {
        assert!(send_notification("/nonexistent/notify", "t", "b").await.is_err());
    }
}
