//! In-memory collaborators for tests

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Mutex,
    },
    time::Duration,
};
use tokio::sync::oneshot;

use super::{AudioCueEngine, NotificationGateway};

/// Audio engine that records what it was asked to play
#[derive(Debug, Default)]
pub struct RecordingAudio {
    busy: AtomicBool,
    failures_left: AtomicU32,
    tones: AtomicU32,
    spoken: Mutex<Vec<String>>,
}

impl RecordingAudio {
    pub fn set_busy(&self, busy: bool) {
        self.busy.store(busy, Ordering::SeqCst);
    }

    /// Make the next `count` playback requests fail
    pub fn fail_next(&self, count: u32) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    pub fn tones(&self) -> u32 {
        self.tones.load(Ordering::SeqCst)
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }

    fn should_fail(&self) -> bool {
        self.failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

impl AudioCueEngine for RecordingAudio {
    fn play_tone(&self) -> bool {
        if self.should_fail() {
            return false;
        }
        self.tones.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn speak(&self, text: &str) -> (bool, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(());
        if self.should_fail() {
            return (false, rx);
        }
        self.spoken.lock().unwrap().push(text.to_string());
        (true, rx)
    }

    fn stop(&self) {
        self.set_busy(false);
    }

    fn is_playing(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    fn is_speaking(&self) -> bool {
        false
    }

    fn tone_duration(&self) -> Duration {
        Duration::from_millis(1_500)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledNotification {
    pub id: String,
    pub delay: Duration,
    pub title: String,
    pub body: String,
}

/// Gateway that keeps scheduled notifications in memory
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    scheduled: Mutex<Vec<ScheduledNotification>>,
    cancelled_all: AtomicU32,
}

impl RecordingNotifier {
    pub fn scheduled(&self) -> Vec<ScheduledNotification> {
        self.scheduled.lock().unwrap().clone()
    }

    pub fn cancel_all_calls(&self) -> u32 {
        self.cancelled_all.load(Ordering::SeqCst)
    }
}

impl NotificationGateway for RecordingNotifier {
    fn schedule_at(&self, id: &str, delay: Duration, title: &str, body: &str) -> Result<(), String> {
        let mut scheduled = self.scheduled.lock().unwrap();
        scheduled.retain(|n| n.id != id);
        scheduled.push(ScheduledNotification {
            id: id.to_string(),
            delay,
            title: title.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }

    fn cancel(&self, id: &str) {
        self.scheduled.lock().unwrap().retain(|n| n.id != id);
    }

    fn cancel_all(&self) {
        self.cancelled_all.fetch_add(1, Ordering::SeqCst);
        self.scheduled.lock().unwrap().clear();
    }
}
