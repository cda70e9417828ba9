//! Audio cue playback through external tone and speech commands

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio::{process::Command, sync::oneshot};
use tracing::{debug, warn};

/// Plays the tone and spoken cues.
///
/// The engine only relies on the busy flags to avoid overlapping playback and
/// on the completion signal returned by [`AudioCueEngine::speak`].
pub trait AudioCueEngine: Send + Sync {
    fn play_tone(&self) -> bool;
    fn speak(&self, text: &str) -> (bool, oneshot::Receiver<()>);
    fn stop(&self);
    fn is_playing(&self) -> bool;
    fn is_speaking(&self) -> bool;
    /// Length of the phase-transition tone
    fn tone_duration(&self) -> Duration;

    fn is_busy(&self) -> bool {
        self.is_playing() || self.is_speaking()
    }
}

/// One child process at a time, killable, with a completion signal
#[derive(Debug, Default)]
struct PlaybackSlot {
    active: Arc<AtomicBool>,
    cancel: Mutex<Option<oneshot::Sender<()>>>,
}

impl PlaybackSlot {
    fn launch(&self, mut command: Command) -> Result<oneshot::Receiver<()>, String> {
        let mut child = command
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("Failed to spawn cue player: {}", e))?;

        let (cancel_tx, mut cancel_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();
        if let Ok(mut cancel) = self.cancel.lock() {
            *cancel = Some(cancel_tx);
        }

        let active = Arc::clone(&self.active);
        active.store(true, Ordering::SeqCst);
        tokio::spawn(async move {
            let cancelled = tokio::select! {
                status = child.wait() => {
                    match status {
                        Ok(status) if !status.success() => warn!("Cue player exited with {}", status),
                        Err(e) => warn!("Failed to wait for cue player: {}", e),
                        _ => {}
                    }
                    false
                }
                _ = &mut cancel_rx => true,
            };
            if cancelled {
                if let Err(e) = child.kill().await {
                    warn!("Failed to stop cue player: {}", e);
                }
            }
            active.store(false, Ordering::SeqCst);
            let _ = done_tx.send(());
        });

        Ok(done_rx)
    }

    fn stop(&self) {
        if let Ok(mut cancel) = self.cancel.lock() {
            if let Some(tx) = cancel.take() {
                let _ = tx.send(());
            }
        }
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// Audio engine backed by command-line players (`paplay`, `espeak`, ...)
#[derive(Debug)]
pub struct CommandAudioEngine {
    tone_command: String,
    tone_file: Option<String>,
    tone_duration: Duration,
    speech_command: String,
    tone: PlaybackSlot,
    speech: PlaybackSlot,
}

impl CommandAudioEngine {
    pub fn new(
        tone_command: String,
        tone_file: Option<String>,
        tone_duration: Duration,
        speech_command: String,
    ) -> Self {
        Self {
            tone_command,
            tone_file,
            tone_duration,
            speech_command,
            tone: PlaybackSlot::default(),
            speech: PlaybackSlot::default(),
        }
    }
}

impl AudioCueEngine for CommandAudioEngine {
    fn play_tone(&self) -> bool {
        debug!("Playing transition tone");
        let mut command = Command::new(&self.tone_command);
        if let Some(file) = &self.tone_file {
            command.arg(file);
        }
        match self.tone.launch(command) {
            Ok(_) => true,
            Err(e) => {
                warn!("{}", e);
                false
            }
        }
    }

    fn speak(&self, text: &str) -> (bool, oneshot::Receiver<()>) {
        debug!("Speaking cue: {}", text);
        let mut command = Command::new(&self.speech_command);
        command.arg(text);
        match self.speech.launch(command) {
            Ok(done) => (true, done),
            Err(e) => {
                warn!("{}", e);
                let (tx, rx) = oneshot::channel();
                let _ = tx.send(());
                (false, rx)
            }
        }
    }

    fn stop(&self) {
        self.tone.stop();
        self.speech.stop();
    }

    fn is_playing(&self) -> bool {
        self.tone.is_active()
    }

    fn is_speaking(&self) -> bool {
        self.speech.is_active()
    }

    fn tone_duration(&self) -> Duration {
        self.tone_duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_player_reports_failure() {
        let engine = CommandAudioEngine::new(
            "/nonexistent/tone-player".to_string(),
            None,
            Duration::from_secs(1),
            "/nonexistent/speaker".to_string(),
        );
        assert!(!engine.play_tone());
        let (ok, done) = engine.speak("Set 1 of 2 finishing");
        assert!(!ok);
        assert!(done.await.is_ok());
        assert!(!engine.is_busy());
    }

    #[tokio::test]
    async fn finished_player_clears_busy_flag() {
        let engine = CommandAudioEngine::new(
            "true".to_string(),
            None,
            Duration::from_secs(1),
            "true".to_string(),
        );
        let (ok, done) = engine.speak("hello");
        assert!(ok);
        done.await.unwrap();
        assert!(!engine.is_speaking());
    }
}
