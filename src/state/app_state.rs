//! Main application state management

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use chrono::{DateTime, Utc};
use tokio::{sync::watch, time::Instant};
use tracing::{info, warn};

use super::session::{Session, SessionSnapshot, SuspendReport};
use super::workout::WorkoutConfig;
use crate::{
    error::EngineError,
    services::{
        schedule_terminal_notifications, AudioCueEngine, LifecycleEvent, LifecycleHost, LifecyclePhase,
        NotificationGateway, BACKUP_NOTIFICATION_ID, TERMINAL_NOTIFICATION_ID,
    },
    tasks::cue_poller_task,
    timing::ReconcileOutcome,
};

/// Main application state: the session plus its collaborators
pub struct AppState {
    /// Timer session; every mutation goes through this lock
    pub session: Arc<Mutex<Session>>,
    /// Injected collaborators
    pub audio: Arc<dyn AudioCueEngine>,
    pub notifier: Arc<dyn NotificationGateway>,
    pub lifecycle_host: Arc<dyn LifecycleHost>,
    /// Server metadata
    pub start_time: Instant,
    pub port: u16,
    pub host: String,
    /// Last action tracking
    pub last_action: Arc<Mutex<Option<String>>>,
    pub last_action_time: Arc<Mutex<Option<DateTime<Utc>>>>,
    /// Session generation; background tasks wake on every change
    pub generation_tx: watch::Sender<u64>,
    /// Keep the receiver alive to prevent channel closure
    pub _generation_rx: watch::Receiver<u64>,
}

impl AppState {
    pub fn new(
        port: u16,
        host: String,
        session: Session,
        audio: Arc<dyn AudioCueEngine>,
        notifier: Arc<dyn NotificationGateway>,
        lifecycle_host: Arc<dyn LifecycleHost>,
    ) -> Self {
        let (generation_tx, generation_rx) = watch::channel(session.generation());

        Self {
            session: Arc::new(Mutex::new(session)),
            audio,
            notifier,
            lifecycle_host,
            start_time: Instant::now(),
            port,
            host,
            last_action: Arc::new(Mutex::new(None)),
            last_action_time: Arc::new(Mutex::new(None)),
            generation_tx,
            _generation_rx: generation_rx,
        }
    }

    /// Run `f` with the session locked
    pub fn with_session<R>(&self, f: impl FnOnce(&mut Session) -> R) -> Result<R, EngineError> {
        let mut session = self
            .session
            .lock()
            .map_err(|e| EngineError::LockPoisoned(e.to_string()))?;
        Ok(f(&mut session))
    }

    pub fn generation(&self) -> u64 {
        *self.generation_tx.borrow()
    }

    /// Wake background tasks if the session generation moved
    pub fn publish_generation(&self, generation: u64) {
        self.generation_tx.send_if_modified(|current| {
            if *current == generation {
                false
            } else {
                *current = generation;
                true
            }
        });
    }

    fn record_action(&self, action: &str) {
        if let Ok(mut last_action) = self.last_action.lock() {
            *last_action = Some(action.to_string());
        }
        if let Ok(mut last_time) = self.last_action_time.lock() {
            *last_time = Some(Utc::now());
        }
    }

    /// Apply a session command, then publish the new generation and record the action
    fn command<R>(
        &self,
        action: &str,
        f: impl FnOnce(&mut Session) -> Result<R, EngineError>,
    ) -> Result<SessionSnapshot, EngineError> {
        let (snapshot, generation) = self.with_session(|session| {
            f(session).map(|_| (session.snapshot(), session.generation()))
        })??;
        self.publish_generation(generation);
        self.record_action(action);
        Ok(snapshot)
    }

    pub fn configure(&self, config: WorkoutConfig) -> Result<SessionSnapshot, EngineError> {
        self.command("configure", |session| session.configure(config))
    }

    /// Starting while suspended also launches the background cue work
    pub fn start(self: &Arc<Self>) -> Result<SessionSnapshot, EngineError> {
        info!("Starting workout");
        let mut report = None;
        let snapshot = self.command("start", |session| {
            report = session.start(Instant::now(), Utc::now())?;
            Ok(())
        })?;
        if let Some(report) = report {
            self.spawn_background(report, None);
        }
        Ok(snapshot)
    }

    /// Pending cues and notifications are withdrawn before this returns
    pub fn pause(&self) -> Result<SessionSnapshot, EngineError> {
        info!("Pausing workout");
        self.command("pause", |session| {
            session.pause(Utc::now());
            self.silence();
            Ok(())
        })
    }

    pub fn stop(&self) -> Result<SessionSnapshot, EngineError> {
        info!("Stopping workout");
        self.command("stop", |session| {
            session.stop();
            self.silence();
            Ok(())
        })
    }

    pub fn reset(&self) -> Result<SessionSnapshot, EngineError> {
        info!("Resetting workout");
        self.command("reset", |session| {
            session.reset();
            self.silence();
            Ok(())
        })
    }

    fn silence(&self) {
        self.audio.stop();
        self.notifier.cancel_all();
    }

    /// React to a host lifecycle transition
    pub fn handle_lifecycle(
        self: &Arc<Self>,
        event: LifecycleEvent,
        budget: Option<Duration>,
    ) -> Result<SessionSnapshot, EngineError> {
        info!("Lifecycle transition to {} at {}", event.phase, event.at);
        match event.phase {
            LifecyclePhase::Suspended => self.suspend(event.at, budget)?,
            phase => {
                if let Some(outcome) = self.resume(phase, event.at)? {
                    info!("Resume reconciliation: {:?}", outcome);
                }
            }
        }
        self.record_action(&format!("lifecycle-{}", event.phase));
        self.snapshot()
    }

    fn suspend(self: &Arc<Self>, at: DateTime<Utc>, budget: Option<Duration>) -> Result<(), EngineError> {
        let Some(report) = self.with_session(|session| session.enter_suspension(at))? else {
            return Ok(());
        };
        self.publish_generation(report.generation);
        self.spawn_background(report, budget);
        Ok(())
    }

    /// Schedule the completion notice and poll planned cues for a suspended run
    fn spawn_background(self: &Arc<Self>, report: SuspendReport, budget: Option<Duration>) {
        let generation = report.generation;
        if let Some(notice) = report.notice {
            let state = Arc::clone(self);
            tokio::spawn(async move {
                schedule_terminal_notifications(&state, generation, notice).await;
            });
        }

        if report.planned == 0 {
            return;
        }
        match budget.or_else(|| self.lifecycle_host.begin_background()) {
            Some(budget) => {
                let state = Arc::clone(self);
                tokio::spawn(cue_poller_task(state, generation, budget));
            }
            None => info!("No background time granted, cues will be skipped until resume"),
        }
    }

    fn resume(&self, phase: LifecyclePhase, at: DateTime<Utc>) -> Result<Option<ReconcileOutcome>, EngineError> {
        let (outcome, generation) = self.with_session(|session| {
            let outcome = session.set_lifecycle(phase, at, Instant::now());
            if outcome.is_some() {
                self.notifier.cancel(TERMINAL_NOTIFICATION_ID);
                self.notifier.cancel(BACKUP_NOTIFICATION_ID);
            }
            (outcome, session.generation())
        })?;
        self.publish_generation(generation);
        Ok(outcome)
    }

    /// Replay a host sleep that happened without any lifecycle event
    pub fn recover_from_sleep(&self, gap: Duration) -> Result<Option<ReconcileOutcome>, EngineError> {
        let now = Utc::now();
        let slept_from = match chrono::Duration::from_std(gap) {
            Ok(gap) => now - gap,
            Err(e) => {
                warn!("Ignoring implausible sleep gap: {}", e);
                return Ok(None);
            }
        };
        let (outcome, generation) = self.with_session(|session| {
            (session.absorb_sleep(slept_from, now, Instant::now()), session.generation())
        })?;
        self.publish_generation(generation);
        if outcome.is_some() {
            self.record_action("wake-up");
        }
        Ok(outcome)
    }

    pub fn snapshot(&self) -> Result<SessionSnapshot, EngineError> {
        self.with_session(|session| session.snapshot())
    }

    /// Calculate server uptime as a formatted string
    pub fn get_uptime(&self) -> String {
        let duration = self.start_time.elapsed();
        let hours = duration.as_secs() / 3600;
        let minutes = (duration.as_secs() % 3600) / 60;
        let seconds = duration.as_secs() % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }

    /// Get last action information
    pub fn get_last_action(&self) -> (Option<String>, Option<DateTime<Utc>>) {
        let last_action = self.last_action.lock().ok().and_then(|a| a.clone());
        let last_action_time = self.last_action_time.lock().ok().and_then(|t| *t);
        (last_action, last_action_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{RecordingAudio, RecordingNotifier};
    use crate::state::Intensity;
    use crate::test_support::app_state;

    #[tokio::test]
    async fn commands_bump_generation_and_record_action() {
        let state = app_state(
            WorkoutConfig::default(),
            Arc::new(RecordingAudio::default()),
            Arc::new(RecordingNotifier::default()),
        );
        let before = state.generation();
        let snapshot = state.start().unwrap();
        assert!(snapshot.timer.is_running());
        assert!(state.generation() > before);
        assert_eq!(state.get_last_action().0.as_deref(), Some("start"));
    }

    #[tokio::test]
    async fn stop_cancels_notifications_before_returning() {
        let notifier = Arc::new(RecordingNotifier::default());
        let state = app_state(WorkoutConfig::default(), Arc::new(RecordingAudio::default()), notifier.clone());
        state.start().unwrap();
        state.stop().unwrap();
        assert_eq!(notifier.cancel_all_calls(), 1);
    }

    #[tokio::test]
    async fn configure_rejects_invalid_and_running() {
        let state = app_state(
            WorkoutConfig::default(),
            Arc::new(RecordingAudio::default()),
            Arc::new(RecordingNotifier::default()),
        );
        assert!(matches!(
            state.configure(WorkoutConfig::new(0, 0, 1, Intensity::Low)),
            Err(EngineError::InvalidConfig(_))
        ));
        state.start().unwrap();
        assert_eq!(
            state.configure(WorkoutConfig::new(0, 30, 1, Intensity::Low)).unwrap_err(),
            EngineError::NotIdle
        );
    }

    #[tokio::test(start_paused = true)]
    async fn suspend_and_resume_round_trip() {
        let notifier = Arc::new(RecordingNotifier::default());
        let state = app_state(
            WorkoutConfig::new(1, 30, 2, Intensity::Low),
            Arc::new(RecordingAudio::default()),
            notifier.clone(),
        );
        state.start().unwrap();

        let t0 = Utc::now();
        let snapshot = state
            .handle_lifecycle(
                LifecycleEvent {
                    phase: LifecyclePhase::Suspended,
                    at: t0,
                },
                Some(Duration::from_secs(1)),
            )
            .unwrap();
        assert_eq!(snapshot.lifecycle, LifecyclePhase::Suspended);
        assert_eq!(snapshot.pending_cues.len(), 4);

        // Let the notification task run
        tokio::task::yield_now().await;
        assert_eq!(notifier.scheduled().len(), 1);

        let snapshot = state
            .handle_lifecycle(
                LifecycleEvent {
                    phase: LifecyclePhase::Active,
                    at: t0 + chrono::Duration::seconds(95),
                },
                None,
            )
            .unwrap();
        assert_eq!(snapshot.lifecycle, LifecyclePhase::Active);
        assert!(snapshot.pending_cues.is_empty());
        assert_eq!(snapshot.timer.remaining_seconds(), 85);
        assert!(notifier.scheduled().is_empty());
    }

    #[tokio::test]
    async fn wake_after_lifecycle_resume_does_not_replay_again() {
        let state = app_state(
            WorkoutConfig::new(0, 30, 4, Intensity::Low),
            Arc::new(RecordingAudio::default()),
            Arc::new(RecordingNotifier::default()),
        );
        state.start().unwrap();

        let resumed_at = Utc::now();
        state
            .handle_lifecycle(
                LifecycleEvent {
                    phase: LifecyclePhase::Suspended,
                    at: resumed_at - chrono::Duration::seconds(20),
                },
                None,
            )
            .unwrap();
        let snapshot = state
            .handle_lifecycle(
                LifecycleEvent {
                    phase: LifecyclePhase::Active,
                    at: resumed_at,
                },
                None,
            )
            .unwrap();
        assert_eq!(snapshot.timer.remaining_seconds(), 10);

        // The wake detector sees the same 20s sleep once the host is back
        assert_eq!(state.recover_from_sleep(Duration::from_secs(20)).unwrap(), None);
        assert_eq!(state.snapshot().unwrap().timer.remaining_seconds(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn start_while_suspended_schedules_background_work() {
        let notifier = Arc::new(RecordingNotifier::default());
        let state = app_state(
            WorkoutConfig::new(0, 10, 1, Intensity::Low),
            Arc::new(RecordingAudio::default()),
            notifier.clone(),
        );
        state
            .handle_lifecycle(
                LifecycleEvent {
                    phase: LifecyclePhase::Suspended,
                    at: Utc::now(),
                },
                None,
            )
            .unwrap();

        let snapshot = state.start().unwrap();
        assert_eq!(snapshot.pending_cues.len(), 2);

        tokio::task::yield_now().await;
        assert_eq!(notifier.scheduled().len(), 1);
    }
}
