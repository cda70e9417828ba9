//! Cue and notification dispatch with bounded retries

use std::time::Duration;
use chrono::Utc;
use tokio::{sync::oneshot, time::sleep};
use tracing::{debug, info, warn};

use super::notify::{BACKUP_NOTIFICATION_ID, TERMINAL_NOTIFICATION_ID};
use crate::{
    state::{AppState, DispatchAttempt, TerminalNotice},
    timing::CueKind,
};

/// Tries per cue or notification before giving up
pub const DISPATCH_ATTEMPTS: u32 = 3;
/// Wait between tries
pub const DISPATCH_BACKOFF: Duration = Duration::from_millis(200);

/// Final result of dispatching a cue
#[derive(Debug)]
pub enum DispatchOutcome {
    Delivered(Option<oneshot::Receiver<()>>),
    /// Already played recently by the other path
    Suppressed,
    /// The run was paused, stopped, reset or resumed meanwhile
    Cancelled,
    /// Every attempt failed; the cue is dropped
    Dropped,
}

/// Play `kind` under `generation`, retrying failures and busy audio a few times
pub async fn dispatch_cue(state: &AppState, generation: u64, kind: CueKind) -> DispatchOutcome {
    for attempt in 1..=DISPATCH_ATTEMPTS {
        let result = state.with_session(|session| {
            session.try_dispatch(generation, kind, Utc::now(), state.audio.as_ref())
        });

        match result {
            Ok(DispatchAttempt::Played { done }) => {
                debug!("Cue {:?} played on attempt {}", kind, attempt);
                return DispatchOutcome::Delivered(done);
            }
            Ok(DispatchAttempt::Suppressed { set }) => {
                debug!("Duplicate completion cue for set {} suppressed", set);
                return DispatchOutcome::Suppressed;
            }
            Ok(DispatchAttempt::Cancelled) => return DispatchOutcome::Cancelled,
            Ok(DispatchAttempt::Busy) => debug!("Audio busy, deferring cue {:?}", kind),
            Ok(DispatchAttempt::Failed) => warn!("Cue {:?} failed on attempt {}", kind, attempt),
            Err(e) => {
                warn!("Cue dispatch aborted: {}", e);
                return DispatchOutcome::Cancelled;
            }
        }

        if attempt < DISPATCH_ATTEMPTS {
            sleep(DISPATCH_BACKOFF).await;
        }
    }

    warn!("Dropping cue {:?} after {} attempts", kind, DISPATCH_ATTEMPTS);
    DispatchOutcome::Dropped
}

async fn schedule_with_retry(
    state: &AppState,
    generation: u64,
    id: &str,
    delay: Duration,
    body: &str,
) -> Result<(), String> {
    let mut last_error = String::new();
    for attempt in 1..=DISPATCH_ATTEMPTS {
        // Checked under the session lock so nothing is scheduled after a stop returns
        let result = state
            .with_session(|session| {
                if session.generation() != generation {
                    return Err(None);
                }
                state
                    .notifier
                    .schedule_at(id, delay, "Workout complete", body)
                    .map_err(Some)
            })
            .map_err(|e| e.to_string())?;

        match result {
            Ok(()) => return Ok(()),
            Err(None) => {
                debug!("Notification {} no longer wanted", id);
                return Ok(());
            }
            Err(Some(e)) => {
                warn!("Scheduling {} failed on attempt {}: {}", id, attempt, e);
                last_error = e;
            }
        }

        if attempt < DISPATCH_ATTEMPTS {
            sleep(DISPATCH_BACKOFF).await;
        }
    }
    Err(last_error)
}

/// Schedule the completion notification and, if enabled, its backup
pub async fn schedule_terminal_notifications(state: &AppState, generation: u64, notice: TerminalNotice) {
    info!("Scheduling completion notification in {}s", notice.delay.as_secs());
    if let Err(e) = schedule_with_retry(
        state,
        generation,
        TERMINAL_NOTIFICATION_ID,
        notice.delay,
        "All sets done. Nice work!",
    )
    .await
    {
        warn!("Completion notification dropped: {}", e);
    }

    if let Some(backup_delay) = notice.backup_delay {
        if let Err(e) = schedule_with_retry(
            state,
            generation,
            BACKUP_NOTIFICATION_ID,
            backup_delay,
            "Your workout finished while the timer was in the background.",
        )
        .await
        {
            warn!("Backup notification dropped: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{RecordingAudio, RecordingNotifier};
    use crate::state::WorkoutConfig;
    use crate::test_support::app_state;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn transient_failure_is_retried() {
        let audio = Arc::new(RecordingAudio::default());
        audio.fail_next(2);
        let state = app_state(WorkoutConfig::default(), audio.clone(), Arc::new(RecordingNotifier::default()));
        state.start().unwrap();
        let generation = state.generation();

        let outcome = dispatch_cue(&state, generation, CueKind::PhaseTransition).await;
        assert!(matches!(outcome, DispatchOutcome::Delivered(None)));
        assert_eq!(audio.tones(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_failure_drops_cue() {
        let audio = Arc::new(RecordingAudio::default());
        audio.fail_next(5);
        let state = app_state(WorkoutConfig::default(), audio.clone(), Arc::new(RecordingNotifier::default()));
        state.start().unwrap();

        let outcome = dispatch_cue(&state, state.generation(), CueKind::PhaseTransition).await;
        assert!(matches!(outcome, DispatchOutcome::Dropped));
        assert_eq!(audio.tones(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_run_cancels_dispatch() {
        let audio = Arc::new(RecordingAudio::default());
        let state = app_state(WorkoutConfig::default(), audio.clone(), Arc::new(RecordingNotifier::default()));
        state.start().unwrap();
        let generation = state.generation();
        state.stop().unwrap();

        let outcome = dispatch_cue(&state, generation, CueKind::PhaseTransition).await;
        assert!(matches!(outcome, DispatchOutcome::Cancelled));
        assert_eq!(audio.tones(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_notification_skipped_after_stop() {
        let notifier = Arc::new(RecordingNotifier::default());
        let state = app_state(WorkoutConfig::default(), Arc::new(RecordingAudio::default()), notifier.clone());
        state.start().unwrap();
        let generation = state.generation();
        state.stop().unwrap();

        let notice = TerminalNotice {
            delay: Duration::from_secs(60),
            backup_delay: Some(Duration::from_secs(75)),
        };
        schedule_terminal_notifications(&state, generation, notice).await;
        assert!(notifier.scheduled().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn backup_notification_follows_primary() {
        let notifier = Arc::new(RecordingNotifier::default());
        let state = app_state(WorkoutConfig::default(), Arc::new(RecordingAudio::default()), notifier.clone());
        let notice = TerminalNotice {
            delay: Duration::from_secs(60),
            backup_delay: Some(Duration::from_secs(75)),
        };
        schedule_terminal_notifications(&state, state.generation(), notice).await;

        let ids: Vec<_> = notifier.scheduled().into_iter().map(|n| (n.id, n.delay)).collect();
        assert_eq!(
            ids,
            vec![
                (TERMINAL_NOTIFICATION_ID.to_string(), Duration::from_secs(60)),
                (BACKUP_NOTIFICATION_ID.to_string(), Duration::from_secs(75)),
            ]
        );
    }
}
