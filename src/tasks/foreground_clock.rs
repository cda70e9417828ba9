//! Foreground one-second driver

use std::{sync::Arc, time::Duration};
use tokio::{
    sync::watch,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, error, info};

use crate::{
    services::dispatch_cue,
    state::AppState,
};

const TICK: Duration = Duration::from_secs(1);

/// Background task that counts seconds while the run is active in the foreground
pub async fn foreground_clock_task(state: Arc<AppState>) {
    info!("Starting foreground clock task");

    let mut generation_rx = state.generation_tx.subscribe();

    loop {
        let generation = *generation_rx.borrow_and_update();
        let ticking = match state.with_session(|session| session.is_ticking()) {
            Ok(ticking) => ticking,
            Err(e) => {
                error!("Foreground clock stopping: {}", e);
                return;
            }
        };

        if ticking {
            debug!("Foreground clock running under generation {}", generation);
            run_clock(&state, generation, &mut generation_rx).await;
        } else if generation_rx.changed().await.is_err() {
            debug!("Generation channel closed, stopping foreground clock");
            return;
        }
    }
}

/// Tick once a second until the generation changes
async fn run_clock(state: &Arc<AppState>, generation: u64, generation_rx: &mut watch::Receiver<u64>) {
    let mut interval = interval_at(Instant::now() + TICK, TICK);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let report = match state.with_session(|session| session.foreground_fire(generation, Instant::now())) {
                    Ok(Some(report)) => report,
                    Ok(None) => return,
                    Err(e) => {
                        error!("Failed to tick: {}", e);
                        return;
                    }
                };

                for transition in &report.transitions {
                    debug!("Transition: {:?}", transition);
                }

                if report.generation != generation {
                    state.publish_generation(report.generation);
                }

                if let Some(kind) = report.cue {
                    let state = Arc::clone(state);
                    tokio::spawn(async move {
                        let outcome = dispatch_cue(&state, report.generation, kind).await;
                        debug!("Live cue {:?}: {:?}", kind, outcome);
                    });
                }
            }

            changed = generation_rx.changed() => {
                if changed.is_ok() {
                    debug!("Generation changed, leaving foreground clock loop");
                }
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{RecordingAudio, RecordingNotifier};
    use crate::state::{Intensity, WorkoutConfig};
    use crate::test_support::app_state;

    #[tokio::test(start_paused = true)]
    async fn counts_seconds_and_plays_cues() {
        let audio = Arc::new(RecordingAudio::default());
        let state = app_state(
            WorkoutConfig::new(0, 5, 1, Intensity::Low),
            audio.clone(),
            Arc::new(RecordingNotifier::default()),
        );
        tokio::spawn(foreground_clock_task(Arc::clone(&state)));
        state.start().unwrap();

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert_eq!(state.snapshot().unwrap().timer.remaining_seconds(), 2);
        assert_eq!(audio.tones(), 1);

        tokio::time::sleep(Duration::from_secs(8)).await;
        assert!(state.snapshot().unwrap().timer.is_completed());
        assert_eq!(
            audio.spoken(),
            vec!["Set 1 of 1 finishing".to_string(), "Workout complete".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn pause_stops_counting() {
        let state = app_state(
            WorkoutConfig::new(0, 30, 1, Intensity::Low),
            Arc::new(RecordingAudio::default()),
            Arc::new(RecordingNotifier::default()),
        );
        tokio::spawn(foreground_clock_task(Arc::clone(&state)));
        state.start().unwrap();

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        state.pause().unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(state.snapshot().unwrap().timer.remaining_seconds(), 28);

        state.start().unwrap();
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(state.snapshot().unwrap().timer.remaining_seconds(), 27);
    }
}
