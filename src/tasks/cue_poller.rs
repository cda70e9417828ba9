//! Suspended cue polling within the host's background budget

use std::{sync::Arc, time::Duration};
use chrono::Utc;
use tokio::time::{interval, sleep_until, timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::{
    services::{dispatch_cue, DispatchOutcome},
    state::{AppState, CuePoll},
};

/// Longest wait for a spoken cue to finish before polling again
const SPEECH_WAIT: Duration = Duration::from_secs(10);

/// Poll the planned cues until they run out, the budget expires or the run changes.
/// Plays at most one cue per poll.
pub async fn cue_poller_task(state: Arc<AppState>, generation: u64, budget: Duration) {
    let poll_every = match state.with_session(|session| session.timing().poll_interval) {
        Ok(every) => every,
        Err(e) => {
            warn!("Cue poller not started: {}", e);
            return;
        }
    };
    info!(
        "Starting cue poller (every {}ms, budget {}s)",
        poll_every.as_millis(),
        budget.as_secs()
    );

    let mut generation_rx = state.generation_tx.subscribe();
    let mut ticker = interval(poll_every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut deadline = Instant::now() + budget;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let poll = match state.with_session(|session| session.poll_cue(generation, Utc::now())) {
                    Ok(poll) => poll,
                    Err(e) => {
                        warn!("Cue poll failed: {}", e);
                        break;
                    }
                };

                let cue = match poll {
                    CuePoll::Cancelled => break,
                    CuePoll::Exhausted => {
                        info!("All planned cues handled, stopping cue poller");
                        break;
                    }
                    CuePoll::Waiting => continue,
                    CuePoll::Due(cue) => cue,
                };

                let outcome = dispatch_cue(&state, generation, cue.kind).await;
                if let DispatchOutcome::Cancelled = outcome {
                    break;
                }
                if let Err(e) = state.with_session(|session| session.confirm_cue(generation, &cue)) {
                    warn!("Failed to confirm cue: {}", e);
                    break;
                }
                if let DispatchOutcome::Delivered(Some(done)) = outcome {
                    if timeout(SPEECH_WAIT, done).await.is_err() {
                        debug!("Spoken cue still running after {}s", SPEECH_WAIT.as_secs());
                    }
                }
            }

            _ = sleep_until(deadline) => {
                match state.lifecycle_host.request_renewal() {
                    Some(extra) => deadline = Instant::now() + extra,
                    None => {
                        info!("Background budget expired, stopping cue poller");
                        break;
                    }
                }
            }

            changed = generation_rx.changed() => {
                if changed.is_err() || *generation_rx.borrow_and_update() != generation {
                    debug!("Cue poller cancelled");
                    break;
                }
            }
        }
    }
}
