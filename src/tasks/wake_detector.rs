//! Host sleep detection

use std::{sync::Arc, time::Duration};
use chrono::Utc;
use tokio::time::{interval, Instant};
use tracing::{info, warn};

use crate::state::AppState;

/// How often the wall clock is compared with the monotonic clock
pub const WAKE_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Wall time that passed beyond monotonic time between two samples.
///
/// The monotonic clock stands still while the machine sleeps, so any excess is
/// time the process spent suspended.
pub fn sleep_gap(wall_elapsed: Duration, monotonic_elapsed: Duration) -> Duration {
    wall_elapsed.saturating_sub(monotonic_elapsed)
}

/// Background task that detects system wake-up and replays the slept time
pub async fn wake_detector_task(state: Arc<AppState>) {
    info!("Starting wake detector task");

    let threshold = match state.with_session(|session| session.timing().min_resume) {
        Ok(threshold) => threshold,
        Err(e) => {
            warn!("Wake detector not started: {}", e);
            return;
        }
    };

    let mut interval = interval(WAKE_CHECK_INTERVAL);
    let mut last_wall = Utc::now();
    let mut last_mono = Instant::now();

    loop {
        interval.tick().await;

        let (now_wall, now_mono) = (Utc::now(), Instant::now());
        let wall_elapsed = (now_wall - last_wall).to_std().unwrap_or_default();
        let gap = sleep_gap(wall_elapsed, now_mono.duration_since(last_mono));
        last_wall = now_wall;
        last_mono = now_mono;

        if gap < threshold {
            continue;
        }

        info!("System wake-up detected after {}s asleep", gap.as_secs());
        match state.recover_from_sleep(gap) {
            Ok(Some(outcome)) => info!("Recovered from sleep: {:?}", outcome),
            Ok(None) => {}
            Err(e) => warn!("Failed to recover from sleep: {}", e),
        }
    }
}
