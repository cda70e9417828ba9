//! Shared builders for tests

use std::{sync::Arc, time::Duration};

use crate::{
    services::{
        testing::{RecordingAudio, RecordingNotifier},
        AudioCueEngine, FixedBudgetHost,
    },
    state::{AppState, Session, WorkoutConfig},
    timing::TimingConfig,
};

/// App state over recording collaborators; the host grants no renewals
pub fn app_state(
    config: WorkoutConfig,
    audio: Arc<RecordingAudio>,
    notifier: Arc<RecordingNotifier>,
) -> Arc<AppState> {
    let session = Session::new(config, TimingConfig::default(), audio.tone_duration())
        .expect("valid test configuration");
    Arc::new(AppState::new(
        0,
        "127.0.0.1".to_string(),
        session,
        audio,
        notifier,
        Arc::new(FixedBudgetHost::new(Duration::ZERO, 0)),
    ))
}
