//! Timing algorithms: drift compensation, suspension replay, cue planning and deduplication
//!
//! Everything in here is synchronous and takes the current time as an argument,
//! so the async drivers in [`crate::tasks`] stay thin.

pub mod clock;
pub mod cues;
pub mod dedup;
pub mod reconcile;

use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

pub use clock::DriftCompensator;
pub use cues::{boundaries, fire_time, live_cue, Boundary, CueKind, CueLeads, CueScheduler, ScheduledCue};
pub use dedup::{terminal_buffer, CueDeduplicator, TerminalNotificationGuard};
pub use reconcile::{ReconcileOutcome, SuspensionReconciler};

/// What to do with a run that was suspended longer than the sanity bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StalePolicy {
    /// Leave the last known state in place
    Keep,
    /// Treat the workout as finished
    Complete,
}

/// Tunable timing constants
#[derive(Debug, Clone, PartialEq)]
pub struct TimingConfig {
    /// Gap between foreground fires (seconds) above which missed ticks are replayed
    pub drift_threshold: f64,
    /// Leftover fraction of a second that still counts as a whole tick
    pub drift_fraction: f64,
    pub min_resume: Duration,
    pub max_resume: Duration,
    pub stale_policy: StalePolicy,
    /// Countdown before the end of a set's final phase
    pub set_lead_secs: u32,
    pub dedup_window: Duration,
    /// Number of sets kept in the dedup history
    pub dedup_retain: usize,
    pub poll_interval: Duration,
    /// Second terminal notification this long after the primary one
    pub backup_notification: Option<Duration>,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            drift_threshold: 1.2,
            drift_fraction: 0.7,
            min_resume: Duration::from_secs(3),
            max_resume: Duration::from_secs(3600),
            stale_policy: StalePolicy::Keep,
            set_lead_secs: 5,
            dedup_window: Duration::from_secs(10),
            dedup_retain: 8,
            poll_interval: Duration::from_millis(500),
            backup_notification: None,
        }
    }
}
