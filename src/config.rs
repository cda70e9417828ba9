//! Configuration and CLI argument handling

use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use crate::{
    state::{Intensity, WorkoutConfig},
    timing::{StalePolicy, TimingConfig},
};

/// CLI argument parsing structure
#[derive(Parser, Debug, Clone)]
#[command(name = "interval-coach")]
#[command(about = "Interval training timer that survives suspension and never repeats a cue")]
#[command(version = "1.0.0")]
pub struct Config {
    /// Port to bind the server to
    #[arg(short, long, default_value = "20554")]
    pub port: u16,

    /// Host address to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Minutes per phase
    #[arg(long, default_value = "1")]
    pub phase_minutes: u32,

    /// Seconds per phase, added to the minutes
    #[arg(long, default_value = "30")]
    pub phase_seconds: u32,

    /// Number of low/high sets
    #[arg(short, long, default_value = "8")]
    pub sets: u32,

    /// Intensity every set starts with
    #[arg(long, value_enum, default_value = "low")]
    pub start_intensity: Intensity,

    /// Seconds between foreground fires beyond which missed ticks are replayed
    #[arg(long, default_value = "1.2")]
    pub drift_threshold: f64,

    /// Leftover fraction of a second that still counts as a tick
    #[arg(long, default_value = "0.7")]
    pub drift_fraction: f64,

    /// Suspensions shorter than this many seconds are ignored
    #[arg(long, default_value = "3.0")]
    pub min_resume_secs: f64,

    /// Suspensions at least this long are not replayed
    #[arg(long, default_value = "3600")]
    pub max_resume_secs: u64,

    /// What to do with a run suspended past the sanity bound
    #[arg(long, value_enum, default_value = "keep")]
    pub stale_policy: StalePolicy,

    /// Countdown before the end of each set
    #[arg(long, default_value = "5")]
    pub set_lead_secs: u32,

    /// Window in which a repeated cue or notification is suppressed
    #[arg(long, default_value = "10")]
    pub dedup_window_secs: u64,

    /// Cue poll interval while suspended
    #[arg(long, default_value = "500")]
    pub poll_interval_ms: u64,

    /// Send a second completion notification this many seconds after the first
    #[arg(long)]
    pub backup_notification_secs: Option<u64>,

    /// Program that plays the transition tone
    #[arg(long, default_value = "paplay")]
    pub tone_command: String,

    /// Sound file passed to the tone program
    #[arg(long, default_value = "/usr/share/sounds/freedesktop/stereo/bell.oga")]
    pub tone_file: Option<String>,

    /// Length of the transition tone
    #[arg(long, default_value = "1500")]
    pub tone_duration_ms: u64,

    /// Program that speaks the set cues
    #[arg(long, default_value = "espeak")]
    pub speech_command: String,

    /// Program that shows desktop notifications
    #[arg(long, default_value = "notify-send")]
    pub notify_command: String,

    /// Background time granted for cue polling per suspension
    #[arg(long, default_value = "30")]
    pub background_budget_secs: u64,

    /// Times the background budget may be renewed per suspension
    #[arg(long, default_value = "2")]
    pub background_renewals: u32,
}

impl Config {
    /// Parse configuration from command line arguments
    pub fn parse() -> Self {
        Parser::parse()
    }

    /// Get the server address as a formatted string
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the appropriate log level based on verbose flag
    pub fn log_level(&self) -> &'static str {
        if self.verbose { "debug" } else { "info" }
    }

    /// Workout loaded at startup
    pub fn workout(&self) -> WorkoutConfig {
        WorkoutConfig::new(self.phase_minutes, self.phase_seconds, self.sets, self.start_intensity)
    }

    /// Timing tunables, rejecting values that are not a valid duration
    pub fn timing(&self) -> anyhow::Result<TimingConfig> {
        let min_resume = Duration::try_from_secs_f64(self.min_resume_secs)
            .with_context(|| format!("invalid --min-resume-secs {}", self.min_resume_secs))?;

        Ok(TimingConfig {
            drift_threshold: self.drift_threshold,
            drift_fraction: self.drift_fraction,
            min_resume,
            max_resume: Duration::from_secs(self.max_resume_secs),
            stale_policy: self.stale_policy,
            set_lead_secs: self.set_lead_secs,
            dedup_window: Duration::from_secs(self.dedup_window_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            backup_notification: self.backup_notification_secs.map(Duration::from_secs),
            ..TimingConfig::default()
        })
    }

    pub fn tone_duration(&self) -> Duration {
        Duration::from_millis(self.tone_duration_ms)
    }

    pub fn background_budget(&self) -> Duration {
        Duration::from_secs(self.background_budget_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_engine_defaults() {
        let config = Config::parse_from(["interval-coach"]);
        assert_eq!(config.timing().unwrap(), TimingConfig::default());
        assert_eq!(config.workout(), WorkoutConfig::default());
        assert_eq!(config.address(), "127.0.0.1:20554");
    }

    #[test]
    fn flags_override_workout_and_timing() {
        let config = Config::parse_from([
            "interval-coach",
            "--phase-minutes",
            "0",
            "--phase-seconds",
            "20",
            "--sets",
            "3",
            "--start-intensity",
            "high",
            "--stale-policy",
            "complete",
            "--backup-notification-secs",
            "15",
            "--verbose",
        ]);
        assert_eq!(config.workout(), WorkoutConfig::new(0, 20, 3, Intensity::High));
        let timing = config.timing().unwrap();
        assert_eq!(timing.stale_policy, StalePolicy::Complete);
        assert_eq!(timing.backup_notification, Some(Duration::from_secs(15)));
        assert_eq!(config.log_level(), "debug");
    }

    #[test]
    fn unrepresentable_resume_threshold_is_an_error() {
        for value in ["inf", "NaN"] {
            let config = Config::parse_from(["interval-coach", "--min-resume-secs", value]);
            let err = config.timing().unwrap_err();
            assert!(err.to_string().contains("--min-resume-secs"));
        }
    }
}
