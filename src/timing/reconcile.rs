//! Replay of time spent suspended

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::state::machine::{Advance, IntervalStateMachine};

/// What a resume did to the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Nothing was running
    NotRunning,
    /// Gap below the resume threshold, state untouched
    TooShort,
    /// Gap at or above the sanity bound, no replay attempted
    Stale { elapsed_secs: u64 },
    Replayed { advance: Advance, extra_tick: bool },
}

#[derive(Debug, Clone)]
pub struct SuspensionReconciler {
    min_resume: Duration,
    max_resume: Duration,
    fraction: f64,
}

impl SuspensionReconciler {
    pub fn new(min_resume: Duration, max_resume: Duration, fraction: f64) -> Self {
        Self {
            min_resume,
            max_resume,
            fraction,
        }
    }

    /// Bring `machine` forward by `elapsed`. Re-anchoring the foreground clock is the caller's job.
    pub fn reconcile(&self, machine: &mut IntervalStateMachine, elapsed: Duration) -> ReconcileOutcome {
        if !machine.is_running() {
            return ReconcileOutcome::NotRunning;
        }
        if elapsed < self.min_resume {
            debug!("Resumed after {:.1}s, below replay threshold", elapsed.as_secs_f64());
            return ReconcileOutcome::TooShort;
        }
        if elapsed >= self.max_resume {
            warn!(
                "Resumed after {}s, beyond the {}s sanity bound; skipping replay",
                elapsed.as_secs(),
                self.max_resume.as_secs()
            );
            return ReconcileOutcome::Stale {
                elapsed_secs: elapsed.as_secs(),
            };
        }

        let advance = machine.advance_by(elapsed.as_secs());
        let fraction = f64::from(elapsed.subsec_millis()) / 1000.0;
        let extra_tick = machine.is_running() && fraction > self.fraction;
        if extra_tick {
            machine.tick();
        }

        info!(
            "Replayed {:.1}s of suspension: {} phase(s) ended{}",
            elapsed.as_secs_f64(),
            advance.phases_ended,
            if machine.state().is_completed() { ", workout completed" } else { "" }
        );

        ReconcileOutcome::Replayed { advance, extra_tick }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Intensity, TimerState, WorkoutConfig};

    fn reconciler() -> SuspensionReconciler {
        SuspensionReconciler::new(Duration::from_secs(3), Duration::from_secs(3600), 0.7)
    }

    fn running(config: WorkoutConfig) -> IntervalStateMachine {
        let mut machine = IntervalStateMachine::new(config).unwrap();
        machine.start().unwrap();
        machine
    }

    #[test]
    fn ninety_five_seconds_crosses_into_high() {
        let mut machine = running(WorkoutConfig::new(1, 30, 2, Intensity::Low));
        let outcome = reconciler().reconcile(&mut machine, Duration::from_secs(95));
        assert!(matches!(outcome, ReconcileOutcome::Replayed { extra_tick: false, .. }));
        let progress = machine.state().progress().unwrap();
        assert_eq!(progress.set, 1);
        assert_eq!(progress.intensity, Intensity::High);
        assert_eq!(progress.remaining, 85);
    }

    #[test]
    fn stale_gap_leaves_state_alone() {
        let mut machine = running(WorkoutConfig::new(1, 30, 2, Intensity::Low));
        let before = *machine.state();
        let outcome = reconciler().reconcile(&mut machine, Duration::from_secs(50_000));
        assert_eq!(outcome, ReconcileOutcome::Stale { elapsed_secs: 50_000 });
        assert_eq!(*machine.state(), before);
    }

    #[test]
    fn short_flicker_is_ignored() {
        let mut machine = running(WorkoutConfig::new(0, 30, 1, Intensity::Low));
        let outcome = reconciler().reconcile(&mut machine, Duration::from_millis(2_900));
        assert_eq!(outcome, ReconcileOutcome::TooShort);
        assert_eq!(machine.state().remaining_seconds(), 30);
    }

    #[test]
    fn large_fraction_counts_one_more_second() {
        let mut machine = running(WorkoutConfig::new(0, 30, 1, Intensity::Low));
        let outcome = reconciler().reconcile(&mut machine, Duration::from_millis(10_800));
        assert!(matches!(outcome, ReconcileOutcome::Replayed { extra_tick: true, .. }));
        assert_eq!(machine.state().remaining_seconds(), 19);
    }

    #[test]
    fn extra_second_can_finish_a_phase() {
        let mut machine = running(WorkoutConfig::new(0, 10, 1, Intensity::Low));
        reconciler().reconcile(&mut machine, Duration::from_millis(9_900));
        let progress = machine.state().progress().unwrap();
        assert_eq!(progress.intensity, Intensity::High);
        assert_eq!(progress.remaining, 10);
    }

    #[test]
    fn walking_past_the_last_set_completes() {
        let mut machine = running(WorkoutConfig::new(0, 20, 3, Intensity::High));
        reconciler().reconcile(&mut machine, Duration::from_secs(500));
        assert_eq!(*machine.state(), TimerState::Completed);
        assert_eq!(machine.state().remaining_seconds(), 0);
    }

    #[test]
    fn paused_run_is_not_replayed() {
        let mut machine = IntervalStateMachine::new(WorkoutConfig::default()).unwrap();
        assert_eq!(
            reconciler().reconcile(&mut machine, Duration::from_secs(60)),
            ReconcileOutcome::NotRunning
        );
    }
}
