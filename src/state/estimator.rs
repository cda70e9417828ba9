//! Total remaining time until the workout finishes

use super::timer_state::{Progress, TimerState};
use super::workout::{Intensity, WorkoutConfig};

/// Seconds left until completion.
///
/// The branching over `(intensity, low_done, high_done)` follows
/// [`Progress::end_phase`]: a set still has another phase to run unless the
/// running phase is the second of its pair.
pub fn total_remaining(
    remaining: u32,
    intensity: Intensity,
    low_done: bool,
    high_done: bool,
    current_set: u32,
    sets: u32,
    phase_duration: u32,
) -> u64 {
    let phases_left_in_set: u64 = match (intensity, low_done, high_done) {
        // First phase of the set running, its partner still outstanding
        (_, false, false) => 1,
        // Second phase of the set running
        (Intensity::High, true, false) | (Intensity::Low, false, true) => 0,
        // Same intensity as the finished one: the state machine toggles once more
        (Intensity::Low, true, false) | (Intensity::High, false, true) => 1,
        (_, true, true) => 0,
    };
    let sets_after_current = u64::from(sets.saturating_sub(current_set));
    let phase = u64::from(phase_duration);

    u64::from(remaining) + phases_left_in_set * phase + sets_after_current * 2 * phase
}

/// [`total_remaining`] for a live progress snapshot
pub fn total_remaining_for(progress: &Progress, config: &WorkoutConfig) -> u64 {
    total_remaining(
        progress.remaining,
        progress.intensity,
        progress.phase.low_done(),
        progress.phase.high_done(),
        progress.set,
        config.sets,
        config.phase_duration(),
    )
}

/// Remaining seconds for any state; idle runs count from where they stand
pub fn total_remaining_for_state(state: &TimerState, config: &WorkoutConfig) -> u64 {
    state
        .progress()
        .map(|progress| total_remaining_for(progress, config))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::machine::IntervalStateMachine;

    #[test]
    fn fresh_workout_remaining_is_total_duration() {
        let config = WorkoutConfig::new(1, 30, 2, Intensity::Low);
        let state = TimerState::new(&config);
        assert_eq!(total_remaining_for_state(&state, &config), 360);
    }

    #[test]
    fn second_phase_has_nothing_left_in_set() {
        assert_eq!(total_remaining(40, Intensity::High, true, false, 2, 3, 60), 40 + 120);
        assert_eq!(total_remaining(40, Intensity::Low, false, true, 3, 3, 60), 40);
    }

    #[test]
    fn completed_has_nothing_left() {
        let config = WorkoutConfig::default();
        assert_eq!(total_remaining_for_state(&TimerState::Completed, &config), 0);
    }

    #[test]
    fn estimate_shrinks_one_second_per_tick() {
        let config = WorkoutConfig::new(0, 7, 3, Intensity::High);
        let mut machine = IntervalStateMachine::new(config).unwrap();
        machine.start().unwrap();
        let mut expected = config.total_duration();
        while !machine.state().is_completed() {
            assert_eq!(total_remaining_for_state(machine.state(), &config), expected);
            machine.tick();
            expected -= 1;
        }
        assert_eq!(expected, 0);
    }
}
