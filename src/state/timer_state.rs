//! Timer state structure and the phase-end transition rule

use serde::{Deserialize, Serialize};

use super::workout::{Intensity, WorkoutConfig};

/// Which phases of the current set have finished.
///
/// There is no "both done" variant: finishing the second phase of a set is
/// collapsed into either a set advance or workout completion in the same step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseFlags {
    Fresh,
    LowDone,
    HighDone,
}

impl PhaseFlags {
    pub fn low_done(self) -> bool {
        matches!(self, PhaseFlags::LowDone)
    }

    pub fn high_done(self) -> bool {
        matches!(self, PhaseFlags::HighDone)
    }

    /// Record that a phase of `finished` intensity ended.
    /// Returns `None` when both phases of the set are now done.
    fn mark(self, finished: Intensity) -> Option<PhaseFlags> {
        match (self, finished) {
            (PhaseFlags::Fresh, Intensity::Low) => Some(PhaseFlags::LowDone),
            (PhaseFlags::Fresh, Intensity::High) => Some(PhaseFlags::HighDone),
            (PhaseFlags::LowDone, Intensity::High) | (PhaseFlags::HighDone, Intensity::Low) => None,
            // The same intensity twice in one set never happens through `end_phase`.
            (flags, _) => Some(flags),
        }
    }
}

/// Position inside a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub set: u32,
    pub intensity: Intensity,
    pub remaining: u32,
    pub phase: PhaseFlags,
    /// Set once the live path has announced the upcoming end of this phase
    pub warning_triggered: bool,
}

/// Result of finishing the current phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEnd {
    /// Mid-set: the other intensity starts
    Toggled(Progress),
    /// Set boundary: next set starts at the configured start intensity
    SetAdvanced(Progress),
    /// Last phase of the last set ended
    Finished,
}

impl Progress {
    /// First second of the first set
    pub fn fresh(config: &WorkoutConfig) -> Self {
        Self {
            set: 1,
            intensity: config.start_intensity,
            remaining: config.phase_duration(),
            phase: PhaseFlags::Fresh,
            warning_triggered: false,
        }
    }

    pub fn minutes(&self) -> u32 {
        self.remaining / 60
    }

    pub fn seconds(&self) -> u32 {
        self.remaining % 60
    }

    /// True when the running phase is the second one of its set
    pub fn in_final_phase_of_set(&self) -> bool {
        self.phase != PhaseFlags::Fresh
    }

    /// Apply the phase-end rule. Every path that moves time forward goes through here.
    pub fn end_phase(self, config: &WorkoutConfig) -> PhaseEnd {
        match self.phase.mark(self.intensity) {
            Some(phase) => PhaseEnd::Toggled(Progress {
                set: self.set,
                intensity: self.intensity.toggled(),
                remaining: config.phase_duration(),
                phase,
                warning_triggered: false,
            }),
            None if self.set < config.sets => PhaseEnd::SetAdvanced(Progress {
                set: self.set + 1,
                intensity: config.start_intensity,
                remaining: config.phase_duration(),
                phase: PhaseFlags::Fresh,
                warning_triggered: false,
            }),
            None => PhaseEnd::Finished,
        }
    }
}

/// Live run state.
///
/// `Idle` carries progress so that a paused run keeps its position; a reset
/// replaces it with fresh progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum TimerState {
    Idle(Progress),
    Running(Progress),
    Completed,
}

impl TimerState {
    /// Idle at the configured start
    pub fn new(config: &WorkoutConfig) -> Self {
        TimerState::Idle(Progress::fresh(config))
    }

    pub fn is_running(&self) -> bool {
        matches!(self, TimerState::Running(_))
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, TimerState::Completed)
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, TimerState::Idle(_))
    }

    pub fn progress(&self) -> Option<&Progress> {
        match self {
            TimerState::Idle(progress) | TimerState::Running(progress) => Some(progress),
            TimerState::Completed => None,
        }
    }

    /// Remaining seconds in the current phase, zero once completed
    pub fn remaining_seconds(&self) -> u32 {
        self.progress().map(|p| p.remaining).unwrap_or(0)
    }
}
