//! Interval state machine
//!
//! ```text
//! Idle -> Running -> Completed
//! Running -> Idle        (pause / stop)
//! Completed -> Idle      (reset)
//! ```
//!
//! Time only moves forward through [`IntervalStateMachine::tick`] (one second)
//! or [`IntervalStateMachine::advance_by`] (bulk replay). Both apply the same
//! phase-end rule from [`Progress::end_phase`], so `advance_by(d)` lands on the
//! exact state `d` ticks would.

use tracing::debug;

use super::timer_state::{PhaseEnd, Progress, TimerState};
use super::workout::{Intensity, WorkoutConfig};
use crate::error::EngineError;

/// What a single step did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not running, nothing consumed
    Inactive,
    /// One second counted inside the current phase
    Counted,
    PhaseToggled { set: u32, intensity: Intensity },
    SetAdvanced { set: u32 },
    Completed,
}

/// Summary of a bulk replay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Advance {
    pub phases_ended: u32,
    pub completed: bool,
}

#[derive(Debug, Clone)]
pub struct IntervalStateMachine {
    config: WorkoutConfig,
    state: TimerState,
}

impl IntervalStateMachine {
    /// Build a machine idle at the configured start. Invalid configurations never produce a state.
    pub fn new(config: WorkoutConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            state: TimerState::new(&config),
            config,
        })
    }

    pub fn config(&self) -> &WorkoutConfig {
        &self.config
    }

    pub fn state(&self) -> &TimerState {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Replace the configuration. Only allowed while idle; resets progress.
    pub fn set_config(&mut self, config: WorkoutConfig) -> Result<(), EngineError> {
        if !self.state.is_idle() {
            return Err(EngineError::NotIdle);
        }
        config.validate()?;
        self.config = config;
        self.state = TimerState::new(&config);
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), EngineError> {
        match self.state {
            TimerState::Idle(progress) => {
                self.state = TimerState::Running(progress);
                Ok(())
            }
            TimerState::Running(_) => Ok(()),
            TimerState::Completed => Err(EngineError::AlreadyCompleted),
        }
    }

    /// Keep position, stop counting. Returns false if nothing was running.
    pub fn pause(&mut self) -> bool {
        match self.state {
            TimerState::Running(progress) => {
                self.state = TimerState::Idle(progress);
                true
            }
            _ => false,
        }
    }

    /// Back to idle at the configured start
    pub fn reset(&mut self) {
        self.state = TimerState::new(&self.config);
    }

    /// Force the terminal state
    pub fn complete(&mut self) {
        self.state = TimerState::Completed;
    }

    /// Remember that the live path already announced the end of this phase
    pub fn mark_warning(&mut self) {
        if let TimerState::Running(progress) = &mut self.state {
            progress.warning_triggered = true;
        }
    }

    /// Consume one second
    pub fn tick(&mut self) -> TickOutcome {
        let TimerState::Running(progress) = &mut self.state else {
            return TickOutcome::Inactive;
        };
        progress.remaining = progress.remaining.saturating_sub(1);
        if progress.remaining > 0 {
            return TickOutcome::Counted;
        }
        self.finish_phase()
    }

    /// Consume `secs` seconds at once, crossing as many boundaries as needed
    pub fn advance_by(&mut self, secs: u64) -> Advance {
        let mut budget = secs;
        let mut advance = Advance::default();

        while budget > 0 {
            let TimerState::Running(progress) = &mut self.state else {
                break;
            };
            let left = u64::from(progress.remaining);
            if budget >= left {
                budget -= left;
                progress.remaining = 0;
                advance.phases_ended += 1;
                if self.finish_phase() == TickOutcome::Completed {
                    advance.completed = true;
                    break;
                }
            } else {
                // budget < left, and left fits in u32
                progress.remaining -= budget as u32;
                budget = 0;
            }
        }

        advance
    }

    fn finish_phase(&mut self) -> TickOutcome {
        let TimerState::Running(progress) = self.state else {
            return TickOutcome::Inactive;
        };
        match progress.end_phase(&self.config) {
            PhaseEnd::Toggled(next) => {
                debug!("Set {} switching to {} intensity", next.set, next.intensity);
                self.state = TimerState::Running(next);
                TickOutcome::PhaseToggled {
                    set: next.set,
                    intensity: next.intensity,
                }
            }
            PhaseEnd::SetAdvanced(next) => {
                debug!("Advancing to set {}/{}", next.set, self.config.sets);
                self.state = TimerState::Running(next);
                TickOutcome::SetAdvanced { set: next.set }
            }
            PhaseEnd::Finished => {
                debug!("Workout completed after {} sets", self.config.sets);
                self.state = TimerState::Completed;
                TickOutcome::Completed
            }
        }
    }

    /// Rebuild a machine from a saved position
    pub fn with_progress(config: WorkoutConfig, progress: Progress, running: bool) -> Result<Self, EngineError> {
        config.validate()?;
        let state = if running {
            TimerState::Running(progress)
        } else {
            TimerState::Idle(progress)
        };
        Ok(Self { config, state })
    }
}
