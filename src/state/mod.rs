//! State management module
//!
//! This module contains the interval state machine, the session aggregate that
//! guards it, and the shared application state.

pub mod app_state;
pub mod estimator;
pub mod machine;
pub mod session;
pub mod timer_state;
pub mod workout;

// Re-export main types
pub use app_state::AppState;
pub use estimator::total_remaining;
pub use machine::{IntervalStateMachine, TickOutcome};
pub use session::{CuePoll, DispatchAttempt, Session, SessionSnapshot, TerminalNotice};
pub use timer_state::{PhaseEnd, PhaseFlags, Progress, TimerState};
pub use workout::{ConfigError, Intensity, WorkoutConfig};
