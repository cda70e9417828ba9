//! Interval Coach - a suspension-tolerant interval training timer engine
//!
//! This library advances low/high intensity phases across a configured number
//! of sets, replays time lost while the host was suspended, and schedules audio
//! cues and notifications so each one fires exactly once.

pub mod api;
pub mod config;
pub mod error;
pub mod services;
pub mod state;
pub mod tasks;
pub mod timing;
pub mod utils;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use api::create_router;
pub use config::Config;
pub use error::EngineError;
pub use state::{AppState, IntervalStateMachine, TimerState, WorkoutConfig};
pub use timing::TimingConfig;
pub use utils::signals::shutdown_signal;
