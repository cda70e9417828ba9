//! Background tasks module
//!
//! This module contains background tasks that run alongside the HTTP server.

pub mod cue_poller;
pub mod foreground_clock;
pub mod wake_detector;

// Re-export main functions
pub use cue_poller::cue_poller_task;
pub use foreground_clock::foreground_clock_task;
pub use wake_detector::wake_detector_task;
