//! External collaborators
//!
//! Audio playback, notification delivery and the host lifecycle sit behind
//! traits so the engine can be driven by fakes in tests.

pub mod audio;
pub mod dispatch;
pub mod lifecycle;
pub mod notify;

#[cfg(test)]
pub mod testing;

// Re-export main types
pub use audio::{AudioCueEngine, CommandAudioEngine};
pub use dispatch::{dispatch_cue, schedule_terminal_notifications, DispatchOutcome};
pub use lifecycle::{FixedBudgetHost, LifecycleEvent, LifecycleHost, LifecyclePhase};
pub use notify::{DesktopNotifier, NotificationGateway, BACKUP_NOTIFICATION_ID, TERMINAL_NOTIFICATION_ID};
