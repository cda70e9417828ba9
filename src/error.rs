//! Engine error types

use thiserror::Error;

use crate::state::ConfigError;

/// Errors surfaced by engine commands
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("invalid workout configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
    #[error("configuration can only change while the timer is idle")]
    NotIdle,
    #[error("workout already completed, reset before starting again")]
    AlreadyCompleted,
    #[error("failed to lock session state: {0}")]
    LockPoisoned(String),
}
