//! Workout configuration and validation

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Intensity of a single phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Intensity {
    Low,
    High,
}

impl Intensity {
    /// The other intensity of the pair
    pub fn toggled(self) -> Self {
        match self {
            Intensity::Low => Intensity::High,
            Intensity::High => Intensity::Low,
        }
    }
}

impl fmt::Display for Intensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intensity::Low => write!(f, "low"),
            Intensity::High => write!(f, "high"),
        }
    }
}

/// Reasons a workout configuration cannot produce a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("phase duration must be greater than zero")]
    ZeroPhaseDuration,
    #[error("a workout needs at least one set")]
    ZeroSets,
    #[error("phase duration does not fit in {} seconds", u32::MAX)]
    PhaseTooLong,
}

/// Immutable description of a workout, fixed once a run starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkoutConfig {
    pub phase_minutes: u32,
    pub phase_seconds: u32,
    pub sets: u32,
    pub start_intensity: Intensity,
}

impl WorkoutConfig {
    pub fn new(phase_minutes: u32, phase_seconds: u32, sets: u32, start_intensity: Intensity) -> Self {
        Self {
            phase_minutes,
            phase_seconds,
            sets,
            start_intensity,
        }
    }

    /// Length of one phase in seconds, or `None` if it overflows
    pub fn checked_phase_duration(&self) -> Option<u32> {
        self.phase_minutes.checked_mul(60)?.checked_add(self.phase_seconds)
    }

    /// Length of one phase in seconds. Saturates for configs that fail [`Self::validate`].
    pub fn phase_duration(&self) -> u32 {
        self.phase_minutes
            .saturating_mul(60)
            .saturating_add(self.phase_seconds)
    }

    /// Length of the whole workout in seconds: two phases per set
    pub fn total_duration(&self) -> u64 {
        u64::from(self.phase_duration()) * 2 * u64::from(self.sets)
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let Some(phase) = self.checked_phase_duration() else {
            return Err(ConfigError::PhaseTooLong);
        };
        if phase == 0 {
            return Err(ConfigError::ZeroPhaseDuration);
        }
        if self.sets == 0 {
            return Err(ConfigError::ZeroSets);
        }
        Ok(())
    }
}

impl Default for WorkoutConfig {
    fn default() -> Self {
        Self::new(1, 30, 8, Intensity::Low)
    }
}
