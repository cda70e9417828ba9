//! Host lifecycle: foreground/background transitions and background execution budget

use std::{
    fmt,
    sync::atomic::{AtomicU32, Ordering},
    time::Duration,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Host visibility as reported by the lifecycle source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecyclePhase {
    Active,
    Inactive,
    Suspended,
}

impl LifecyclePhase {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            "suspended" => Some(Self::Suspended),
            _ => None,
        }
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Inactive => write!(f, "inactive"),
            Self::Suspended => write!(f, "suspended"),
        }
    }
}

/// A lifecycle transition with the wall time it happened at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub phase: LifecyclePhase,
    pub at: DateTime<Utc>,
}

/// Grants background execution time while suspended
pub trait LifecycleHost: Send + Sync {
    /// Initial budget for a new suspension, `None` if no background time is granted
    fn begin_background(&self) -> Option<Duration>;
    /// Ask for more time once the current budget expired
    fn request_renewal(&self) -> Option<Duration>;
}

/// Host that grants a fixed budget and a bounded number of renewals per suspension
#[derive(Debug)]
pub struct FixedBudgetHost {
    grant: Duration,
    max_renewals: u32,
    renewals_left: AtomicU32,
}

impl FixedBudgetHost {
    pub fn new(grant: Duration, max_renewals: u32) -> Self {
        Self {
            grant,
            max_renewals,
            renewals_left: AtomicU32::new(max_renewals),
        }
    }
}

impl LifecycleHost for FixedBudgetHost {
    fn begin_background(&self) -> Option<Duration> {
        self.renewals_left.store(self.max_renewals, Ordering::SeqCst);
        (!self.grant.is_zero()).then_some(self.grant)
    }

    fn request_renewal(&self) -> Option<Duration> {
        let renewed = self
            .renewals_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if renewed && !self.grant.is_zero() {
            info!("Background budget renewed for {}s", self.grant.as_secs());
            Some(self.grant)
        } else {
            None
        }
    }
}
