//! Once-only bookkeeping shared by the foreground and suspended dispatch paths

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

/// Phases at or below this length get the larger terminal buffer
const SHORT_PHASE_SECS: u32 = 15;

/// Extra seconds added to the completion estimate before scheduling the terminal notification
pub fn terminal_buffer(phase_duration: u32) -> u64 {
    if phase_duration <= SHORT_PHASE_SECS {
        8
    } else {
        5
    }
}

fn within(window: Duration, since: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    // A timestamp in the future (clock stepped back) also counts as recent
    match (now - since).to_std() {
        Ok(elapsed) => elapsed < window,
        Err(_) => true,
    }
}

/// Last dispatch time of each set's completion cue
#[derive(Debug, Clone)]
pub struct CueDeduplicator {
    window: Duration,
    retain: usize,
    last_fired: BTreeMap<u32, DateTime<Utc>>,
}

impl CueDeduplicator {
    pub fn new(window: Duration, retain: usize) -> Self {
        Self {
            window,
            retain: retain.max(1),
            last_fired: BTreeMap::new(),
        }
    }

    pub fn is_suppressed(&self, set: u32, now: DateTime<Utc>) -> bool {
        self.last_fired
            .get(&set)
            .is_some_and(|&fired| within(self.window, fired, now))
    }

    /// Record a successful dispatch for `set`
    pub fn record(&mut self, set: u32, now: DateTime<Utc>) {
        self.last_fired.insert(set, now);
        while self.last_fired.len() > self.retain {
            if let Some((evicted, _)) = self.last_fired.pop_first() {
                debug!("Dropping dedup history for set {}", evicted);
            }
        }
    }

    pub fn last_fired(&self, set: u32) -> Option<DateTime<Utc>> {
        self.last_fired.get(&set).copied()
    }

    pub fn clear(&mut self) {
        self.last_fired.clear();
    }
}

/// Guards the "workout complete" notification against resends
#[derive(Debug, Clone)]
pub struct TerminalNotificationGuard {
    window: Duration,
    last_sent: Option<DateTime<Utc>>,
    scheduled_for: Option<DateTime<Utc>>,
}

impl TerminalNotificationGuard {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_sent: None,
            scheduled_for: None,
        }
    }

    pub fn may_schedule(&self, now: DateTime<Utc>) -> bool {
        if self.last_sent.is_some_and(|sent| within(self.window, sent, now)) {
            return false;
        }
        !self.scheduled_for.is_some_and(|target| target > now)
    }

    pub fn record(&mut self, now: DateTime<Utc>, target: DateTime<Utc>) {
        self.last_sent = Some(now);
        self.scheduled_for = Some(target);
    }

    /// The pending notification was withdrawn; the send time still counts for the window
    pub fn cancel(&mut self) {
        self.scheduled_for = None;
    }

    pub fn scheduled_for(&self) -> Option<DateTime<Utc>> {
        self.scheduled_for
    }
}
