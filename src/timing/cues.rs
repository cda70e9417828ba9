//! Cue planning and polling
//!
//! [`boundaries`] walks the upcoming phase ends using the state machine's own
//! transition rule. Both the live "is a cue due now" check and the suspended
//! scheduler are built on it, so the two can never disagree about when a phase
//! or set ends.

use std::{collections::VecDeque, time::Duration};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;

use crate::state::{Intensity, PhaseEnd, Progress, WorkoutConfig};

/// Grace before `fire_at` within which a poll already counts a cue as due
const POLL_TOLERANCE_MS: i64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CueKind {
    /// Upcoming switch between intensities inside a set
    PhaseTransition,
    /// Countdown before the final phase of a set ends. `set` is the set simulated
    /// at planning time; the announcement uses the live set at dispatch.
    SetCompletion { set: u32 },
    /// Live-only announcement once the last phase ends
    WorkoutComplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScheduledCue {
    pub fire_at: DateTime<Utc>,
    pub kind: CueKind,
}

/// Seconds before a boundary each cue family fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CueLeads {
    pub phase: u32,
    pub set: u32,
}

/// End of one upcoming phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boundary {
    /// Seconds from now until the phase starts
    pub starts_in: u64,
    /// Seconds from now until the phase ends
    pub ends_in: u64,
    pub set: u32,
    pub intensity: Intensity,
    /// Whether this phase is the final one of its set
    pub ends_set: bool,
}

impl Boundary {
    /// The cue announcing this boundary and how long before it it fires
    pub fn cue(&self, leads: CueLeads) -> (u32, CueKind) {
        if self.ends_set {
            (leads.set, CueKind::SetCompletion { set: self.set })
        } else {
            (leads.phase, CueKind::PhaseTransition)
        }
    }

    /// Offset from now at which the cue fires, never before the phase begins
    pub fn cue_offset(&self, lead: u32) -> u64 {
        self.ends_in.saturating_sub(u64::from(lead)).max(self.starts_in)
    }
}

/// Iterator over the phase ends still ahead of `progress`
#[derive(Debug, Clone)]
pub struct Boundaries<'a> {
    config: &'a WorkoutConfig,
    next: Option<Progress>,
    elapsed: u64,
}

pub fn boundaries(progress: Progress, config: &WorkoutConfig) -> Boundaries<'_> {
    Boundaries {
        config,
        next: Some(progress),
        elapsed: 0,
    }
}

impl Iterator for Boundaries<'_> {
    type Item = Boundary;

    fn next(&mut self) -> Option<Boundary> {
        let current = self.next.take()?;
        let starts_in = self.elapsed;
        self.elapsed += u64::from(current.remaining);
        self.next = match current.end_phase(self.config) {
            PhaseEnd::Toggled(next) | PhaseEnd::SetAdvanced(next) => Some(next),
            PhaseEnd::Finished => None,
        };
        Some(Boundary {
            starts_in,
            ends_in: self.elapsed,
            set: current.set,
            intensity: current.intensity,
            ends_set: current.in_final_phase_of_set(),
        })
    }
}

/// Cue the foreground path should play for the running phase right now, if any
pub fn live_cue(progress: &Progress, config: &WorkoutConfig, leads: CueLeads) -> Option<CueKind> {
    if progress.warning_triggered {
        return None;
    }
    let boundary = boundaries(*progress, config).next()?;
    let (lead, kind) = boundary.cue(leads);
    (boundary.cue_offset(lead) == 0).then_some(kind)
}

/// `now` plus `secs`, or `None` when that lies outside chrono's range
pub fn fire_time(now: DateTime<Utc>, secs: u64) -> Option<DateTime<Utc>> {
    let secs = i64::try_from(secs).ok()?;
    now.checked_add_signed(ChronoDuration::try_seconds(secs)?)
}

/// Queue of cues to play while suspended, ordered by fire time
#[derive(Debug, Clone, Default)]
pub struct CueScheduler {
    queue: VecDeque<ScheduledCue>,
}

impl CueScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the queue with every cue due within `horizon` of `now`.
    ///
    /// Cues past the horizon, or past the representable calendar, are never planned.
    pub fn plan(
        &mut self,
        progress: &Progress,
        config: &WorkoutConfig,
        leads: CueLeads,
        now: DateTime<Utc>,
        horizon: Duration,
    ) {
        self.queue.clear();
        let horizon = horizon.as_secs();
        for (index, boundary) in boundaries(*progress, config).enumerate() {
            // The live path already spoke for the running phase
            if index == 0 && progress.warning_triggered {
                continue;
            }
            let (lead, kind) = boundary.cue(leads);
            let offset = boundary.cue_offset(lead);
            if offset > horizon {
                break;
            }
            let Some(fire_at) = fire_time(now, offset) else {
                break;
            };
            self.queue.push_back(ScheduledCue { fire_at, kind });
        }
    }

    /// Oldest cue whose fire time has arrived, allowing for poll granularity
    pub fn peek_due(&self, now: DateTime<Utc>) -> Option<&ScheduledCue> {
        self.queue
            .front()
            .filter(|cue| (now - cue.fire_at).num_milliseconds() > -POLL_TOLERANCE_MS)
    }

    /// Drop `cue` once it has been handled
    pub fn confirm(&mut self, cue: &ScheduledCue) -> bool {
        if self.queue.front() == Some(cue) {
            self.queue.pop_front();
            true
        } else {
            false
        }
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn pending(&self) -> impl Iterator<Item = &ScheduledCue> {
        self.queue.iter()
    }
}
