//! The single mutable aggregate behind the session mutex
//!
//! Every entry point here runs with the session lock held, so ticks, suspend and
//! resume events and cue polls from independent timer sources never observe a
//! half-applied step. Each cancelling command bumps [`Session::generation`];
//! background work carries the generation it was started under and gives up as
//! soon as it no longer matches.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::{sync::oneshot, time::Instant};
use tracing::{debug, info, warn};

use super::estimator::{total_remaining_for, total_remaining_for_state};
use super::machine::{IntervalStateMachine, TickOutcome};
use super::timer_state::TimerState;
use super::workout::WorkoutConfig;
use crate::error::EngineError;
use crate::services::{AudioCueEngine, LifecyclePhase};
use crate::timing::{
    fire_time, live_cue, terminal_buffer, CueDeduplicator, CueKind, CueLeads, CueScheduler, DriftCompensator,
    ReconcileOutcome, ScheduledCue, StalePolicy, SuspensionReconciler, TerminalNotificationGuard,
    TimingConfig,
};

/// Result of one foreground timer fire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForegroundReport {
    pub ticks: u32,
    /// Boundary crossings, in order
    pub transitions: Vec<TickOutcome>,
    pub cue: Option<CueKind>,
    /// Generation to dispatch `cue` under
    pub generation: u64,
}

/// State of the suspended cue queue at poll time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CuePoll {
    Cancelled,
    Exhausted,
    Waiting,
    Due(ScheduledCue),
}

/// Result of a single dispatch try
#[derive(Debug)]
pub enum DispatchAttempt {
    Cancelled,
    Busy,
    Suppressed { set: u32 },
    Played { done: Option<oneshot::Receiver<()>> },
    Failed,
}

/// Terminal notification to hand to the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalNotice {
    pub delay: Duration,
    pub backup_delay: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuspendReport {
    pub generation: u64,
    pub planned: usize,
    pub notice: Option<TerminalNotice>,
}

/// Serializable view of the session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub config: WorkoutConfig,
    pub timer: TimerState,
    pub total_remaining_seconds: u64,
    pub lifecycle: LifecyclePhase,
    pub suspended_at: Option<DateTime<Utc>>,
    pub pending_cues: Vec<ScheduledCue>,
    pub generation: u64,
}

#[derive(Debug)]
pub struct Session {
    machine: IntervalStateMachine,
    timing: TimingConfig,
    leads: CueLeads,
    clock: DriftCompensator,
    reconciler: SuspensionReconciler,
    scheduler: CueScheduler,
    dedup: CueDeduplicator,
    terminal: TerminalNotificationGuard,
    lifecycle: LifecyclePhase,
    suspended_at: Option<DateTime<Utc>>,
    /// Wall time up to which suspended time has been replayed
    reconciled_until: Option<DateTime<Utc>>,
    generation: u64,
}

impl Session {
    /// `tone_duration` sizes the phase-transition lead, rounded up to whole seconds
    pub fn new(config: WorkoutConfig, timing: TimingConfig, tone_duration: Duration) -> Result<Self, EngineError> {
        let machine = IntervalStateMachine::new(config)?;
        let leads = CueLeads {
            phase: tone_duration.as_secs_f64().ceil() as u32,
            set: timing.set_lead_secs,
        };
        Ok(Self {
            machine,
            leads,
            clock: DriftCompensator::new(timing.drift_threshold, timing.drift_fraction),
            reconciler: SuspensionReconciler::new(timing.min_resume, timing.max_resume, timing.drift_fraction),
            scheduler: CueScheduler::new(),
            dedup: CueDeduplicator::new(timing.dedup_window, timing.dedup_retain),
            terminal: TerminalNotificationGuard::new(timing.dedup_window),
            lifecycle: LifecyclePhase::Active,
            suspended_at: None,
            reconciled_until: None,
            generation: 0,
            timing,
        })
    }

    pub fn machine(&self) -> &IntervalStateMachine {
        &self.machine
    }

    pub fn timing(&self) -> &TimingConfig {
        &self.timing
    }

    pub fn leads(&self) -> CueLeads {
        self.leads
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn lifecycle(&self) -> LifecyclePhase {
        self.lifecycle
    }

    pub fn pending_cues(&self) -> usize {
        self.scheduler.len()
    }

    /// Whether the foreground clock should be counting seconds
    pub fn is_ticking(&self) -> bool {
        self.machine.is_running() && self.lifecycle != LifecyclePhase::Suspended
    }

    /// Drop all outstanding work started under the current generation
    fn invalidate(&mut self) {
        self.generation += 1;
        self.scheduler.clear();
    }

    // Commands

    pub fn configure(&mut self, config: WorkoutConfig) -> Result<(), EngineError> {
        self.machine.set_config(config)?;
        self.dedup.clear();
        self.invalidate();
        info!(
            "Workout configured: {} sets of {}s phases starting {}",
            config.sets,
            config.phase_duration(),
            config.start_intensity
        );
        Ok(())
    }

    /// Starting while suspended plans the background cues straight away
    pub fn start(&mut self, now: Instant, now_wall: DateTime<Utc>) -> Result<Option<SuspendReport>, EngineError> {
        self.machine.start()?;
        self.clock.anchor(now);
        self.invalidate();
        if self.lifecycle != LifecyclePhase::Suspended {
            return Ok(None);
        }
        self.suspended_at = Some(now_wall);
        let report = self.plan_background(now_wall);
        info!("Started while suspended with {} cue(s) planned", report.planned);
        Ok(Some(report))
    }

    /// A pause while suspended first counts the time already spent in the background
    pub fn pause(&mut self, now_wall: DateTime<Utc>) -> bool {
        if self.lifecycle == LifecyclePhase::Suspended && self.machine.is_running() {
            let outcome = self.replay_suspension(now_wall);
            debug!("Suspended time counted before pausing: {:?}", outcome);
            self.suspended_at = Some(now_wall);
        }
        let paused = self.machine.pause();
        self.terminal.cancel();
        self.invalidate();
        paused
    }

    /// End the run and return to the configured start. Returns false if nothing was running.
    pub fn stop(&mut self) -> bool {
        let was_running = self.machine.is_running();
        self.reset();
        was_running
    }

    pub fn reset(&mut self) {
        self.machine.reset();
        self.dedup.clear();
        self.terminal.cancel();
        self.invalidate();
    }

    // Foreground path

    /// Handle one foreground timer fire started under `generation`
    pub fn foreground_fire(&mut self, generation: u64, now: Instant) -> Option<ForegroundReport> {
        if generation != self.generation || !self.is_ticking() {
            return None;
        }

        let ticks = self.clock.ticks_due(now);
        if ticks > 1 {
            debug!("Timer fire was late, counting {} seconds", ticks);
        }

        let mut transitions = Vec::new();
        for _ in 0..ticks {
            match self.machine.tick() {
                TickOutcome::Counted | TickOutcome::Inactive => {}
                outcome => {
                    transitions.push(outcome);
                    if outcome == TickOutcome::Completed {
                        break;
                    }
                }
            }
        }

        let cue = if self.machine.state().is_completed() {
            info!("Workout complete");
            self.invalidate();
            Some(CueKind::WorkoutComplete)
        } else {
            self.machine
                .state()
                .progress()
                .and_then(|progress| live_cue(progress, self.machine.config(), self.leads))
        };
        if matches!(cue, Some(CueKind::PhaseTransition | CueKind::SetCompletion { .. })) {
            self.machine.mark_warning();
        }

        Some(ForegroundReport {
            ticks,
            transitions,
            cue,
            generation: self.generation,
        })
    }

    // Lifecycle

    /// Host went to the background. Plans cues for the rest of the run.
    pub fn enter_suspension(&mut self, now: DateTime<Utc>) -> Option<SuspendReport> {
        if self.lifecycle == LifecyclePhase::Suspended {
            debug!("Already suspended, ignoring duplicate suspension");
            return None;
        }
        self.lifecycle = LifecyclePhase::Suspended;
        self.suspended_at = Some(now);
        self.invalidate();

        let report = self.plan_background(now);
        info!("Suspended with {} cue(s) planned", report.planned);
        Some(report)
    }

    /// Plan the cues and completion notice for a run going on in the background.
    /// Nothing past `max_resume` is planned since a longer gap is never replayed.
    fn plan_background(&mut self, now: DateTime<Utc>) -> SuspendReport {
        let mut notice = None;
        if let TimerState::Running(progress) = *self.machine.state() {
            self.scheduler
                .plan(&progress, self.machine.config(), self.leads, now, self.timing.max_resume);
            notice = self.terminal_notice(now);
        }
        SuspendReport {
            generation: self.generation,
            planned: self.scheduler.len(),
            notice,
        }
    }

    fn terminal_notice(&mut self, now: DateTime<Utc>) -> Option<TerminalNotice> {
        if !self.terminal.may_schedule(now) {
            debug!("Terminal notification already pending or recently sent");
            return None;
        }
        let progress = self.machine.state().progress()?;
        let config = self.machine.config();
        let delay_secs = total_remaining_for(progress, config).saturating_add(terminal_buffer(config.phase_duration()));
        let Some(fires_at) = fire_time(now, delay_secs) else {
            warn!("Workout ends {}s from now, too far out to notify", delay_secs);
            return None;
        };
        let delay = Duration::from_secs(delay_secs);

        self.terminal.record(now, fires_at);
        Some(TerminalNotice {
            delay,
            backup_delay: self
                .timing
                .backup_notification
                .and_then(|extra| delay.checked_add(extra)),
        })
    }

    /// Host came back. Replays the suspended gap and re-anchors the foreground clock.
    pub fn resume(&mut self, phase: LifecyclePhase, now_wall: DateTime<Utc>, now: Instant) -> ReconcileOutcome {
        let outcome = self.replay_suspension(now_wall);
        self.clock.anchor(now);
        self.lifecycle = phase;
        self.terminal.cancel();
        self.invalidate();
        outcome
    }

    /// Count the time since `suspended_at` exactly once
    fn replay_suspension(&mut self, now_wall: DateTime<Utc>) -> ReconcileOutcome {
        let elapsed = self
            .suspended_at
            .take()
            .and_then(|at| (now_wall - at).to_std().ok())
            .unwrap_or_default();

        let outcome = self.reconciler.reconcile(&mut self.machine, elapsed);
        if let ReconcileOutcome::Stale { elapsed_secs } = outcome {
            if self.timing.stale_policy == StalePolicy::Complete {
                warn!("Session stale after {}s, marking workout complete", elapsed_secs);
                self.machine.complete();
            }
        }
        self.reconciled_until = Some(now_wall);
        outcome
    }

    /// Host moved between foreground states, or came back from suspension
    pub fn set_lifecycle(&mut self, phase: LifecyclePhase, now_wall: DateTime<Utc>, now: Instant) -> Option<ReconcileOutcome> {
        match (self.lifecycle, phase) {
            (_, LifecyclePhase::Suspended) => {
                self.enter_suspension(now_wall);
                None
            }
            (LifecyclePhase::Suspended, _) => Some(self.resume(phase, now_wall, now)),
            _ => {
                self.lifecycle = phase;
                None
            }
        }
    }

    /// The whole host slept without a suspension event; replay the gap it left
    pub fn absorb_sleep(&mut self, slept_from: DateTime<Utc>, now_wall: DateTime<Utc>, now: Instant) -> Option<ReconcileOutcome> {
        if self.lifecycle == LifecyclePhase::Suspended {
            return None;
        }
        // A lifecycle resume may already have counted part of this sleep
        let slept_from = match self.reconciled_until {
            Some(until) if until > slept_from => until,
            _ => slept_from,
        };
        let gap = (now_wall - slept_from).to_std().unwrap_or_default();
        if gap < self.timing.min_resume {
            debug!("Sleep of {}ms already reconciled", gap.as_millis());
            return None;
        }
        self.suspended_at = Some(slept_from);
        Some(self.resume(self.lifecycle, now_wall, now))
    }

    // Suspended path

    pub fn poll_cue(&self, generation: u64, now: DateTime<Utc>) -> CuePoll {
        if generation != self.generation {
            return CuePoll::Cancelled;
        }
        if self.scheduler.is_empty() {
            return CuePoll::Exhausted;
        }
        match self.scheduler.peek_due(now) {
            Some(cue) => CuePoll::Due(*cue),
            None => CuePoll::Waiting,
        }
    }

    pub fn confirm_cue(&mut self, generation: u64, cue: &ScheduledCue) -> bool {
        generation == self.generation && self.scheduler.confirm(cue)
    }

    /// Set the run is in at `now`, projecting across an ongoing suspension
    pub fn current_set_at(&self, now: DateTime<Utc>) -> u32 {
        let sets = self.machine.config().sets;
        match (self.machine.state(), self.suspended_at) {
            (TimerState::Running(_), Some(since)) => {
                let elapsed = (now - since).to_std().map(|d| d.as_secs()).unwrap_or(0);
                let mut projected = self.machine.clone();
                projected.advance_by(elapsed);
                projected.state().progress().map(|p| p.set).unwrap_or(sets)
            }
            (TimerState::Running(progress) | TimerState::Idle(progress), _) => progress.set,
            (TimerState::Completed, _) => sets,
        }
    }

    /// Try to play `kind` once. Both dispatch paths come through here.
    pub fn try_dispatch(
        &mut self,
        generation: u64,
        kind: CueKind,
        now: DateTime<Utc>,
        audio: &dyn AudioCueEngine,
    ) -> DispatchAttempt {
        if generation != self.generation {
            return DispatchAttempt::Cancelled;
        }
        if audio.is_busy() {
            return DispatchAttempt::Busy;
        }

        let sets = self.machine.config().sets;
        match kind {
            CueKind::PhaseTransition => {
                if audio.play_tone() {
                    DispatchAttempt::Played { done: None }
                } else {
                    DispatchAttempt::Failed
                }
            }
            CueKind::SetCompletion { set: planned } => {
                let set = self.current_set_at(now);
                if set != planned {
                    debug!("Set cue planned for set {} fires during set {}", planned, set);
                }
                if self.dedup.is_suppressed(set, now) {
                    debug!("Set {} completion cue already played", set);
                    return DispatchAttempt::Suppressed { set };
                }
                let (spoken, done) = audio.speak(&format!("Set {} of {} finishing", set, sets));
                if spoken {
                    self.dedup.record(set, now);
                    DispatchAttempt::Played { done: Some(done) }
                } else {
                    DispatchAttempt::Failed
                }
            }
            CueKind::WorkoutComplete => {
                let (spoken, done) = audio.speak("Workout complete");
                if spoken {
                    DispatchAttempt::Played { done: Some(done) }
                } else {
                    DispatchAttempt::Failed
                }
            }
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let config = *self.machine.config();
        SessionSnapshot {
            config,
            timer: *self.machine.state(),
            total_remaining_seconds: total_remaining_for_state(self.machine.state(), &config),
            lifecycle: self.lifecycle,
            suspended_at: self.suspended_at,
            pending_cues: self.scheduler.pending().copied().collect(),
            generation: self.generation,
        }
    }
}
