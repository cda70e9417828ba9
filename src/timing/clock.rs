//! Drift compensation for the one-second foreground driver

use tokio::time::Instant;

/// Turns irregular timer fires into a whole number of elapsed seconds.
///
/// A fire arriving more than `threshold` seconds after the previous one is
/// treated as coalesced: the whole missed seconds are replayed, plus one more
/// if the leftover fraction exceeds `fraction`.
#[derive(Debug, Clone)]
pub struct DriftCompensator {
    last_fire: Option<Instant>,
    threshold: f64,
    fraction: f64,
}

impl DriftCompensator {
    pub fn new(threshold: f64, fraction: f64) -> Self {
        Self {
            last_fire: None,
            threshold,
            fraction,
        }
    }

    /// Start measuring from `now`
    pub fn anchor(&mut self, now: Instant) {
        self.last_fire = Some(now);
    }

    pub fn last_fire(&self) -> Option<Instant> {
        self.last_fire
    }

    /// Number of ticks owed for a fire at `now`, including the regular one
    pub fn ticks_due(&mut self, now: Instant) -> u32 {
        let Some(last) = self.last_fire.replace(now) else {
            return 1;
        };
        let delta = now.saturating_duration_since(last).as_secs_f64();
        if delta <= self.threshold {
            return 1;
        }

        let missed = delta - 1.0;
        let extra = missed.floor();
        let mut ticks = extra as u32;
        if missed - extra > self.fraction {
            ticks += 1;
        }
        ticks + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn fire_after(millis: u64) -> u32 {
        let start = Instant::now();
        let mut clock = DriftCompensator::new(1.2, 0.7);
        clock.anchor(start);
        clock.ticks_due(start + Duration::from_millis(millis))
    }

    #[test]
    fn on_time_fire_is_one_tick() {
        assert_eq!(fire_after(1_000), 1);
        assert_eq!(fire_after(1_150), 1);
        assert_eq!(fire_after(400), 1);
    }

    #[test]
    fn late_fire_replays_whole_missed_seconds() {
        assert_eq!(fire_after(3_500), 3);
        assert_eq!(fire_after(2_000), 2);
    }

    #[test]
    fn large_fraction_rounds_up() {
        // 1.9s: no whole missed second but 0.9 of one
        assert_eq!(fire_after(1_900), 2);
        assert_eq!(fire_after(4_750), 5);
        assert_eq!(fire_after(4_650), 4);
    }

    #[test]
    fn each_fire_reanchors() {
        let start = Instant::now();
        let mut clock = DriftCompensator::new(1.2, 0.7);
        clock.anchor(start);
        assert_eq!(clock.ticks_due(start + Duration::from_secs(5)), 5);
        assert_eq!(clock.ticks_due(start + Duration::from_secs(6)), 1);
        assert_eq!(clock.last_fire(), Some(start + Duration::from_secs(6)));
    }

    #[test]
    fn unanchored_fire_counts_once() {
        let mut clock = DriftCompensator::new(1.2, 0.7);
        assert_eq!(clock.ticks_due(Instant::now()), 1);
    }
}
