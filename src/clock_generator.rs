//! 24-PPQ MIDI clock pulse generation with drift correction.
//!
//! Mirrors the step loop's drift policy ([`crate::loop_engine`]) at a finer
//! grain: pulses rather than steps, tighter thresholds since a pulse is a
//! sixth of a step.

use crate::constants::{
    CLOCK_DRIFT_RESET_THRESHOLD_MS, CLOCK_DRIFT_WARNING_THRESHOLD_MS, PULSES_PER_STEP,
};
use std::time::{Duration, Instant};

/// Outcome of advancing the generator by one pulse.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PulseOutcome {
    /// Pulse count after this tick (1-based following a reset).
    pub pulse_count: u64,
    /// Signed drift from the expected pulse time, in milliseconds. Positive
    /// means the tick arrived late.
    pub drift_ms: f64,
    /// Whether this tick's drift exceeded the reset threshold and the
    /// anchor was moved to `now`.
    pub reset: bool,
    /// Whether this reset was silenced by a prior [`ClockGenerator::suppress_next_drift_reset`]
    /// latch: true when the reset happened because of the latch rather than
    /// because drift genuinely crossed the threshold. Suppressed resets do
    /// not count toward [`DriftStats::reset_count`].
    pub suppressed: bool,
}

/// Cumulative drift statistics since the generator was created or last reset
/// via [`ClockGenerator::reset_stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DriftStats {
    /// Number of anchor resets triggered by excessive drift.
    pub reset_count: u64,
    /// Largest absolute drift magnitude observed, in milliseconds.
    pub max_drift_ms: f64,
}

/// Generates MIDI clock pulses at 24 PPQ, correcting for scheduler jitter by
/// resetting its anchor whenever drift exceeds a threshold.
///
/// Holds only a timing anchor and pulse counter; it does not own a MIDI
/// connection itself; the loop driving it (in [`crate::loop_engine`]) sends
/// the actual clock byte through whatever `MidiOutput` the engine was built
/// with, and issues Start/Stop/Continue separately (outside this type), per
/// the design note on narrow interfaces.
#[derive(Debug)]
pub struct ClockGenerator {
    anchor: Instant,
    pulse_count: u64,
    suppress_next_reset: bool,
    stats: DriftStats,
}

impl ClockGenerator {
    /// Starts a new generator anchored at `now`.
    pub fn new(now: Instant) -> Self {
        Self {
            anchor: now,
            pulse_count: 0,
            suppress_next_reset: false,
            stats: DriftStats::default(),
        }
    }

    /// Re-anchors immediately and latches a flag that forces the *next*
    /// regular tick to also reset, rather than evaluate drift normally.
    /// Used when the engine just changed tempo or resumed from a pause,
    /// where the old anchor is meaningless.
    pub fn suppress_next_drift_reset(&mut self, now: Instant) {
        self.anchor = now;
        self.pulse_count = 0;
        self.suppress_next_reset = true;
    }

    /// Duration of one pulse at `bpm` (`step_duration / PULSES_PER_STEP`).
    pub fn pulse_duration(bpm: f64) -> Duration {
        let step_duration = Duration::from_secs_f64(60.0 / bpm / crate::constants::STEPS_PER_BEAT as f64);
        step_duration / PULSES_PER_STEP
    }

    /// Advances the generator by one pulse, given the current wall time and
    /// tempo. After a reset, `pulse_count` is 1, not 0: the pulse that
    /// triggered the reset still counts as having fired.
    pub fn tick(&mut self, now: Instant, bpm: f64) -> PulseOutcome {
        let pulse_duration = Self::pulse_duration(bpm);
        let expected = self.anchor + pulse_duration * self.pulse_count as u32;
        let drift_ms = now.saturating_duration_since(expected).as_secs_f64() * 1000.0
            - expected.saturating_duration_since(now).as_secs_f64() * 1000.0;

        let breaches_threshold = drift_ms.abs() > CLOCK_DRIFT_RESET_THRESHOLD_MS;
        let suppressed = self.suppress_next_reset;
        let reset = suppressed || breaches_threshold;

        if reset {
            self.anchor = now;
            self.pulse_count = 1;
            self.suppress_next_reset = false;
            if !suppressed {
                self.stats.reset_count += 1;
                tracing::warn!(
                    drift_ms,
                    direction = if drift_ms >= 0.0 { "behind" } else { "ahead" },
                    "clock drift reset"
                );
            }
        } else {
            self.pulse_count += 1;
            if drift_ms.abs() > CLOCK_DRIFT_WARNING_THRESHOLD_MS {
                tracing::warn!(drift_ms, "clock drift warning");
            }
        }

        self.stats.max_drift_ms = self.stats.max_drift_ms.max(drift_ms.abs());

        PulseOutcome {
            pulse_count: self.pulse_count,
            drift_ms,
            reset,
            suppressed,
        }
    }

    /// Whether this pulse count lands on a step boundary (once every
    /// [`PULSES_PER_STEP`] pulses).
    pub fn is_step_boundary(&self) -> bool {
        self.pulse_count % PULSES_PER_STEP as u64 == 0
    }

    /// Cumulative drift statistics.
    pub fn get_drift_stats(&self) -> DriftStats {
        self.stats
    }

    /// Clears cumulative drift statistics without touching the anchor.
    pub fn reset_stats(&mut self) {
        self.stats = DriftStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn on_time_ticks_increment_without_reset() {
        let start = Instant::now();
        let mut clock = ClockGenerator::new(start);
        let pulse_duration = ClockGenerator::pulse_duration(120.0);
        let outcome = clock.tick(start + pulse_duration, 120.0);
        assert_eq!(outcome.pulse_count, 1);
        assert!(!outcome.reset);
    }

    #[test]
    fn large_drift_triggers_reset_and_counter_equals_one() {
        let start = Instant::now();
        let mut clock = ClockGenerator::new(start);
        let late = start + Duration::from_millis(200);
        let outcome = clock.tick(late, 120.0);
        assert!(outcome.reset);
        assert_eq!(outcome.pulse_count, 1);
        assert_eq!(clock.get_drift_stats().reset_count, 1);
    }

    #[test]
    fn suppressed_reset_forces_next_tick_to_reset() {
        let start = Instant::now();
        let mut clock = ClockGenerator::new(start);
        clock.suppress_next_drift_reset(start);
        let pulse_duration = ClockGenerator::pulse_duration(120.0);
        let outcome = clock.tick(start + pulse_duration, 120.0);
        assert!(outcome.reset);
        assert!(outcome.suppressed);
        assert_eq!(outcome.pulse_count, 1);
        assert_eq!(clock.get_drift_stats().reset_count, 0);
    }

    #[test]
    fn step_boundary_fires_every_six_pulses() {
        let start = Instant::now();
        let mut clock = ClockGenerator::new(start);
        let pulse_duration = ClockGenerator::pulse_duration(120.0);
        let mut boundaries = 0;
        for i in 1..=12u32 {
            clock.tick(start + pulse_duration * i, 120.0);
            if clock.is_step_boundary() {
                boundaries += 1;
            }
        }
        assert_eq!(boundaries, 2);
    }
}
