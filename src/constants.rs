//! Fixed timing and protocol constants shared across the engine.

/// Steps in one full loop.
pub const LOOP_STEPS: u32 = 256;

/// Steps per quarter-note beat.
pub const STEPS_PER_BEAT: u32 = 4;

/// Steps per bar (4 beats).
pub const STEPS_PER_BAR: u32 = 16;

/// MIDI clock resolution: pulses per quarter note.
pub const MIDI_PPQ: u32 = 24;

/// MIDI clock pulses emitted per step (`MIDI_PPQ / STEPS_PER_BEAT`).
pub const PULSES_PER_STEP: u32 = 6;

/// Lower clamp for BPM accepted by [`crate::runtime_state::RuntimeState::set_bpm`].
pub const MIN_BPM: f64 = 1.0;

/// Upper clamp for BPM accepted by [`crate::runtime_state::RuntimeState::set_bpm`].
pub const MAX_BPM: f64 = 999.0;

/// Step-loop drift magnitude above which the anchor is reset.
pub const STEP_DRIFT_RESET_THRESHOLD_MS: f64 = 50.0;

/// Step-loop drift magnitude above which a warning is logged (but no reset).
pub const STEP_DRIFT_WARNING_THRESHOLD_MS: f64 = 20.0;

/// Clock-loop drift magnitude above which the anchor is reset.
///
/// Tighter than the step loop's threshold since pulses are finer-grained.
pub const CLOCK_DRIFT_RESET_THRESHOLD_MS: f64 = 30.0;

/// Clock-loop drift magnitude above which a warning is logged (but no reset).
pub const CLOCK_DRIFT_WARNING_THRESHOLD_MS: f64 = 15.0;

/// Floor/ceiling for the note-off loop's adaptive sleep, in milliseconds.
pub const NOTE_OFF_SLEEP_FLOOR_MS: u64 = 1;
/// See [`NOTE_OFF_SLEEP_FLOOR_MS`].
pub const NOTE_OFF_SLEEP_CEILING_MS: u64 = 10;

/// Starting sleep for the command loop's exponential backoff.
pub const COMMAND_BACKOFF_FLOOR_MS: u64 = 1;
/// Cap for the command loop's exponential backoff.
pub const COMMAND_BACKOFF_CEILING_MS: u64 = 50;

/// Heartbeat loop period.
pub const HEARTBEAT_PERIOD_SECS: u64 = 5;

/// Default telemetry queue capacity before drop-oldest kicks in.
pub const TELEMETRY_QUEUE_CAPACITY: usize = 64;

/// Standard MIDI CC numbers used by the modulation/track layer.
pub mod midi_cc {
    /// Modulation wheel.
    pub const MODWHEEL: u8 = 1;
    /// Breath controller.
    pub const BREATH: u8 = 2;
    /// Channel volume.
    pub const VOLUME: u8 = 7;
    /// Pan.
    pub const PAN: u8 = 10;
    /// Expression.
    pub const EXPRESSION: u8 = 11;
    /// Sustain pedal.
    pub const SUSTAIN: u8 = 64;
    /// Filter cutoff (NRPN-ish convention, widely used by synths).
    pub const CUTOFF: u8 = 74;
    /// Filter resonance.
    pub const RESONANCE: u8 = 71;
}
