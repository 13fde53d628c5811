//! Layer 1 of the session's 3-layer data model: global performance settings.

use crate::constants::LOOP_STEPS;
use serde::{Deserialize, Serialize};

/// A chord definition used by chord-progression-aware sequences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chord {
    /// Chord name (e.g. `"Cmaj7"`).
    pub name: String,
    /// Length in steps; `None` means "divide the bar equally".
    pub length: Option<u32>,
}

/// Global performance settings (Layer 1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Environment {
    /// Tempo in beats per minute.
    pub bpm: f64,
    /// Named scale used for note resolution.
    pub scale: String,
    /// Default gate length (fraction of a step) applied when a track omits one.
    pub default_gate: f64,
    /// Swing amount, 0.0 = none.
    pub swing: f64,
    /// Steps in one loop. Fixed at [`LOOP_STEPS`]; carried as a field only
    /// because the wire format includes it.
    pub loop_steps: u32,
    /// Chord progression, if any.
    pub chords: Vec<Chord>,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            scale: "C_major".to_string(),
            default_gate: 1.0,
            swing: 0.0,
            loop_steps: LOOP_STEPS,
            chords: Vec::new(),
        }
    }
}
