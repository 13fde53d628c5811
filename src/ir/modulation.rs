//! Modulation routing data.
//!
//! Modulation *evaluation* (turning a signal expression into a per-step
//! value) belongs to the DSL compiler, which is out of scope for this
//! engine (see spec.md §1: "the core consumes the already-compiled
//! batch"). [`Modulation`] exists here only so `Track`/`TrackMidi` round-
//! trip completely; the engine stores and merges it but never evaluates it.

use serde::{Deserialize, Serialize};

/// How a modulation signal is combined with a parameter's base value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModulationType {
    /// `base + signal * range`.
    Additive,
    /// `base * (1 + signal)`.
    #[serde(rename = "mult")]
    Multiplicative,
    /// `center + signal * half_range`.
    Bipolar,
}

/// A modulation routing: a named target parameter, an application mode,
/// and an opaque handle to the compiler-side signal expression that drives
/// it. The expression itself is never interpreted by this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Modulation {
    /// Name of the parameter this modulation targets (e.g. `"cutoff"`).
    pub target: String,
    /// Application mode.
    pub mod_type: ModulationType,
    /// Opaque, compiler-produced signal expression (never evaluated here).
    pub signal: serde_json::Value,
}
