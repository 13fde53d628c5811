//! Mixer bus/group definitions: shared spatial effects and dynamics.
//!
//! Mixer lines are carried as addressable, mergeable state and surfaced in
//! telemetry/status payloads, but the step loop never routes audio through
//! them (audio synthesis is an explicit non-goal of the engine).

use serde::{Deserialize, Serialize};

/// Limiter/compression settings shared by every track routed to a mixer line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixerLineDynamics {
    /// Whether the limiter is engaged.
    pub limiter: bool,
    /// Limiter algorithm: 0=off, 1=tanh, 2=compress.
    pub limiter_type: i32,
    /// Compression ratio; 1.0 = no compression.
    pub compression_ratio: f64,
    /// Compression threshold; 1.0 = no compression.
    pub compression_threshold: f64,
}

impl Default for MixerLineDynamics {
    fn default() -> Self {
        Self {
            limiter: true,
            limiter_type: 1,
            compression_ratio: 1.0,
            compression_threshold: 1.0,
        }
    }
}

/// Spatial effects shared by every track routed to a mixer line.
///
/// Distinct from [`super::track::TrackFxParams`], which handles per-track
/// tone-shaping (filter, distortion, envelope) instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixerLineFx {
    /// Reverb send amount.
    pub reverb_room: f64,
    /// Reverb room size.
    pub reverb_size: f64,
    /// Reverb dry signal level.
    pub reverb_dry: f64,
    /// Delay send amount.
    pub delay_send: f64,
    /// Delay time (s).
    pub delay_time: f64,
    /// Delay feedback amount.
    pub delay_feedback: f64,
    /// Leslie rotation speed; 0 = off.
    pub leslie_rate: f64,
    /// Leslie effect depth.
    pub leslie_size: f64,
}

impl Default for MixerLineFx {
    fn default() -> Self {
        Self {
            reverb_room: 0.0,
            reverb_size: 0.5,
            reverb_dry: 1.0,
            delay_send: 0.0,
            delay_time: 0.375,
            delay_feedback: 0.4,
            leslie_rate: 0.0,
            leslie_size: 0.0,
        }
    }
}

/// A mixer bus/group: tracks routed to it via [`super::track::Send`]
/// share its dynamics and spatial effects.
///
/// Signal flow (conceptual, not executed by this engine):
/// track sound -> track fx -> mixer line dynamics -> mixer line fx -> output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixerLine {
    /// Unique identifier for this mixer line.
    pub name: String,
    /// Track ids that belong to this mixer line.
    pub include: Vec<String>,
    /// Master volume, 0.0-2.0.
    pub volume: f64,
    /// Pan position, 0.0 = left, 1.0 = right.
    pub pan: f64,
    /// Mute state.
    pub mute: bool,
    /// Solo state.
    pub solo: bool,
    /// Physical output channel, 0-7.
    pub output: u8,
    /// Limiter/compression settings.
    pub dynamics: MixerLineDynamics,
    /// Spatial effects.
    pub fx: MixerLineFx,
}

impl Default for MixerLine {
    fn default() -> Self {
        Self {
            name: String::new(),
            include: Vec::new(),
            volume: 1.0,
            pan: 0.5,
            mute: false,
            solo: false,
            output: 0,
            dynamics: MixerLineDynamics::default(),
            fx: MixerLineFx::default(),
        }
    }
}
