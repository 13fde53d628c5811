//! Layer 2 of the session's 3-layer data model: per-track sound, effects and routing.

use super::modulation::Modulation;
use crate::param_value::ParamValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Track identity and transport flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackMeta {
    /// Stable track identifier.
    pub track_id: String,
    /// Output bus / range grouping (sender-specific, opaque to the engine).
    pub range_id: i32,
    /// Muted tracks are excluded from [`crate::runtime_state::RuntimeState::get_active_tracks`].
    pub mute: bool,
    /// Soloed tracks, if any exist, are the *only* ones returned by the same filter.
    pub solo: bool,
}

impl Default for TrackMeta {
    fn default() -> Self {
        Self {
            track_id: String::new(),
            range_id: 2,
            mute: false,
            solo: false,
        }
    }
}

/// Sound-selection and voice parameters for a track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackParams {
    /// Resolved sound name (e.g. `"super808"`).
    pub s: String,
    /// Original hierarchical path the sound was resolved from.
    pub s_path: String,
    /// Sample index within the sound's bank.
    pub n: i32,
    /// Output gain.
    pub gain: f64,
    /// Stereo pan, 0.0 = left, 1.0 = right.
    pub pan: f64,
    /// Playback speed multiplier.
    pub speed: f64,
    /// Sample start point, 0.0-1.0.
    pub begin: f64,
    /// Sample end point, 0.0-1.0.
    pub end: f64,
    /// Cut group: triggering a note with the same `cut` value chokes prior ones.
    pub cut: Option<i32>,
    /// Note-length multiplier.
    pub legato: Option<f64>,
    /// Sound-specific extra parameters not modeled elsewhere.
    pub extra_params: BTreeMap<String, ParamValue>,
}

impl Default for TrackParams {
    fn default() -> Self {
        Self {
            s: String::new(),
            s_path: String::new(),
            n: 0,
            gain: 1.0,
            pan: 0.5,
            speed: 1.0,
            begin: 0.0,
            end: 1.0,
            cut: None,
            legato: None,
            extra_params: BTreeMap::new(),
        }
    }
}

/// Legacy flat effect bag, retained alongside [`TrackFxParams`] for
/// backward compatibility with sessions compiled before tone-shaping
/// effects were split out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FxParams {
    /// Lowpass cutoff (Hz).
    pub cutoff: Option<f64>,
    /// Lowpass resonance (0-1).
    pub resonance: Option<f64>,
    /// Highpass cutoff (Hz).
    pub hcutoff: Option<f64>,
    /// Highpass resonance (0-1).
    pub hresonance: Option<f64>,
    /// Bandpass center frequency.
    pub bandf: Option<f64>,
    /// Bandpass Q.
    pub bandq: Option<f64>,
    /// Reverb send amount.
    pub room: Option<f64>,
    /// Reverb room size.
    pub size: Option<f64>,
    /// Reverb dry level.
    pub dry: Option<f64>,
    /// Delay send amount.
    pub delay_send: Option<f64>,
    /// Delay time (s).
    pub delay_time: Option<f64>,
    /// Delay feedback.
    pub delay_feedback: Option<f64>,
    /// Waveshaping amount.
    pub shape: Option<f64>,
    /// Bit-depth crush.
    pub crush: Option<f64>,
    /// Sample-rate reduction.
    pub coarse: Option<f64>,
    /// Envelope attack (s).
    pub attack: Option<f64>,
    /// Envelope hold (s).
    pub hold: Option<f64>,
    /// Envelope release (s).
    pub release: Option<f64>,
}

/// Tone-shaping effect parameters applied per-track (v5).
///
/// Spatial effects (reverb, delay, leslie) live on [`super::mixer_line::MixerLineFx`]
/// instead, since those are shared across every track routed to a mixer line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackFxParams {
    /// Lowpass cutoff (20-20000 Hz).
    pub cutoff: Option<f64>,
    /// Lowpass resonance (0-1).
    pub resonance: Option<f64>,
    /// Highpass cutoff (20-20000 Hz).
    pub hcutoff: Option<f64>,
    /// Highpass resonance (0-1).
    pub hresonance: Option<f64>,
    /// Bandpass center frequency.
    pub bandf: Option<f64>,
    /// Bandpass Q.
    pub bandq: Option<f64>,
    /// Vowel formant filter (a, e, i, o, u).
    pub vowel: Option<String>,
    /// Waveshaping amount (0-1).
    pub shape: Option<f64>,
    /// Bit depth (1-24, lower = rougher).
    pub crush: Option<f64>,
    /// Sample rate reduction (1-64).
    pub coarse: Option<f64>,
    /// Krush-style distortion amount.
    pub krush: Option<f64>,
    /// Krush filter cutoff (Hz).
    pub kcutoff: Option<f64>,
    /// Triode tube distortion.
    pub triode: Option<f64>,
    /// Envelope attack time (s).
    pub attack: Option<f64>,
    /// Envelope hold time (s).
    pub hold: Option<f64>,
    /// Envelope release time (s).
    pub release: Option<f64>,
    /// Tremolo speed.
    pub tremolo_rate: Option<f64>,
    /// Tremolo amount (0-1).
    pub tremolo_depth: Option<f64>,
    /// Phaser speed.
    pub phaser_rate: Option<f64>,
    /// Phaser amount (0-1).
    pub phaser_depth: Option<f64>,
    /// Detune amount.
    pub detune: Option<f64>,
    /// Pitch acceleration over time.
    pub accelerate: Option<f64>,
    /// Pitch shift rate.
    pub psrate: Option<f64>,
    /// Pitch shift dispersion.
    pub psdisp: Option<f64>,
    /// FFT freeze amount (0-1).
    pub freeze: Option<f64>,
    /// Spectral smearing.
    pub smear: Option<f64>,
    /// FFT bin shifting.
    pub binshift: Option<f64>,
    /// Spectral comb filter.
    pub comb: Option<f64>,
    /// Spectral scramble.
    pub scram: Option<f64>,
    /// Spectral high-pass brick wall.
    pub hbrick: Option<f64>,
    /// Spectral low-pass brick wall.
    pub lbrick: Option<f64>,
    /// Spectral enhancement.
    pub enhance: Option<f64>,
    /// Spectral delay time.
    pub tsdelay: Option<f64>,
    /// Spectral delay mix.
    pub xsdelay: Option<f64>,
    /// Ring modulation amount.
    pub ring: Option<f64>,
    /// Ring modulation frequency (Hz).
    pub ringf: Option<f64>,
    /// Ring frequency slide (Hz).
    pub ringdf: Option<f64>,
    /// Squiz pitch ratio.
    pub squiz: Option<f64>,
    /// Wave segment drop percentage.
    pub waveloss: Option<f64>,
    /// Octave-up harmonics.
    pub octer: Option<f64>,
    /// Half-frequency harmonics.
    pub octersub: Option<f64>,
    /// Quarter-frequency harmonics.
    pub octersubsub: Option<f64>,
    /// Frequency shift (Hz).
    pub fshift: Option<f64>,
    /// Shift as fraction of note frequency.
    pub fshiftnote: Option<f64>,
    /// Shift phase (radians).
    pub fshiftphase: Option<f64>,
    /// DJ filter position.
    pub djf: Option<f64>,
    /// Compression threshold.
    pub cthresh: Option<f64>,
    /// Compression ratio.
    pub cratio: Option<f64>,
    /// Compressor attack time.
    pub cattack: Option<f64>,
    /// Compressor release time.
    pub crelease: Option<f64>,
    /// Compressor output gain.
    pub cgain: Option<f64>,
    /// Soft knee amount.
    pub cknee: Option<f64>,
    /// Stereo spread.
    pub panspread: Option<f64>,
}

/// A send/return routing from a track to a [`super::mixer_line::MixerLine`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Send {
    /// Name of the target mixer line.
    pub target: String,
    /// Send level, clamped to `[0.0, 1.0]`.
    pub amount: f64,
}

impl Send {
    /// Builds a send, clamping `amount` into `[0.0, 1.0]` the way the
    /// original source's `__post_init__` does.
    pub fn new(target: impl Into<String>, amount: f64) -> Self {
        Self {
            target: target.into(),
            amount: amount.clamp(0.0, 1.0),
        }
    }
}

/// A single SuperDirt-style track definition (Layer 2).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Track {
    /// Identity and mute/solo flags.
    pub meta: TrackMeta,
    /// Sound-selection parameters.
    pub params: TrackParams,
    /// Legacy flat effect bag (backward compatibility).
    pub fx: FxParams,
    /// Tone-shaping effect parameters.
    pub track_fx: TrackFxParams,
    /// Multi-bus sends to mixer lines.
    pub sends: Vec<Send>,
    /// Named parameter modulations.
    pub modulations: BTreeMap<String, Modulation>,
}

impl Track {
    /// Track identifier, read through from [`TrackMeta::track_id`].
    pub fn id(&self) -> &str {
        &self.meta.track_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_clamps_amount() {
        assert_eq!(Send::new("reverb", 1.5).amount, 1.0);
        assert_eq!(Send::new("reverb", -0.5).amount, 0.0);
        assert_eq!(Send::new("reverb", 0.7).amount, 0.7);
    }

    #[test]
    fn track_round_trips_through_json() {
        let mut track = Track {
            meta: TrackMeta {
                track_id: "kick".into(),
                ..Default::default()
            },
            params: TrackParams {
                s: "bd".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        track.sends.push(Send::new("main", 0.3));
        let json = serde_json::to_string(&track).unwrap();
        let back: Track = serde_json::from_str(&json).unwrap();
        assert_eq!(track, back);
        assert_eq!(track.id(), "kick");
    }
}
