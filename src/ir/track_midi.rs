//! Layer 2 of the session's 3-layer data model, for MIDI-driven tracks.

use super::modulation::Modulation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single MIDI track definition (Layer 2, MIDI output).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackMidi {
    /// Stable track identifier.
    pub track_id: String,
    /// MIDI channel, 0-15.
    pub channel: u8,
    /// Default velocity, 0-127.
    pub velocity: u8,
    /// Semitone transpose applied to every note.
    pub transpose: i32,
    /// Muted tracks are excluded from active-track filtering.
    pub mute: bool,
    /// Soloed tracks, if any exist, are the only ones returned.
    pub solo: bool,
    /// Per-CC-number modulation routing.
    pub cc_modulations: BTreeMap<u8, Modulation>,
    /// Pitch bend modulation, if routed.
    pub pitch_bend_modulation: Option<Modulation>,
    /// Channel aftertouch modulation, if routed.
    pub aftertouch_modulation: Option<Modulation>,
    /// Velocity modulation, if routed.
    pub velocity_modulation: Option<Modulation>,
}

impl Default for TrackMidi {
    fn default() -> Self {
        Self {
            track_id: String::new(),
            channel: 0,
            velocity: 127,
            transpose: 0,
            mute: false,
            solo: false,
            cc_modulations: BTreeMap::new(),
            pitch_bend_modulation: None,
            aftertouch_modulation: None,
            velocity_modulation: None,
        }
    }
}

impl TrackMidi {
    /// Track identifier, read through from `track_id`.
    pub fn id(&self) -> &str {
        &self.track_id
    }
}
