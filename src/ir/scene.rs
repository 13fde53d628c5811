//! Named snapshots of tracks/sequences/environment, switchable at runtime.

use super::environment::Environment;
use super::sequence::EventSequence;
use super::track::Track;
use super::track_midi::TrackMidi;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named collection of tracks, sequences, and optionally environment
/// settings, activated wholesale by the `scene` command
/// (see [`crate::runtime_state::RuntimeState::apply_scene`]).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scene {
    /// Scene name, matched against the `scene` command's payload.
    pub name: String,
    /// Environment override; `None` leaves the current environment untouched.
    pub environment: Option<Environment>,
    /// Tracks defined by this scene.
    pub tracks: BTreeMap<String, Track>,
    /// MIDI tracks defined by this scene.
    pub tracks_midi: BTreeMap<String, TrackMidi>,
    /// Sequences defined by this scene.
    pub sequences: BTreeMap<String, EventSequence>,
}
