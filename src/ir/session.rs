//! The complete compiled session: all three data-model layers plus scenes.

use super::environment::Environment;
use super::mixer_line::MixerLine;
use super::scene::Scene;
use super::sequence::EventSequence;
use super::track::Track;
use super::track_midi::TrackMidi;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// When a pending compile should take effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplyTiming {
    /// Apply on the very next step loop iteration.
    #[default]
    Now,
    /// Apply on the next beat boundary (`step mod 4 == 0`).
    Beat,
    /// Apply on the next bar boundary (`step mod 16 == 0`).
    Bar,
    /// Apply at the start of the next full loop, after at least one
    /// non-zero step has elapsed since submission.
    Seq,
}

/// A deferred-application directive attached to a `compile` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyCommand {
    /// When the change should take effect.
    pub timing: ApplyTiming,
    /// If non-empty, only these tracks receive new events (exclusive apply);
    /// every other track's events are cleared while its definition is kept.
    #[serde(default)]
    pub track_ids: Vec<String>,
    /// Scene to activate, for `apply scene "name"`.
    #[serde(default)]
    pub scene_name: Option<String>,
}

/// The complete output of compiling a DSL source file: every layer of the
/// data model, plus mixer lines, scenes, and an optional deferred apply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompiledSession {
    /// Global performance settings.
    pub environment: Environment,
    /// SuperDirt-style tracks, keyed by track id.
    pub tracks: BTreeMap<String, Track>,
    /// MIDI tracks, keyed by track id.
    pub tracks_midi: BTreeMap<String, TrackMidi>,
    /// Mixer buses, keyed by name.
    pub mixer_lines: BTreeMap<String, MixerLine>,
    /// Pattern data, keyed by track id.
    pub sequences: BTreeMap<String, EventSequence>,
    /// Named scene snapshots.
    pub scenes: BTreeMap<String, Scene>,
    /// Deferred-application directive, if this compile should not land immediately.
    pub apply: Option<ApplyCommand>,
}
