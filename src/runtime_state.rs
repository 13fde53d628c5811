//! Live performance state: the merged view of a committed session and any
//! live overrides, the playhead, and deferred-apply bookkeeping.

use crate::constants::{STEPS_PER_BAR, STEPS_PER_BEAT};
use crate::ir::{CompiledSession, Environment, EventSequence, MixerLine, Scene, Track, TrackMidi};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The current playhead: a step plus its derived beat/bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Absolute step, `0..=255`.
    pub step: u8,
    /// Beat within the bar, `0..=3`.
    pub beat: u8,
    /// Bar within the loop, `0..=15`.
    pub bar: u8,
}

impl Position {
    /// Builds a position from a raw step, deriving beat and bar.
    pub fn at_step(step: u8) -> Self {
        Self {
            step,
            beat: (step / STEPS_PER_BEAT as u8) % STEPS_PER_BEAT as u8,
            bar: step / STEPS_PER_BAR as u8,
        }
    }

    /// Advances to the next step, wrapping `255 -> 0`. Returns whether it
    /// wrapped.
    pub fn advance(&mut self) -> bool {
        let (next, wrapped) = self.step.overflowing_add(1);
        *self = Position::at_step(next);
        wrapped
    }
}

impl Default for Position {
    fn default() -> Self {
        Position::at_step(0)
    }
}

/// Transport state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaybackState {
    /// Not advancing; next `play` starts from step 0.
    #[default]
    Stopped,
    /// Advancing normally.
    Playing,
    /// Not advancing; next `play` resumes from the current step.
    Paused,
}

impl PlaybackState {
    /// Transitions to `Playing` regardless of current state.
    pub fn play(&mut self) {
        *self = PlaybackState::Playing;
    }

    /// Transitions to `Stopped`; callers reset [`Position`] separately since
    /// that mutation belongs to the caller holding `&mut Position`.
    pub fn stop(&mut self) {
        *self = PlaybackState::Stopped;
    }

    /// Transitions to `Paused` only from `Playing`; a no-op otherwise.
    pub fn pause(&mut self) {
        if *self == PlaybackState::Playing {
            *self = PlaybackState::Paused;
        }
    }

    /// Whether the step/clock/note-off loops should currently advance time.
    pub fn is_advancing(&self) -> bool {
        matches!(self, PlaybackState::Playing)
    }
}

/// A compile submitted with a deferred apply timing, held until
/// [`RuntimeState::should_apply_pending`] says it is time to land.
#[derive(Debug, Clone, Default)]
pub struct PendingApply {
    /// When to apply.
    pub timing: crate::ir::ApplyTiming,
    /// Environment override, if the compile touched it.
    pub environment: Option<Environment>,
    /// Track overrides, keyed by track id.
    pub tracks: BTreeMap<String, Track>,
    /// MIDI track overrides, keyed by track id.
    pub tracks_midi: BTreeMap<String, TrackMidi>,
    /// Mixer bus overrides, keyed by name.
    pub mixer_lines: BTreeMap<String, MixerLine>,
    /// Sequence overrides, keyed by track id.
    pub sequences: BTreeMap<String, EventSequence>,
    /// Scene definitions to add or replace in the committed session's
    /// scene library (not live state; only consulted by a later `scene` command).
    pub scenes: BTreeMap<String, Scene>,
    /// If non-empty, only these tracks receive new sequences; every other
    /// track's sequence is cleared (exclusive apply).
    pub track_ids: Vec<String>,
    /// Scene to activate once this lands, if any.
    pub scene_name: Option<String>,
    /// Set once a non-zero step has been observed since this was queued;
    /// required before a `Seq`-timed apply may land on the step-0 boundary,
    /// so a compile submitted exactly at step 0 does not land immediately.
    pub passed_non_zero: bool,
}

/// Merges `override_env` onto `base`, a field wins from the override only
/// when it differs from the type's schema default (i.e. was actually set).
fn merge_environment(base: &Environment, override_env: &Environment) -> Environment {
    let default = Environment::default();
    Environment {
        bpm: if override_env.bpm != default.bpm {
            override_env.bpm
        } else {
            base.bpm
        },
        scale: if override_env.scale != default.scale {
            override_env.scale.clone()
        } else {
            base.scale.clone()
        },
        default_gate: if override_env.default_gate != default.default_gate {
            override_env.default_gate
        } else {
            base.default_gate
        },
        swing: if override_env.swing != default.swing {
            override_env.swing
        } else {
            base.swing
        },
        loop_steps: if override_env.loop_steps != default.loop_steps {
            override_env.loop_steps
        } else {
            base.loop_steps
        },
        chords: if !override_env.chords.is_empty() {
            override_env.chords.clone()
        } else {
            base.chords.clone()
        },
    }
}

macro_rules! merge_option_fields {
    ($ty:path, $base:expr, $ovr:expr, { $($field:ident),* $(,)? }) => {
        $ty {
            $( $field: $ovr.$field.clone().or_else(|| $base.$field.clone()), )*
        }
    };
}

fn merge_fx_params(base: &crate::ir::FxParams, ovr: &crate::ir::FxParams) -> crate::ir::FxParams {
    merge_option_fields!(crate::ir::FxParams, base, ovr, {
        cutoff, resonance, hcutoff, hresonance, bandf, bandq, room, size, dry,
        delay_send, delay_time, delay_feedback, shape, crush, coarse, attack, hold, release,
    })
}

fn merge_track_fx_params(base: &crate::ir::TrackFxParams, ovr: &crate::ir::TrackFxParams) -> crate::ir::TrackFxParams {
    merge_option_fields!(crate::ir::TrackFxParams, base, ovr, {
        cutoff, resonance, hcutoff, hresonance, bandf, bandq, vowel, shape, crush, coarse,
        krush, kcutoff, triode, attack, hold, release, tremolo_rate, tremolo_depth,
        phaser_rate, phaser_depth, detune, accelerate, psrate, psdisp, freeze, smear,
        binshift, comb, scram, hbrick, lbrick, enhance, tsdelay, xsdelay, ring, ringf,
        ringdf, squiz, waveloss, octer, octersub, octersubsub, fshift, fshiftnote,
        fshiftphase, djf, cthresh, cratio, cattack, crelease, cgain, cknee, panspread,
    })
}

/// Merges `ovr` onto `base`: params fields win from the override only when
/// set away from schema default; fx/track_fx fields win per-field whenever
/// the override carries `Some`; `sends`/`modulations` are replaced wholesale
/// the moment the override supplies any entry at all (partial send lists
/// are not merged field-by-field the way scalar params are).
fn merge_track(base: &Track, ovr: &Track) -> Track {
    let default_params = crate::ir::TrackParams::default();
    let params = crate::ir::TrackParams {
        s: if ovr.params.s != default_params.s { ovr.params.s.clone() } else { base.params.s.clone() },
        s_path: if ovr.params.s_path != default_params.s_path {
            ovr.params.s_path.clone()
        } else {
            base.params.s_path.clone()
        },
        n: if ovr.params.n != default_params.n { ovr.params.n } else { base.params.n },
        gain: if ovr.params.gain != default_params.gain { ovr.params.gain } else { base.params.gain },
        pan: if ovr.params.pan != default_params.pan { ovr.params.pan } else { base.params.pan },
        speed: if ovr.params.speed != default_params.speed { ovr.params.speed } else { base.params.speed },
        begin: if ovr.params.begin != default_params.begin { ovr.params.begin } else { base.params.begin },
        end: if ovr.params.end != default_params.end { ovr.params.end } else { base.params.end },
        cut: ovr.params.cut.or(base.params.cut),
        legato: ovr.params.legato.or(base.params.legato),
        extra_params: if !ovr.params.extra_params.is_empty() {
            ovr.params.extra_params.clone()
        } else {
            base.params.extra_params.clone()
        },
    };

    Track {
        meta: crate::ir::TrackMeta {
            track_id: base.meta.track_id.clone(),
            range_id: if ovr.meta.range_id != 2 { ovr.meta.range_id } else { base.meta.range_id },
            // A compile's Track carries whatever mute/solo its author baked in,
            // taken wholesale like the rest of this merged meta. The live
            // `mute`/`solo` commands sit one layer above this and are applied
            // separately in `get_effective` (`RuntimeState::mute_overrides`/
            // `solo_overrides`), since a bare bool here can't distinguish
            // "explicitly turned off live" from "never touched by a command".
            mute: ovr.meta.mute,
            solo: ovr.meta.solo,
        },
        params,
        fx: merge_fx_params(&base.fx, &ovr.fx),
        track_fx: merge_track_fx_params(&base.track_fx, &ovr.track_fx),
        sends: if !ovr.sends.is_empty() { ovr.sends.clone() } else { base.sends.clone() },
        modulations: if !ovr.modulations.is_empty() {
            ovr.modulations.clone()
        } else {
            base.modulations.clone()
        },
    }
}

/// Live performance state: the committed session, pending live overrides, a
/// memoized merge of the two, the playhead, transport, and any deferred apply.
#[derive(Debug, Default)]
pub struct RuntimeState {
    base: CompiledSession,
    overrides: CompiledSession,
    effective_cache: Option<CompiledSession>,
    position: Position,
    playback: PlaybackState,
    pending: Option<PendingApply>,
    /// Live `mute`/`solo` command state, keyed by track id. Applied on top of
    /// the merged `base`/`overrides` view last, so toggling a flag through
    /// the dedicated command always wins and always works in both directions
    /// (a compile's baked-in track meta cannot express "explicitly unset").
    mute_overrides: BTreeMap<String, bool>,
    /// See [`RuntimeState::mute_overrides`].
    solo_overrides: BTreeMap<String, bool>,
}

impl RuntimeState {
    /// A fresh, stopped state with an empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the committed base session outright and invalidates the cache.
    pub fn load_session(&mut self, session: CompiledSession) {
        self.base = session;
        self.overrides = CompiledSession::default();
        self.invalidate();
    }

    fn invalidate(&mut self) {
        self.effective_cache = None;
    }

    /// The merged view of base and live overrides, recomputed lazily and
    /// cached until the next mutation invalidates it.
    pub fn get_effective(&mut self) -> &CompiledSession {
        if self.effective_cache.is_none() {
            let environment = merge_environment(&self.base.environment, &self.overrides.environment);

            let mut tracks = self.base.tracks.clone();
            for (id, ovr_track) in &self.overrides.tracks {
                let merged = match tracks.get(id) {
                    Some(base_track) => merge_track(base_track, ovr_track),
                    None => ovr_track.clone(),
                };
                tracks.insert(id.clone(), merged);
            }
            for (id, mute) in &self.mute_overrides {
                if let Some(track) = tracks.get_mut(id) {
                    track.meta.mute = *mute;
                }
            }
            for (id, solo) in &self.solo_overrides {
                if let Some(track) = tracks.get_mut(id) {
                    track.meta.solo = *solo;
                }
            }

            let mut tracks_midi = self.base.tracks_midi.clone();
            for (id, ovr) in &self.overrides.tracks_midi {
                tracks_midi.insert(id.clone(), ovr.clone());
            }

            let mut sequences = self.base.sequences.clone();
            for (id, ovr) in &self.overrides.sequences {
                sequences.insert(id.clone(), ovr.clone());
            }

            let mut mixer_lines = self.base.mixer_lines.clone();
            for (id, ovr) in &self.overrides.mixer_lines {
                mixer_lines.insert(id.clone(), ovr.clone());
            }

            self.effective_cache = Some(CompiledSession {
                environment,
                tracks,
                tracks_midi,
                mixer_lines,
                sequences,
                scenes: self.base.scenes.clone(),
                apply: None,
            });
        }
        self.effective_cache.as_ref().expect("just populated")
    }

    /// Current playhead.
    pub fn position(&self) -> Position {
        self.position
    }

    /// Tempo of the current merged view, without cloning the whole session.
    pub fn effective_bpm(&mut self) -> f64 {
        self.get_effective().environment.bpm
    }

    /// Current transport state.
    pub fn playback(&self) -> PlaybackState {
        self.playback
    }

    /// Starts (or resumes) playback.
    pub fn play(&mut self) {
        self.playback.play();
    }

    /// Stops playback and resets the playhead to step 0.
    pub fn stop(&mut self) {
        self.playback.stop();
        self.position = Position::default();
    }

    /// Pauses playback, retaining the current step.
    pub fn pause(&mut self) {
        self.playback.pause();
    }

    /// Advances the playhead by one step if currently playing. Returns
    /// whether the loop wrapped back to step 0.
    pub fn advance_step(&mut self) -> bool {
        if !self.playback.is_advancing() {
            return false;
        }
        let wrapped = self.position.advance();
        if let Some(pending) = self.pending.as_mut() {
            if self.position.step != 0 {
                pending.passed_non_zero = true;
            }
        }
        wrapped
    }

    /// Sets the tempo, clamped to `[MIN_BPM, MAX_BPM]`.
    pub fn set_bpm(&mut self, bpm: f64) {
        self.overrides.environment.bpm = bpm.clamp(crate::constants::MIN_BPM, crate::constants::MAX_BPM);
        self.invalidate();
    }

    /// Sets a track's mute flag, live, independent of any compile override.
    pub fn set_mute(&mut self, track_id: &str, mute: bool) {
        self.mute_overrides.insert(track_id.to_string(), mute);
        self.invalidate();
    }

    /// Sets a track's solo flag, live, independent of any compile override.
    pub fn set_solo(&mut self, track_id: &str, solo: bool) {
        self.solo_overrides.insert(track_id.to_string(), solo);
        self.invalidate();
    }

    /// Queues a deferred compile, to be landed by the step loop once
    /// [`RuntimeState::should_apply_pending`] returns true.
    pub fn queue_pending(&mut self, pending: PendingApply) {
        self.pending = Some(pending);
    }

    /// Whether a queued pending apply is due to land at the current position.
    pub fn should_apply_pending(&self) -> bool {
        let Some(pending) = &self.pending else {
            return false;
        };
        match pending.timing {
            crate::ir::ApplyTiming::Now => true,
            crate::ir::ApplyTiming::Beat => self.position.step % STEPS_PER_BEAT as u8 == 0,
            crate::ir::ApplyTiming::Bar => self.position.step % STEPS_PER_BAR as u8 == 0,
            crate::ir::ApplyTiming::Seq => self.position.step == 0 && pending.passed_non_zero,
        }
    }

    /// Lands the queued pending apply, if any, performing an exclusive
    /// apply when `track_ids` is non-empty: every track not named there has
    /// its sequence cleared (definition kept) rather than left untouched.
    pub fn execute_pending(&mut self) -> Result<(), String> {
        let Some(pending) = self.pending.take() else {
            return Ok(());
        };

        if let Some(scene_name) = &pending.scene_name {
            self.apply_scene(scene_name)?;
        }

        if let Some(env) = pending.environment {
            self.overrides.environment = env;
        }
        for (id, track) in pending.tracks {
            self.overrides.tracks.insert(id, track);
        }
        for (id, track_midi) in pending.tracks_midi {
            self.overrides.tracks_midi.insert(id, track_midi);
        }
        for (id, mixer_line) in pending.mixer_lines {
            self.overrides.mixer_lines.insert(id, mixer_line);
        }
        for (name, scene) in pending.scenes {
            self.base.scenes.insert(name, scene);
        }

        if pending.track_ids.is_empty() {
            for (id, seq) in pending.sequences {
                self.overrides.sequences.insert(id, seq);
            }
        } else {
            let named: std::collections::HashSet<&str> = pending.track_ids.iter().map(String::as_str).collect();
            let all_track_ids: Vec<String> = self.base.tracks.keys().chain(self.overrides.tracks.keys()).cloned().collect();
            for id in all_track_ids {
                if named.contains(id.as_str()) {
                    if let Some(seq) = pending.sequences.get(&id) {
                        self.overrides.sequences.insert(id.clone(), seq.clone());
                    }
                } else {
                    self.overrides.sequences.insert(id.clone(), EventSequence::empty(id));
                }
            }
        }

        self.invalidate();
        Ok(())
    }

    /// Activates `scene_name`: replaces the base session's tracks, MIDI
    /// tracks, sequences, and (if the scene specifies one) environment.
    /// Live overrides are cleared, since they apply to the scene that is
    /// being replaced.
    pub fn apply_scene(&mut self, scene_name: &str) -> Result<(), String> {
        let scene: Scene = self
            .base
            .scenes
            .get(scene_name)
            .cloned()
            .ok_or_else(|| format!("no such scene: {scene_name}"))?;

        if let Some(env) = scene.environment {
            self.base.environment = env;
        }
        self.base.tracks = scene.tracks;
        self.base.tracks_midi = scene.tracks_midi;
        self.base.sequences = scene.sequences;
        self.overrides = CompiledSession::default();
        self.invalidate();
        Ok(())
    }

    /// Names of all scenes in the committed session.
    pub fn scene_names(&self) -> Vec<&str> {
        self.base.scenes.keys().map(String::as_str).collect()
    }

    /// Whether `track_id` names a known track in the committed or override
    /// session, used by the `mute`/`solo` command handlers' precondition.
    pub fn track_exists(&self, track_id: &str) -> bool {
        self.base.tracks.contains_key(track_id) || self.overrides.tracks.contains_key(track_id)
    }

    /// Tracks that should currently produce output: if any track is soloed,
    /// only soloed tracks; otherwise every non-muted track.
    pub fn get_active_tracks(&mut self) -> Vec<String> {
        let effective = self.get_effective();
        let any_solo = effective.tracks.values().any(|t| t.meta.solo);
        effective
            .tracks
            .values()
            .filter(|t| if any_solo { t.meta.solo } else { !t.meta.mute })
            .map(|t| t.meta.track_id.clone())
            .collect()
    }

    /// MIDI tracks that should currently produce output, by the same
    /// solo-priority rule as [`RuntimeState::get_active_tracks`].
    pub fn get_active_tracks_midi(&mut self) -> Vec<String> {
        let effective = self.get_effective();
        let any_solo = effective.tracks_midi.values().any(|t| t.solo);
        effective
            .tracks_midi
            .values()
            .filter(|t| if any_solo { t.solo } else { !t.mute })
            .map(|t| t.track_id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ApplyTiming, TrackMeta};

    #[test]
    fn position_wraps_and_derives_beat_bar() {
        let mut pos = Position::at_step(255);
        assert!(pos.advance());
        assert_eq!(pos.step, 0);
        assert_eq!(pos.beat, 0);
        assert_eq!(pos.bar, 0);

        let pos = Position::at_step(18);
        assert_eq!(pos.beat, 0);
        assert_eq!(pos.bar, 1);
    }

    #[test]
    fn bpm_is_clamped_to_valid_range() {
        let mut state = RuntimeState::new();
        state.set_bpm(5000.0);
        assert_eq!(state.get_effective().environment.bpm, 999.0);
        state.set_bpm(-10.0);
        assert_eq!(state.get_effective().environment.bpm, 1.0);
    }

    #[test]
    fn live_mute_can_toggle_a_base_muted_track_back_on() {
        let mut state = RuntimeState::new();
        let mut session = CompiledSession::default();
        session.tracks.insert(
            "kick".to_string(),
            Track {
                meta: TrackMeta { track_id: "kick".into(), mute: true, ..Default::default() },
                ..Default::default()
            },
        );
        state.load_session(session);
        assert!(state.get_active_tracks().is_empty());

        state.set_mute("kick", false);
        assert_eq!(state.get_active_tracks(), vec!["kick".to_string()]);

        state.set_mute("kick", true);
        assert!(state.get_active_tracks().is_empty());
    }

    #[test]
    fn solo_filters_to_only_soloed_tracks() {
        let mut state = RuntimeState::new();
        let mut session = CompiledSession::default();
        session.tracks.insert(
            "kick".to_string(),
            Track {
                meta: TrackMeta { track_id: "kick".into(), solo: true, ..Default::default() },
                ..Default::default()
            },
        );
        session.tracks.insert(
            "snare".to_string(),
            Track {
                meta: TrackMeta { track_id: "snare".into(), ..Default::default() },
                ..Default::default()
            },
        );
        state.load_session(session);
        assert_eq!(state.get_active_tracks(), vec!["kick".to_string()]);
    }

    #[test]
    fn seq_apply_requires_non_zero_step_since_submission() {
        let mut state = RuntimeState::new();
        state.play();
        state.queue_pending(PendingApply {
            timing: ApplyTiming::Seq,
            ..Default::default()
        });
        // Submitted while sitting at step 0: must not land immediately.
        assert!(!state.should_apply_pending());
        state.advance_step();
        // Still mid-loop.
        assert!(!state.should_apply_pending());
        for _ in 0..254 {
            state.advance_step();
        }
        // Wrapped back to step 0 after seeing a non-zero step.
        assert!(state.should_apply_pending());
    }

    #[test]
    fn pending_apply_merges_tracks_midi_mixer_lines_and_scene_library() {
        let mut state = RuntimeState::new();
        state.load_session(CompiledSession::default());

        let mut tracks_midi = BTreeMap::new();
        tracks_midi.insert(
            "lead".to_string(),
            crate::ir::TrackMidi { track_id: "lead".into(), ..Default::default() },
        );
        let mut mixer_lines = BTreeMap::new();
        mixer_lines.insert("bus_a".to_string(), crate::ir::MixerLine { name: "bus_a".into(), ..Default::default() });
        let mut scenes = BTreeMap::new();
        scenes.insert("verse".to_string(), Scene { name: "verse".into(), ..Default::default() });

        state.queue_pending(PendingApply {
            timing: ApplyTiming::Now,
            tracks_midi,
            mixer_lines,
            scenes,
            ..Default::default()
        });
        state.execute_pending().unwrap();

        assert!(state.get_effective().tracks_midi.contains_key("lead"));
        assert!(state.get_effective().mixer_lines.contains_key("bus_a"));
        assert!(state.scene_names().contains(&"verse"));
    }

    #[test]
    fn exclusive_apply_clears_unnamed_track_sequences() {
        let mut state = RuntimeState::new();
        let mut session = CompiledSession::default();
        session.tracks.insert("kick".into(), Track { meta: TrackMeta { track_id: "kick".into(), ..Default::default() }, ..Default::default() });
        session.tracks.insert("snare".into(), Track { meta: TrackMeta { track_id: "snare".into(), ..Default::default() }, ..Default::default() });
        session.sequences.insert("snare".into(), EventSequence::from_events("snare".into(), vec![crate::ir::Event::new(0)]));
        state.load_session(session);

        let mut new_seqs = BTreeMap::new();
        new_seqs.insert("kick".to_string(), EventSequence::from_events("kick".into(), vec![crate::ir::Event::new(0)]));
        state.queue_pending(PendingApply {
            timing: ApplyTiming::Now,
            track_ids: vec!["kick".to_string()],
            sequences: new_seqs,
            ..Default::default()
        });
        state.execute_pending().unwrap();

        assert!(!state.get_effective().sequences["kick"].is_empty());
        assert!(state.get_effective().sequences["snare"].is_empty());
    }
}
