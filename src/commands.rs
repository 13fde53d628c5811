//! Command payloads accepted from a [`crate::ipc::CommandSource`], and the
//! uniform result type handlers reply with.

use crate::ir::CompiledSession;
use crate::scheduler::ScheduledMessageBatch;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Submits a freshly scheduled message batch, fully replacing
/// [`crate::scheduler::MessageScheduler`]'s prior contents — the
/// destination-routed path (`spec.md` §3, §6). Wire shape is the flat
/// `{ messages, bpm, pattern_length }` object §6 specifies, reusing
/// [`ScheduledMessageBatch`] directly rather than duplicating its fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionCommand {
    /// The batch to load.
    #[serde(flatten)]
    pub batch: ScheduledMessageBatch,
}

/// Submits a freshly compiled session IR. Unlike [`SessionCommand`] (which
/// replaces the scheduled-message batch on the destination-routed path),
/// this lands on [`crate::runtime_state::RuntimeState`] as a live override
/// layer — immediately if stopped or `session.apply` asks for `now` timing
/// (or carries no `apply` at all), otherwise queued until that timing's
/// musical boundary arrives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompileCommand {
    /// The freshly compiled session. Its own `apply` field (see
    /// [`crate::ir::CompiledSession`]) carries the deferred-apply directive.
    pub session: CompiledSession,
}

/// Resumes or starts playback from the current step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayCommand {}

/// Stops playback and resets position to step 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StopCommand {}

/// Suspends playback, retaining the current step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PauseCommand {}

/// Mutes or unmutes a track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MuteCommand {
    /// Track to mute/unmute.
    pub track_id: String,
    /// New mute state.
    #[serde(default = "default_true")]
    pub mute: bool,
}

/// Solos or unsolos a track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoloCommand {
    /// Track to solo/unsolo.
    pub track_id: String,
    /// New solo state.
    #[serde(default = "default_true")]
    pub solo: bool,
}

fn default_true() -> bool {
    true
}

/// Changes tempo. Must be strictly positive; [`crate::runtime_state::RuntimeState`]
/// separately clamps the effective value to `[1, 999]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BpmCommand {
    /// Requested beats per minute.
    pub bpm: f64,
}

/// Switches the active MIDI output port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MidiPortCommand {
    /// Name of the port to connect to.
    pub port_name: String,
}

/// Sends all-notes-off on every channel of the active MIDI output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MidiPanicCommand {}

/// Stops playback and clears all pending note-offs and scheduled messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PanicCommand {}

/// Activates a named scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneCommand {
    /// Scene name to activate.
    pub name: String,
}

/// Lists the names of all scenes in the active session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenesCommand {}

/// A tagged union of every command a [`crate::ipc::CommandSource`] may deliver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "payload", rename_all = "snake_case")]
pub enum Command {
    /// See [`SessionCommand`].
    Session(SessionCommand),
    /// See [`CompileCommand`].
    Compile(CompileCommand),
    /// See [`PlayCommand`].
    Play(PlayCommand),
    /// See [`StopCommand`].
    Stop(StopCommand),
    /// See [`PauseCommand`].
    Pause(PauseCommand),
    /// See [`MuteCommand`].
    Mute(MuteCommand),
    /// See [`SoloCommand`].
    Solo(SoloCommand),
    /// See [`BpmCommand`].
    Bpm(BpmCommand),
    /// See [`MidiPortCommand`].
    MidiPort(MidiPortCommand),
    /// See [`MidiPanicCommand`].
    MidiPanic(MidiPanicCommand),
    /// See [`PanicCommand`].
    Panic(PanicCommand),
    /// See [`SceneCommand`].
    Scene(SceneCommand),
    /// See [`ScenesCommand`].
    Scenes(ScenesCommand),
}

/// Uniform reply from a command handler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    /// Whether the command succeeded.
    pub success: bool,
    /// Human-readable detail, present on both success and failure.
    pub message: Option<String>,
    /// Structured payload (e.g. the list of scene names for `scenes`).
    pub data: Option<Value>,
}

impl CommandResult {
    /// A successful result, with optional message/data.
    pub fn ok(message: Option<impl Into<String>>, data: Option<Value>) -> Self {
        Self {
            success: true,
            message: message.map(Into::into),
            data,
        }
    }

    /// A failed result carrying `message`.
    pub fn error(message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            data,
        }
    }
}
