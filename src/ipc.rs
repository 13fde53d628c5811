//! Command intake and telemetry fan-out, decoupled from any particular
//! transport. The in-process channel implementations here are the only
//! transport this crate ships; a networked transport (ZeroMQ in the system
//! this was distilled from) is out of scope and would implement the same
//! two traits.

use crate::commands::Command;
use crate::constants::TELEMETRY_QUEUE_CAPACITY;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Source of incoming commands, polled once per command-loop iteration.
#[async_trait::async_trait]
pub trait CommandSource: Send + Sync {
    /// Establishes the underlying transport, if any.
    async fn connect(&self) {}
    /// Tears down the underlying transport, if any.
    async fn disconnect(&self) {}
    /// Pops and returns the next pending command, if one is available.
    /// Never blocks; the caller backs off on its own schedule when this
    /// returns `None`.
    async fn receive(&self) -> Option<Command>;
    /// Whether the underlying transport considers itself connected.
    fn is_connected(&self) -> bool {
        true
    }
}

/// A telemetry event pushed to a [`StateSink`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum TelemetryEvent {
    /// Sent once, immediately after a consumer attaches.
    Connected,
    /// Current playhead position, emitted on quarter-note boundaries (`step % 4 == 0`).
    Position(PositionTelemetry),
    /// Transport/tempo summary, emitted on bar boundaries and on transport changes.
    Status(StatusTelemetry),
    /// Per-track activity snapshot, emitted on bar boundaries (`step % 16 == 0`).
    Tracks(TracksTelemetry),
    /// A recoverable error worth surfacing to a UI.
    Error(ErrorTelemetry),
    /// Liveness ping, emitted on a fixed interval regardless of playback state.
    Heartbeat(Value),
}

/// Playhead position payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionTelemetry {
    /// Current step, `0..=255`.
    pub step: u8,
    /// Current beat within the bar, `0..=3`.
    pub beat: u8,
    /// Current bar, `0..=15`.
    pub bar: u8,
    /// Tempo at the time of this event, if changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bpm: Option<f64>,
    /// Transport state at the time of this event, if changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<String>,
}

/// Transport/tempo summary payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusTelemetry {
    /// Current transport state (`"stopped"`, `"playing"`, `"paused"`).
    pub transport: String,
    /// Current tempo in beats per minute.
    pub bpm: f64,
    /// Ids of tracks currently contributing output (post solo/mute filter).
    pub active_tracks: Vec<String>,
}

/// Per-track activity payload, keyed by track id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracksTelemetry {
    /// Track id to its compact pattern-presence encoding (see
    /// [`crate::loop_engine::encode_track_pattern`]) for the current 16-step window.
    pub tracks: std::collections::BTreeMap<String, String>,
}

/// A recoverable error payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorTelemetry {
    /// Short machine-readable code, e.g. `"CLOCK_DRIFT_RESET"`.
    pub code: String,
    /// Human-readable detail.
    pub message: String,
}

/// Sink for outgoing telemetry, written to once per event per loop iteration.
#[async_trait::async_trait]
pub trait StateSink: Send + Sync {
    /// Establishes the underlying transport, if any.
    async fn connect(&self) {}
    /// Tears down the underlying transport, if any.
    async fn disconnect(&self) {}
    /// Pushes `event`. Implementations must never block or propagate
    /// backpressure to the caller; a bounded, drop-oldest queue is expected.
    async fn send(&self, event: TelemetryEvent);
    /// Whether the underlying transport considers itself connected.
    fn is_connected(&self) -> bool {
        true
    }
}

/// A [`CommandSource`] with nothing to offer; every poll returns `None`.
///
/// Used when the engine is driven purely through [`ChannelCommandSource`]
/// (or not driven by external commands at all, e.g. in tests).
#[derive(Debug, Default)]
pub struct NoopCommandSource;

#[async_trait::async_trait]
impl CommandSource for NoopCommandSource {
    async fn receive(&self) -> Option<Command> {
        None
    }
}

/// An in-process [`CommandSource`] backed by an unbounded channel; the
/// counterpart sender is handed to whatever embeds the engine (a CLI, a
/// test harness).
pub struct ChannelCommandSource {
    receiver: Mutex<tokio::sync::mpsc::UnboundedReceiver<Command>>,
}

impl ChannelCommandSource {
    /// Creates a source/sender pair. The sender is retained by the caller;
    /// the source is handed to the engine.
    pub fn channel() -> (tokio::sync::mpsc::UnboundedSender<Command>, Self) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (tx, Self { receiver: Mutex::new(rx) })
    }
}

#[async_trait::async_trait]
impl CommandSource for ChannelCommandSource {
    async fn receive(&self) -> Option<Command> {
        self.receiver.lock().unwrap().try_recv().ok()
    }
}

/// An in-process [`StateSink`] backed by a bounded, drop-oldest queue.
///
/// Ported from the in-process IPC implementation this was distilled from:
/// a full queue drops its oldest entry to make room for the new one rather
/// than blocking the engine or rejecting the push.
pub struct ChannelStateSink {
    queue: Mutex<VecDeque<TelemetryEvent>>,
    capacity: usize,
}

impl Default for ChannelStateSink {
    fn default() -> Self {
        Self::new(TELEMETRY_QUEUE_CAPACITY)
    }
}

impl ChannelStateSink {
    /// Creates a sink with room for `capacity` pending events.
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Drains and returns every currently queued event, oldest first.
    pub fn drain(&self) -> Vec<TelemetryEvent> {
        self.queue.lock().unwrap().drain(..).collect()
    }

    /// Number of events currently queued.
    pub fn len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    /// Whether the queue is currently empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl StateSink for ChannelStateSink {
    async fn send(&self, event: TelemetryEvent) {
        let mut queue = self.queue.lock().unwrap();
        if queue.len() >= self.capacity {
            queue.pop_front();
        }
        queue.push_back(event);
    }
}
