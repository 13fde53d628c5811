//! Tracks notes that are currently sounding and are due to receive a
//! note-off, independent of the step that triggered them.

use crate::output::MidiOutput;
use std::time::{Duration, Instant};

/// A note-on waiting for its matching note-off.
#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingNoteOff {
    off_time: Instant,
    channel: u8,
    note: u8,
}

/// Schedules note-offs independently of the step grid: a note triggered on
/// step N with a gate shorter than a full step still gets its off message
/// at the right wall-clock time, not merely "next step".
pub struct NoteScheduler {
    pending: Vec<PendingNoteOff>,
    output: Box<dyn MidiOutput>,
}

impl NoteScheduler {
    /// Creates a scheduler writing note-offs through `output`.
    pub fn new(output: Box<dyn MidiOutput>) -> Self {
        Self {
            pending: Vec::new(),
            output,
        }
    }

    /// Sends a note-on and schedules its note-off `gate * step_duration`
    /// later. No-ops (and schedules nothing) if the output reports itself
    /// disconnected.
    pub fn schedule_note_on(&mut self, channel: u8, note: u8, velocity: u8, step_duration: Duration, gate: f64) {
        if !self.output.is_connected() {
            return;
        }
        if !self.output.send_note_on(channel, note, velocity) {
            return;
        }
        let off_time = Instant::now() + step_duration.mul_f64(gate.max(0.0));
        self.pending.push(PendingNoteOff { off_time, channel, note });
    }

    /// Sends note-off for every pending note whose `off_time` has passed.
    /// Walks the list in reverse so each removal only invalidates indices
    /// already visited.
    pub fn process_due(&mut self, now: Instant) {
        for i in (0..self.pending.len()).rev() {
            if self.pending[i].off_time <= now {
                let note = self.pending.remove(i);
                self.output.send_note_off(note.channel, note.note);
            }
        }
    }

    /// Sends note-off for every pending note immediately and drops the
    /// queue, then requests an all-notes-off on the output for good measure.
    pub fn clear_all(&mut self) {
        self.pending.clear();
        self.output.all_notes_off(None);
    }

    /// Earliest pending `off_time`, or `None` if nothing is pending. Used to
    /// size the note-off loop's adaptive sleep.
    pub fn next_off_time(&self) -> Option<Instant> {
        self.pending.iter().map(|p| p.off_time).min()
    }

    /// Number of notes currently awaiting their note-off.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Direct access to the underlying output, for transport messages
    /// (clock/start/stop/continue) the engine sends outside of note
    /// scheduling. `NoteScheduler` and [`crate::clock_generator::ClockGenerator`]
    /// never reference each other; the engine is the only thing that needs
    /// both a note scheduler and a transport.
    pub fn output_mut(&mut self) -> &mut dyn MidiOutput {
        self.output.as_mut()
    }
}
