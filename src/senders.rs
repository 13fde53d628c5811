//! Concrete per-destination senders: the glue between a
//! [`DestinationRouter`](crate::router::DestinationRouter) entry and an
//! [`OscOutput`]/[`MidiOutput`] transport.

use crate::constants::midi_cc;
use crate::output::{MidiOutput, OscOutput};
use crate::param_value::ParamMap;

/// Which transport a registered destination sends over. Used by the
/// heartbeat loop to pick `CONNECTION_LOST_MIDI` vs `CONNECTION_LOST_OSC`
/// when a destination's underlying transport drops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderKind {
    /// Backed by an [`OscOutput`].
    Osc,
    /// Backed by a [`MidiOutput`].
    Midi,
}

/// A sender bound to one destination; registered with the router under that
/// destination's id.
pub trait DestinationSender: Send {
    /// Sends a single message's params to this destination.
    fn send_message(&mut self, params: &ParamMap) -> bool;
    /// Which transport this destination is backed by.
    fn kind(&self) -> SenderKind;
    /// Whether the underlying transport is currently connected.
    fn is_connected(&self) -> bool;
}

/// Sends a flattened `params` map as a single OSC message to a fixed address.
pub struct OscSender {
    address: String,
    output: Box<dyn OscOutput>,
}

impl OscSender {
    /// Creates a sender that writes every message to `address` over `output`.
    pub fn new(address: impl Into<String>, mut output: Box<dyn OscOutput>) -> Self {
        output.connect();
        Self {
            address: address.into(),
            output,
        }
    }
}

impl DestinationSender for OscSender {
    fn send_message(&mut self, params: &ParamMap) -> bool {
        self.output.send_message(&self.address, params)
    }

    fn kind(&self) -> SenderKind {
        SenderKind::Osc
    }

    fn is_connected(&self) -> bool {
        self.output.is_connected()
    }
}

/// Dispatches `params` to note-on, CC, or pitch-bend MIDI messages depending
/// on which keys are present, falling back to this destination's configured
/// default channel when `params` carries none.
pub struct MidiSender {
    default_channel: u8,
    output: Box<dyn MidiOutput>,
}

impl MidiSender {
    /// Creates a sender writing to `output` on `default_channel` unless a
    /// message's params override it.
    pub fn new(default_channel: u8, output: Box<dyn MidiOutput>) -> Self {
        Self {
            default_channel,
            output,
        }
    }

    fn channel(&self, params: &ParamMap) -> u8 {
        params
            .get("channel")
            .and_then(|v| v.as_i64())
            .map(|c| c as u8)
            .unwrap_or(self.default_channel)
    }
}

impl DestinationSender for MidiSender {
    fn send_message(&mut self, params: &ParamMap) -> bool {
        let channel = self.channel(params);

        if let Some(note) = params.get("note").and_then(|v| v.as_i64()) {
            let velocity = params
                .get("velocity")
                .and_then(|v| v.as_i64())
                .unwrap_or(100) as u8;
            return self.output.send_note_on(channel, note as u8, velocity);
        }

        if let Some(cc) = params.get("cc").and_then(|v| v.as_i64()) {
            let value = params.get("value").and_then(|v| v.as_i64()).unwrap_or(0) as u8;
            return self.output.send_cc(channel, cc as u8, value);
        }

        if let Some(bend) = params.get("pitch_bend").and_then(|v| v.as_i64()) {
            return self.output.send_pitch_bend(channel, bend as i16);
        }

        false
    }

    fn kind(&self) -> SenderKind {
        SenderKind::Midi
    }

    fn is_connected(&self) -> bool {
        self.output.is_connected()
    }
}

/// Sends a modulation source onto a fixed, pre-bound CC number.
///
/// Not present in the source router, which dispatches by params key only;
/// added so `TrackMidi`'s `cc_modulations` map (keyed by CC number) has a
/// destination-level counterpart once wired by the engine. Reuses the
/// `midi_cc` constants rather than inventing a parallel naming scheme.
pub struct FixedCcSender {
    channel: u8,
    cc: u8,
    output: Box<dyn MidiOutput>,
}

impl FixedCcSender {
    /// Creates a sender that always writes to `cc` on `channel`.
    pub fn new(channel: u8, cc: u8, output: Box<dyn MidiOutput>) -> Self {
        Self { channel, cc, output }
    }

    /// A sender pre-bound to the sustain-pedal CC.
    pub fn sustain(channel: u8, output: Box<dyn MidiOutput>) -> Self {
        Self::new(channel, midi_cc::SUSTAIN, output)
    }
}

impl DestinationSender for FixedCcSender {
    fn send_message(&mut self, params: &ParamMap) -> bool {
        let Some(value) = params.get("value").and_then(|v| v.as_i64()) else {
            return false;
        };
        self.output.send_cc(self.channel, self.cc, value as u8)
    }

    fn kind(&self) -> SenderKind {
        SenderKind::Midi
    }

    fn is_connected(&self) -> bool {
        self.output.is_connected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::mock::{RecordingMidiOutput, RecordingOscOutput};
    use crate::param_value::ParamValue;

    fn params(pairs: &[(&str, ParamValue)]) -> ParamMap {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn osc_sender_flattens_to_fixed_address() {
        let recording = Box::<RecordingOscOutput>::default();
        let mut sender = OscSender::new("/track/1", recording);
        let p = params(&[("n", ParamValue::Int(60)), ("gain", ParamValue::Float(0.8))]);
        assert!(sender.send_message(&p));
    }

    #[test]
    fn midi_sender_dispatches_note_before_cc() {
        let recording = Box::<RecordingMidiOutput>::default();
        let mut sender = MidiSender::new(0, recording);
        let p = params(&[("note", ParamValue::Int(64)), ("velocity", ParamValue::Int(90))]);
        assert!(sender.send_message(&p));
    }

    #[test]
    fn midi_sender_uses_param_channel_over_default() {
        let recording = Box::<RecordingMidiOutput>::default();
        let mut sender = MidiSender::new(5, recording);
        let p = params(&[("cc", ParamValue::Int(74)), ("value", ParamValue::Int(20)), ("channel", ParamValue::Int(2))]);
        assert!(sender.send_message(&p));
    }

    #[test]
    fn midi_sender_with_no_recognized_key_sends_nothing() {
        let recording = Box::<RecordingMidiOutput>::default();
        let mut sender = MidiSender::new(0, recording);
        let p = params(&[("unused", ParamValue::Bool(true))]);
        assert!(!sender.send_message(&p));
    }
}
