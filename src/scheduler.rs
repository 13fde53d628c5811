//! Message scheduling: index pre-compiled messages by step for O(1) lookup.

use crate::param_value::ParamMap;
use serde::{Deserialize, Serialize};

/// An immutable, pre-compiled message bound to a destination and a step.
///
/// The engine makes no semantic decisions about `params`; validation is the
/// producer's responsibility (see design note on dynamic typing).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledMessage {
    /// Destination this message is routed to, matched against a
    /// [`crate::destination::DestinationConfig`] id.
    pub destination_id: String,
    /// Timing position in bars, as used by the DSL layer. Opaque to the
    /// engine beyond being carried through.
    pub cycle: f64,
    /// Quantized step, 0..=255.
    pub step: u8,
    /// Untyped parameter bag handed to the destination's sender verbatim.
    pub params: ParamMap,
}

/// A batch of scheduled messages for one session submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduledMessageBatch {
    /// All messages for this session.
    pub messages: Vec<ScheduledMessage>,
    /// Tempo in beats per minute.
    #[serde(default = "default_bpm")]
    pub bpm: f64,
    /// Pattern length in cycles.
    #[serde(default = "default_pattern_length")]
    pub pattern_length: f64,
}

fn default_bpm() -> f64 {
    120.0
}

fn default_pattern_length() -> f64 {
    4.0
}

/// Schedules pre-compiled messages by step for playback.
///
/// Messages are indexed into a fixed-size, 256-slot array rather than a
/// hash map: steps are a known, small, dense key space (`0..=255`), so a
/// plain array lookup is both simpler and faster than the original
/// `defaultdict(list)` it replaces.
#[derive(Debug)]
pub struct MessageScheduler {
    messages_by_step: Box<[Vec<ScheduledMessage>; 256]>,
    bpm: f64,
    pattern_length: f64,
}

impl Default for MessageScheduler {
    fn default() -> Self {
        Self {
            messages_by_step: Box::new(std::array::from_fn(|_| Vec::new())),
            bpm: 120.0,
            pattern_length: 4.0,
        }
    }
}

impl MessageScheduler {
    /// An empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a batch, fully replacing any previously loaded messages.
    pub fn load_messages(&mut self, batch: ScheduledMessageBatch) {
        for slot in self.messages_by_step.iter_mut() {
            slot.clear();
        }
        self.bpm = batch.bpm;
        self.pattern_length = batch.pattern_length;
        for msg in batch.messages {
            let step = msg.step as usize;
            self.messages_by_step[step].push(msg);
        }
    }

    /// Messages scheduled at `step`, in insertion order. Empty if none.
    pub fn get_messages_at_step(&self, step: u8) -> &[ScheduledMessage] {
        &self.messages_by_step[step as usize]
    }

    /// Clears all scheduled messages.
    pub fn clear(&mut self) {
        for slot in self.messages_by_step.iter_mut() {
            slot.clear();
        }
    }

    /// Tempo recorded by the last loaded batch.
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Pattern length recorded by the last loaded batch.
    pub fn pattern_length(&self) -> f64 {
        self.pattern_length
    }

    /// Total number of scheduled messages across all steps.
    pub fn message_count(&self) -> usize {
        self.messages_by_step.iter().map(Vec::len).sum()
    }

    /// Steps that have at least one scheduled message.
    pub fn occupied_steps(&self) -> Vec<u8> {
        self.messages_by_step
            .iter()
            .enumerate()
            .filter(|(_, msgs)| !msgs.is_empty())
            .map(|(step, _)| step as u8)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(destination_id: &str, step: u8) -> ScheduledMessage {
        ScheduledMessage {
            destination_id: destination_id.to_string(),
            cycle: 0.0,
            step,
            params: ParamMap::new(),
        }
    }

    #[test]
    fn indexes_by_step_and_preserves_order() {
        let mut scheduler = MessageScheduler::new();
        scheduler.load_messages(ScheduledMessageBatch {
            messages: vec![msg("a", 0), msg("b", 0), msg("c", 4)],
            bpm: 120.0,
            pattern_length: 4.0,
        });
        let at_zero = scheduler.get_messages_at_step(0);
        assert_eq!(at_zero.len(), 2);
        assert_eq!(at_zero[0].destination_id, "a");
        assert_eq!(at_zero[1].destination_id, "b");
        assert!(scheduler.get_messages_at_step(1).is_empty());
        assert_eq!(scheduler.message_count(), 3);
        assert_eq!(scheduler.occupied_steps(), vec![0, 4]);
    }

    #[test]
    fn load_fully_replaces_prior_contents() {
        let mut scheduler = MessageScheduler::new();
        scheduler.load_messages(ScheduledMessageBatch {
            messages: vec![msg("a", 0)],
            bpm: 120.0,
            pattern_length: 4.0,
        });
        scheduler.load_messages(ScheduledMessageBatch {
            messages: vec![msg("b", 1)],
            bpm: 140.0,
            pattern_length: 4.0,
        });
        assert!(scheduler.get_messages_at_step(0).is_empty());
        assert_eq!(scheduler.get_messages_at_step(1).len(), 1);
        assert_eq!(scheduler.bpm(), 140.0);
    }
}
