//! Layer 3 of the session's 3-layer data model: step-indexed pattern events.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single trigger within a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Step at which this event fires, 0..=255.
    pub step: u8,
    /// Velocity, 0.0-1.0.
    pub velocity: f64,
    /// MIDI note number, for melodic patterns.
    pub note: Option<u8>,
    /// Gate length as a fraction of the step duration.
    pub gate: f64,
}

impl Event {
    /// Builds an event with the schema defaults (`velocity = 1.0`, `gate = 1.0`).
    pub fn new(step: u8) -> Self {
        Self {
            step,
            velocity: 1.0,
            note: None,
            gate: 1.0,
        }
    }
}

/// A step-indexed sequence of [`Event`]s for one track.
///
/// The `step -> event indices` index is built once, at construction, so
/// that [`EventSequence::get_events_at`] is O(1) per step the way the
/// source's `_step_index` is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventSequence {
    /// Track this sequence belongs to.
    pub track_id: String,
    /// Events, in insertion order.
    events: Vec<Event>,
    /// `step -> indices into `events`` built by [`EventSequence::from_events`]
    /// and on deserialization.
    #[serde(skip)]
    step_index: BTreeMap<u8, Vec<usize>>,
}

impl EventSequence {
    /// Builds a sequence from a track id and an ordered event list,
    /// constructing the step index immediately.
    pub fn from_events(track_id: impl Into<String>, events: Vec<Event>) -> Self {
        let mut seq = Self {
            track_id: track_id.into(),
            events,
            step_index: BTreeMap::new(),
        };
        seq.build_index();
        seq
    }

    fn build_index(&mut self) {
        self.step_index.clear();
        for (i, event) in self.events.iter().enumerate() {
            self.step_index.entry(event.step).or_default().push(i);
        }
    }

    /// Rebuilds the step index. Required after deserialization, since the
    /// index itself is not carried over the wire.
    pub fn reindex(&mut self) {
        self.build_index();
    }

    /// All events scheduled at `step` (O(1) lookup). Empty if none.
    pub fn get_events_at(&self, step: u8) -> Vec<&Event> {
        self.step_index
            .get(&step)
            .map(|indices| indices.iter().map(|&i| &self.events[i]).collect())
            .unwrap_or_default()
    }

    /// Whether any event is scheduled at `step`.
    pub fn has_events_at(&self, step: u8) -> bool {
        self.step_index.contains_key(&step)
    }

    /// Number of events in this sequence.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether this sequence has no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Steps that have at least one event, in ascending order.
    pub fn steps_with_events(&self) -> Vec<u8> {
        self.step_index.keys().copied().collect()
    }

    /// Iterates over every event, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    /// An empty sequence for `track_id`, used by exclusive-apply to clear
    /// a non-named track's events while preserving its definition.
    pub fn empty(track_id: impl Into<String>) -> Self {
        Self::from_events(track_id, Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexes_events_by_step() {
        let seq = EventSequence::from_events(
            "kick",
            vec![Event::new(0), Event::new(4), Event::new(4)],
        );
        assert_eq!(seq.get_events_at(0).len(), 1);
        assert_eq!(seq.get_events_at(4).len(), 2);
        assert!(seq.get_events_at(1).is_empty());
        assert!(seq.has_events_at(0));
        assert!(!seq.has_events_at(1));
        assert_eq!(seq.steps_with_events(), vec![0, 4]);
    }

    #[test]
    fn reindex_after_deserialize() {
        let seq = EventSequence::from_events("kick", vec![Event::new(2)]);
        let json = serde_json::to_string(&seq).unwrap();
        let mut back: EventSequence = serde_json::from_str(&json).unwrap();
        assert!(back.get_events_at(2).is_empty());
        back.reindex();
        assert_eq!(back.get_events_at(2).len(), 1);
    }
}
