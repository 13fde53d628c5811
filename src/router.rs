//! Fans scheduled messages out to their registered destination senders.

use crate::scheduler::ScheduledMessage;
use crate::senders::DestinationSender;
use std::collections::BTreeMap;

/// Routes scheduled messages to the sender registered for each
/// `destination_id`, grouping consecutive messages for the same
/// destination to preserve per-destination send order.
#[derive(Default)]
pub struct DestinationRouter {
    senders: BTreeMap<String, Box<dyn DestinationSender>>,
}

impl DestinationRouter {
    /// An empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the sender for `destination_id`.
    pub fn register_destination(&mut self, destination_id: impl Into<String>, sender: Box<dyn DestinationSender>) {
        self.senders.insert(destination_id.into(), sender);
    }

    /// Removes the sender registered for `destination_id`, if any.
    pub fn unregister_destination(&mut self, destination_id: &str) {
        self.senders.remove(destination_id);
    }

    /// Dispatches `messages`, grouped by `destination_id` in the order each
    /// destination first appears, preserving relative order within a group.
    ///
    /// Unlike the source this was ported from, which only commented that a
    /// warning "could" be logged here, a message for an unregistered
    /// destination is logged at warning level and dropped.
    pub fn send_messages(&mut self, messages: &[ScheduledMessage]) {
        let mut grouped: Vec<(&str, Vec<&ScheduledMessage>)> = Vec::new();
        for msg in messages {
            match grouped.iter_mut().find(|(id, _)| *id == msg.destination_id) {
                Some((_, group)) => group.push(msg),
                None => grouped.push((&msg.destination_id, vec![msg])),
            }
        }

        for (destination_id, group) in grouped {
            match self.senders.get_mut(destination_id) {
                Some(sender) => {
                    for msg in group {
                        sender.send_message(&msg.params);
                    }
                }
                None => {
                    tracing::warn!(destination_id, "destination not registered, dropping message(s)");
                }
            }
        }
    }

    /// Ids of all currently registered destinations.
    pub fn get_registered_destinations(&self) -> Vec<&str> {
        self.senders.keys().map(String::as_str).collect()
    }

    /// `destination_id -> (kind, is_connected)` for every registered sender,
    /// for the heartbeat loop's connection-delta check.
    pub fn connection_snapshot(&self) -> BTreeMap<String, (crate::senders::SenderKind, bool)> {
        self.senders
            .iter()
            .map(|(id, sender)| (id.clone(), (sender.kind(), sender.is_connected())))
            .collect()
    }
}
