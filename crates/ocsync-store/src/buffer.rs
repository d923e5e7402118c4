//! Bounded holding area for records whose owner has not arrived yet.
//!
//! Messages wait for their session, part updates wait for their message.
//! Each queue is FIFO with a fixed horizon; pushing past the horizon evicts
//! the oldest entry, which the caller logs as dropped.

use std::collections::VecDeque;

use ocsync_core::{Message, StoreConfig};
use ocsync_events::PartUpdated;

#[derive(Debug, Default)]
pub struct PendingBuffer {
    messages: VecDeque<Message>,
    parts: VecDeque<PartUpdated>,
    max_messages: usize,
    max_parts: usize,
}

impl PendingBuffer {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            messages: VecDeque::new(),
            parts: VecDeque::new(),
            max_messages: config.max_pending_messages,
            max_parts: config.max_pending_parts,
        }
    }

    /// Hold a message until its session appears. A newer snapshot of an
    /// already-held message replaces it in place.
    ///
    /// Returns the message evicted to stay within the horizon, if any.
    pub fn push_message(&mut self, message: Message) -> Option<Message> {
        if let Some(held) = self.messages.iter_mut().find(|m| m.id == message.id) {
            *held = message;
            return None;
        }
        push_bounded(&mut self.messages, message, self.max_messages)
    }

    /// Hold a part update until its message appears. Updates to the same part
    /// are all kept, in order, since deltas must be replayed one by one.
    pub fn push_part(&mut self, update: PartUpdated) -> Option<PartUpdated> {
        push_bounded(&mut self.parts, update, self.max_parts)
    }

    pub fn take_messages_for_session(&mut self, session_id: &str) -> Vec<Message> {
        drain_matching(&mut self.messages, |m| m.session_id == session_id)
    }

    pub fn take_parts_for_message(&mut self, message_id: &str) -> Vec<PartUpdated> {
        drain_matching(&mut self.parts, |u| {
            u.part.message_id.as_deref() == Some(message_id)
        })
    }

    /// Forget every held update for a part. Returns how many were dropped.
    pub fn remove_part(&mut self, part_id: &str) -> usize {
        let before = self.parts.len();
        self.parts.retain(|u| u.part.id != part_id);
        before - self.parts.len()
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn part_count(&self) -> usize {
        self.parts.len()
    }
}

fn push_bounded<T>(queue: &mut VecDeque<T>, item: T, max: usize) -> Option<T> {
    if max == 0 {
        return Some(item);
    }
    queue.push_back(item);
    if queue.len() > max {
        queue.pop_front()
    } else {
        None
    }
}

fn drain_matching<T>(queue: &mut VecDeque<T>, mut matches: impl FnMut(&T) -> bool) -> Vec<T> {
    let mut taken = Vec::new();
    let mut kept = VecDeque::with_capacity(queue.len());
    for item in queue.drain(..) {
        if matches(&item) {
            taken.push(item);
        } else {
            kept.push_back(item);
        }
    }
    *queue = kept;
    taken
}
