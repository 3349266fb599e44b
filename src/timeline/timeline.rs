use crate::domain_model::*;
use std::collections::{BTreeMap, HashSet};

/// The client-local ordered view of one room's messages.
///
/// History pages and live pushes funnel through the same insert-dedup path,
/// so the snapshot order is chronological regardless of arrival order. A
/// message id seen once is never inserted again.
#[derive(Debug)]
pub struct MessageTimeline {
    room_id: RoomId,
    entries: BTreeMap<TimelineKey, ChatMessage>,
    seen: HashSet<MessageId>,
    history_loaded: bool,
}

impl MessageTimeline {
    pub fn new(room_id: RoomId) -> Self {
        Self {
            room_id,
            entries: BTreeMap::new(),
            seen: HashSet::new(),
            history_loaded: false,
        }
    }

    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    /// Merges a historical page. Live messages that raced ahead of the fetch
    /// are retained; duplicates are dropped. Returns how many messages were
    /// newly inserted.
    pub fn load_history(&mut self, messages: Vec<ChatMessage>) -> usize {
        self.history_loaded = true;
        let mut inserted = 0;
        for message in messages {
            if self.insert(message) {
                inserted += 1;
            }
        }
        inserted
    }

    /// Inserts one live push. Returns false when the id was already present.
    pub fn append_live(&mut self, message: ChatMessage) -> bool {
        self.insert(message)
    }

    /// Current merged view, chronological. Pure.
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.entries.values().cloned().collect()
    }

    /// Identifier of the latest message incorporated, for resuming history
    /// after an interruption.
    pub fn high_water_mark(&self) -> Option<MessageId> {
        self.entries.keys().next_back().map(|k| k.message_id)
    }

    pub fn history_loaded(&self) -> bool {
        self.history_loaded
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, message: ChatMessage) -> bool {
        if !self.seen.insert(message.message_id) {
            return false;
        }
        self.entries.insert(message.timeline_key(), message);
        true
    }
}
