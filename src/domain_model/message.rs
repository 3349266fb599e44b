use crate::domain_model::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which path delivered a message to this client.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryOrigin {
    History,
    Live,
}

/// One chat utterance. Immutable after creation; ids and timestamps are
/// assigned by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub message_id: MessageId,
    pub room_id: RoomId,
    pub sender: ParticipantId,
    pub sender_name: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
    pub origin: DeliveryOrigin,
}

impl ChatMessage {
    pub fn timeline_key(&self) -> TimelineKey {
        TimelineKey {
            sent_at: self.sent_at,
            message_id: self.message_id,
        }
    }
}

/// Total order for the merged timeline: (timestamp, id), id as tie-breaker.
#[derive(Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub struct TimelineKey {
    pub sent_at: DateTime<Utc>,
    pub message_id: MessageId,
}
