use crate::domain_model::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Control and chat frames sent by the client.
///
/// On the wire: `{"action":"subscribe","room":42}` and
/// `{"action":"send","room":42,"listing":7,"body":"..."}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ClientFrame {
    Subscribe { room: RoomId },
    Unsubscribe { room: RoomId },
    Send { room: RoomId, listing: ListingId, body: String },
}

/// A chat message pushed by the gateway. The `room` echo is optional; older
/// gateways omit it because the topic already identifies the room.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatFrame {
    pub from: ParticipantId,
    pub from_name: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
    pub message_id: MessageId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<RoomId>,
}

impl ChatFrame {
    pub fn into_message(self, room_id: RoomId, origin: DeliveryOrigin) -> ChatMessage {
        ChatMessage {
            message_id: self.message_id,
            room_id,
            sender: self.from,
            sender_name: self.from_name,
            body: self.body,
            sent_at: self.sent_at,
            origin,
        }
    }
}
