use crate::domain_model::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An open conversation between this client and one counterpart, attached to
/// a listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub room_id: RoomId,
    pub counterpart: ParticipantId,
    pub counterpart_name: String,
    pub listing_id: ListingId,
}

/// One row of the room list: the latest message and its read state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSummary {
    pub room_id: RoomId,
    pub listing_id: ListingId,
    pub counterpart: ParticipantId,
    pub counterpart_name: String,
    pub last_message: String,
    pub last_message_at: Option<DateTime<Utc>>,
    pub unread: bool,
}
