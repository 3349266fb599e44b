use crate::domain_model::*;

#[derive(Debug, thiserror::Error)]
pub enum RoomOpenError {
    #[error("listing not found")]
    ListingNotFound,
    #[error("not authorized")]
    Forbidden,
    #[error("room service error: {0}")]
    Service(String),
}

#[async_trait::async_trait]
pub trait RoomDirectory: Send + Sync {
    /// Open (or look up) the room for a listing + current-user pair.
    async fn open_room(&self, listing_id: ListingId) -> Result<Room, RoomOpenError>;

    /// All conversations of the current user, most recent first.
    async fn list_rooms(&self) -> Result<Vec<RoomSummary>, RoomOpenError>;
}
