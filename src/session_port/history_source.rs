use crate::domain_model::*;

#[derive(Debug, thiserror::Error)]
pub enum HistoryFetchError {
    #[error("room not found")]
    RoomNotFound,
    #[error("not authorized for this room")]
    Forbidden,
    #[error("history service error: {0}")]
    Service(String),
}

/// Bulk historical page for a room. `after` requests only messages past a
/// known high-water mark when resuming an interrupted session.
#[async_trait::async_trait]
pub trait HistorySource: Send + Sync {
    async fn fetch(
        &self,
        room_id: RoomId,
        after: Option<MessageId>,
    ) -> Result<Vec<ChatMessage>, HistoryFetchError>;
}
