use crate::domain_model::*;

#[derive(Debug, thiserror::Error)]
pub enum ReadTrackError {
    #[error("read-tracking service error: {0}")]
    Service(String),
}

/// Best-effort "messages in this room are now read" signal. Failures are
/// logged by the caller and never retried.
#[async_trait::async_trait]
pub trait ReadTracker: Send + Sync {
    async fn mark_read(&self, room_id: RoomId) -> Result<(), ReadTrackError>;
}
