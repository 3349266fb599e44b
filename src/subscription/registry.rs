use crate::connection::{ClientFrame, Connection, FrameSendError};
use crate::domain_model::*;
use std::collections::HashSet;

/// Which rooms have a subscribe frame on the wire for the current connection.
///
/// The recorded set must always reflect frames actually sent: a room is
/// recorded only after its subscribe frame went out, and forgotten only after
/// the unsubscribe frame went out.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    subscribed: HashSet<RoomId>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent: a second subscribe for the same room sends nothing.
    pub async fn subscribe(
        &mut self,
        connection: &Connection,
        room_id: RoomId,
    ) -> Result<(), FrameSendError> {
        if self.subscribed.contains(&room_id) {
            return Ok(());
        }
        connection
            .send_frame(&ClientFrame::Subscribe { room: room_id })
            .await?;
        self.subscribed.insert(room_id);
        Ok(())
    }

    /// No-op for rooms that were never subscribed.
    pub async fn unsubscribe(
        &mut self,
        connection: &Connection,
        room_id: RoomId,
    ) -> Result<(), FrameSendError> {
        if !self.subscribed.contains(&room_id) {
            return Ok(());
        }
        connection
            .send_frame(&ClientFrame::Unsubscribe { room: room_id })
            .await?;
        self.subscribed.remove(&room_id);
        Ok(())
    }

    pub fn is_subscribed(&self, room_id: RoomId) -> bool {
        self.subscribed.contains(&room_id)
    }

    /// Forget everything. Only valid once the connection itself is gone; the
    /// wire state died with it.
    pub fn clear(&mut self) {
        self.subscribed.clear();
    }
}
