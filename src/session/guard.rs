use crate::domain_model::RoomId;
use std::collections::HashSet;
use std::sync::{LazyLock, Mutex};

static ACTIVE_ROOMS: LazyLock<Mutex<HashSet<RoomId>>> =
    LazyLock::new(|| Mutex::new(HashSet::new()));

/// Process-wide claim enforcing one live session per room. Held for the
/// whole session, including across failures, so a retry never races a
/// second session for the same room.
#[derive(Debug)]
pub(crate) struct RoomClaim {
    room_id: RoomId,
}

impl RoomClaim {
    pub fn acquire(room_id: RoomId) -> Option<Self> {
        let mut rooms = ACTIVE_ROOMS.lock().ok()?;
        if rooms.insert(room_id) {
            Some(Self { room_id })
        } else {
            None
        }
    }
}

impl Drop for RoomClaim {
    fn drop(&mut self) {
        if let Ok(mut rooms) = ACTIVE_ROOMS.lock() {
            rooms.remove(&self.room_id);
        }
    }
}
