use crate::domain_model::*;
use crate::session_port::*;
use dashmap::DashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::oneshot;

/// Canned history pages. Fetches can be gated (to reproduce the
/// live-before-history race) or made to fail (graceful-degradation path).
pub struct FakeHistorySource {
    messages: Mutex<Vec<ChatMessage>>,
    fetches: Mutex<Vec<(RoomId, Option<MessageId>)>>,
    gate: tokio::sync::Mutex<Option<oneshot::Receiver<()>>>,
    failing: AtomicBool,
}

impl FakeHistorySource {
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            fetches: Mutex::new(Vec::new()),
            gate: tokio::sync::Mutex::new(None),
            failing: AtomicBool::new(false),
        }
    }

    /// Every (room, after) pair fetched so far.
    pub fn fetches(&self) -> Vec<(RoomId, Option<MessageId>)> {
        self.fetches.lock().map(|f| f.clone()).unwrap_or_default()
    }

    pub fn push(&self, message: ChatMessage) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message);
        }
    }

    /// The next fetch blocks until the returned sender fires or drops.
    pub async fn hold(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.gate.lock().await = Some(rx);
        tx
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl Default for FakeHistorySource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl HistorySource for FakeHistorySource {
    async fn fetch(
        &self,
        room_id: RoomId,
        after: Option<MessageId>,
    ) -> Result<Vec<ChatMessage>, HistoryFetchError> {
        if let Ok(mut fetches) = self.fetches.lock() {
            fetches.push((room_id, after));
        }
        let gate = self.gate.lock().await.take();
        if let Some(rx) = gate {
            let _ = rx.await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(HistoryFetchError::Service(
                "history backend unavailable".to_string(),
            ));
        }

        let mut page: Vec<ChatMessage> = match self.messages.lock() {
            Ok(messages) => messages
                .iter()
                .filter(|m| m.room_id == room_id)
                .filter(|m| after.is_none_or(|after| m.message_id > after))
                .cloned()
                .collect(),
            Err(_) => Vec::new(),
        };
        for message in &mut page {
            message.origin = DeliveryOrigin::History;
        }
        page.sort_by_key(|m| m.timeline_key());
        Ok(page)
    }
}

/// Records every mark-read call; can be switched to failing to exercise the
/// logged-only error path.
pub struct RecordingReadTracker {
    calls: Mutex<Vec<RoomId>>,
    failing: AtomicBool,
}

impl RecordingReadTracker {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        }
    }

    pub fn calls(&self) -> Vec<RoomId> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl Default for RecordingReadTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ReadTracker for RecordingReadTracker {
    async fn mark_read(&self, room_id: RoomId) -> Result<(), ReadTrackError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ReadTrackError::Service(
                "read tracker unavailable".to_string(),
            ));
        }
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(room_id);
        }
        Ok(())
    }
}

/// Static room directory keyed by listing.
pub struct FakeRoomDirectory {
    rooms: DashMap<ListingId, Room>,
    summaries: Mutex<Vec<RoomSummary>>,
}

impl FakeRoomDirectory {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            summaries: Mutex::new(Vec::new()),
        }
    }

    pub fn insert_room(&self, room: Room) {
        self.rooms.insert(room.listing_id, room);
    }

    pub fn set_summaries(&self, summaries: Vec<RoomSummary>) {
        if let Ok(mut lock) = self.summaries.lock() {
            *lock = summaries;
        }
    }
}

impl Default for FakeRoomDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl RoomDirectory for FakeRoomDirectory {
    async fn open_room(&self, listing_id: ListingId) -> Result<Room, RoomOpenError> {
        self.rooms
            .get(&listing_id)
            .map(|room| room.clone())
            .ok_or(RoomOpenError::ListingNotFound)
    }

    async fn list_rooms(&self) -> Result<Vec<RoomSummary>, RoomOpenError> {
        Ok(self.summaries.lock().map(|s| s.clone()).unwrap_or_default())
    }
}
