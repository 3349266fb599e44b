use crate::connection::*;
use crate::domain_model::*;
use crate::logger::*;
use crate::session::guard::RoomClaim;
use crate::session_port::*;
use crate::subscription::SubscriptionRegistry;
use crate::timeline::MessageTimeline;
use nanoid::nanoid;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{Receiver, channel};
use tokio::task::JoinHandle;

const MAILBOX_CAP: usize = 256;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SessionState {
    Idle,
    Opening,
    Active,
    Closing,
    Closed,
    Failed,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session already started ({0:?})")]
    AlreadyStarted(SessionState),
    #[error("another session is bound to room {0}")]
    RoomBusy(RoomId),
    #[error("nothing to resume ({0:?})")]
    NotResumable(SessionState),
    #[error(transparent)]
    Connection(ConnectionError),
    #[error("subscribe failed: {0}")]
    Subscribe(FrameSendError),
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("session is not active ({0:?})")]
    NotActive(SessionState),
    #[error(transparent)]
    Frame(#[from] FrameSendError),
}

/// Orchestrates one chat conversation: open connection, subscribe, merge
/// history with the live stream, mark-read, teardown. One room at a time.
///
/// The whole room-session state sits behind a single mutex, so every state
/// mutation is serialized. Async completions (history page, inbound frames)
/// carry the generation they were started under and are discarded when a
/// newer generation has taken over.
pub struct SessionController {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    identity: ParticipantId,
    token: AccessToken,
    factory: Arc<dyn ConnectionFactory>,
    history: Arc<dyn HistorySource>,
    read_tracker: Arc<dyn ReadTracker>,
    observer: Arc<dyn SessionObserver>,
    core: Mutex<SessionCore>,
}

struct SessionCore {
    run_id: String,
    state: SessionState,
    generation: u64,
    room: Option<Room>,
    claim: Option<RoomClaim>,
    timeline: Option<MessageTimeline>,
    subscriptions: SubscriptionRegistry,
    connection: Option<Arc<Connection>>,
    pump: Option<JoinHandle<()>>,
    failed_reported: bool,
}

impl SessionController {
    pub fn new(
        identity: ParticipantId,
        token: AccessToken,
        factory: Arc<dyn ConnectionFactory>,
        history: Arc<dyn HistorySource>,
        read_tracker: Arc<dyn ReadTracker>,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        let alphabet: [char; 16] = [
            '1', '2', '3', '4', '5', '6', '7', '8', '9', '0', 'a', 'b', 'c', 'd', 'e', 'f',
        ];
        let run_id = nanoid!(10, &alphabet);

        Self {
            inner: Arc::new(SessionInner {
                identity,
                token,
                factory,
                history,
                read_tracker,
                observer,
                core: Mutex::new(SessionCore {
                    run_id,
                    state: SessionState::Idle,
                    generation: 0,
                    room: None,
                    claim: None,
                    timeline: None,
                    subscriptions: SubscriptionRegistry::new(),
                    connection: None,
                    pump: None,
                    failed_reported: false,
                }),
            }),
        }
    }

    /// Open the room: connect, subscribe, start the history fetch, route the
    /// live stream. Returns once the session is `Active`; the history page
    /// may still be in flight at that point.
    pub async fn start_session(&self, room: Room) -> Result<(), SessionError> {
        let mut core = self.inner.core.lock().await;
        match core.state {
            SessionState::Idle | SessionState::Closed | SessionState::Failed => {}
            s => return Err(SessionError::AlreadyStarted(s)),
        }

        // release any previous room before claiming the new one
        core.claim = None;
        let claim =
            RoomClaim::acquire(room.room_id).ok_or(SessionError::RoomBusy(room.room_id))?;
        core.claim = Some(claim);
        core.timeline = Some(MessageTimeline::new(room.room_id));
        core.room = Some(room);

        self.inner.open_and_attach(&mut core).await
    }

    /// Retry hook after a failure: reconnects, re-subscribes, and requests
    /// only the history past the timeline's high-water mark. Backoff policy
    /// is the caller's.
    pub async fn restart_session(&self) -> Result<(), SessionError> {
        let mut core = self.inner.core.lock().await;
        if core.state != SessionState::Failed || core.room.is_none() {
            return Err(SessionError::NotResumable(core.state));
        }
        self.inner.open_and_attach(&mut core).await
    }

    /// Valid only while `Active`. The sent message is not echoed into the
    /// local timeline; it appears when the gateway broadcasts it back.
    pub async fn send_message(&self, body: &str) -> Result<(), SendError> {
        // build the frame under the lock, transmit without it: the wire can
        // apply backpressure and must not stall other session operations
        let (connection, frame) = {
            let core = self.inner.core.lock().await;
            if core.state != SessionState::Active {
                return Err(SendError::NotActive(core.state));
            }
            let (connection, room) = match (core.connection.as_ref(), core.room.as_ref()) {
                (Some(c), Some(r)) => (c.clone(), r.clone()),
                _ => return Err(SendError::NotActive(core.state)),
            };
            let frame = ClientFrame::Send {
                room: room.room_id,
                listing: room.listing_id,
                body: body.to_owned(),
            };
            (connection, frame)
        };
        connection.send_frame(&frame).await?;
        Ok(())
    }

    /// Idempotent teardown: unsubscribe (best effort), close the connection,
    /// discard the timeline. Completions of in-flight work started before
    /// this call are discarded by the generation check.
    pub async fn end_session(&self) {
        let mut core = self.inner.core.lock().await;
        match core.state {
            SessionState::Idle | SessionState::Closing | SessionState::Closed => return,
            _ => {}
        }
        core.state = SessionState::Closing;
        core.generation += 1;
        let run_id = core.run_id.clone();
        let connection = core.connection.take();
        let room = core.room.clone();
        let mut subscriptions = std::mem::take(&mut core.subscriptions);
        core.timeline = None;
        core.claim = None;
        let pump = core.pump.take();
        // Wire teardown runs with the lock released: the pump needs the
        // mutex to drain the mailbox the reader could be parked on, and
        // `Closing` already fences off every other entry point.
        drop(core);

        if let (Some(connection), Some(room)) = (connection, room) {
            if let Err(e) = subscriptions.unsubscribe(&connection, room.room_id).await {
                debug!("[{run_id}] unsubscribe on teardown failed: {e}");
            }
            connection.close().await;
        }
        // the pump ends on its own once the closed connection's channel drains
        if let Some(handle) = pump {
            let _ = handle.await;
        }

        let mut core = self.inner.core.lock().await;
        core.state = SessionState::Closed;
        info!("[{run_id}] session closed");
    }

    pub async fn state(&self) -> SessionState {
        self.inner.core.lock().await.state
    }

    pub async fn room(&self) -> Option<Room> {
        self.inner.core.lock().await.room.clone()
    }

    /// Current merged timeline, chronological. Empty outside a session.
    pub async fn snapshot(&self) -> Vec<ChatMessage> {
        let core = self.inner.core.lock().await;
        core.timeline
            .as_ref()
            .map(|t| t.snapshot())
            .unwrap_or_default()
    }
}

impl SessionInner {
    async fn open_and_attach(
        self: &Arc<Self>,
        core: &mut SessionCore,
    ) -> Result<(), SessionError> {
        let room = match core.room.clone() {
            Some(room) => room,
            None => return Err(SessionError::NotResumable(core.state)),
        };

        core.state = SessionState::Opening;
        core.generation += 1;
        core.failed_reported = false;
        let generation = core.generation;
        info!(
            "[{}] opening session for room {} (gen {})",
            core.run_id, room.room_id, generation
        );

        let halves = match self.factory.open(self.identity, &self.token).await {
            Ok(halves) => halves,
            Err(e) => {
                self.fail_locked(core, &SessionFault::Connect(e.clone()));
                return Err(SessionError::Connection(e));
            }
        };

        let (inbound_tx, inbound_rx) = channel(MAILBOX_CAP);
        let connection = Connection::spawn(halves, inbound_tx);

        if let Err(e) = core.subscriptions.subscribe(&connection, room.room_id).await {
            connection.close().await;
            let fault = SessionFault::Subscribe(e.to_string());
            self.fail_locked(core, &fault);
            return Err(SessionError::Subscribe(e));
        }

        core.connection = Some(connection);
        core.state = SessionState::Active;
        info!("[{}] session active for room {}", core.run_id, room.room_id);

        let pump_inner = self.clone();
        core.pump = Some(tokio::spawn(pump_inbound(
            pump_inner, generation, inbound_rx,
        )));

        // May resolve after live frames have already trickled in; the
        // timeline merge makes the arrival order irrelevant.
        let after = core.timeline.as_ref().and_then(|t| t.high_water_mark());
        let history_inner = self.clone();
        let room_id = room.room_id;
        tokio::spawn(async move {
            history_inner.load_history(generation, room_id, after).await;
        });

        Ok(())
    }

    async fn load_history(&self, generation: u64, room_id: RoomId, after: Option<MessageId>) {
        let result = self.history.fetch(room_id, after).await;

        let mut core = self.core.lock().await;
        if core.generation != generation || core.state != SessionState::Active {
            debug!("[{}] stale history response dropped", core.run_id);
            return;
        }

        match result {
            Ok(messages) => {
                let run_id = core.run_id.clone();
                let Some(timeline) = core.timeline.as_mut() else {
                    return;
                };
                let inserted = timeline.load_history(messages);
                debug!(
                    "[{run_id}] history merged: {inserted} new, {} total",
                    timeline.len()
                );
                if inserted > 0 {
                    let snapshot = timeline.snapshot();
                    self.observer.timeline_changed(&snapshot);
                }
            }
            Err(e) => {
                // degraded session: live messages only
                warn!("[{}] history fetch failed: {e}", core.run_id);
                self.observer.history_unavailable(&e);
            }
        }
    }

    async fn handle_chat_text(&self, generation: u64, text: &str) {
        let frame: ChatFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("malformed chat frame dropped: {e}");
                return;
            }
        };

        let mut core = self.core.lock().await;
        if core.generation != generation || core.state != SessionState::Active {
            return;
        }
        let run_id = core.run_id.clone();
        let Some(timeline) = core.timeline.as_mut() else {
            return;
        };
        let room_id = timeline.room_id();
        if let Some(room) = frame.room {
            if room != room_id {
                warn!("[{run_id}] frame for foreign room {room} dropped");
                return;
            }
        }

        let message = frame.into_message(room_id, DeliveryOrigin::Live);
        if timeline.append_live(message) {
            let snapshot = timeline.snapshot();
            self.observer.timeline_changed(&snapshot);
            self.spawn_mark_read(room_id);
        }
    }

    async fn handle_ping(&self, generation: u64) {
        let connection = {
            let core = self.core.lock().await;
            if core.generation != generation {
                return;
            }
            core.connection.clone()
        };
        if let Some(connection) = connection {
            let _ = connection.send(ConnMessage::Pong).await;
        }
    }

    async fn handle_disconnect(&self, generation: u64) {
        let mut core = self.core.lock().await;
        if core.generation != generation {
            return;
        }
        match core.state {
            // a local end_session is already tearing things down
            SessionState::Closing | SessionState::Closed => {}
            _ => self.fail_locked(&mut core, &SessionFault::RemoteClosed),
        }
    }

    async fn handle_transport_error(&self, generation: u64, detail: String) {
        let mut core = self.core.lock().await;
        if core.generation != generation {
            return;
        }
        self.fail_locked(&mut core, &SessionFault::ConnectionLost(detail));
    }

    fn fail_locked(&self, core: &mut SessionCore, fault: &SessionFault) {
        core.state = SessionState::Failed;
        core.connection = None;
        core.subscriptions.clear();
        // room, claim and timeline stay: restart_session resumes from here
        if !core.failed_reported {
            core.failed_reported = true;
            warn!("[{}] session failed: {fault}", core.run_id);
            self.observer.session_failed(fault);
        }
    }

    fn spawn_mark_read(&self, room_id: RoomId) {
        let tracker = self.read_tracker.clone();
        tokio::spawn(async move {
            // best effort, never retried
            if let Err(e) = tracker.mark_read(room_id).await {
                warn!("mark-read failed for room {room_id}: {e}");
            }
        });
    }
}

async fn pump_inbound(
    inner: Arc<SessionInner>,
    generation: u64,
    mut inbound_rx: Receiver<InboundEvent>,
) {
    while let Some(event) = inbound_rx.recv().await {
        match event {
            InboundEvent::Frame(ConnMessage::Text(text)) => {
                inner.handle_chat_text(generation, &text).await;
            }
            InboundEvent::Frame(ConnMessage::Ping) => {
                inner.handle_ping(generation).await;
            }
            InboundEvent::Frame(ConnMessage::Pong) => {
                trace!("pong received");
            }
            InboundEvent::Frame(ConnMessage::Binary(_)) => {
                warn!("unexpected binary frame from gateway");
            }
            InboundEvent::Frame(ConnMessage::Close) | InboundEvent::Disconnected => {
                inner.handle_disconnect(generation).await;
                break;
            }
            InboundEvent::TransportError(detail) => {
                inner.handle_transport_error(generation, detail).await;
                break;
            }
        }
    }
    trace!("inbound pump finished (gen {generation})");
}
