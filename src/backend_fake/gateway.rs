use crate::connection::*;
use crate::domain_model::*;
use crate::logger::*;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use tokio::sync::mpsc::{Receiver, Sender, channel};

const MAILBOX_CAP: usize = 256;

struct Subscriber {
    conn_id: u64,
    to_client: Sender<ConnMessage>,
}

/// In-process messaging gateway for tests and the demo client. Speaks the
/// real gateway's frames: subscribe/unsubscribe/send in, chat frames out.
/// Message ids and timestamps are assigned here, and a send is echoed to
/// every subscriber of the room, the sender included.
pub struct FakeGateway {
    rooms: Arc<DashMap<RoomId, Vec<Subscriber>>>,
    names: DashMap<ParticipantId, String>,
    next_message_id: Arc<AtomicI64>,
    next_conn_id: AtomicU64,
    fail_next_open: AtomicBool,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            names: DashMap::new(),
            next_message_id: Arc::new(AtomicI64::new(1)),
            next_conn_id: AtomicU64::new(1),
            fail_next_open: AtomicBool::new(false),
        }
    }

    pub fn register_name(&self, id: ParticipantId, name: impl Into<String>) {
        self.names.insert(id, name.into());
    }

    /// The next `open` call is rejected, as if the gateway were unreachable.
    pub fn fail_next_open(&self) {
        self.fail_next_open.store(true, Ordering::SeqCst);
    }

    /// Where server-assigned message ids continue from.
    pub fn set_next_message_id(&self, id: i64) {
        self.next_message_id.store(id, Ordering::SeqCst);
    }

    pub fn subscriber_count(&self, room_id: RoomId) -> usize {
        self.rooms.get(&room_id).map(|subs| subs.len()).unwrap_or(0)
    }

    /// Push a frame to a room's subscribers as if the gateway originated it.
    /// Lets tests inject retransmits and foreign-room traffic.
    pub async fn push_chat(&self, room_id: RoomId, frame: &ChatFrame) -> anyhow::Result<()> {
        let text = serde_json::to_string(frame)?;
        broadcast(&self.rooms, room_id, &text).await;
        Ok(())
    }

    /// Close every subscriber of a room from the server side.
    pub async fn kick(&self, room_id: RoomId) {
        let targets: Vec<Sender<ConnMessage>> = self
            .rooms
            .remove(&room_id)
            .map(|(_, subs)| subs.into_iter().map(|s| s.to_client).collect())
            .unwrap_or_default();
        for target in targets {
            let _ = target.send(ConnMessage::Close).await;
        }
    }
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ConnectionFactory for FakeGateway {
    async fn open(
        &self,
        identity: ParticipantId,
        _token: &AccessToken,
    ) -> Result<ConnHalves, ConnectionError> {
        if self.fail_next_open.swap(false, Ordering::SeqCst) {
            return Err(ConnectionError::Unreachable("gateway offline".to_string()));
        }

        let (c2s_tx, c2s_rx) = channel::<ConnMessage>(MAILBOX_CAP);
        let (s2c_tx, s2c_rx) = channel::<ConnMessage>(MAILBOX_CAP);

        let conn = GatewayConn {
            conn_id: self.next_conn_id.fetch_add(1, Ordering::SeqCst),
            identity,
            display_name: self
                .names
                .get(&identity)
                .map(|name| name.clone())
                .unwrap_or_else(|| format!("member-{identity}")),
            rooms: self.rooms.clone(),
            next_message_id: self.next_message_id.clone(),
        };
        tokio::spawn(gateway_conn(conn, c2s_rx, s2c_tx));

        Ok(ConnHalves {
            sender: Box::new(c2s_tx),
            receiver: Box::new(s2c_rx),
        })
    }
}

struct GatewayConn {
    conn_id: u64,
    identity: ParticipantId,
    display_name: String,
    rooms: Arc<DashMap<RoomId, Vec<Subscriber>>>,
    next_message_id: Arc<AtomicI64>,
}

async fn gateway_conn(
    conn: GatewayConn,
    mut from_client: Receiver<ConnMessage>,
    to_client: Sender<ConnMessage>,
) {
    while let Some(message) = from_client.recv().await {
        match message {
            ConnMessage::Text(text) => handle_client_frame(&conn, &to_client, &text).await,
            ConnMessage::Ping => {
                let _ = to_client.send(ConnMessage::Pong).await;
            }
            ConnMessage::Pong => {}
            ConnMessage::Binary(_) => {
                warn!("unexpected binary message from [{}]", conn.identity);
            }
            ConnMessage::Close => break,
        }
    }

    for mut entry in conn.rooms.iter_mut() {
        entry.value_mut().retain(|s| s.conn_id != conn.conn_id);
    }
    debug!("gateway connection [{}] finished", conn.identity);
}

async fn handle_client_frame(conn: &GatewayConn, to_client: &Sender<ConnMessage>, text: &str) {
    match serde_json::from_str::<ClientFrame>(text) {
        Ok(ClientFrame::Subscribe { room }) => {
            conn.rooms.entry(room).or_default().push(Subscriber {
                conn_id: conn.conn_id,
                to_client: to_client.clone(),
            });
        }
        Ok(ClientFrame::Unsubscribe { room }) => {
            if let Some(mut subs) = conn.rooms.get_mut(&room) {
                subs.retain(|s| s.conn_id != conn.conn_id);
            }
        }
        Ok(ClientFrame::Send {
            room,
            listing: _,
            body,
        }) => {
            let frame = ChatFrame {
                from: conn.identity,
                from_name: conn.display_name.clone(),
                body,
                sent_at: Utc::now(),
                message_id: MessageId(conn.next_message_id.fetch_add(1, Ordering::SeqCst)),
                room: Some(room),
            };
            match serde_json::to_string(&frame) {
                Ok(text) => broadcast(&conn.rooms, room, &text).await,
                Err(e) => warn!("failed to encode chat frame: {e}"),
            }
        }
        Err(e) => {
            warn!("malformed frame from [{}]: {e}", conn.identity);
            let _ = to_client
                .send(ConnMessage::Text("malformed message".to_owned()))
                .await;
        }
    }
}

async fn broadcast(rooms: &DashMap<RoomId, Vec<Subscriber>>, room_id: RoomId, text: &str) {
    let targets: Vec<Sender<ConnMessage>> = rooms
        .get(&room_id)
        .map(|subs| subs.iter().map(|s| s.to_client.clone()).collect())
        .unwrap_or_default();
    for target in targets {
        let _ = target.send(ConnMessage::Text(text.to_owned())).await;
    }
}
