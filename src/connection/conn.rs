use crate::connection::*;
use crate::logger::*;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Lifecycle of an established connection. Dialing happens before one
/// exists (`ConnectionFactory::open` returns handshake-complete halves), so
/// `Open` is the starting state.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ConnState {
    Open,
    Closing,
    Closed,
    Failed,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConnectionError {
    #[error("gateway unreachable: {0}")]
    Unreachable(String),
    #[error("handshake rejected: {0}")]
    HandshakeRejected(String),
    #[error("transport error: {0}")]
    Transport(String),
}

#[derive(Debug, thiserror::Error)]
pub enum FrameSendError {
    #[error("connection is not open ({0:?})")]
    NotOpen(ConnState),
    #[error("frame encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("transport error: {0}")]
    Transport(String),
}

/// Raw inbound happenings, delivered to exactly one consumer in transport
/// order by a single reader task.
#[derive(Debug)]
pub enum InboundEvent {
    Frame(ConnMessage),
    TransportError(String),
    Disconnected,
}

/// One established transport session to the messaging gateway. Owned by a
/// single session at a time; never auto-reconnects.
pub struct Connection {
    state: Arc<Mutex<ConnState>>,
    outbound: AsyncMutex<Box<dyn ConnSender>>,
    reader_handle: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl Connection {
    /// Wraps handshake-complete halves and starts the reader task. Inbound
    /// events go to `inbound_tx` until `close` or a transport failure.
    pub fn spawn(halves: ConnHalves, inbound_tx: Sender<InboundEvent>) -> Arc<Self> {
        let state = Arc::new(Mutex::new(ConnState::Open));
        let cancel = CancellationToken::new();

        let reader = tokio::spawn(read_loop(
            halves.receiver,
            inbound_tx,
            state.clone(),
            cancel.clone(),
        ));

        Arc::new(Self {
            state,
            outbound: AsyncMutex::new(halves.sender),
            reader_handle: Mutex::new(Some(reader)),
            cancel,
        })
    }

    pub fn state(&self) -> ConnState {
        self.state.lock().map(|s| *s).unwrap_or(ConnState::Failed)
    }

    /// Fire-and-forget transmit; reliability is the caller's concern.
    pub async fn send(&self, message: ConnMessage) -> Result<(), FrameSendError> {
        let state = self.state();
        if state != ConnState::Open {
            return Err(FrameSendError::NotOpen(state));
        }

        let mut outbound = self.outbound.lock().await;
        if let Err(e) = outbound.send(message).await {
            set_state(&self.state, ConnState::Failed);
            return Err(FrameSendError::Transport(e.to_string()));
        }
        Ok(())
    }

    pub async fn send_frame(&self, frame: &ClientFrame) -> Result<(), FrameSendError> {
        let text = serde_json::to_string(frame)?;
        self.send(ConnMessage::Text(text)).await
    }

    /// Idempotent. After completion no further inbound events are delivered.
    pub async fn close(&self) {
        match self.state() {
            ConnState::Closed => return,
            ConnState::Open => set_state(&self.state, ConnState::Closing),
            _ => {}
        }

        // Stop the reader before the close frame goes out so nothing can be
        // delivered past this point.
        self.cancel.cancel();
        let handle = self
            .reader_handle
            .lock()
            .ok()
            .and_then(|mut lock| lock.take());
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        let mut outbound = self.outbound.lock().await;
        if let Err(e) = outbound.send(ConnMessage::Close).await {
            trace!("close frame not delivered: {e}");
        }
        set_state(&self.state, ConnState::Closed);
    }
}

fn set_state(state: &Mutex<ConnState>, next: ConnState) {
    if let Ok(mut lock) = state.lock() {
        *lock = next;
    }
}

async fn read_loop(
    mut receiver: Box<dyn ConnReceiver>,
    inbound_tx: Sender<InboundEvent>,
    state: Arc<Mutex<ConnState>>,
    cancel: CancellationToken,
) {
    loop {
        let maybe_message = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            m = receiver.next() => m,
        };

        match maybe_message {
            None => {
                set_state(&state, ConnState::Closed);
                deliver(&inbound_tx, &cancel, InboundEvent::Disconnected).await;
                break;
            }
            Some(Ok(ConnMessage::Close)) => {
                set_state(&state, ConnState::Closed);
                deliver(&inbound_tx, &cancel, InboundEvent::Disconnected).await;
                break;
            }
            Some(Ok(message)) => {
                if !deliver(&inbound_tx, &cancel, InboundEvent::Frame(message)).await {
                    break;
                }
            }
            Some(Err(e)) => {
                set_state(&state, ConnState::Failed);
                deliver(
                    &inbound_tx,
                    &cancel,
                    InboundEvent::TransportError(e.to_string()),
                )
                .await;
                break;
            }
        }
    }
    trace!("connection reader finished");
}

// A full mailbox must not park the reader past cancellation, or `close`
// would never see the reader finish. Returns false when the event was
// dropped (cancelled or consumer gone).
async fn deliver(
    inbound_tx: &Sender<InboundEvent>,
    cancel: &CancellationToken,
    event: InboundEvent,
) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        sent = inbound_tx.send(event) => sent.is_ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_model::RoomId;
    use tokio::sync::mpsc;

    fn channel_halves() -> (
        ConnHalves,
        mpsc::Receiver<ConnMessage>,
        mpsc::Sender<ConnMessage>,
    ) {
        let (c2s_tx, c2s_rx) = mpsc::channel::<ConnMessage>(16);
        let (s2c_tx, s2c_rx) = mpsc::channel::<ConnMessage>(16);
        let halves = ConnHalves {
            sender: Box::new(c2s_tx),
            receiver: Box::new(s2c_rx),
        };
        (halves, c2s_rx, s2c_tx)
    }

    #[tokio::test]
    async fn send_serializes_frames_in_order() {
        let (halves, mut wire, _s2c) = channel_halves();
        let (inbound_tx, _inbound_rx) = mpsc::channel(16);
        let conn = Connection::spawn(halves, inbound_tx);
        assert_eq!(conn.state(), ConnState::Open);

        conn.send_frame(&ClientFrame::Subscribe { room: RoomId(1) })
            .await
            .unwrap();
        conn.send_frame(&ClientFrame::Subscribe { room: RoomId(2) })
            .await
            .unwrap();

        for expected in [1i64, 2] {
            match wire.recv().await.unwrap() {
                ConnMessage::Text(t) => assert!(t.contains(&format!("\"room\":{expected}"))),
                other => panic!("unexpected frame: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn send_after_close_is_not_open() {
        let (halves, _wire, _s2c) = channel_halves();
        let (inbound_tx, _inbound_rx) = mpsc::channel(16);
        let conn = Connection::spawn(halves, inbound_tx);

        conn.close().await;
        let err = conn.send(ConnMessage::Text("x".into())).await.unwrap_err();
        assert!(matches!(err, FrameSendError::NotOpen(ConnState::Closed)));
    }

    #[tokio::test]
    async fn close_is_idempotent_and_silences_inbound() {
        let (halves, _wire, s2c) = channel_halves();
        let (inbound_tx, mut inbound_rx) = mpsc::channel(16);
        let conn = Connection::spawn(halves, inbound_tx);

        conn.close().await;
        conn.close().await;
        assert_eq!(conn.state(), ConnState::Closed);

        // A frame pushed after close must never surface.
        let _ = s2c.send(ConnMessage::Text("late".into())).await;
        assert!(inbound_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn close_completes_with_full_inbound_mailbox() {
        let (halves, _wire, s2c) = channel_halves();
        // capacity 1 and an undrained receiver: the second frame parks the
        // reader mid-send
        let (inbound_tx, _inbound_rx) = mpsc::channel(1);
        let conn = Connection::spawn(halves, inbound_tx);

        for _ in 0..4 {
            let _ = s2c.send(ConnMessage::Text("burst".into())).await;
        }

        tokio::time::timeout(std::time::Duration::from_secs(5), conn.close())
            .await
            .expect("close must interrupt a parked reader");
        assert_eq!(conn.state(), ConnState::Closed);
    }

    #[tokio::test]
    async fn remote_drop_reports_disconnect() {
        let (halves, _wire, s2c) = channel_halves();
        let (inbound_tx, mut inbound_rx) = mpsc::channel(16);
        let conn = Connection::spawn(halves, inbound_tx);

        drop(s2c);
        match inbound_rx.recv().await.unwrap() {
            InboundEvent::Disconnected => {}
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(conn.state(), ConnState::Closed);
    }
}
