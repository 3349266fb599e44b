use crate::domain_model::*;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio_tungstenite::tungstenite::{Bytes, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

// region conn message

#[derive(Debug)]
pub enum ConnMessage {
    Text(String),
    Binary(Vec<u8>),
    Ping,
    Pong,
    Close,
}

impl From<Message> for ConnMessage {
    fn from(message: Message) -> Self {
        match message {
            Message::Text(t) => ConnMessage::Text(t.as_str().to_owned()),
            Message::Binary(b) => ConnMessage::Binary(b.to_vec()),
            Message::Ping(_) => ConnMessage::Ping,
            Message::Pong(_) => ConnMessage::Pong,
            Message::Close(_) => ConnMessage::Close,
            // NOTE: raw frames never surface through connect_async streams
            Message::Frame(_) => unreachable!("raw frame from websocket stream"),
        }
    }
}

impl From<ConnMessage> for Message {
    fn from(message: ConnMessage) -> Message {
        match message {
            ConnMessage::Text(t) => Message::text(t),
            ConnMessage::Binary(b) => Message::binary(b),
            ConnMessage::Ping => Message::Ping(Bytes::new()),
            ConnMessage::Pong => Message::Pong(Bytes::new()),
            ConnMessage::Close => Message::Close(None),
        }
    }
}

// endregion

// region conn sender / receiver

pub type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
pub type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

#[async_trait::async_trait]
pub trait ConnSender: Send + Sync {
    async fn send(&mut self, message: ConnMessage) -> anyhow::Result<()>;
}

#[async_trait::async_trait]
impl ConnSender for WsSink {
    async fn send(&mut self, message: ConnMessage) -> anyhow::Result<()> {
        SinkExt::send(&mut self, Message::from(message)).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ConnSender for Sender<ConnMessage> {
    async fn send(&mut self, message: ConnMessage) -> anyhow::Result<()> {
        Sender::<ConnMessage>::send(self, message).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
pub trait ConnReceiver: Send + Sync {
    async fn next(&mut self) -> Option<anyhow::Result<ConnMessage>>;
}

#[async_trait::async_trait]
impl ConnReceiver for WsStream {
    async fn next(&mut self) -> Option<anyhow::Result<ConnMessage>> {
        StreamExt::next(&mut self)
            .await
            .map(|result| result.map(ConnMessage::from).map_err(anyhow::Error::from))
    }
}

#[async_trait::async_trait]
impl ConnReceiver for Receiver<ConnMessage> {
    async fn next(&mut self) -> Option<anyhow::Result<ConnMessage>> {
        Some(Ok(Receiver::<ConnMessage>::recv(&mut *self).await?))
    }
}

// endregion

/// The two halves of an established transport connection, already past the
/// handshake.
pub struct ConnHalves {
    pub sender: Box<dyn ConnSender>,
    pub receiver: Box<dyn ConnReceiver>,
}

/// Dials the messaging gateway. Implemented over a real websocket and over
/// in-process channel pairs for tests.
#[async_trait::async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn open(
        &self,
        identity: ParticipantId,
        token: &AccessToken,
    ) -> Result<ConnHalves, super::ConnectionError>;
}
