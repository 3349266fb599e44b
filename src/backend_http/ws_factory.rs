use crate::connection::*;
use crate::domain_model::*;
use futures_util::StreamExt;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Error as WsError;

/// Dials the gateway websocket (`ws://…/api/ws-chat`). Identity travels as a
/// query parameter; the handshake carries no bearer token (backend contract).
pub struct WsConnectionFactory {
    endpoint: String,
}

impl WsConnectionFactory {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait::async_trait]
impl ConnectionFactory for WsConnectionFactory {
    async fn open(
        &self,
        identity: ParticipantId,
        _token: &AccessToken,
    ) -> Result<ConnHalves, ConnectionError> {
        let url = format!("{}?memberPk={}", self.endpoint, identity);
        let (stream, _response) = connect_async(url.as_str()).await.map_err(|e| match e {
            WsError::Http(response) => {
                ConnectionError::HandshakeRejected(response.status().to_string())
            }
            other => ConnectionError::Unreachable(other.to_string()),
        })?;

        let (sink, stream) = stream.split();
        Ok(ConnHalves {
            sender: Box::new(sink),
            receiver: Box::new(stream),
        })
    }
}
