// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The agent side of the channel protocol (§4.7): a thin connect/send/
//! receive wrapper. Reconnection policy, output buffering and the
//! heartbeat timer live in `sp-agent`, which is the only consumer —
//! this module's job is only to get `AgentMessage`/`ServerMessage`
//! values on and off the wire.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::protocol::{AgentMessage, ServerMessage};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("failed to connect to {url}: {source}")]
    Connect { url: String, #[source] source: tokio_tungstenite::tungstenite::Error },
    #[error("connection closed by server")]
    Closed,
    #[error("websocket error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("malformed server message: {0}")]
    Decode(#[from] serde_json::Error),
}

/// One connected channel socket. Not `Clone` — the agent holds exactly
/// one live client at a time and replaces it wholesale on reconnect.
pub struct ChannelClient {
    write: SplitSink<WsStream, Message>,
    read: SplitStream<WsStream>,
}

impl ChannelClient {
    pub async fn connect(url: &str) -> Result<Self, ClientError> {
        let (ws, _response) =
            tokio_tungstenite::connect_async(url).await.map_err(|source| {
                ClientError::Connect { url: url.to_string(), source }
            })?;
        let (write, read) = ws.split();
        Ok(Self { write, read })
    }

    pub async fn send(&mut self, msg: &AgentMessage) -> Result<(), ClientError> {
        let encoded = serde_json::to_string(msg)?;
        self.write.send(Message::Text(encoded.into())).await?;
        Ok(())
    }

    /// Wait for the next `ServerMessage`. Returns `Err(ClientError::Closed)`
    /// when the server hangs up and `Ok(None)` for frames worth ignoring
    /// (ping/pong/binary) so callers can loop without special-casing them.
    pub async fn recv(&mut self) -> Result<Option<ServerMessage>, ClientError> {
        match self.read.next().await {
            Some(Ok(Message::Text(text))) => Ok(Some(serde_json::from_str(&text)?)),
            Some(Ok(Message::Close(_))) | None => Err(ClientError::Closed),
            Some(Ok(_)) => Ok(None),
            Some(Err(e)) => Err(e.into()),
        }
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
