// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The agent channel server (§4.6): accepts inbound WebSocket
//! connections from agents, demultiplexes messages by
//! `(job_instance, machine)`, and drives `SharedState` accordingly.
//!
//! One tokio task per accepted connection; a single background task
//! polls `SharedState::drain_commands()` for kill delivery. Neither
//! task ever finalises a target on its own initiative beyond what the
//! protocol requires here — the heartbeat-timeout and job-timeout
//! finalisation paths belong to the job monitor (§4.5), not this crate.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use sp_core::{Clock, SharedState};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::protocol::{AgentMessage, ServerMessage};
use crate::registry::{AgentConnection, ConnectionRegistry};

/// Owns the listener, the connection registry and the kill-delivery
/// background task. Cheap to clone: everything inside is `Arc`.
#[derive(Clone)]
pub struct ChannelServer {
    state: Arc<SharedState>,
    clock: Arc<dyn Clock>,
    registry: Arc<ConnectionRegistry>,
}

impl ChannelServer {
    pub fn new(state: Arc<SharedState>, clock: Arc<dyn Clock>) -> Self {
        Self { state, clock, registry: Arc::new(ConnectionRegistry::new()) }
    }

    /// Bind `addr` and run the accept loop plus the kill-delivery task
    /// forever. Returns only on a listener bind error.
    pub async fn run(self, addr: &str) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(%addr, "channel server listening");

        // Runs for the lifetime of the process; nothing ever joins it.
        tokio::spawn(self.clone().kill_delivery_loop());

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::warn!(%e, "channel server: accept failed");
                    continue;
                }
            };
            let server = self.clone();
            tokio::spawn(async move {
                if let Err(e) = server.handle_connection(stream, peer).await {
                    tracing::warn!(%peer, %e, "channel connection ended with error");
                }
            });
        }
    }

    async fn handle_connection(
        &self,
        stream: tokio::net::TcpStream,
        peer: std::net::SocketAddr,
    ) -> Result<(), ChannelError> {
        let ws = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(|e| ChannelError::Handshake(e.to_string()))?;
        let (mut write, mut read) = ws.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerMessage>(32);

        let mut key: Option<crate::registry::ConnectionKey> = None;

        loop {
            tokio::select! {
                incoming = read.next() => {
                    match incoming {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<AgentMessage>(&text) {
                                Ok(msg) => {
                                    if let Some(reply) = self.apply(&msg, &outbound_tx, &mut key).await {
                                        let encoded = serde_json::to_string(&reply)
                                            .map_err(ChannelError::Encode)?;
                                        let _ = write.send(Message::Text(encoded.into())).await;
                                    }
                                    if matches!(msg, AgentMessage::Complete { .. } | AgentMessage::Error { .. }) {
                                        break;
                                    }
                                }
                                Err(e) => {
                                    tracing::warn!(%peer, %e, "channel server: unparseable agent message");
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {} // ping/pong/binary ignored
                        Some(Err(e)) => {
                            tracing::warn!(%peer, %e, "channel server: read error");
                            break;
                        }
                    }
                }
                outbound = outbound_rx.recv() => {
                    match outbound {
                        Some(msg) => {
                            let encoded = serde_json::to_string(&msg).map_err(ChannelError::Encode)?;
                            let _ = write.send(Message::Text(encoded.into())).await;
                        }
                        None => break,
                    }
                }
            }
        }

        if let Some(key) = key {
            self.registry.remove(&key);
        }
        Ok(())
    }

    /// Apply one inbound `AgentMessage` to shared state, registering or
    /// resuming the connection as needed. Returns a message to send
    /// back immediately (ack / sync_response), if any.
    async fn apply(
        &self,
        msg: &AgentMessage,
        outbound_tx: &mpsc::Sender<ServerMessage>,
        key: &mut Option<crate::registry::ConnectionKey>,
    ) -> Option<ServerMessage> {
        let now = self.clock.epoch_ms();
        match msg {
            AgentMessage::Connect { job_name, job_instance, machine, .. } => {
                let k = (job_instance.clone(), machine.clone());
                self.registry.insert(
                    k.clone(),
                    AgentConnection {
                        job_name: job_name.clone(),
                        connected_at_epoch_ms: now,
                        outbound: outbound_tx.clone(),
                    },
                );
                *key = Some(k);
                let last_seq = self.state.with_target_result_mut(job_name, machine, |tr| tr.last_seq_applied);
                Some(ServerMessage::SyncResponse { last_seq })
            }
            AgentMessage::Start { job_name, machine, .. } => {
                self.state.with_target_result_mut(job_name, machine, |tr| {
                    tr.starttime_epoch_ms.get_or_insert(now);
                    tr.last_heartbeat_epoch_ms = now;
                });
                None
            }
            AgentMessage::Output { job_name, machine, seq, data, .. } => {
                self.state.with_target_result_mut(job_name, machine, |tr| {
                    if *seq == tr.last_seq_applied + 1 {
                        tr.output.push_str(data);
                        tr.last_seq_applied = *seq;
                        tr.last_heartbeat_epoch_ms = now;
                        Some(ServerMessage::Ack { seq: *seq })
                    } else {
                        Some(ServerMessage::SyncResponse { last_seq: tr.last_seq_applied })
                    }
                })
            }
            AgentMessage::Heartbeat { job_name, machine, .. } => {
                self.state.with_target_result_mut(job_name, machine, |tr| {
                    tr.last_heartbeat_epoch_ms = now;
                });
                None
            }
            AgentMessage::Complete { job_name, machine, retcode, .. } => {
                self.state.with_target_result_mut(job_name, machine, |tr| {
                    tr.finalize(now, *retcode);
                });
                None
            }
            AgentMessage::Error { job_name, machine, error, .. } => {
                self.state.with_target_result_mut(job_name, machine, |tr| {
                    tr.output.push_str(&format!("[SALTPETER ERROR: {error}]\n"));
                    tr.finalize(now, sp_core::exit_code::OTHER_FAILURE);
                });
                None
            }
        }
    }

    async fn kill_delivery_loop(self) {
        let mut ticker = tokio::time::interval(Duration::from_millis(500));
        loop {
            ticker.tick().await;
            let now = self.clock.epoch_ms();
            for entry in self.state.drain_commands() {
                let sp_core::CommandQueueEntry::Kill { job_name } = entry;
                for sender in self.registry.senders_for_job(&job_name) {
                    let _ = sender.send(ServerMessage::Kill { timestamp: now }).await;
                }
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("websocket handshake failed: {0}")]
    Handshake(String),
    #[error("failed to encode outbound message: {0}")]
    Encode(#[source] serde_json::Error),
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
