// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The agent's state machine (§4.7): connect → start → stream output →
//! heartbeat → complete, all interleaved with a non-blocking poll for
//! inbound `kill` and output acks.
//!
//! Rather than a literal poll-every-100ms loop, the interleaving is
//! expressed with `tokio::select!` — each branch below (child output, a
//! channel message, a timer tick) is a suspension point the runtime
//! multiplexes the same way a hand-rolled poll loop would, without
//! ever blocking the others.

use std::time::Duration;

use sp_channel::{AgentMessage, ChannelClient, OutputStream, ServerMessage};
use tokio::time::Instant;

use crate::buffer::OutputBuffer;
use crate::env::AgentConfig;
use crate::process::{self, RunningCommand};

/// Reconnect attempts are spaced this far apart while disconnected
/// (§4.7 "Connection resilience").
const RECONNECT_INTERVAL: Duration = Duration::from_secs(2);
/// Independent liveness signal, sent whether or not output is flowing
/// (§4.7 "Heartbeat").
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
/// How often the main loop checks whether a flush is due; unrelated to
/// the flush thresholds themselves (`buffer::DEFAULT_FLUSH_*`).
const FLUSH_CHECK_INTERVAL: Duration = Duration::from_millis(50);
/// Keep retrying `complete` against a reconnecting channel for this
/// long after the process exits before giving up (§4.7 "Connection
/// resilience").
const COMPLETION_WINDOW: Duration = Duration::from_secs(60);

const TERMINATED_BY_USER_MARKER: &str = "[Job terminated by user request]";

struct Session {
    config: AgentConfig,
    channel: Option<ChannelClient>,
    buffer: OutputBuffer,
    killed: bool,
}

impl Session {
    fn now_ms(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    fn connect_message(&self) -> AgentMessage {
        AgentMessage::Connect {
            job_name: self.config.job_name.clone(),
            job_instance: self.config.job_instance.clone(),
            machine: self.config.machine.clone(),
            timestamp: self.now_ms(),
        }
    }

    fn start_message(&self, pid: u32) -> AgentMessage {
        AgentMessage::Start {
            job_name: self.config.job_name.clone(),
            job_instance: self.config.job_instance.clone(),
            machine: self.config.machine.clone(),
            pid,
        }
    }

    fn output_message(&self, seq: u64, stream: OutputStream, data: String) -> AgentMessage {
        AgentMessage::Output {
            job_name: self.config.job_name.clone(),
            job_instance: self.config.job_instance.clone(),
            machine: self.config.machine.clone(),
            seq,
            stream,
            data,
            timestamp: self.now_ms(),
        }
    }

    fn heartbeat_message(&self) -> AgentMessage {
        AgentMessage::Heartbeat {
            job_name: self.config.job_name.clone(),
            job_instance: self.config.job_instance.clone(),
            machine: self.config.machine.clone(),
            timestamp: self.now_ms(),
        }
    }

    fn complete_message(&self, retcode: i32) -> AgentMessage {
        AgentMessage::Complete {
            job_name: self.config.job_name.clone(),
            job_instance: self.config.job_instance.clone(),
            machine: self.config.machine.clone(),
            retcode,
            timestamp: self.now_ms(),
        }
    }

    /// Try once to (re)establish the channel, sending `connect` and
    /// replaying any unacked output so a resumed connection starts in
    /// sync (§4.6 "Duplicate connect for an already-running (instance,
    /// machine): accept as resumption").
    async fn try_connect(&mut self) {
        match ChannelClient::connect(&self.config.websocket_url).await {
            Ok(mut client) => {
                let connect = self.connect_message();
                if client.send(&connect).await.is_err() {
                    return;
                }
                for msg in self.buffer.unacked() {
                    let out = self.output_message(msg.seq, msg.stream, msg.data.clone());
                    let _ = client.send(&out).await;
                }
                self.channel = Some(client);
            }
            Err(e) => {
                tracing::debug!(error = %e, "agent: channel connect failed, will retry");
            }
        }
    }

    /// Flush the buffer if due and forward the new message over the
    /// channel when connected. The message is retained regardless of
    /// connection state (§4.7): it's only ever dropped on ack.
    async fn maybe_flush(&mut self) {
        let now = self.now_ms();
        if !self.buffer.flush_due(now) {
            return;
        }
        let Some(msg) = self.buffer.flush(now) else { return };
        if let Some(client) = &mut self.channel {
            let out = self.output_message(msg.seq, msg.stream, msg.data);
            if client.send(&out).await.is_err() {
                self.channel = None;
            }
        }
    }

    async fn send_heartbeat(&mut self) {
        let msg = self.heartbeat_message();
        if let Some(client) = &mut self.channel {
            if client.send(&msg).await.is_err() {
                self.channel = None;
            }
        }
    }

    /// Apply one inbound `ServerMessage`. Returns `true` if a kill was
    /// observed (the caller drives the actual SIGTERM/SIGKILL sequence,
    /// since that needs the running child, which this session doesn't
    /// own).
    async fn apply_server_message(&mut self, msg: ServerMessage) -> bool {
        match msg {
            ServerMessage::Ack { seq } => {
                self.buffer.ack(seq);
                false
            }
            ServerMessage::SyncResponse { last_seq } => {
                // The server has everything up to `last_seq`; ack drops
                // it from our retained tail, and whatever remains
                // unacked is exactly what it's missing.
                self.buffer.ack(last_seq);
                if let Some(client) = &mut self.channel {
                    for msg in self.buffer.unacked() {
                        let out = self.output_message(msg.seq, msg.stream, msg.data.clone());
                        if client.send(&out).await.is_err() {
                            self.channel = None;
                            break;
                        }
                    }
                }
                false
            }
            ServerMessage::Kill { .. } => {
                // Two kills in quick succession: the second is a no-op
                // because the caller only acts on the first `true`.
                let first = !self.killed;
                self.killed = true;
                first
            }
        }
    }

    /// Send `complete`, retrying against a possibly-reconnecting
    /// channel for up to `COMPLETION_WINDOW` (§4.7 "Completion path").
    async fn send_complete_with_retry(&mut self, retcode: i32) {
        let deadline = Instant::now() + COMPLETION_WINDOW;
        loop {
            if self.channel.is_none() {
                self.try_connect().await;
            }
            if let Some(client) = &mut self.channel {
                for msg in self.buffer.unacked() {
                    let out = self.output_message(msg.seq, msg.stream, msg.data.clone());
                    let _ = client.send(&out).await;
                }
                let complete = self.complete_message(retcode);
                if client.send(&complete).await.is_ok() {
                    return;
                }
                self.channel = None;
            }
            if Instant::now() >= deadline {
                tracing::warn!("agent: giving up on delivering `complete` after the completion window");
                return;
            }
            tokio::time::sleep(RECONNECT_INTERVAL).await;
        }
    }
}

/// Run one job instance end to end: spawn the command, stream its
/// output, honour cancellation, and report final disposition. Always
/// returns — the caller (`main`) just exits the process afterward.
pub async fn run(config: AgentConfig) {
    let RunningCommand { mut child, pid, mut lines } =
        match process::spawn(&config.command, config.cwd.as_deref(), config.user.as_deref(), &config.passthrough_env) {
            Ok(running) => running,
            Err(e) => {
                tracing::error!(error = %e, "agent: failed to spawn command");
                report_spawn_failure(&config, &e.to_string()).await;
                return;
            }
        };

    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);

    let mut session = Session { config, channel: None, buffer: OutputBuffer::new(now), killed: false };
    session.try_connect().await;
    if let Some(client) = &mut session.channel {
        let start = session.start_message(pid);
        if client.send(&start).await.is_err() {
            session.channel = None;
        }
    }

    let deadline = session.config.timeout_secs.map(|secs| Instant::now() + Duration::from_secs(secs));

    let mut reconnect_ticker = tokio::time::interval(RECONNECT_INTERVAL);
    let mut heartbeat_ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
    let mut flush_ticker = tokio::time::interval(FLUSH_CHECK_INTERVAL);

    let mut retcode: i32;
    let mut self_timed_out = false;

    loop {
        let recv_fut = async {
            match &mut session.channel {
                Some(client) => client.recv().await,
                None => std::future::pending().await,
            }
        };
        let timeout_fut = async {
            match deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;

            line = lines.recv() => {
                match line {
                    Some(captured) => session.buffer.push_line(captured.stream, captured.text),
                    None => {} // both pipes closed; `child.wait()` below is the real signal
                }
            }
            status = child.wait() => {
                retcode = match status {
                    Ok(status) => exit_code_of(status, session.killed, self_timed_out),
                    Err(e) => {
                        tracing::error!(error = %e, "agent: failed to reap child process");
                        sp_core::exit_code::OTHER_FAILURE
                    }
                };
                break;
            }
            _ = timeout_fut => {
                tracing::warn!(job = %session.config.job_name, "agent: SP_TIMEOUT exceeded, killing command");
                self_timed_out = true;
                process::terminate(&mut child, pid).await;
                retcode = sp_core::exit_code::TIMEOUT;
                break;
            }
            inbound = recv_fut => {
                match inbound {
                    Ok(Some(msg)) => {
                        if session.apply_server_message(msg).await {
                            session.buffer.push_line(OutputStream::Stdout, TERMINATED_BY_USER_MARKER.to_string());
                            process::terminate(&mut child, pid).await;
                        }
                    }
                    Ok(None) => {} // ping/pong, ignored
                    Err(_) => session.channel = None,
                }
            }
            _ = reconnect_ticker.tick() => {
                if session.channel.is_none() {
                    session.try_connect().await;
                }
            }
            _ = heartbeat_ticker.tick() => {
                session.send_heartbeat().await;
            }
            _ = flush_ticker.tick() => {
                session.maybe_flush().await;
            }
        }
    }

    // Drain anything left in the pipes and flush the remainder.
    while let Ok(Some(captured)) = lines.try_recv() {
        session.buffer.push_line(captured.stream, captured.text);
    }
    loop {
        let now = session.now_ms();
        let Some(msg) = session.buffer.flush(now) else { break };
        if let Some(client) = &mut session.channel {
            let out = session.output_message(msg.seq, msg.stream, msg.data);
            if client.send(&out).await.is_err() {
                session.channel = None;
            }
        }
    }

    session.send_complete_with_retry(retcode).await;
}

fn exit_code_of(status: std::process::ExitStatus, killed_by_user: bool, self_timed_out: bool) -> i32 {
    if self_timed_out {
        return sp_core::exit_code::TIMEOUT;
    }
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return if killed_by_user { sp_core::exit_code::KILLED_BY_USER } else { 128 + sig };
        }
    }
    sp_core::exit_code::OTHER_FAILURE
}

/// The command never started at all (e.g. `sh` itself missing) — there
/// is no child to stream output from, so go straight to reporting an
/// `error` (§4.6: treated by the server as `complete` with code 255).
async fn report_spawn_failure(config: &AgentConfig, error: &str) {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    let mut session = Session { config: config.clone(), channel: None, buffer: OutputBuffer::new(now), killed: false };
    session.try_connect().await;
    if let Some(client) = &mut session.channel {
        let connect = session.connect_message();
        let _ = client.send(&connect).await;
        let err = AgentMessage::Error {
            job_name: session.config.job_name.clone(),
            job_instance: session.config.job_instance.clone(),
            machine: session.config.machine.clone(),
            error: error.to_string(),
            timestamp: session.now_ms(),
        };
        let _ = client.send(&err).await;
    }
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
