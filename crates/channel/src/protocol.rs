// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The agent channel's JSON message envelope (§4.6 / external interfaces
//! table). Every message carries its routing triple
//! (`job_name`, `job_instance`, `machine`) so the server can demux
//! messages from many concurrently-connected agents on one socket
//! address space, and a `timestamp` (agent-observed epoch ms) used only
//! for diagnostics — liveness decisions are made against the server's
//! own clock, not the agent's claimed timestamp.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// agent → server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentMessage {
    Connect {
        job_name: String,
        job_instance: String,
        machine: String,
        timestamp: u64,
    },
    Start {
        job_name: String,
        job_instance: String,
        machine: String,
        pid: u32,
    },
    Output {
        job_name: String,
        job_instance: String,
        machine: String,
        seq: u64,
        stream: OutputStream,
        data: String,
        timestamp: u64,
    },
    Heartbeat {
        job_name: String,
        job_instance: String,
        machine: String,
        timestamp: u64,
    },
    Complete {
        job_name: String,
        job_instance: String,
        machine: String,
        retcode: i32,
        timestamp: u64,
    },
    Error {
        job_name: String,
        job_instance: String,
        machine: String,
        error: String,
        timestamp: u64,
    },
}

impl AgentMessage {
    pub fn job_instance(&self) -> &str {
        match self {
            AgentMessage::Connect { job_instance, .. }
            | AgentMessage::Start { job_instance, .. }
            | AgentMessage::Output { job_instance, .. }
            | AgentMessage::Heartbeat { job_instance, .. }
            | AgentMessage::Complete { job_instance, .. }
            | AgentMessage::Error { job_instance, .. } => job_instance,
        }
    }

    pub fn machine(&self) -> &str {
        match self {
            AgentMessage::Connect { machine, .. }
            | AgentMessage::Start { machine, .. }
            | AgentMessage::Output { machine, .. }
            | AgentMessage::Heartbeat { machine, .. }
            | AgentMessage::Complete { machine, .. }
            | AgentMessage::Error { machine, .. } => machine,
        }
    }

    pub fn job_name(&self) -> &str {
        match self {
            AgentMessage::Connect { job_name, .. }
            | AgentMessage::Start { job_name, .. }
            | AgentMessage::Output { job_name, .. }
            | AgentMessage::Heartbeat { job_name, .. }
            | AgentMessage::Complete { job_name, .. }
            | AgentMessage::Error { job_name, .. } => job_name,
        }
    }
}

/// server → agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Ack { seq: u64 },
    SyncResponse { last_seq: u64 },
    Kill { timestamp: u64 },
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
