// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The in-memory `AgentConnection` table (§3 / §5): mutated only from
//! the channel server's own tasks, keyed by `(job_instance_id, machine)`.
//!
//! A `parking_lot::Mutex` guards it rather than confining it to a
//! single task, because each accepted socket runs its own tokio task —
//! but every critical section here is a single map operation, so the
//! "no external lock needed" framing in the design notes still holds in
//! spirit: nothing outside this crate ever touches the registry.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::protocol::ServerMessage;

pub type ConnectionKey = (String, String); // (job_instance_id, machine)

pub struct AgentConnection {
    pub job_name: String,
    pub connected_at_epoch_ms: u64,
    pub outbound: mpsc::Sender<ServerMessage>,
}

#[derive(Default)]
pub struct ConnectionRegistry {
    inner: Mutex<HashMap<ConnectionKey, AgentConnection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: ConnectionKey, conn: AgentConnection) {
        self.inner.lock().insert(key, conn);
    }

    pub fn remove(&self, key: &ConnectionKey) {
        self.inner.lock().remove(key);
    }

    /// All connections whose job matches `job_name`, for best-effort kill
    /// delivery (§4.6 outbound). Returns cloned senders so the caller
    /// doesn't hold the registry lock across the (potentially blocking)
    /// send.
    pub fn senders_for_job(&self, job_name: &str) -> Vec<mpsc::Sender<ServerMessage>> {
        self.inner
            .lock()
            .values()
            .filter(|c| c.job_name == job_name)
            .map(|c| c.outbound.clone())
            .collect()
    }

    pub fn contains(&self, key: &ConnectionKey) -> bool {
        self.inner.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
