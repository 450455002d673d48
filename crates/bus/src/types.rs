// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::BTreeMap;

use thiserror::Error;

/// A bus-assigned handle for one `submit_launch` call, opaque outside
/// this crate's implementations.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BusJobRef(pub String);

/// What to launch and where (§4.3 step 4): the dispatcher builds the
/// environment mapping (channel URL, job identity, command, user/cwd/
/// timeout, `custom_env`) and hands it to the bus rather than ever
/// putting any of it on a command line.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub job_instance_id: String,
    pub targets: Vec<String>,
    pub agent_path: String,
    pub env: BTreeMap<String, String>,
}

/// One target's Phase 1 resolution (§4.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// Agent fork succeeded (bus retcode 0); ready for Phase 2.
    Confirmed,
    /// The bus heard back with a non-zero retcode: the agent could not
    /// start. Carries the exact retcode and any stderr text.
    Rejected { retcode: i32, error: String },
    /// The bus itself could not reach the target (distinct from a
    /// rejection the target returned) — finalised with code 255.
    Unreachable { error: String },
}

/// One target's result from the legacy (`use_agent=false`) synchronous
/// path (§4.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub retcode: i32,
    pub output: String,
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("resolving targets {expr:?}: {reason}")]
    Resolve { expr: String, reason: String },
    #[error("submitting launch for job instance {job_instance_id}: {reason}")]
    Submit { job_instance_id: String, reason: String },
    #[error("polling launch outcomes for {0:?}: unknown job reference")]
    UnknownJobRef(BusJobRef),
    #[error("running synchronous command: {0}")]
    SyncExec(String),
    #[error("transport failure talking to the bus: {0}")]
    Transport(#[from] std::io::Error),
}
