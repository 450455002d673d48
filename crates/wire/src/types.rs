// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Read-only view types returned by `Request::ReadState`.
//!
//! These are deliberately separate from `sp_core`'s internal
//! `SharedState` — they're a serialization-friendly snapshot, not the
//! locked, mutable structures the scheduler operates on.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobSummary {
    pub name: String,
    pub next_run_epoch_ms: Option<u64>,
    pub last_run_epoch_ms: Option<u64>,
    pub overlap: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetResultSummary {
    pub machine: String,
    pub starttime_epoch_ms: Option<u64>,
    pub endtime_epoch_ms: Option<u64>,
    pub retcode: Option<i32>,
    pub last_heartbeat_epoch_ms: u64,
    pub output_len: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunningInstanceSummary {
    pub job_instance_id: String,
    pub job_name: String,
    pub started_at_epoch_ms: u64,
    pub outstanding_machines: Vec<String>,
    pub targets: Vec<TargetResultSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MaintenanceSummary {
    pub global: bool,
    pub machines: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct StateSnapshot {
    pub jobs: Vec<JobSummary>,
    pub running: Vec<RunningInstanceSummary>,
    pub maintenance: Option<MaintenanceSummary>,
}
