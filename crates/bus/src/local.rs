// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! [`LocalBus`]: a `Bus` implementation that shells out to
//! `tokio::process::Command` on the local host instead of reaching a
//! real remote-execution substrate.
//!
//! This is the shippable, single-box deployment mode the expanded spec
//! calls for: every "target" is just a logical name, and launching an
//! agent "on" one means spawning `agent_path` as a local child process
//! with the given environment. Target resolution is deliberately
//! simple — a comma-separated list regardless of `target_type` — since
//! a single box has no grains, pillars, or node groups to query; richer
//! resolution is a matter of implementing another `Bus`.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sp_core::TargetType;
use tokio::process::Command;
use tokio::time::timeout;

use crate::types::{BusError, BusJobRef, LaunchOutcome, LaunchRequest, SyncOutcome};
use crate::Bus;

#[derive(Default)]
struct JobState {
    /// Outcomes produced so far but not yet drained by `poll_launch_outcomes`.
    pending: Vec<(String, LaunchOutcome)>,
}

/// Shells out locally. Cheap to clone — everything inside is `Arc`.
#[derive(Clone, Default)]
pub struct LocalBus {
    jobs: Arc<Mutex<HashMap<BusJobRef, JobState>>>,
    counter: Arc<AtomicU64>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_ref(&self) -> BusJobRef {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        BusJobRef(format!("local-{n}"))
    }

    /// Spawn `agent_path` for one target and classify the outcome the
    /// way §4.4 Phase 1 expects: a missing binary is 127, a non-executable
    /// one is 126, any other spawn failure is an "unreachable" target,
    /// and a successful spawn/exit is `Confirmed` regardless of the
    /// agent's own exit code (that code belongs to the job's eventual
    /// `TargetResult`, not to Phase 1 — the agent detaches and exits 0
    /// on success per §4.7, so a non-zero exit here still means the
    /// fork itself failed in some way the OS can report).
    async fn launch_one(request: &LaunchRequest, machine: &str) -> LaunchOutcome {
        let mut cmd = Command::new(&request.agent_path);
        cmd.envs(request.env.iter())
            .env("SP_MACHINE_ID", machine)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(false);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return LaunchOutcome::Rejected {
                    retcode: sp_core::exit_code::AGENT_NOT_FOUND,
                    error: format!("No such file or directory: {}", request.agent_path),
                };
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return LaunchOutcome::Rejected {
                    retcode: sp_core::exit_code::NOT_EXECUTABLE,
                    error: format!("permission denied: {}", request.agent_path),
                };
            }
            Err(e) => return LaunchOutcome::Unreachable { error: e.to_string() },
        };

        match timeout(Duration::from_secs(10), child.wait()).await {
            Ok(Ok(status)) if status.success() => LaunchOutcome::Confirmed,
            Ok(Ok(status)) => LaunchOutcome::Rejected {
                retcode: status.code().unwrap_or(sp_core::exit_code::OTHER_FAILURE),
                error: "agent process exited before detaching".to_string(),
            },
            Ok(Err(e)) => LaunchOutcome::Unreachable { error: e.to_string() },
            Err(_) => LaunchOutcome::Unreachable {
                error: "agent did not detach from the launching process in time".to_string(),
            },
        }
    }
}

#[async_trait]
impl Bus for LocalBus {
    async fn resolve_targets(
        &self,
        targets_expr: &str,
        _target_type: TargetType,
    ) -> Result<Vec<String>, BusError> {
        Ok(targets_expr.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect())
    }

    async fn submit_launch(&self, request: LaunchRequest) -> Result<BusJobRef, BusError> {
        let job_ref = self.next_ref();
        self.jobs.lock().insert(job_ref.clone(), JobState::default());

        let jobs = self.jobs.clone();
        let job_ref_for_task = job_ref.clone();
        tokio::spawn(async move {
            let mut outcomes = Vec::with_capacity(request.targets.len());
            for machine in &request.targets {
                let outcome = LocalBus::launch_one(&request, machine).await;
                outcomes.push((machine.clone(), outcome));
            }
            if let Some(state) = jobs.lock().get_mut(&job_ref_for_task) {
                state.pending.extend(outcomes);
            }
        });

        Ok(job_ref)
    }

    async fn poll_launch_outcomes(
        &self,
        job_ref: &BusJobRef,
    ) -> Result<Vec<(String, LaunchOutcome)>, BusError> {
        let mut jobs = self.jobs.lock();
        let state = jobs.get_mut(job_ref).ok_or_else(|| BusError::UnknownJobRef(job_ref.clone()))?;
        Ok(std::mem::take(&mut state.pending))
    }

    async fn run_sync(
        &self,
        targets: &[String],
        command: &str,
        timeout_secs: u64,
    ) -> Result<Vec<(String, SyncOutcome)>, BusError> {
        let mut results = Vec::with_capacity(targets.len());
        for machine in targets {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(command).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
            let outcome = match timeout(Duration::from_secs(timeout_secs.max(1)), cmd.output()).await {
                Ok(Ok(output)) => {
                    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
                    text.push_str(&String::from_utf8_lossy(&output.stderr));
                    SyncOutcome { retcode: output.status.code().unwrap_or(sp_core::exit_code::OTHER_FAILURE), output: text }
                }
                Ok(Err(e)) => SyncOutcome { retcode: sp_core::exit_code::OTHER_FAILURE, output: e.to_string() },
                Err(_) => SyncOutcome { retcode: sp_core::exit_code::TIMEOUT, output: String::new() },
            };
            results.push((machine.clone(), outcome));
        }
        Ok(results)
    }
}

#[cfg(test)]
#[path = "local_tests.rs"]
mod tests;
