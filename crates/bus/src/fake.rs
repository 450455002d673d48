// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! [`FakeBus`]: an in-memory `Bus` double for scripting every Phase 1
//! outcome in §4.4 deterministically — confirmed, rejected, or "never
//! heard back" — without touching a real process or network. This is
//! what the scheduler crate's and the workspace's integration tests
//! drive directly to reproduce scenarios S1–S7.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use sp_core::TargetType;

use crate::types::{BusError, BusJobRef, LaunchOutcome, LaunchRequest, SyncOutcome};
use crate::Bus;

#[derive(Default)]
struct Scripted {
    resolve: HashMap<String, Vec<String>>,
    /// Outcomes queued per target, consumed one poll at a time so a
    /// test can simulate outcomes trickling in across several polls.
    /// A target with an empty queue never resolves — simulating an
    /// unreachable-forever bus that the scheduler must stay responsive
    /// around (§8: "Phase 1 with an unreachable bus").
    outcomes: HashMap<String, Vec<LaunchOutcome>>,
    sync_outcomes: HashMap<String, SyncOutcome>,
}

#[derive(Clone, Default)]
pub struct FakeBus {
    scripted: Arc<Mutex<Scripted>>,
    submitted: Arc<Mutex<HashMap<BusJobRef, Vec<String>>>>,
    counter: Arc<AtomicU64>,
}

impl FakeBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script `resolve_targets(expr, _)` to return `machines`.
    pub fn set_resolution(&self, expr: &str, machines: &[&str]) {
        self.scripted
            .lock()
            .resolve
            .insert(expr.to_string(), machines.iter().map(|s| s.to_string()).collect());
    }

    /// Queue the next outcome `poll_launch_outcomes` will surface for
    /// `machine`. Call multiple times to script several outcomes in
    /// sequence (rarely needed — most tests want exactly one).
    pub fn queue_outcome(&self, machine: &str, outcome: LaunchOutcome) {
        self.scripted.lock().outcomes.entry(machine.to_string()).or_default().push(outcome);
    }

    /// Script `run_sync`'s result for `machine` (legacy/`use_agent=false` path).
    pub fn set_sync_outcome(&self, machine: &str, outcome: SyncOutcome) {
        self.scripted.lock().sync_outcomes.insert(machine.to_string(), outcome);
    }

    /// The targets most recently handed to `submit_launch` for `job_ref`,
    /// for assertions that the dispatcher built the right fan-out.
    pub fn submitted_targets(&self, job_ref: &BusJobRef) -> Option<Vec<String>> {
        self.submitted.lock().get(job_ref).cloned()
    }
}

#[async_trait]
impl Bus for FakeBus {
    async fn resolve_targets(
        &self,
        targets_expr: &str,
        _target_type: TargetType,
    ) -> Result<Vec<String>, BusError> {
        self.scripted.lock().resolve.get(targets_expr).cloned().ok_or_else(|| BusError::Resolve {
            expr: targets_expr.to_string(),
            reason: "no scripted resolution for this expression".to_string(),
        })
    }

    async fn submit_launch(&self, request: LaunchRequest) -> Result<BusJobRef, BusError> {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let job_ref = BusJobRef(format!("fake-{n}"));
        self.submitted.lock().insert(job_ref.clone(), request.targets);
        Ok(job_ref)
    }

    async fn poll_launch_outcomes(
        &self,
        job_ref: &BusJobRef,
    ) -> Result<Vec<(String, LaunchOutcome)>, BusError> {
        let submitted = self.submitted.lock();
        let targets = submitted.get(job_ref).ok_or_else(|| BusError::UnknownJobRef(job_ref.clone()))?;
        let mut scripted = self.scripted.lock();
        let mut out = Vec::new();
        for machine in targets {
            if let Some(queue) = scripted.outcomes.get_mut(machine) {
                if !queue.is_empty() {
                    out.push((machine.clone(), queue.remove(0)));
                }
            }
        }
        Ok(out)
    }

    async fn run_sync(
        &self,
        targets: &[String],
        _command: &str,
        _timeout_secs: u64,
    ) -> Result<Vec<(String, SyncOutcome)>, BusError> {
        let scripted = self.scripted.lock();
        Ok(targets
            .iter()
            .map(|m| {
                let outcome = scripted
                    .sync_outcomes
                    .get(m)
                    .cloned()
                    .unwrap_or(SyncOutcome { retcode: 0, output: String::new() });
                (m.clone(), outcome)
            })
            .collect())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
