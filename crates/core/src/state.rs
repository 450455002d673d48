// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The process-wide, lock-protected scheduler state (§3's `SchedulerState`,
//! `TargetResult`, `RunningInstance` and `CommandQueue`).
//!
//! This is a leaf dependency: the channel server, dispatcher, monitor,
//! scheduler loop, and the external API surface all read and mutate the
//! same `SharedState` handle. The design notes ask for "an explicit
//! store with per-key mutual exclusion rather than language-level
//! synchronised objects" — in a single process that is realised here as
//! one `parking_lot::Mutex` guarding the whole map, with callers taking
//! short critical sections (a clone out, or a single field mutation) so
//! contention stays negligible; `per_job` below is where a future
//! sharded implementation would split the lock without touching
//! callers.

use std::collections::{BTreeSet, HashMap};

use parking_lot::Mutex;

/// One target's recorded disposition for a single job instance (§3).
/// `endtime.is_some()` iff `retcode.is_some()` (invariant 4); neither
/// changes once set — `TargetResult::finalize` enforces first-write-wins
/// so a late `complete` after a heartbeat-timeout finalisation is a
/// no-op (design notes, Open Questions).
#[derive(Debug, Clone, Default)]
pub struct TargetResult {
    pub starttime_epoch_ms: Option<u64>,
    pub endtime_epoch_ms: Option<u64>,
    pub output: String,
    pub retcode: Option<i32>,
    pub last_heartbeat_epoch_ms: u64,
    /// The highest contiguous `output` seq number applied so far (§4.6).
    /// Survives socket disconnects — it's what lets a reconnecting agent
    /// be told exactly where to resume via `sync_response`.
    pub last_seq_applied: u64,
}

impl TargetResult {
    pub fn is_finalized(&self) -> bool {
        self.endtime_epoch_ms.is_some()
    }

    /// Set `endtime`/`retcode` unless already finalized. Returns `true`
    /// if this call actually finalized the result.
    pub fn finalize(&mut self, now_epoch_ms: u64, retcode: i32) -> bool {
        if self.is_finalized() {
            return false;
        }
        self.endtime_epoch_ms = Some(now_epoch_ms);
        self.retcode = Some(retcode);
        true
    }
}

/// One dispatch of a job, keyed by `job_instance_id` (§3). Destroyed
/// once `machines` empties.
#[derive(Debug, Clone)]
pub struct RunningInstance {
    pub job_name: String,
    pub started_at_epoch_ms: u64,
    /// Captured from the `JobDefinition` at dispatch time, not re-read
    /// from the live config snapshot — an in-flight instance keeps the
    /// timeout it was dispatched with even if the job definition changes
    /// underneath it on reload (§9 "Hot-reload configuration").
    pub timeout_secs: u64,
    pub machines: BTreeSet<String>,
    /// Targets that have passed Phase 1 bus confirmation (§4.4) and are
    /// therefore eligible for heartbeat-timeout checking. A target still
    /// awaiting its bus outcome sits in `machines` but not here — the
    /// heartbeat clock starts at Phase 2 entry, not at dispatch, so the
    /// monitor must never judge liveness on an unconfirmed target.
    pub confirmed: BTreeSet<String>,
}

/// A write to the shared state originating from the external API
/// surface (§4.8). Append-only; drained by the channel server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandQueueEntry {
    Kill { job_name: String },
}

/// Per-job run-state: the scheduling bookkeeping (`next_run`,
/// `last_run`, the overlap flag) plus the last dispatched target list
/// and their results, all addressed by machine name.
#[derive(Debug, Clone, Default)]
pub struct JobRuntimeState {
    pub next_run_epoch_ms: Option<u64>,
    pub last_run_epoch_ms: Option<u64>,
    /// Set while an instance of this job is live; suppresses re-dispatch
    /// (invariant 2 / the overlap policy).
    pub overlap: bool,
    pub targets: Vec<String>,
    pub results: HashMap<String, TargetResult>,
}

#[derive(Debug, Default)]
struct Inner {
    jobs: HashMap<String, JobRuntimeState>,
    running: HashMap<String, RunningInstance>,
    command_queue: Vec<CommandQueueEntry>,
}

/// The process-wide store. Cheap to clone (it's an `Arc` internally via
/// `parking_lot::Mutex` + the caller wrapping it in `Arc`, same as every
/// other shared handle in this workspace) — callers hold `Arc<SharedState>`.
#[derive(Debug, Default)]
pub struct SharedState {
    inner: Mutex<Inner>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure a job has a runtime-state entry (idempotent). Called once
    /// per job name whenever the config snapshot is (re)loaded, so a
    /// brand-new job gets `next_run = None` and a removed-then-re-added
    /// job keeps no stale overlap flag from a previous incarnation under
    /// a prior config.
    pub fn ensure_job(&self, job_name: &str) {
        self.inner.lock().jobs.entry(job_name.to_string()).or_default();
    }

    /// Drop run-state for jobs no longer present in the config snapshot.
    /// A job with a live `RunningInstance` keeps its entry even if the
    /// config removed it — the instance is left to finish or time out
    /// rather than orphaned mid-flight (§3 lifecycle note).
    pub fn retain_jobs(&self, still_defined: impl Fn(&str) -> bool) {
        let mut inner = self.inner.lock();
        let running_job_names: BTreeSet<String> =
            inner.running.values().map(|r| r.job_name.clone()).collect();
        inner
            .jobs
            .retain(|name, _| still_defined(name) || running_job_names.contains(name));
    }

    pub fn next_run_epoch_ms(&self, job_name: &str) -> Option<u64> {
        self.inner.lock().jobs.get(job_name).and_then(|j| j.next_run_epoch_ms)
    }

    pub fn set_next_run_epoch_ms(&self, job_name: &str, value: Option<u64>) {
        self.inner.lock().jobs.entry(job_name.to_string()).or_default().next_run_epoch_ms = value;
    }

    pub fn is_overlapping(&self, job_name: &str) -> bool {
        self.inner.lock().jobs.get(job_name).map(|j| j.overlap).unwrap_or(false)
    }

    /// Register a new dispatch: marks the job as overlapping, records
    /// its target list, creates the `RunningInstance`, and seeds a fresh
    /// `TargetResult` per target. Returns `false` (and does nothing) if
    /// the job is already overlapping — callers must have already
    /// checked `is_overlapping`, this is the atomic compare-and-set that
    /// closes the race between that check and the write.
    pub fn register_dispatch(
        &self,
        job_name: &str,
        job_instance_id: &str,
        targets: &[String],
        timeout_secs: u64,
        now_epoch_ms: u64,
    ) -> bool {
        let mut inner = self.inner.lock();
        let job = inner.jobs.entry(job_name.to_string()).or_default();
        if job.overlap {
            return false;
        }
        job.overlap = true;
        job.last_run_epoch_ms = Some(now_epoch_ms);
        job.targets = targets.to_vec();
        job.results = targets
            .iter()
            .map(|m| {
                (
                    m.clone(),
                    TargetResult { last_heartbeat_epoch_ms: now_epoch_ms, ..Default::default() },
                )
            })
            .collect();
        inner.running.insert(
            job_instance_id.to_string(),
            RunningInstance {
                job_name: job_name.to_string(),
                started_at_epoch_ms: now_epoch_ms,
                timeout_secs,
                machines: targets.iter().cloned().collect(),
                confirmed: BTreeSet::new(),
            },
        );
        true
    }

    pub fn running_instance(&self, job_instance_id: &str) -> Option<RunningInstance> {
        self.inner.lock().running.get(job_instance_id).cloned()
    }

    /// The target list a job's most recent dispatch was registered
    /// with (`JobRuntimeState::targets`), used when aggregating a
    /// finished instance's full per-target history for the log sink —
    /// `RunningInstance::machines` alone has already drained to empty
    /// by the time an instance is ready to be logged.
    pub fn last_dispatched_targets(&self, job_name: &str) -> Vec<String> {
        self.inner.lock().jobs.get(job_name).map(|j| j.targets.clone()).unwrap_or_default()
    }

    /// Move a target from "awaiting Phase 1" to "confirmed, eligible for
    /// heartbeat-timeout checking" (§4.4 Phase 2 entry), resetting its
    /// `last_heartbeat` to `now` so the 15s liveness window is measured
    /// from confirmation, never from dispatch.
    pub fn mark_confirmed(&self, job_instance_id: &str, job_name: &str, machine: &str, now_epoch_ms: u64) {
        let mut inner = self.inner.lock();
        if let Some(ri) = inner.running.get_mut(job_instance_id) {
            ri.confirmed.insert(machine.to_string());
        }
        let job = inner.jobs.entry(job_name.to_string()).or_default();
        let result = job.results.entry(machine.to_string()).or_default();
        result.last_heartbeat_epoch_ms = now_epoch_ms;
    }

    pub fn target_result(&self, job_name: &str, machine: &str) -> Option<TargetResult> {
        self.inner.lock().jobs.get(job_name).and_then(|j| j.results.get(machine).cloned())
    }

    /// Apply `f` to the named target's result, creating it if absent
    /// (the channel server's `connect`/`start` resumption path: a
    /// reconnecting agent may arrive before the dispatcher's own
    /// `register_dispatch` bookkeeping would otherwise expect).
    pub fn with_target_result_mut<R>(
        &self,
        job_name: &str,
        machine: &str,
        f: impl FnOnce(&mut TargetResult) -> R,
    ) -> R {
        let mut inner = self.inner.lock();
        let job = inner.jobs.entry(job_name.to_string()).or_default();
        let result = job.results.entry(machine.to_string()).or_default();
        f(result)
    }

    /// Remove `machine` from the running instance's outstanding set.
    /// Returns `true` if the instance is now empty (caller should log
    /// the aggregated disposition and clear the overlap flag).
    pub fn remove_outstanding(&self, job_instance_id: &str, machine: &str) -> bool {
        let mut inner = self.inner.lock();
        match inner.running.get_mut(job_instance_id) {
            Some(ri) => {
                ri.machines.remove(machine);
                ri.machines.is_empty()
            }
            None => true,
        }
    }

    /// Destroy a finished `RunningInstance` and clear its job's overlap
    /// flag. Idempotent.
    pub fn finish_instance(&self, job_instance_id: &str, job_name: &str) {
        let mut inner = self.inner.lock();
        inner.running.remove(job_instance_id);
        if let Some(job) = inner.jobs.get_mut(job_name) {
            job.overlap = false;
        }
    }

    pub fn enqueue_kill(&self, job_name: &str) {
        self.inner.lock().command_queue.push(CommandQueueEntry::Kill { job_name: job_name.to_string() });
    }

    /// Drain the whole command queue. Single consumer (the channel
    /// server's background poll task).
    pub fn drain_commands(&self) -> Vec<CommandQueueEntry> {
        std::mem::take(&mut self.inner.lock().command_queue)
    }

    pub fn job_names(&self) -> Vec<String> {
        self.inner.lock().jobs.keys().cloned().collect()
    }

    pub fn running_instance_ids(&self) -> Vec<String> {
        self.inner.lock().running.keys().cloned().collect()
    }

    /// A consistent-enough snapshot for the external API's read path
    /// (§4.8). Locks once, clones out, releases — callers never hold
    /// the lock across serialization or I/O.
    pub fn snapshot(&self) -> Vec<(String, JobRuntimeState)> {
        let inner = self.inner.lock();
        inner.jobs.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    pub fn running_snapshot(&self) -> Vec<(String, RunningInstance)> {
        let inner = self.inner.lock();
        inner.running.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
