// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The job monitor (§4.5): one tick loop, shared across every
//! `RunningInstance`, that watches `SharedState` for completions,
//! heartbeat loss, and job-level timeout, and retires instances whose
//! machine set has emptied.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use sp_core::{exit_code, Clock, SharedState};
use sp_storage::{InstanceRecord, LogSink, TargetOutcome};

/// Heartbeat liveness window (§3 invariant 6 / §4.5): a confirmed
/// target with no heartbeat for longer than this is finalised as a
/// heartbeat loss.
const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct Monitor {
    state: Arc<SharedState>,
    clock: Arc<dyn Clock>,
    log_sink: LogSink,
    tick_interval: Duration,
}

impl Monitor {
    pub fn new(state: Arc<SharedState>, clock: Arc<dyn Clock>, log_sink: LogSink) -> Self {
        Self { state, clock, log_sink, tick_interval: DEFAULT_TICK_INTERVAL }
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Run forever, ticking at `tick_interval`. Intended to be spawned
    /// as its own task by the daemon; never returns.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.tick_interval);
        loop {
            ticker.tick().await;
            self.tick();
        }
    }

    /// One pass over every live `RunningInstance`. Exposed standalone
    /// (rather than only via `run`) so tests can drive it deterministically
    /// against a `FakeClock` without waiting on a real timer.
    pub fn tick(&self) {
        let now = self.clock.epoch_ms();
        for job_instance_id in self.state.running_instance_ids() {
            self.tick_instance(&job_instance_id, now);
        }
    }

    fn tick_instance(&self, job_instance_id: &str, now: u64) {
        let Some(ri) = self.state.running_instance(job_instance_id) else { return };
        let job_name = ri.job_name.clone();
        let timed_out = now.saturating_sub(ri.started_at_epoch_ms) > ri.timeout_secs.saturating_mul(1000);

        for machine in ri.machines.clone() {
            let Some(tr) = self.state.target_result(&job_name, &machine) else { continue };

            if tr.is_finalized() {
                tracing::info!(job = %job_name, job_instance_id, machine = %machine, retcode = tr.retcode, "target finalised");
                self.drain_target(job_instance_id, &job_name, &machine);
                continue;
            }

            if timed_out {
                self.state.with_target_result_mut(&job_name, &machine, |tr| {
                    tr.finalize(now, exit_code::TIMEOUT);
                });
                self.state.enqueue_kill(&job_name);
                tracing::warn!(job = %job_name, job_instance_id, machine = %machine, "job timeout; killing and finalising");
                self.drain_target(job_instance_id, &job_name, &machine);
                continue;
            }

            // Heartbeat loss is only judged once a target has passed
            // Phase 1 — an unconfirmed target has no heartbeat clock yet.
            if ri.confirmed.contains(&machine) {
                let silence = now.saturating_sub(tr.last_heartbeat_epoch_ms);
                if silence > HEARTBEAT_TIMEOUT.as_millis() as u64 {
                    let silence_secs = silence / 1000;
                    self.state.with_target_result_mut(&job_name, &machine, |tr| {
                        tr.output.push_str(&format!(
                            "[SALTPETER ERROR: no heartbeat for {silence_secs} seconds]\n"
                        ));
                        tr.finalize(now, exit_code::HEARTBEAT_LOSS);
                    });
                    tracing::warn!(job = %job_name, job_instance_id, machine = %machine, silence_secs, "heartbeat loss");
                    self.drain_target(job_instance_id, &job_name, &machine);
                }
            }
        }
    }

    /// Remove `machine` from the instance's outstanding set; if that
    /// empties the instance, aggregate every target's final disposition
    /// into one `InstanceRecord` and append it to the per-job log.
    fn drain_target(&self, job_instance_id: &str, job_name: &str, machine: &str) {
        if !self.state.remove_outstanding(job_instance_id, machine) {
            return;
        }

        let Some(ri) = self.state.running_instance(job_instance_id) else { return };
        let targets = self.state.last_dispatched_targets(job_name);
        let mut outcomes = std::collections::BTreeMap::new();
        for m in &targets {
            if let Some(tr) = self.state.target_result(job_name, m) {
                outcomes.insert(
                    m.clone(),
                    TargetOutcome {
                        starttime_epoch_ms: tr.starttime_epoch_ms,
                        endtime_epoch_ms: tr.endtime_epoch_ms,
                        retcode: tr.retcode,
                        output: tr.output,
                    },
                );
            }
        }

        let record = InstanceRecord {
            job_instance_id: job_instance_id.to_string(),
            job_name: job_name.to_string(),
            started_at: epoch_ms_to_utc(ri.started_at_epoch_ms),
            finished_at: epoch_ms_to_utc(self.clock.epoch_ms()),
            targets: outcomes,
        };

        if let Err(e) = self.log_sink.append(&record) {
            tracing::error!(job = job_name, job_instance_id, error = %e, "failed to append instance record");
        }

        self.state.finish_instance(job_instance_id, job_name);
        tracing::info!(job = job_name, job_instance_id, "instance finished; overlap cleared");
    }
}

fn epoch_ms_to_utc(ms: u64) -> chrono::DateTime<Utc> {
    Utc.timestamp_millis_opt(ms as i64).single().unwrap_or_else(Utc::now)
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
