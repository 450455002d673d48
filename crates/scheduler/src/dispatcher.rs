// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The dispatcher (§4.3) and the two-phase launch protocol (§4.4).
//!
//! `Dispatcher::dispatch` does steps 1–6 of §4.3 synchronously (target
//! resolution, maintenance filtering, sampling, registering the
//! `RunningInstance`) and then spawns Phase 1 (§4.4) as a detached
//! background task: it polls the bus for launch outcomes with no
//! deadline of its own, applying `Confirmed`/`Rejected`/`Unreachable`
//! to `SharedState` as they arrive. Phase 2 isn't a distinct piece of
//! code here — once a target is marked confirmed, the `Monitor` (which
//! is already polling `SharedState` independently) starts judging its
//! liveness.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use sp_bus::{Bus, BusError, LaunchOutcome, LaunchRequest};
use sp_core::{Clock, JobDefinition, JobInstanceId, MaintenanceConfig, SharedState};
use thiserror::Error;

const DEFAULT_PHASE1_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("job {job_name}: already has a live running instance")]
    Overlapping { job_name: String },
    #[error("job {job_name}: resolving targets: {source}")]
    Resolve { job_name: String, source: BusError },
    #[error("job {job_name}: submitting launch: {source}")]
    Submit { job_name: String, source: BusError },
    #[error("job {job_name}: running legacy synchronous command: {source}")]
    SyncRun { job_name: String, source: BusError },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Target resolution (after the maintenance filter) came back
    /// empty; nothing was dispatched and the job's overlap flag was
    /// left untouched.
    NoEligibleTargets,
    Dispatched { job_instance_id: String },
}

/// Drives §4.3/§4.4 against a concrete `Bus` implementation.
pub struct Dispatcher<B: Bus> {
    bus: Arc<B>,
    state: Arc<SharedState>,
    clock: Arc<dyn Clock>,
    /// The URL agents should open their channel connection to
    /// (`SP_WEBSOCKET_URL`), e.g. `ws://10.0.0.1:4505`.
    channel_url: String,
    phase1_poll_interval: Duration,
    default_agent_path: String,
}

impl<B: Bus + 'static> Dispatcher<B> {
    pub fn new(bus: Arc<B>, state: Arc<SharedState>, clock: Arc<dyn Clock>, channel_url: String) -> Self {
        Self {
            bus,
            state,
            clock,
            channel_url,
            phase1_poll_interval: DEFAULT_PHASE1_POLL_INTERVAL,
            default_agent_path: "sp-agent".to_string(),
        }
    }

    /// Override the Phase 1 poll interval (tests only need this to
    /// avoid waiting 5 real seconds per iteration).
    pub fn with_phase1_poll_interval(mut self, interval: Duration) -> Self {
        self.phase1_poll_interval = interval;
        self
    }

    /// Override the binary a job falls back to when it doesn't set its
    /// own `agent_path` — `saltpeter_config.default_agent_path`.
    pub fn with_default_agent_path(mut self, path: String) -> Self {
        self.default_agent_path = path;
        self
    }

    pub async fn dispatch(
        &self,
        job: &JobDefinition,
        maintenance: &MaintenanceConfig,
    ) -> Result<DispatchOutcome, DispatchError> {
        if self.state.is_overlapping(&job.name) {
            return Err(DispatchError::Overlapping { job_name: job.name.clone() });
        }

        let resolved = self
            .bus
            .resolve_targets(&job.targets, job.target_type)
            .await
            .map_err(|source| DispatchError::Resolve { job_name: job.name.clone(), source })?;

        let mut targets: BTreeSet<String> =
            resolved.into_iter().filter(|m| !maintenance.machines.contains(m)).collect();

        if job.number_of_targets > 0 && (job.number_of_targets as usize) < targets.len() {
            let mut pool: Vec<String> = targets.into_iter().collect();
            pool.shuffle(&mut rand::thread_rng());
            pool.truncate(job.number_of_targets as usize);
            targets = pool.into_iter().collect();
        }

        if targets.is_empty() {
            tracing::info!(job = %job.name, "dispatch: no eligible targets after maintenance filter");
            return Ok(DispatchOutcome::NoEligibleTargets);
        }
        let targets: Vec<String> = targets.into_iter().collect();

        let now = self.clock.epoch_ms();
        let job_instance_id = JobInstanceId::new(&job.name, now / 1000).to_string();

        if !job.use_agent {
            return self.dispatch_legacy(job, &targets, &job_instance_id, now).await;
        }

        let env = self.build_env(job, &job_instance_id);
        let agent_path = job.agent_path.clone().unwrap_or_else(|| self.default_agent_path.clone());
        let request = LaunchRequest {
            job_instance_id: job_instance_id.clone(),
            targets: targets.clone(),
            agent_path,
            env,
        };

        let job_ref = self
            .bus
            .submit_launch(request)
            .await
            .map_err(|source| DispatchError::Submit { job_name: job.name.clone(), source })?;

        if !self.state.register_dispatch(&job.name, &job_instance_id, &targets, job.timeout, now) {
            return Err(DispatchError::Overlapping { job_name: job.name.clone() });
        }

        tracing::info!(job = %job.name, job_instance_id = %job_instance_id, targets = targets.len(), "dispatched");

        let bus = self.bus.clone();
        let state = self.state.clone();
        let clock = self.clock.clone();
        let job_name = job.name.clone();
        let jid = job_instance_id.clone();
        let poll_interval = self.phase1_poll_interval;
        tokio::spawn(async move {
            phase1_loop(bus, state, clock, job_name, jid, job_ref, targets.into_iter().collect(), poll_interval)
                .await;
        });

        Ok(DispatchOutcome::Dispatched { job_instance_id })
    }

    /// §4.3's "legacy mode": run synchronously through the bus with no
    /// agent channel involved, then feed the result directly into the
    /// monitor's territory (finalising every target immediately).
    async fn dispatch_legacy(
        &self,
        job: &JobDefinition,
        targets: &[String],
        job_instance_id: &str,
        now: u64,
    ) -> Result<DispatchOutcome, DispatchError> {
        let results = self
            .bus
            .run_sync(targets, &job.command, job.timeout)
            .await
            .map_err(|source| DispatchError::SyncRun { job_name: job.name.clone(), source })?;

        if !self.state.register_dispatch(&job.name, job_instance_id, targets, job.timeout, now) {
            return Err(DispatchError::Overlapping { job_name: job.name.clone() });
        }

        for (machine, outcome) in results {
            let finished = self.clock.epoch_ms();
            self.state.with_target_result_mut(&job.name, &machine, |tr| {
                tr.starttime_epoch_ms = Some(now);
                tr.output = outcome.output;
                tr.finalize(finished, outcome.retcode);
            });
            if self.state.remove_outstanding(job_instance_id, &machine) {
                self.state.finish_instance(job_instance_id, &job.name);
            }
        }

        Ok(DispatchOutcome::Dispatched { job_instance_id: job_instance_id.to_string() })
    }

    /// Build the agent's environment (§4.3 step 4 / §6): channel URL,
    /// job identity, command, optional user/cwd/timeout, then every
    /// `custom_env` entry. Nothing here is ever passed as a command-line
    /// argument — the bus's env-injection facility is the only carrier.
    fn build_env(&self, job: &JobDefinition, job_instance_id: &str) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert("SP_WEBSOCKET_URL".to_string(), self.channel_url.clone());
        env.insert("SP_JOB_NAME".to_string(), job.name.clone());
        env.insert("SP_JOB_INSTANCE".to_string(), job_instance_id.to_string());
        env.insert("SP_COMMAND".to_string(), job.command.clone());
        env.insert("SP_TIMEOUT".to_string(), job.timeout.to_string());
        if let Some(cwd) = &job.cwd {
            env.insert("SP_CWD".to_string(), cwd.clone());
        }
        if let Some(user) = &job.user {
            env.insert("SP_USER".to_string(), user.clone());
        }
        if let Some(level) = &job.agent_log_level {
            env.insert("SP_LOG_LEVEL".to_string(), level.clone());
        }
        if let Some(dir) = &job.agent_log_dir {
            env.insert("SP_LOG_DIR".to_string(), dir.clone());
        }
        env.extend(job.custom_env.iter().map(|(k, v)| (k.clone(), v.clone())));
        env
    }
}

/// Phase 1 (§4.4): poll until every target in `outstanding` has an
/// outcome, applying each as it arrives. Never imposes its own
/// deadline — a target the bus never answers for simply stays
/// outstanding forever, which is exactly the "don't fail a busy bus"
/// behaviour the design notes call for.
async fn phase1_loop(
    bus: Arc<impl Bus>,
    state: Arc<SharedState>,
    clock: Arc<dyn Clock>,
    job_name: String,
    job_instance_id: String,
    job_ref: sp_bus::BusJobRef,
    mut outstanding: BTreeSet<String>,
    poll_interval: Duration,
) {
    while !outstanding.is_empty() {
        match bus.poll_launch_outcomes(&job_ref).await {
            Ok(outcomes) => {
                for (machine, outcome) in outcomes {
                    outstanding.remove(&machine);
                    apply_phase1_outcome(&state, &clock, &job_name, &job_instance_id, &machine, outcome);
                }
            }
            Err(e) => {
                tracing::warn!(job = %job_name, job_instance_id = %job_instance_id, error = %e, "phase 1 poll failed; retrying");
            }
        }
        if outstanding.is_empty() {
            break;
        }
        tokio::time::sleep(poll_interval).await;
    }
}

fn apply_phase1_outcome(
    state: &SharedState,
    clock: &Arc<dyn Clock>,
    job_name: &str,
    job_instance_id: &str,
    machine: &str,
    outcome: LaunchOutcome,
) {
    let now = clock.epoch_ms();
    match outcome {
        LaunchOutcome::Confirmed => {
            tracing::info!(job = job_name, job_instance_id, machine, "phase 1 confirmed; entering monitoring");
            state.mark_confirmed(job_instance_id, job_name, machine, now);
            return;
        }
        LaunchOutcome::Rejected { retcode, error } => {
            tracing::warn!(job = job_name, job_instance_id, machine, retcode, %error, "agent launch rejected by bus");
            state.with_target_result_mut(job_name, machine, |tr| {
                tr.output.push_str(&format!("[SALTPETER ERROR: {error}]\n"));
                tr.finalize(now, retcode);
            });
        }
        LaunchOutcome::Unreachable { error } => {
            tracing::warn!(job = job_name, job_instance_id, machine, %error, "target unreachable at phase 1");
            state.with_target_result_mut(job_name, machine, |tr| {
                tr.output.push_str(&format!("[SALTPETER ERROR: {error}]\n"));
                tr.finalize(now, sp_core::exit_code::OTHER_FAILURE);
            });
        }
    }
    if state.remove_outstanding(job_instance_id, machine) {
        state.finish_instance(job_instance_id, job_name);
    }
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
