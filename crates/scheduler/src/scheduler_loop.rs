// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The 1Hz scheduling loop (§4.2): walks the current `ConfigSnapshot`,
//! fires `Dispatcher::dispatch` for any job whose cron schedule has
//! come due, and recomputes `next_run` whether or not a dispatch
//! actually happened.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use sp_bus::Bus;
use sp_core::{Clock, JobDefinition, MaintenanceConfig, SharedState};

use crate::dispatcher::Dispatcher;

const TICK_INTERVAL: Duration = Duration::from_secs(1);
/// How often a global-maintenance skip is allowed to log (§4.2 step 4:
/// "log a throttled status message ~every 20s").
const MAINTENANCE_LOG_INTERVAL: Duration = Duration::from_secs(20);

pub struct SchedulerLoop<B: Bus> {
    dispatcher: Arc<Dispatcher<B>>,
    state: Arc<SharedState>,
    clock: Arc<dyn Clock>,
    tick_interval: Duration,
    last_maintenance_log_epoch_ms: std::sync::atomic::AtomicU64,
}

impl<B: Bus + 'static> SchedulerLoop<B> {
    pub fn new(dispatcher: Arc<Dispatcher<B>>, state: Arc<SharedState>, clock: Arc<dyn Clock>) -> Self {
        Self {
            dispatcher,
            state,
            clock,
            tick_interval: TICK_INTERVAL,
            last_maintenance_log_epoch_ms: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Run forever, reading `jobs`/`maintenance` fresh on every tick so
    /// a hot-reloaded config is picked up without restarting the loop.
    /// Intended to be spawned as its own task; never returns.
    pub async fn run(
        self,
        jobs: Arc<dyn Fn() -> Vec<JobDefinition> + Send + Sync>,
        maintenance: Arc<dyn Fn() -> MaintenanceConfig + Send + Sync>,
    ) {
        let mut ticker = tokio::time::interval(self.tick_interval);
        loop {
            ticker.tick().await;
            self.tick(&jobs(), &maintenance()).await;
        }
    }

    /// One pass over every job in `jobs`. Exposed standalone so tests
    /// can drive it deterministically against a `FakeClock`.
    pub async fn tick(&self, jobs: &[JobDefinition], maintenance: &MaintenanceConfig) {
        let now = self.clock.epoch_ms();

        if maintenance.global {
            self.log_global_maintenance_throttled(now);
            return;
        }

        for job in jobs {
            self.state.ensure_job(&job.name);
            self.tick_job(job, maintenance, now).await;
        }
    }

    async fn tick_job(&self, job: &JobDefinition, maintenance: &MaintenanceConfig, now: u64) {
        let schedule = match job.compiled_schedule() {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(job = %job.name, error = %e, "skipping job with unparseable schedule");
                return;
            }
        };

        let Some(next_run) = self.state.next_run_epoch_ms(&job.name) else {
            self.recompute_next_run(&job.name, &schedule, now);
            return;
        };

        if now >= next_run && !self.state.is_overlapping(&job.name) {
            let span = tracing::info_span!("dispatch_tick", job = %job.name);
            let _enter = span.enter();
            match self.dispatcher.dispatch(job, maintenance).await {
                Ok(outcome) => {
                    tracing::info!(job = %job.name, ?outcome, "tick: dispatch evaluated");
                }
                Err(e) => {
                    tracing::warn!(job = %job.name, error = %e, "tick: dispatch failed");
                }
            }
            self.recompute_next_run(&job.name, &schedule, now);
        } else if now >= next_run {
            // Due, but a previous instance is still live: leave
            // `next_run` untouched so the job fires as soon as the
            // overlap clears rather than skipping a cycle silently.
            tracing::debug!(job = %job.name, "tick: due but overlapping, deferring");
        }
    }

    fn recompute_next_run(&self, job_name: &str, schedule: &sp_core::CronSchedule, now_epoch_ms: u64) {
        let Some(reference) = Utc.timestamp_millis_opt(now_epoch_ms as i64).single() else {
            return;
        };
        match schedule.next_after(reference) {
            Ok(next) => {
                self.state.set_next_run_epoch_ms(job_name, Some(next.timestamp_millis() as u64));
            }
            Err(e) => {
                tracing::warn!(job_name, error = %e, "no firing time found within the search horizon");
                self.state.set_next_run_epoch_ms(job_name, None);
            }
        }
    }

    fn log_global_maintenance_throttled(&self, now: u64) {
        use std::sync::atomic::Ordering;
        let last = self.last_maintenance_log_epoch_ms.load(Ordering::Relaxed);
        if now.saturating_sub(last) >= MAINTENANCE_LOG_INTERVAL.as_millis() as u64 {
            tracing::info!("scheduler loop: global maintenance active, all dispatch suppressed");
            self.last_maintenance_log_epoch_ms.store(now, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
#[path = "scheduler_loop_tests.rs"]
mod tests;
