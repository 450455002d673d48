// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The external API surface (§4.8): a Unix-socket server speaking
//! `sp-wire`'s length-prefixed JSON `Request`/`Response` contract.
//!
//! Two operations, per the spec: a read of `{running, state}` and a
//! write that enqueues a kill command. `ReloadConfig` is an operator
//! convenience this workspace adds on top (§9 design notes allow
//! supplementing the distilled contract) so tests and a manual
//! `sp reload` don't have to wait out the config watcher's debounce
//! window.
//!
//! This is intentionally not the HTTP/UI surface — that's named out of
//! scope in §1 ("only its contract with the scheduler is specified").
//! A future HTTP layer would be just another client of this same
//! `Request`/`Response` contract, proxied over its own transport.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sp_config::ConfigLoader;
use sp_core::SharedState;
use sp_wire::{
    JobSummary, MaintenanceSummary, Request, Response, RunningInstanceSummary, StateSnapshot,
    TargetResultSummary,
};
use tokio::net::{UnixListener, UnixStream};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("removing stale socket at {path}: {source}")]
    RemoveStale { path: PathBuf, source: std::io::Error },
    #[error("binding unix socket at {path}: {source}")]
    Bind { path: PathBuf, source: std::io::Error },
}

/// Owns the listener and the state/config handles every request reads
/// or mutates. Cheap to clone: everything inside is `Arc`.
#[derive(Clone)]
pub struct ApiServer {
    state: Arc<SharedState>,
    config: Arc<ConfigLoader>,
}

impl ApiServer {
    pub fn new(state: Arc<SharedState>, config: Arc<ConfigLoader>) -> Self {
        Self { state, config }
    }

    /// Bind `socket_path` and accept connections forever. Binding
    /// failure is fatal to the daemon (§7: "inability to bind the
    /// channel port" is listed alongside this as a fatal startup
    /// condition; the API socket is the same kind of required
    /// listener).
    pub async fn run(self, socket_path: &Path) -> Result<(), ApiError> {
        if socket_path.exists() {
            std::fs::remove_file(socket_path)
                .map_err(|source| ApiError::RemoveStale { path: socket_path.to_path_buf(), source })?;
        }
        if let Some(parent) = socket_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let listener = UnixListener::bind(socket_path)
            .map_err(|source| ApiError::Bind { path: socket_path.to_path_buf(), source })?;
        tracing::info!(path = %socket_path.display(), "api surface listening");

        loop {
            let (stream, _addr) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::warn!(error = %e, "api surface: accept failed");
                    continue;
                }
            };
            let server = self.clone();
            tokio::spawn(async move {
                if let Err(e) = server.handle_connection(stream).await {
                    tracing::debug!(error = %e, "api connection ended");
                }
            });
        }
    }

    async fn handle_connection(&self, mut stream: UnixStream) -> Result<(), sp_wire::FramingError> {
        loop {
            let request: Request = match sp_wire::read_frame(&mut stream).await {
                Ok(req) => req,
                Err(sp_wire::FramingError::Eof) => return Ok(()),
                Err(e) => return Err(e),
            };
            let response = self.apply(request);
            sp_wire::write_frame(&mut stream, &response).await?;
        }
    }

    fn apply(&self, request: Request) -> Response {
        match request {
            Request::ReadState => Response::State(self.snapshot()),
            Request::Kill { job_name } => {
                self.state.enqueue_kill(&job_name);
                tracing::info!(job = %job_name, "api surface: kill enqueued");
                Response::Ack
            }
            Request::ReloadConfig => match self.config.reload_now() {
                Ok(errors) => {
                    for e in &errors {
                        tracing::warn!(error = %e, "api surface: reload skipped an invalid entry");
                    }
                    Response::Ack
                }
                Err(e) => Response::Error { message: e.to_string() },
            },
        }
    }

    /// Build the read-only snapshot §4.8 promises: every known job's
    /// scheduling state, every live instance's per-target results, and
    /// the current merged maintenance set.
    fn snapshot(&self) -> StateSnapshot {
        let config = self.config.current();

        let jobs = self
            .state
            .snapshot()
            .into_iter()
            .map(|(name, job)| JobSummary {
                name,
                next_run_epoch_ms: job.next_run_epoch_ms,
                last_run_epoch_ms: job.last_run_epoch_ms,
                overlap: job.overlap,
            })
            .collect();

        let running = self
            .state
            .running_snapshot()
            .into_iter()
            .map(|(job_instance_id, ri)| {
                let dispatched = self.state.last_dispatched_targets(&ri.job_name);
                let targets = dispatched
                    .iter()
                    .filter_map(|machine| {
                        self.state.target_result(&ri.job_name, machine).map(|tr| TargetResultSummary {
                            machine: machine.clone(),
                            starttime_epoch_ms: tr.starttime_epoch_ms,
                            endtime_epoch_ms: tr.endtime_epoch_ms,
                            retcode: tr.retcode,
                            last_heartbeat_epoch_ms: tr.last_heartbeat_epoch_ms,
                            output_len: tr.output.len(),
                        })
                    })
                    .collect();
                RunningInstanceSummary {
                    job_instance_id,
                    job_name: ri.job_name,
                    started_at_epoch_ms: ri.started_at_epoch_ms,
                    outstanding_machines: ri.machines.into_iter().collect(),
                    targets,
                }
            })
            .collect();

        let maintenance = Some(MaintenanceSummary {
            global: config.maintenance.global,
            machines: config.maintenance.machines.iter().cloned().collect(),
        });

        StateSnapshot { jobs, running, maintenance }
    }
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;
