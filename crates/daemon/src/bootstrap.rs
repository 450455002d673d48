// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Assembles every other crate's pieces into one running scheduler
//! process, in the dependency order §2 lays out (leaves first): shared
//! state, config loader, channel server, dispatcher, monitor,
//! scheduler loop, external API surface.

use std::path::PathBuf;
use std::sync::Arc;

use sp_bus::LocalBus;
use sp_channel::ChannelServer;
use sp_config::ConfigLoader;
use sp_core::{Clock, SharedState, SystemClock};
use sp_scheduler::{Dispatcher, Monitor, SchedulerLoop};
use sp_storage::LogSink;

use crate::api::ApiServer;

/// Every long-lived handle the daemon holds once bootstrapped.
/// `run` drives all of it to completion (which in practice means
/// "forever, until the process is killed"); tests that need
/// finer-grained control can call [`Daemon::bootstrap`] directly and
/// drive the pieces themselves.
pub struct Daemon {
    pub state: Arc<SharedState>,
    pub config: Arc<ConfigLoader>,
    pub clock: Arc<dyn Clock>,
    pub bus: Arc<LocalBus>,
    pub dispatcher: Arc<Dispatcher<LocalBus>>,
    pub channel_server: ChannelServer,
    pub monitor: Monitor,
    pub api: ApiServer,
}

impl Daemon {
    /// Load the config directory once (fatal on an unreadable
    /// directory, per §7) and wire up every subsystem against a fresh
    /// `SharedState`. Does not start the config watcher, the channel
    /// server's accept loop, the scheduler loop, the monitor, or the
    /// API surface — that's `run`'s job, split out so tests can start
    /// a subset.
    pub fn bootstrap(config_dir: impl Into<PathBuf>) -> anyhow::Result<(Self, Vec<sp_config::ConfigError>)> {
        let (config, errors) = ConfigLoader::load(config_dir)?;
        let config = Arc::new(config);
        let runtime = config.current().runtime.clone();

        let state = Arc::new(SharedState::new());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let bus = Arc::new(LocalBus::new());
        let log_sink = LogSink::new(runtime.log_dir.clone());

        let channel_url = format!("ws://{}:{}", advertise_host(&runtime.channel_bind), runtime.channel_port);
        let dispatcher = Arc::new(
            Dispatcher::new(bus.clone(), state.clone(), clock.clone(), channel_url)
                .with_default_agent_path(runtime.default_agent_path.clone()),
        );
        let channel_server = ChannelServer::new(state.clone(), clock.clone());
        let monitor = Monitor::new(state.clone(), clock.clone(), log_sink);
        let api = ApiServer::new(state.clone(), config.clone());

        Ok((Self { state, config, clock, bus, dispatcher, channel_server, monitor, api }, errors))
    }

    /// Spawn the scheduler loop, monitor, channel server, config
    /// watcher, and API surface as background tasks and return their
    /// join handles. Never returns an error from the spawned tasks
    /// themselves — a fatal bind failure is logged and the offending
    /// task simply exits; `run` below is the caller that decides that
    /// should bring the whole process down.
    pub fn spawn(&self) -> anyhow::Result<DaemonHandles> {
        let runtime = self.config.current().runtime.clone();

        let watch_handle = self.config.watch()?;

        let scheduler_loop =
            SchedulerLoop::new(self.dispatcher.clone(), self.state.clone(), self.clock.clone());
        let config_for_jobs = self.config.clone();
        let config_for_maintenance = self.config.clone();
        let scheduler_task = tokio::spawn(scheduler_loop.run(
            Arc::new(move || config_for_jobs.current().jobs.values().cloned().collect()),
            Arc::new(move || config_for_maintenance.current().maintenance.clone()),
        ));

        let monitor_task = tokio::spawn(self.monitor.clone().run());

        let channel_bind_addr = format!("{}:{}", runtime.channel_bind, runtime.channel_port);
        let channel_server = self.channel_server.clone();
        let channel_task = tokio::spawn(async move {
            if let Err(e) = channel_server.run(&channel_bind_addr).await {
                tracing::error!(error = %e, "channel server exited");
            }
        });

        let api = self.api.clone();
        let socket_path = ipc_socket_path(&runtime);
        let api_task = tokio::spawn(async move {
            if let Err(e) = api.run(&socket_path).await {
                tracing::error!(error = %e, "api surface exited");
            }
        });

        Ok(DaemonHandles { _watch_handle: watch_handle, scheduler_task, monitor_task, channel_task, api_task })
    }
}

/// Join handles for every background task `Daemon::spawn` started,
/// plus the config watcher's guard. Dropping this stops the watcher;
/// the tokio tasks themselves keep running until the process exits
/// (they are not designed to be cancelled individually — see §5's
/// "scheduling model").
pub struct DaemonHandles {
    _watch_handle: sp_config::WatchHandle,
    pub scheduler_task: tokio::task::JoinHandle<()>,
    pub monitor_task: tokio::task::JoinHandle<()>,
    pub channel_task: tokio::task::JoinHandle<()>,
    pub api_task: tokio::task::JoinHandle<()>,
}

/// Run the daemon forever: bootstrap, spawn every subsystem, then
/// block until interrupted.
pub async fn run(config_dir: PathBuf) -> anyhow::Result<()> {
    let (daemon, errors) = Daemon::bootstrap(config_dir)?;
    for e in &errors {
        tracing::warn!(error = %e, "config: skipping invalid entry at startup");
    }
    tracing::info!(jobs = daemon.config.current().jobs.len(), "config loaded");

    let _handles = daemon.spawn()?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("received interrupt, shutting down");
    Ok(())
}

fn advertise_host(bind: &str) -> &str {
    if bind == "0.0.0.0" {
        "127.0.0.1"
    } else {
        bind
    }
}

fn ipc_socket_path(runtime: &sp_core::RuntimeConfig) -> PathBuf {
    match &runtime.ipc_socket {
        Some(path) => PathBuf::from(path),
        None => std::env::temp_dir().join("saltpeter.sock"),
    }
}
