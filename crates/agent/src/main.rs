// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `sp-agent`: the binary the bus launches on a target machine to run
//! one job instance (§4.7). Configuration arrives entirely through
//! `SP_*` environment variables — there are no CLI flags — and the
//! process detaches from its launching session before doing anything
//! else so the bus's phase-1 wait returns promptly.

mod buffer;
mod detach;
mod env;
mod process;
mod run;

use env::AgentConfig;

fn main() {
    let config = match AgentConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("sp-agent: {e}");
            std::process::exit(sp_core::exit_code::OTHER_FAILURE);
        }
    };

    if std::env::var_os("SP_AGENT_NO_DETACH").is_none() {
        if let Err(e) = detach::detach() {
            eprintln!("sp-agent: failed to detach: {e}");
            std::process::exit(sp_core::exit_code::OTHER_FAILURE);
        }
    }

    // Held for the process lifetime: dropping it stops the non-blocking
    // writer's background flush thread.
    let _log_guard = init_logging(&config);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "sp-agent: failed to start tokio runtime");
            std::process::exit(sp_core::exit_code::OTHER_FAILURE);
        }
    };

    runtime.block_on(run::run(config));
}

/// Set up structured logging (§4.7/§6): to a per-instance file under
/// `SP_LOG_DIR` when set, otherwise to stderr. `SP_LOG_LEVEL` overrides
/// the env-filter default of `info`.
fn init_logging(config: &AgentConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = config
        .log_level
        .as_deref()
        .map(EnvFilter::new)
        .unwrap_or_else(|| EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));

    match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::never(dir, format!("{}.log", config.job_instance));
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(fmt::layer().with_writer(std::io::stderr)).init();
            None
        }
    }
}
