// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `sp-daemon`: the scheduler process. Reads a directory of job YAML
//! files (§4.1), dispatches them on schedule (§4.2–§4.5), accepts
//! agent connections (§4.6), and exposes the external API surface
//! (§4.8) over a Unix socket.

use std::path::PathBuf;

use clap::Parser;

/// The distributed cron scheduler's control-plane daemon.
#[derive(Debug, Parser)]
#[command(name = "sp-daemon", version, about)]
struct Args {
    /// Directory of `*.yaml` job files, watched for hot reload (§4.1).
    #[arg(long, default_value = "/etc/saltpeter/jobs")]
    config_dir: PathBuf,

    /// Verbose (debug-level) logging; equivalent to `RUST_LOG=debug`.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(sp_daemon::run(args.config_dir))
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry().with(filter).with(fmt::layer()).init();
}
