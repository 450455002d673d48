// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `sp`: the operator CLI for the scheduler's external API surface
//! (§4.8) — read the current state snapshot, enqueue a kill, force a
//! config reload, or page through a job's persisted run history.
//!
//! This talks to `sp-daemon` over the same Unix-socket contract
//! (`sp_wire::Request`/`Response`) a future HTTP/UI layer would also
//! speak; it is not that layer itself (§1 lists the HTTP/UI surface as
//! out of scope for the core).

mod client;
mod color;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use sp_wire::{Request, Response};

use client::DaemonClient;

#[derive(Debug, Parser)]
#[command(
    name = "sp",
    version = concat!(env!("CARGO_PKG_VERSION"), "+", env!("BUILD_GIT_HASH")),
    about,
    styles = color::styles()
)]
struct Cli {
    /// Path to the daemon's IPC socket.
    #[arg(long, global = true, default_value_os_t = default_socket_path())]
    socket: PathBuf,

    /// Output format.
    #[arg(long, value_enum, global = true, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show every known job's scheduling state and any live instances.
    Status,
    /// Enqueue a kill for a job's running instance, if any.
    Kill {
        job_name: String,
    },
    /// Force the daemon to re-scan its config directory immediately.
    Reload,
    /// Print a job's persisted run history.
    History {
        job_name: String,
        /// Directory the daemon's `saltpeter_config.log_dir` points at.
        #[arg(long)]
        log_dir: PathBuf,
    },
}

fn default_socket_path() -> PathBuf {
    std::env::temp_dir().join("saltpeter.sock")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::History { job_name, log_dir } => print_history(&log_dir, &job_name, cli.format),
        other => run_daemon_command(&cli.socket, other, cli.format).await,
    }
}

async fn run_daemon_command(socket: &PathBuf, command: Command, format: OutputFormat) -> anyhow::Result<()> {
    let mut client = DaemonClient::connect(socket).await?;

    let response = match command {
        Command::Status => client.send(Request::ReadState).await?,
        Command::Kill { job_name } => client.send(Request::Kill { job_name }).await?,
        Command::Reload => client.send(Request::ReloadConfig).await?,
        Command::History { .. } => unreachable!("handled in main before reaching the daemon"),
    };

    match response {
        Response::State(snapshot) => print_status(&snapshot, format),
        Response::Ack => println!("{}", color::header("ok")),
        Response::Error { message } => anyhow::bail!(message),
    }
    Ok(())
}

fn print_status(snapshot: &sp_wire::StateSnapshot, format: OutputFormat) {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(snapshot).unwrap_or_default());
        return;
    }

    println!("{}", color::header("jobs"));
    for job in &snapshot.jobs {
        let status = if job.overlap { "running" } else { "idle" };
        println!("  {:<24} {:<8} next={}", job.name, status, format_epoch(job.next_run_epoch_ms));
    }

    if !snapshot.running.is_empty() {
        println!();
        println!("{}", color::header("running instances"));
        for instance in &snapshot.running {
            println!("  {} ({})", instance.job_instance_id, color::muted(&instance.job_name));
            for target in &instance.targets {
                println!(
                    "    {:<20} retcode={} output={}b",
                    target.machine,
                    color::retcode(target.retcode),
                    target.output_len
                );
            }
        }
    }

    if let Some(maintenance) = &snapshot.maintenance {
        if maintenance.global || !maintenance.machines.is_empty() {
            println!();
            println!("{}", color::header("maintenance"));
            if maintenance.global {
                println!("  {}", color::muted("global maintenance is ON: no new dispatches"));
            }
            for machine in &maintenance.machines {
                println!("  excluded: {machine}");
            }
        }
    }
}

fn format_epoch(epoch_ms: Option<u64>) -> String {
    match epoch_ms {
        Some(ms) => ms.to_string(),
        None => "-".to_string(),
    }
}

fn print_history(log_dir: &std::path::Path, job_name: &str, format: OutputFormat) -> anyhow::Result<()> {
    let records = sp_storage::read_records(log_dir, job_name)?;
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    for record in &records {
        println!(
            "{} {} -> {}",
            record.job_instance_id,
            record.started_at.to_rfc3339(),
            record.finished_at.to_rfc3339()
        );
        for (machine, outcome) in &record.targets {
            println!("  {:<20} retcode={}", machine, color::retcode(outcome.retcode));
        }
    }
    if records.is_empty() {
        println!("{}", color::muted("no recorded instances"));
    }
    Ok(())
}
