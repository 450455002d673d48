// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Spawns and supervises the user's command (§4.7): stdout/stderr are
//! captured line-by-line and tagged, `user`/`cwd` are honoured before
//! exec, and cancellation drives the SIGTERM → 5s → SIGKILL escalation
//! the spec calls for.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::{Pid, User};
use sp_channel::OutputStream;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

/// How long to wait after SIGTERM before escalating to SIGKILL (§4.7).
pub const TERM_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("unknown user {0:?}")]
    UnknownUser(String),
    #[error("looking up user {user:?}: {source}")]
    UserLookup { user: String, source: nix::Error },
    #[error("spawning command: {0}")]
    Spawn(#[from] std::io::Error),
}

/// One line read from the child's stdout/stderr.
#[derive(Debug, Clone)]
pub struct CapturedLine {
    pub stream: OutputStream,
    pub text: String,
}

/// The running child plus the receiving end of its captured output.
pub struct RunningCommand {
    pub child: Child,
    pub pid: u32,
    pub lines: mpsc::UnboundedReceiver<CapturedLine>,
}

/// Spawn `command` through `sh -c`, with `cwd`/`user` applied and
/// `extra_env` merged into the inherited environment (§4.7
/// "Configuration"/"Command execution"). Stdout and stderr are piped
/// and forwarded line-by-line on the returned channel, tagged by
/// stream, until both pipes close.
pub fn spawn(
    command: &str,
    cwd: Option<&str>,
    user: Option<&str>,
    extra_env: &BTreeMap<String, String>,
) -> Result<RunningCommand, ProcessError> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .envs(extra_env.iter())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(false);

    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    if let Some(name) = user {
        let uid = uid_for_user(name)?;
        cmd.uid(uid);
    }

    let mut child = cmd.spawn()?;
    let pid = child.id().unwrap_or(0);

    let (tx, rx) = mpsc::unbounded_channel();
    if let Some(stdout) = child.stdout.take() {
        spawn_line_reader(stdout, OutputStream::Stdout, tx.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        spawn_line_reader(stderr, OutputStream::Stderr, tx);
    }

    Ok(RunningCommand { child, pid, lines: rx })
}

fn spawn_line_reader<R>(pipe: R, stream: OutputStream, tx: mpsc::UnboundedSender<CapturedLine>)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(pipe).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(text)) => {
                    if tx.send(CapturedLine { stream, text }).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(%e, ?stream, "agent: error reading child output");
                    break;
                }
            }
        }
    });
}

fn uid_for_user(name: &str) -> Result<u32, ProcessError> {
    let user = User::from_name(name)
        .map_err(|source| ProcessError::UserLookup { user: name.to_string(), source })?
        .ok_or_else(|| ProcessError::UnknownUser(name.to_string()))?;
    Ok(user.uid.as_raw())
}

/// Drive the SIGTERM → `TERM_GRACE` → SIGKILL escalation against a
/// running child (§4.7 Cancellation). Returns once the process has
/// actually exited.
pub async fn terminate(child: &mut Child, pid: u32) {
    let pid = Pid::from_raw(pid as i32);
    if signal::kill(pid, Signal::SIGTERM).is_err() {
        // Already gone; `child.wait()` below will reap it immediately.
    }

    if tokio::time::timeout(TERM_GRACE, child.wait()).await.is_ok() {
        return;
    }

    tracing::warn!(pid = pid.as_raw(), "agent: SIGTERM grace period elapsed, sending SIGKILL");
    let _ = signal::kill(pid, Signal::SIGKILL);
    let _ = child.wait().await;
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
