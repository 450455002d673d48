// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Detaching the agent from the bus's launching process (§4.7 "Agent
//! detachment"): the bus only waits through phase 1 (confirmation that
//! the agent started), so the agent must fork away from whatever
//! shell/SSH session launched it before phase 1 returns, or the bus
//! would block on it for the lifetime of the job.
//!
//! This has to happen before the tokio runtime starts — forking a
//! multi-threaded process only leaves the calling thread alive in the
//! child, and a half-started runtime does not tolerate that.

use std::os::fd::AsRawFd;

use nix::sys::stat::Mode;
use nix::unistd::ForkResult;

#[derive(Debug, thiserror::Error)]
pub enum DetachError {
    #[error("fork failed: {0}")]
    Fork(#[source] nix::Error),
    #[error("setsid failed: {0}")]
    Setsid(#[source] nix::Error),
    #[error("opening /dev/null failed: {0}")]
    DevNull(#[source] nix::Error),
}

/// Double-fork away from the controlling terminal/session, redirecting
/// stdio to `/dev/null`. Returns in the grandchild only; the original
/// process and the intermediate child both `exit(0)` from inside this
/// call, so the caller never observes a `Parent` branch.
pub fn detach() -> Result<(), DetachError> {
    redirect_stdio_to_dev_null()?;

    // First fork: the bus sees this (the original) process exit 0 as
    // soon as the child has forked again, satisfying phase 1 without
    // waiting on the job itself.
    match unsafe { nix::unistd::fork() }.map_err(DetachError::Fork)? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => {}
    }

    nix::unistd::setsid().map_err(DetachError::Setsid)?;

    // Second fork: give up any chance of reacquiring a controlling
    // terminal now that we're a session leader.
    match unsafe { nix::unistd::fork() }.map_err(DetachError::Fork)? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => {}
    }

    Ok(())
}

fn redirect_stdio_to_dev_null() -> Result<(), DetachError> {
    use nix::fcntl::{open, OFlag};
    use nix::unistd::dup2;

    let devnull = open("/dev/null", OFlag::O_RDWR, Mode::empty()).map_err(DetachError::DevNull)?;
    for fd in [0, 1, 2] {
        let _ = dup2(devnull.as_raw_fd(), fd);
    }
    Ok(())
}
