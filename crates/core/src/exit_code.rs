// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Named `retcode` values observable on `TargetResult`.
//!
//! Everything in `1..=123` is command-defined and has no constant here.

/// Command exited cleanly.
pub const SUCCESS: i32 = 0;
/// Job-level timeout: the scheduler killed the target after `D.timeout` elapsed.
pub const TIMEOUT: i32 = 124;
/// Bus phase 1: the agent binary exists but could not be executed.
pub const NOT_EXECUTABLE: i32 = 126;
/// Bus phase 1: the agent binary was not found on the target.
pub const AGENT_NOT_FOUND: i32 = 127;
/// The target was killed in response to a user kill request.
pub const KILLED_BY_USER: i32 = 143;
/// No heartbeat was observed for longer than the liveness window.
pub const HEARTBEAT_LOSS: i32 = 253;
/// Catch-all: unreachable target, bus refusal, or agent-internal error.
pub const OTHER_FAILURE: i32 = 255;
