// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! S1 (happy path) and S2 (one target's agent binary is missing).

use std::time::Duration;

use crate::prelude::*;

#[test]
fn happy_path_reaches_retcode_zero_on_every_target() {
    let daemon = Daemon::start(
        r#"
greet:
  command: "echo hello"
  targets: "alpha,beta"
  timeout: 30
  schedule:
    second: "*/2"
"#,
    );

    daemon.wait_until_retired(Duration::from_secs(20), "greet");

    let record = daemon.last_log_record("greet");
    assert_eq!(target_outcome(&record, "alpha").and_then(|t| t["retcode"].as_i64()), Some(0));
    assert_eq!(target_outcome(&record, "beta").and_then(|t| t["retcode"].as_i64()), Some(0));
}

#[test]
fn a_nonexistent_agent_binary_reports_retcode_127_without_blocking_other_targets() {
    let daemon = Daemon::start(
        r#"
broken:
  command: "echo hello"
  targets: "alpha,beta"
  agent_path: "/nonexistent/sp-agent"
  timeout: 30
  schedule:
    second: "*/2"
"#,
    );

    daemon.wait_until_retired(Duration::from_secs(20), "broken");

    let record = daemon.last_log_record("broken");
    assert_eq!(target_outcome(&record, "alpha").and_then(|t| t["retcode"].as_i64()), Some(127));
    assert_eq!(target_outcome(&record, "beta").and_then(|t| t["retcode"].as_i64()), Some(127));
}
