// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! S4: an operator kill reaches a live target and its disposition is
//! recorded as retcode 143.

use std::time::Duration;

use crate::prelude::*;

#[test]
fn operator_kill_finalizes_the_running_instance_as_retcode_143() {
    let daemon = Daemon::start(
        r#"
sleeper:
  command: "sleep 120"
  targets: "alpha"
  timeout: 300
  schedule:
    second: "*/2"
"#,
    );

    daemon.wait_until(Duration::from_secs(20), |s| running_instance(s, "sleeper").is_some());

    daemon.kill("sleeper");

    daemon.wait_until_retired(Duration::from_secs(20), "sleeper");

    let record = daemon.last_log_record("sleeper");
    assert_eq!(target_outcome(&record, "alpha").and_then(|t| t["retcode"].as_i64()), Some(143));
}

#[test]
fn killing_a_job_with_no_running_instance_is_a_harmless_no_op() {
    let daemon = Daemon::start(
        r#"
idle:
  command: "true"
  targets: "alpha"
  schedule:
    minute: "0"
    hour: "0"
    day_of_month: "1"
    month: "1"
"#,
    );

    // No instance is running (the schedule only fires once a year) --
    // this must not error or crash the daemon.
    daemon.kill("idle");
    let snapshot = daemon.status();
    assert!(running_instance(&snapshot, "idle").is_none());
}
