// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! S5 (job-level timeout kills a long-running target) and S6
//! (overlap suppression skips a dispatch while an instance is live).

use std::time::Duration;

use crate::prelude::*;

#[test]
fn a_job_level_timeout_kills_the_target_with_retcode_124() {
    let daemon = Daemon::start(
        r#"
slow:
  command: "sleep 60"
  targets: "alpha"
  timeout: 3
  schedule:
    second: "*/2"
"#,
    );

    daemon.wait_until_retired(Duration::from_secs(25), "slow");

    let record = daemon.last_log_record("slow");
    assert_eq!(target_outcome(&record, "alpha").and_then(|t| t["retcode"].as_i64()), Some(124));
}

#[test]
fn a_job_already_running_is_not_dispatched_again_until_it_finishes() {
    let daemon = Daemon::start(
        r#"
once:
  command: "sleep 8"
  targets: "alpha"
  timeout: 60
  schedule:
    second: "*"
"#,
    );

    let first = daemon.wait_until(Duration::from_secs(10), |s| running_instance(s, "once").is_some());
    let first_id = running_instance(&first, "once").unwrap()["job_instance_id"].as_str().unwrap().to_string();

    // Several ticks pass (the schedule fires every second) while the
    // instance is still live; the same instance must still be the one
    // reported -- no second dispatch replaced it.
    std::thread::sleep(Duration::from_secs(3));
    let mid = daemon.status();
    let mid_id = running_instance(&mid, "once").unwrap()["job_instance_id"].as_str().unwrap();
    assert_eq!(mid_id, first_id, "overlap suppression must keep the same instance live");

    daemon.wait_until(Duration::from_secs(20), |s| {
        running_instance(s, "once").is_some_and(|i| target(i, "alpha").and_then(|t| t["retcode"].as_i64()) == Some(0))
    });
}
