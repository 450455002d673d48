// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Config hot reload (§4.1/§4.10): a new job file dropped into the
//! config directory is picked up and scheduled without restarting the
//! daemon, whether the watcher's own debounce catches it or the
//! operator forces it with `sp reload`.

use std::time::Duration;

use crate::prelude::*;

#[test]
fn a_new_job_file_is_dispatched_after_a_forced_reload() {
    let daemon = Daemon::start(
        r#"
placeholder:
  command: "true"
  targets: "alpha"
  schedule:
    minute: "0"
    hour: "0"
    day_of_month: "1"
    month: "1"
"#,
    );

    let before = daemon.status();
    assert!(job_summary(&before, "fresh").is_none());

    daemon.write_job_file(
        "fresh.yaml",
        r#"
fresh:
  command: "echo hi"
  targets: "alpha"
  timeout: 30
  schedule:
    second: "*/2"
"#,
    );
    daemon.reload();

    daemon.wait_until(Duration::from_secs(20), |s| {
        running_instance(s, "fresh")
            .is_some_and(|i| target(i, "alpha").and_then(|t| t["retcode"].as_i64()) == Some(0))
    });
}

#[test]
fn the_filesystem_watcher_picks_up_a_new_file_without_a_forced_reload() {
    let daemon = Daemon::start(
        r#"
placeholder:
  command: "true"
  targets: "alpha"
  schedule:
    minute: "0"
    hour: "0"
    day_of_month: "1"
    month: "1"
"#,
    );

    daemon.write_job_file(
        "watched.yaml",
        r#"
watched:
  command: "echo hi"
  targets: "alpha"
  timeout: 30
  schedule:
    second: "*/2"
"#,
    );

    // No explicit `sp reload` -- the debounced `notify` watcher alone
    // must surface the new job within its debounce window.
    daemon.wait_until(Duration::from_secs(30), |s| job_summary(s, "watched").is_some());
}
