// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Maintenance mode (§4.1/§4.2): global suppression stops every
//! dispatch, and a per-machine exclusion removes just that machine
//! from a job's target set.

use std::time::Duration;

use crate::prelude::*;

#[test]
fn global_maintenance_suppresses_every_dispatch() {
    let daemon = Daemon::start(
        r#"
quiet:
  command: "echo hi"
  targets: "alpha"
  schedule:
    second: "*"
saltpeter_maintenance:
  global: true
"#,
    );

    // Give the loop several ticks to prove it never dispatches, not
    // just that it hasn't yet.
    std::thread::sleep(Duration::from_secs(5));
    let snapshot = daemon.status();
    assert!(running_instance(&snapshot, "quiet").is_none());
    let maintenance = snapshot["maintenance"].clone();
    assert_eq!(maintenance["global"], true);
}

#[test]
fn a_maintained_machine_is_excluded_from_the_target_set() {
    let daemon = Daemon::start(
        r#"
partial:
  command: "echo hi"
  targets: "alpha,beta"
  timeout: 30
  schedule:
    second: "*/2"
saltpeter_maintenance:
  machines: ["beta"]
"#,
    );

    let snapshot = daemon.wait_until(Duration::from_secs(20), |s| {
        running_instance(s, "partial")
            .is_some_and(|i| target(i, "alpha").and_then(|t| t["retcode"].as_i64()) == Some(0))
    });

    let instance = running_instance(&snapshot, "partial").unwrap();
    assert!(target(instance, "beta").is_none(), "beta is under maintenance and must never be dispatched to");
}
