// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn register_dispatch_sets_overlap_and_seeds_results() {
    let s = SharedState::new();
    s.ensure_job("echo");
    assert!(!s.is_overlapping("echo"));

    let targets = vec!["m1".to_string(), "m2".to_string()];
    assert!(s.register_dispatch("echo", "echo_1", &targets, 60, 1000));
    assert!(s.is_overlapping("echo"));

    let ri = s.running_instance("echo_1").unwrap();
    assert_eq!(ri.machines.len(), 2);
    assert_eq!(s.target_result("echo", "m1").unwrap().last_heartbeat_epoch_ms, 1000);
}

#[test]
fn register_dispatch_refuses_while_overlapping() {
    let s = SharedState::new();
    let targets = vec!["m1".to_string()];
    assert!(s.register_dispatch("echo", "echo_1", &targets, 60, 0));
    assert!(!s.register_dispatch("echo", "echo_2", &targets, 60, 0));
}

#[test]
fn finalize_is_first_write_wins() {
    let mut tr = TargetResult::default();
    assert!(tr.finalize(100, 124));
    assert!(!tr.finalize(200, 0));
    assert_eq!(tr.retcode, Some(124));
    assert_eq!(tr.endtime_epoch_ms, Some(100));
}

#[test]
fn remove_outstanding_reports_when_instance_drains() {
    let s = SharedState::new();
    let targets = vec!["m1".to_string(), "m2".to_string()];
    s.register_dispatch("echo", "echo_1", &targets, 60, 0);
    assert!(!s.remove_outstanding("echo_1", "m1"));
    assert!(s.remove_outstanding("echo_1", "m2"));
}

#[test]
fn finish_instance_clears_overlap_and_removes_instance() {
    let s = SharedState::new();
    let targets = vec!["m1".to_string()];
    s.register_dispatch("echo", "echo_1", &targets, 60, 0);
    s.finish_instance("echo_1", "echo");
    assert!(!s.is_overlapping("echo"));
    assert!(s.running_instance("echo_1").is_none());
}

#[test]
fn retain_jobs_keeps_jobs_with_a_live_running_instance() {
    let s = SharedState::new();
    let targets = vec!["m1".to_string()];
    s.register_dispatch("echo", "echo_1", &targets, 60, 0);
    s.retain_jobs(|_| false);
    // Still tracked: the running instance references it.
    assert!(s.is_overlapping("echo"));
    s.finish_instance("echo_1", "echo");
    s.retain_jobs(|_| false);
    assert!(s.job_names().is_empty());
}

#[test]
fn command_queue_is_drained_once() {
    let s = SharedState::new();
    s.enqueue_kill("echo");
    s.enqueue_kill("other");
    let drained = s.drain_commands();
    assert_eq!(drained.len(), 2);
    assert!(s.drain_commands().is_empty());
}

#[test]
fn new_running_instance_has_no_confirmed_targets_yet() {
    let s = SharedState::new();
    let targets = vec!["m1".to_string(), "m2".to_string()];
    s.register_dispatch("echo", "echo_1", &targets, 60, 500);
    let ri = s.running_instance("echo_1").unwrap();
    assert!(ri.confirmed.is_empty(), "Phase 1 hasn't run yet; nothing is confirmed");
}

#[test]
fn mark_confirmed_adds_to_confirmed_set_and_resets_heartbeat() {
    let s = SharedState::new();
    let targets = vec!["m1".to_string()];
    s.register_dispatch("echo", "echo_1", &targets, 60, 0);
    s.mark_confirmed("echo_1", "echo", "m1", 9000);

    let ri = s.running_instance("echo_1").unwrap();
    assert!(ri.confirmed.contains("m1"));
    assert_eq!(s.target_result("echo", "m1").unwrap().last_heartbeat_epoch_ms, 9000);
}

#[test]
fn with_target_result_mut_creates_entry_on_first_touch() {
    let s = SharedState::new();
    s.with_target_result_mut("echo", "m1", |tr| {
        tr.last_heartbeat_epoch_ms = 42;
    });
    assert_eq!(s.target_result("echo", "m1").unwrap().last_heartbeat_epoch_ms, 42);
}
