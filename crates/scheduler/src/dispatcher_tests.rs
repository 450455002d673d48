// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use sp_bus::{FakeBus, LaunchOutcome, SyncOutcome};
use sp_core::{Clock, FakeClock, JobDefinition, MaintenanceConfig, ScheduleSpec, SharedState, TargetType};

use super::*;

fn job(name: &str, targets: &str) -> JobDefinition {
    JobDefinition {
        name: name.to_string(),
        schedule: ScheduleSpec::default(),
        command: "true".to_string(),
        user: None,
        cwd: None,
        custom_env: Default::default(),
        targets: targets.to_string(),
        target_type: TargetType::Glob,
        number_of_targets: 0,
        timeout: 60,
        use_agent: true,
        agent_path: None,
        agent_log_level: None,
        agent_log_dir: None,
        soft_timeout_ignored: None,
        hard_timeout_ignored: None,
    }
}

fn fixture() -> (Arc<FakeBus>, Arc<SharedState>, Arc<FakeClock>, Dispatcher<FakeBus>) {
    let bus = Arc::new(FakeBus::new());
    let state = Arc::new(SharedState::new());
    let clock = Arc::new(FakeClock::new());
    let dispatcher = Dispatcher::new(bus.clone(), state.clone(), clock.clone() as Arc<dyn Clock>, "ws://127.0.0.1:4505".to_string())
        .with_phase1_poll_interval(Duration::from_millis(5));
    (bus, state, clock, dispatcher)
}

#[tokio::test(flavor = "multi_thread")]
async fn dispatch_registers_running_instance_and_confirms_via_phase1() {
    let (bus, state, _clock, dispatcher) = fixture();
    bus.set_resolution("web*", &["m1", "m2"]);
    let j = job("deploy", "web*");

    let outcome = dispatcher.dispatch(&j, &MaintenanceConfig::default()).await.unwrap();
    let job_instance_id = match outcome {
        DispatchOutcome::Dispatched { job_instance_id } => job_instance_id,
        other => panic!("expected Dispatched, got {other:?}"),
    };

    assert!(state.is_overlapping("deploy"));
    let ri = state.running_instance(&job_instance_id).unwrap();
    assert_eq!(ri.machines.len(), 2);
    assert!(ri.confirmed.is_empty());

    bus.queue_outcome("m1", LaunchOutcome::Confirmed);
    bus.queue_outcome("m2", LaunchOutcome::Confirmed);

    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let ri = state.running_instance(&job_instance_id).unwrap();
        if ri.confirmed.len() == 2 {
            return;
        }
    }
    panic!("phase 1 never confirmed both targets");
}

#[tokio::test(flavor = "multi_thread")]
async fn overlapping_job_is_rejected() {
    let (bus, state, _clock, dispatcher) = fixture();
    bus.set_resolution("web*", &["m1"]);
    let j = job("deploy", "web*");
    state.register_dispatch("deploy", "deploy_1", &["m1".to_string()], 60, 0);

    let err = dispatcher.dispatch(&j, &MaintenanceConfig::default()).await.unwrap_err();
    assert!(matches!(err, DispatchError::Overlapping { .. }));
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_target_set_after_maintenance_filter_is_a_noop() {
    let (bus, state, _clock, dispatcher) = fixture();
    bus.set_resolution("web*", &["m1"]);
    let j = job("deploy", "web*");
    let mut maintenance = MaintenanceConfig::default();
    maintenance.machines.insert("m1".to_string());

    let outcome = dispatcher.dispatch(&j, &maintenance).await.unwrap();
    assert_eq!(outcome, DispatchOutcome::NoEligibleTargets);
    assert!(!state.is_overlapping("deploy"));
}

#[tokio::test(flavor = "multi_thread")]
async fn number_of_targets_samples_down_to_requested_count() {
    let (bus, state, _clock, dispatcher) = fixture();
    bus.set_resolution("web*", &["m1", "m2", "m3", "m4"]);
    let mut j = job("deploy", "web*");
    j.number_of_targets = 2;

    let outcome = dispatcher.dispatch(&j, &MaintenanceConfig::default()).await.unwrap();
    let job_instance_id = match outcome {
        DispatchOutcome::Dispatched { job_instance_id } => job_instance_id,
        other => panic!("expected Dispatched, got {other:?}"),
    };
    let ri = state.running_instance(&job_instance_id).unwrap();
    assert_eq!(ri.machines.len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn legacy_path_runs_synchronously_and_finishes_immediately() {
    let (bus, state, _clock, dispatcher) = fixture();
    bus.set_resolution("web*", &["m1"]);
    bus.set_sync_outcome("m1", SyncOutcome { retcode: 0, output: "ok\n".to_string() });
    let mut j = job("legacy", "web*");
    j.use_agent = false;

    let outcome = dispatcher.dispatch(&j, &MaintenanceConfig::default()).await.unwrap();
    assert!(matches!(outcome, DispatchOutcome::Dispatched { .. }));
    assert!(!state.is_overlapping("legacy"), "legacy jobs finish within dispatch()");
    let tr = state.target_result("legacy", "m1").unwrap();
    assert_eq!(tr.retcode, Some(0));
    assert_eq!(tr.output, "ok\n");
}

#[tokio::test(flavor = "multi_thread")]
async fn phase1_rejection_finalizes_target_with_bus_retcode() {
    let (bus, state, _clock, dispatcher) = fixture();
    bus.set_resolution("web*", &["m1"]);
    let j = job("deploy", "web*");

    let outcome = dispatcher.dispatch(&j, &MaintenanceConfig::default()).await.unwrap();
    let job_instance_id = match outcome {
        DispatchOutcome::Dispatched { job_instance_id } => job_instance_id,
        other => panic!("expected Dispatched, got {other:?}"),
    };
    bus.queue_outcome("m1", LaunchOutcome::Rejected { retcode: 126, error: "permission denied".to_string() });

    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        if state.running_instance(&job_instance_id).is_none() {
            let tr = state.target_result("deploy", "m1").unwrap();
            assert_eq!(tr.retcode, Some(126));
            assert!(tr.output.contains("permission denied"));
            assert!(!state.is_overlapping("deploy"));
            return;
        }
    }
    panic!("phase 1 rejection never finalised the instance");
}

#[tokio::test(flavor = "multi_thread")]
async fn target_the_bus_never_answers_for_stays_outstanding() {
    let (bus, state, _clock, dispatcher) = fixture();
    bus.set_resolution("web*", &["m1"]);
    let j = job("deploy", "web*");

    let outcome = dispatcher.dispatch(&j, &MaintenanceConfig::default()).await.unwrap();
    let job_instance_id = match outcome {
        DispatchOutcome::Dispatched { job_instance_id } => job_instance_id,
        other => panic!("expected Dispatched, got {other:?}"),
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    let ri = state.running_instance(&job_instance_id).unwrap();
    assert!(ri.confirmed.is_empty());
    assert_eq!(ri.machines.len(), 1);
    assert!(state.is_overlapping("deploy"));
}
