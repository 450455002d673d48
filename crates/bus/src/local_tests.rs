// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::BTreeMap;

#[tokio::test]
async fn resolve_targets_splits_and_trims_comma_list() {
    let bus = LocalBus::new();
    let targets = bus.resolve_targets(" m1, m2 ,m3", TargetType::List).await.expect("resolves");
    assert_eq!(targets, vec!["m1", "m2", "m3"]);
}

#[tokio::test]
async fn missing_agent_binary_yields_agent_not_found() {
    let bus = LocalBus::new();
    let request = LaunchRequest {
        job_instance_id: "echo_1".into(),
        targets: vec!["m1".into()],
        agent_path: "/no/such/sp-agent-binary".into(),
        env: BTreeMap::new(),
    };
    let job_ref = bus.submit_launch(request).await.expect("submits");

    let outcomes = loop {
        let outcomes = bus.poll_launch_outcomes(&job_ref).await.expect("polls");
        if !outcomes.is_empty() {
            break outcomes;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    };

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].0, "m1");
    match &outcomes[0].1 {
        LaunchOutcome::Rejected { retcode, error } => {
            assert_eq!(*retcode, sp_core::exit_code::AGENT_NOT_FOUND);
            assert!(error.contains("No such file or directory"));
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
}

#[tokio::test]
async fn unknown_job_ref_is_an_error() {
    let bus = LocalBus::new();
    let err = bus.poll_launch_outcomes(&BusJobRef("nope".into())).await.unwrap_err();
    assert!(matches!(err, BusError::UnknownJobRef(_)));
}

#[tokio::test]
async fn run_sync_captures_stdout() {
    let bus = LocalBus::new();
    let results = bus.run_sync(&["m1".to_string()], "echo hi", 5).await.expect("runs");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].1.retcode, 0);
    assert_eq!(results[0].1.output, "hi\n");
}
