// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use sp_core::FakeClock;
use tokio::sync::mpsc;

use super::*;

fn server() -> (ChannelServer, Arc<SharedState>, Arc<FakeClock>) {
    let state = Arc::new(SharedState::new());
    let clock = Arc::new(FakeClock::new());
    let server = ChannelServer::new(state.clone(), clock.clone());
    (server, state, clock)
}

fn connect_msg() -> AgentMessage {
    AgentMessage::Connect {
        job_name: "echo".into(),
        job_instance: "echo_1".into(),
        machine: "m1".into(),
        timestamp: 0,
    }
}

#[tokio::test]
async fn connect_registers_and_returns_sync_response_at_zero() {
    let (server, _state, _clock) = server();
    let (tx, _rx) = mpsc::channel(8);
    let mut key = None;

    let reply = server.apply(&connect_msg(), &tx, &mut key).await;
    assert_eq!(reply, Some(ServerMessage::SyncResponse { last_seq: 0 }));
    assert!(key.is_some());
    assert!(server.registry.contains(&("echo_1".to_string(), "m1".to_string())));
}

#[tokio::test]
async fn in_order_output_is_appended_and_acked() {
    let (server, state, _clock) = server();
    let (tx, _rx) = mpsc::channel(8);
    let mut key = None;
    server.apply(&connect_msg(), &tx, &mut key).await;

    let msg = AgentMessage::Output {
        job_name: "echo".into(),
        job_instance: "echo_1".into(),
        machine: "m1".into(),
        seq: 1,
        stream: OutputStream::Stdout,
        data: "hello\n".into(),
        timestamp: 0,
    };
    let reply = server.apply(&msg, &tx, &mut key).await;
    assert_eq!(reply, Some(ServerMessage::Ack { seq: 1 }));

    let tr = state.target_result("echo", "m1").unwrap();
    assert_eq!(tr.output, "hello\n");
    assert_eq!(tr.last_seq_applied, 1);
}

#[tokio::test]
async fn gap_in_seq_requests_resync_without_appending() {
    let (server, state, _clock) = server();
    let (tx, _rx) = mpsc::channel(8);
    let mut key = None;
    server.apply(&connect_msg(), &tx, &mut key).await;

    let msg = AgentMessage::Output {
        job_name: "echo".into(),
        job_instance: "echo_1".into(),
        machine: "m1".into(),
        seq: 5,
        stream: OutputStream::Stdout,
        data: "skipped\n".into(),
        timestamp: 0,
    };
    let reply = server.apply(&msg, &tx, &mut key).await;
    assert_eq!(reply, Some(ServerMessage::SyncResponse { last_seq: 0 }));
    assert_eq!(state.target_result("echo", "m1").unwrap().output, "");
}

#[tokio::test]
async fn reconnect_resumes_from_last_applied_seq() {
    let (server, _state, _clock) = server();
    let (tx, _rx) = mpsc::channel(8);
    let mut key = None;
    server.apply(&connect_msg(), &tx, &mut key).await;
    server
        .apply(
            &AgentMessage::Output {
                job_name: "echo".into(),
                job_instance: "echo_1".into(),
                machine: "m1".into(),
                seq: 1,
                stream: OutputStream::Stdout,
                data: "a".into(),
                timestamp: 0,
            },
            &tx,
            &mut key,
        )
        .await;

    // Simulate a fresh socket reconnecting for the same (instance, machine).
    let mut key2 = None;
    let reply = server.apply(&connect_msg(), &tx, &mut key2).await;
    assert_eq!(reply, Some(ServerMessage::SyncResponse { last_seq: 1 }));
}

#[tokio::test]
async fn complete_finalizes_target_result() {
    let (server, state, _clock) = server();
    let (tx, _rx) = mpsc::channel(8);
    let mut key = None;
    server.apply(&connect_msg(), &tx, &mut key).await;

    let reply = server
        .apply(
            &AgentMessage::Complete {
                job_name: "echo".into(),
                job_instance: "echo_1".into(),
                machine: "m1".into(),
                retcode: 0,
                timestamp: 0,
            },
            &tx,
            &mut key,
        )
        .await;
    assert_eq!(reply, None);

    let tr = state.target_result("echo", "m1").unwrap();
    assert!(tr.is_finalized());
    assert_eq!(tr.retcode, Some(0));
}

#[tokio::test]
async fn error_finalizes_with_other_failure_and_appends_message() {
    let (server, state, _clock) = server();
    let (tx, _rx) = mpsc::channel(8);
    let mut key = None;
    server.apply(&connect_msg(), &tx, &mut key).await;

    server
        .apply(
            &AgentMessage::Error {
                job_name: "echo".into(),
                job_instance: "echo_1".into(),
                machine: "m1".into(),
                error: "agent panicked".into(),
                timestamp: 0,
            },
            &tx,
            &mut key,
        )
        .await;

    let tr = state.target_result("echo", "m1").unwrap();
    assert_eq!(tr.retcode, Some(sp_core::exit_code::OTHER_FAILURE));
    assert!(tr.output.contains("agent panicked"));
}
