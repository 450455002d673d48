// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::BTreeMap;
use std::time::Duration;

use super::*;

#[tokio::test]
async fn spawn_captures_stdout_lines_in_order() {
    let mut running = spawn("echo one; echo two", None, None, &BTreeMap::new()).unwrap();
    let status = running.child.wait().await.unwrap();
    assert!(status.success());

    let mut lines = Vec::new();
    while let Ok(Some(line)) = tokio::time::timeout(Duration::from_secs(2), running.lines.recv()).await {
        lines.push(line.text);
    }
    assert_eq!(lines, vec!["one".to_string(), "two".to_string()]);
}

#[tokio::test]
async fn spawn_tags_stderr_separately() {
    let mut running = spawn("echo oops 1>&2", None, None, &BTreeMap::new()).unwrap();
    running.child.wait().await.unwrap();
    let line = tokio::time::timeout(Duration::from_secs(2), running.lines.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(line.stream, OutputStream::Stderr);
    assert_eq!(line.text, "oops");
}

#[tokio::test]
async fn spawn_honours_cwd() {
    let dir = tempfile::tempdir().unwrap();
    let mut running = spawn("pwd", Some(dir.path().to_str().unwrap()), None, &BTreeMap::new()).unwrap();
    running.child.wait().await.unwrap();
    let line = tokio::time::timeout(Duration::from_secs(2), running.lines.recv())
        .await
        .unwrap()
        .unwrap();
    // macOS symlinks /tmp, so compare canonicalized paths.
    assert_eq!(
        std::path::Path::new(&line.text).canonicalize().unwrap(),
        dir.path().canonicalize().unwrap()
    );
}

#[tokio::test]
async fn terminate_kills_a_sleeping_process_within_grace_period() {
    let mut running = spawn("sleep 30", None, None, &BTreeMap::new()).unwrap();
    let pid = running.pid;
    let start = tokio::time::Instant::now();
    terminate(&mut running.child, pid).await;
    assert!(start.elapsed() < TERM_GRACE + Duration::from_secs(2));
}

#[tokio::test]
async fn unknown_user_is_rejected_before_spawn() {
    let err = spawn("true", None, Some("definitely-not-a-real-user"), &BTreeMap::new());
    assert!(matches!(err, Err(ProcessError::UnknownUser(_))));
}
