// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fs;
use std::time::Duration;

use super::*;

#[tokio::test]
async fn current_returns_the_initial_load() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.yaml"), "job_a:\n  command: \"true\"\n  targets: \"*\"\n").unwrap();

    let (loader, errors) = ConfigLoader::load(dir.path()).unwrap();
    assert!(errors.is_empty());
    assert!(loader.current().jobs.contains_key("job_a"));
}

#[tokio::test]
async fn watch_reloads_after_a_file_changes() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.yaml"), "job_a:\n  command: \"true\"\n  targets: \"*\"\n").unwrap();

    let (loader, _errors) = ConfigLoader::load(dir.path()).unwrap();
    let _handle = loader.watch().unwrap();

    fs::write(dir.path().join("b.yaml"), "job_b:\n  command: \"true\"\n  targets: \"*\"\n").unwrap();

    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        if loader.current().jobs.contains_key("job_b") {
            return;
        }
    }
    panic!("watcher never picked up the new file");
}
