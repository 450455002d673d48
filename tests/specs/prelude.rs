// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared black-box harness for the end-to-end scenarios in this test
//! package: write a config directory, spawn the real `sp-daemon`
//! binary against it, and drive it through the real `sp` CLI — the
//! same way an operator would, and the same way the daemon's own
//! config watcher and channel server see the world. No crate internals
//! are touched here; only `serde_json::Value` and process exit status.

use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::Child;
use std::time::{Duration, Instant};

use assert_cmd::cargo::cargo_bin;
use serde_json::Value;

pub struct Daemon {
    child: Child,
    _dir: tempfile::TempDir,
    pub jobs_dir: PathBuf,
    pub socket: PathBuf,
    pub log_dir: PathBuf,
}

impl Daemon {
    /// Write `jobs_yaml` as the only file in a fresh config directory,
    /// wired to a free port and a private socket/log directory, and
    /// start `sp-daemon` against it.
    pub fn start(jobs_yaml: &str) -> Self {
        Self::start_many(&[("jobs.yaml", jobs_yaml)])
    }

    pub fn start_many(files: &[(&str, &str)]) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let jobs_dir = dir.path().join("jobs");
        std::fs::create_dir_all(&jobs_dir).expect("mkdir jobs");
        let log_dir = dir.path().join("logs");
        let socket = dir.path().join("sp.sock");
        let port = free_port();

        for (name, body) in files {
            std::fs::write(jobs_dir.join(name), body.as_ref() as &str).expect("write job file");
        }
        std::fs::write(
            jobs_dir.join("zz-runtime.yaml"),
            format!(
                "saltpeter_config:\n  channel_bind: \"127.0.0.1\"\n  channel_port: {port}\n  ipc_socket: \"{}\"\n  log_dir: \"{}\"\n  default_agent_path: \"{}\"\n",
                socket.display(),
                log_dir.display(),
                agent_path().display(),
            ),
        )
        .expect("write runtime file");

        let child = std::process::Command::new(cargo_bin("sp-daemon"))
            .arg("--config-dir")
            .arg(&jobs_dir)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .expect("spawn sp-daemon");

        let daemon = Self { child, _dir: dir, jobs_dir, socket, log_dir };
        daemon.wait_for_socket();
        daemon
    }

    fn wait_for_socket(&self) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if self.socket.exists() {
                return;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        panic!("sp-daemon never created its IPC socket at {}", self.socket.display());
    }

    pub fn write_job_file(&self, name: &str, body: &str) {
        std::fs::write(self.jobs_dir.join(name), body).expect("write job file");
    }

    pub fn remove_job_file(&self, name: &str) {
        std::fs::remove_file(self.jobs_dir.join(name)).expect("remove job file");
    }

    pub fn status(&self) -> Value {
        sp(&["--socket", self.socket.to_str().unwrap(), "--format", "json", "status"])
    }

    pub fn kill(&self, job_name: &str) {
        sp_raw(&["--socket", self.socket.to_str().unwrap(), "kill", job_name]);
    }

    pub fn reload(&self) {
        sp_raw(&["--socket", self.socket.to_str().unwrap(), "reload"]);
    }

    /// Poll `status()` until `pred` returns `true` or `timeout` elapses.
    pub fn wait_until(&self, timeout: Duration, pred: impl Fn(&Value) -> bool) -> Value {
        let deadline = Instant::now() + timeout;
        loop {
            let snapshot = self.status();
            if pred(&snapshot) {
                return snapshot;
            }
            if Instant::now() >= deadline {
                panic!("condition not met within {timeout:?}; last snapshot: {snapshot:#}");
            }
            std::thread::sleep(Duration::from_millis(200));
        }
    }

    /// Poll `status()` until `job_name` has no live `RunningInstance`.
    /// Retirement (instance removed from `running`) and the
    /// terminal-retcode write to the per-job log both happen inside the
    /// same monitor tick, so this is the only reliable "it's fully
    /// finished" signal -- a snapshot can transiently show the instance
    /// present with its retcode already set, or not show it at all
    /// between those two writes.
    pub fn wait_until_retired(&self, timeout: Duration, job_name: &str) {
        self.wait_until(timeout, |s| running_instance(s, job_name).is_none());
    }

    /// Read back every persisted `InstanceRecord` (as raw JSON, the
    /// same shape `sp`'s `history` command prints) for `job_name`, in
    /// the order they were appended.
    pub fn log_records(&self, job_name: &str) -> Vec<Value> {
        let path = self.log_dir.join(format!("{job_name}.log"));
        let contents = std::fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("reading log file {}: {e}", path.display()));
        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).expect("log line is valid JSON"))
            .collect()
    }

    /// The most recently appended record for `job_name`.
    pub fn last_log_record(&self, job_name: &str) -> Value {
        self.log_records(job_name).pop().unwrap_or_else(|| panic!("no log records for job {job_name}"))
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub fn agent_path() -> PathBuf {
    cargo_bin("sp-agent")
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port").local_addr().unwrap().port()
}

fn sp_raw(args: &[&str]) -> std::process::Output {
    std::process::Command::new(cargo_bin("sp")).args(args).output().expect("run sp")
}

fn sp(args: &[&str]) -> Value {
    let output = sp_raw(args);
    assert!(output.status.success(), "sp {args:?} failed: {}", String::from_utf8_lossy(&output.stderr));
    serde_json::from_slice(&output.stdout).expect("sp output is valid JSON")
}

pub fn running_instance<'a>(snapshot: &'a Value, job_name: &str) -> Option<&'a Value> {
    snapshot["running"].as_array()?.iter().find(|i| i["job_name"] == job_name)
}

pub fn job_summary<'a>(snapshot: &'a Value, job_name: &str) -> Option<&'a Value> {
    snapshot["jobs"].as_array()?.iter().find(|j| j["name"] == job_name)
}

pub fn target<'a>(instance: &'a Value, machine: &str) -> Option<&'a Value> {
    instance["targets"].as_array()?.iter().find(|t| t["machine"] == machine)
}

/// Index a persisted `InstanceRecord` (from `Daemon::log_records`/
/// `last_log_record`) by machine -- its `targets` field is a map, not
/// an array, unlike the live `RunningInstanceSummary`'s.
pub fn target_outcome<'a>(record: &'a Value, machine: &str) -> Option<&'a Value> {
    record["targets"].get(machine)
}

/// A schedule that fires every second, for tests that need the daemon
/// to dispatch promptly rather than waiting out a real-world cron tick.
pub const EVERY_SECOND: &str = "\n  schedule:\n    second: \"*\"\n";
