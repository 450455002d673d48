// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-job append-only log files (§4.11/§6): the only persistence this
//! system requires. One JSON line per finished job instance, written to
//! `{logdir}/{job_name}.log`. Nothing is ever replayed from these files
//! at startup — `sp_core::SharedState` is the system of record while
//! the process is up; this crate exists purely for operator-facing
//! history.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("creating log directory {path}: {source}")]
    CreateDir { path: PathBuf, source: std::io::Error },
    #[error("opening log file {path}: {source}")]
    OpenFile { path: PathBuf, source: std::io::Error },
    #[error("writing log record: {0}")]
    Write(#[from] std::io::Error),
    #[error("encoding log record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One target's final disposition, as recorded for history (a trimmed
/// copy of `sp_core::state::TargetResult` — no `last_seq_applied`,
/// which is channel-protocol bookkeeping with no value once a run is
/// finished).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetOutcome {
    pub starttime_epoch_ms: Option<u64>,
    pub endtime_epoch_ms: Option<u64>,
    pub retcode: Option<i32>,
    pub output: String,
}

/// One aggregated record per job instance, the unit of the per-job log
/// file (§6: "one record per job instance with the aggregated
/// per-target results").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub job_instance_id: String,
    pub job_name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub targets: BTreeMap<String, TargetOutcome>,
}

/// Appends `InstanceRecord`s to `{logdir}/{job_name}.log`, one JSON
/// object per line. Safe to share across tasks: every write reopens
/// the file in append mode, so there is no handle to contend over.
#[derive(Debug, Clone)]
pub struct LogSink {
    log_dir: PathBuf,
}

impl LogSink {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self { log_dir: log_dir.into() }
    }

    pub fn append(&self, record: &InstanceRecord) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.log_dir)
            .map_err(|source| StorageError::CreateDir { path: self.log_dir.clone(), source })?;

        let path = self.log_path(&record.job_name);
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| StorageError::OpenFile { path: path.clone(), source })?;

        let line = serde_json::to_string(record)?;
        writeln!(file, "{line}")?;
        tracing::info!(job_instance_id = %record.job_instance_id, path = %path.display(), "appended instance record");
        Ok(())
    }

    pub fn log_path(&self, job_name: &str) -> PathBuf {
        self.log_dir.join(format!("{job_name}.log"))
    }
}

/// Read back every record for `job_name`, oldest first. Used only by
/// operator tooling (`sp-cli`'s history command) — never by the
/// scheduler itself.
pub fn read_records(log_dir: &Path, job_name: &str) -> Result<Vec<InstanceRecord>, StorageError> {
    let path = LogSink::new(log_dir).log_path(job_name);
    let contents = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => return Err(StorageError::OpenFile { path, source }),
    };

    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(StorageError::from))
        .collect()
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
