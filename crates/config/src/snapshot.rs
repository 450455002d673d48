// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parsing one config directory into a `ConfigSnapshot` (§4.1).
//!
//! Each `*.yaml` file is a mapping whose top-level keys are either one
//! of the two reserved keys (`saltpeter_config`, `saltpeter_maintenance`)
//! or a job name. A job's YAML body never repeats its own name — the
//! map key supplies it, the same way a Salt state file's top-level keys
//! double as IDs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use sp_core::{JobDefinition, MaintenanceConfig, RuntimeConfig};
use thiserror::Error;

const RESERVED_CONFIG_KEY: &str = "saltpeter_config";
const RESERVED_MAINTENANCE_KEY: &str = "saltpeter_maintenance";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config directory {path}: {source}")]
    ReadDir { path: PathBuf, source: std::io::Error },
    #[error("reading {path}: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("{path}: top level must be a YAML mapping")]
    NotAMapping { path: PathBuf },
    #[error("{path}: job {name:?}: {source}")]
    InvalidJob { path: PathBuf, name: String, source: serde_yaml::Error },
    #[error("{path}: {key}: {source}")]
    InvalidReservedKey { path: PathBuf, key: String, source: serde_yaml::Error },
}

/// A job's YAML body, with `name` supplied externally by its map key
/// rather than duplicated inside the value.
#[derive(Debug, Deserialize)]
struct JobBody {
    #[serde(default)]
    schedule: sp_core::model::ScheduleSpec,
    command: String,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default)]
    custom_env: BTreeMap<String, String>,
    targets: String,
    #[serde(default)]
    target_type: sp_core::model::TargetType,
    #[serde(default)]
    number_of_targets: u32,
    #[serde(default = "default_timeout")]
    timeout: u64,
    #[serde(default = "default_true")]
    use_agent: bool,
    #[serde(default)]
    agent_path: Option<String>,
    #[serde(default)]
    agent_log_level: Option<String>,
    #[serde(default)]
    agent_log_dir: Option<String>,
}

fn default_timeout() -> u64 {
    3600
}

fn default_true() -> bool {
    true
}

impl JobBody {
    fn into_definition(self, name: String) -> JobDefinition {
        JobDefinition {
            name,
            schedule: self.schedule,
            command: self.command,
            user: self.user,
            cwd: self.cwd,
            custom_env: self.custom_env,
            targets: self.targets,
            target_type: self.target_type,
            number_of_targets: self.number_of_targets,
            timeout: self.timeout,
            use_agent: self.use_agent,
            agent_path: self.agent_path,
            agent_log_level: self.agent_log_level,
            agent_log_dir: self.agent_log_dir,
            soft_timeout_ignored: None,
            hard_timeout_ignored: None,
        }
    }
}

/// An immutable, atomically-swappable view of the whole config
/// directory (§4.1). Cloning is cheap in the sense that callers always
/// hold it behind an `Arc` — see `ConfigLoader::current`.
#[derive(Debug, Clone, Default)]
pub struct ConfigSnapshot {
    pub jobs: BTreeMap<String, JobDefinition>,
    pub maintenance: MaintenanceConfig,
    pub runtime: RuntimeConfig,
}

/// Parse every `*.yaml` file in `dir` into one snapshot. Per-file and
/// per-job errors are collected and returned alongside the
/// best-effort snapshot rather than aborting the whole reload — a
/// single malformed file must not take down every other job (§4.10).
/// Only a directory that can't be read at all is fatal, and that's
/// signalled by returning `Err` instead of `Ok`.
pub fn load_dir(dir: &Path) -> Result<(ConfigSnapshot, Vec<ConfigError>), ConfigError> {
    let entries = std::fs::read_dir(dir)
        .map_err(|source| ConfigError::ReadDir { path: dir.to_path_buf(), source })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "yaml" || ext == "yml"))
        .collect();
    paths.sort();

    let mut snapshot = ConfigSnapshot::default();
    let mut errors = Vec::new();

    for path in paths {
        errors.extend(load_file(&path, &mut snapshot));
    }

    Ok((snapshot, errors))
}

/// Parse one file into `snapshot`, returning every per-job/per-key
/// error encountered. A bad job entry does not stop the rest of the
/// same file from loading (§4.10) — only a file that isn't valid YAML
/// at all, or isn't a mapping, aborts early.
fn load_file(path: &Path, snapshot: &mut ConfigSnapshot) -> Vec<ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(source) => return vec![ConfigError::ReadFile { path: path.to_path_buf(), source }],
    };

    let doc: serde_yaml::Value = match serde_yaml::from_str(&contents) {
        Ok(v) => v,
        Err(source) => {
            return vec![ConfigError::InvalidJob {
                path: path.to_path_buf(),
                name: "<document>".to_string(),
                source,
            }]
        }
    };
    let Some(mapping) = doc.as_mapping() else {
        return vec![ConfigError::NotAMapping { path: path.to_path_buf() }];
    };

    let mut errors = Vec::new();
    for (key, value) in mapping {
        let Some(key) = key.as_str() else { continue };
        if key == RESERVED_CONFIG_KEY {
            match serde_yaml::from_value::<RuntimeConfig>(value.clone()) {
                Ok(runtime) => snapshot.runtime = runtime,
                Err(source) => errors.push(ConfigError::InvalidReservedKey {
                    path: path.to_path_buf(),
                    key: key.to_string(),
                    source,
                }),
            }
        } else if key == RESERVED_MAINTENANCE_KEY {
            match serde_yaml::from_value::<MaintenanceConfig>(value.clone()) {
                Ok(maintenance) => snapshot.maintenance.merge(&maintenance),
                Err(source) => errors.push(ConfigError::InvalidReservedKey {
                    path: path.to_path_buf(),
                    key: key.to_string(),
                    source,
                }),
            }
        } else {
            match serde_yaml::from_value::<JobBody>(value.clone()) {
                Ok(body) => {
                    snapshot.jobs.insert(key.to_string(), body.into_definition(key.to_string()));
                }
                Err(source) => errors.push(ConfigError::InvalidJob {
                    path: path.to_path_buf(),
                    name: key.to_string(),
                    source,
                }),
            }
        }
    }

    errors
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
