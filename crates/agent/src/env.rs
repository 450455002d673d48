// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent configuration, read exclusively from environment variables
//! (§4.7/§6). The agent must never accept positional command-line
//! parameters for any of this — the bus's env-injection facility is
//! the only carrier, so nothing sensitive ever appears in a process
//! listing.

use std::collections::BTreeMap;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
}

/// One running agent's configuration, assembled once at startup.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub websocket_url: String,
    pub job_name: String,
    pub job_instance: String,
    pub command: String,
    pub machine: String,
    pub cwd: Option<String>,
    pub user: Option<String>,
    pub timeout_secs: Option<u64>,
    pub log_level: Option<String>,
    pub log_dir: Option<String>,
    /// Every other environment variable the process was launched with,
    /// minus the `SP_*` carriers above — this is `custom_env` flowing
    /// through unchanged, since the dispatcher folds it directly into
    /// the launch environment rather than prefixing it (§4.3 step 4).
    pub passthrough_env: BTreeMap<String, String>,
}

const RESERVED_KEYS: &[&str] = &[
    "SP_WEBSOCKET_URL",
    "SP_JOB_NAME",
    "SP_JOB_INSTANCE",
    "SP_COMMAND",
    "SP_MACHINE_ID",
    "SP_CWD",
    "SP_USER",
    "SP_TIMEOUT",
    "SP_LOG_LEVEL",
    "SP_LOG_DIR",
];

impl AgentConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    /// Build from an arbitrary iterator of `(key, value)` pairs instead
    /// of the real process environment, so tests don't need to mutate
    /// global process state.
    pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Result<Self, ConfigError> {
        let mut all: BTreeMap<String, String> = vars.into_iter().collect();

        let mut required = |key: &'static str| -> Result<String, ConfigError> {
            all.remove(key).ok_or(ConfigError::Missing(key))
        };

        let websocket_url = required("SP_WEBSOCKET_URL")?;
        let job_name = required("SP_JOB_NAME")?;
        let job_instance = required("SP_JOB_INSTANCE")?;
        let command = required("SP_COMMAND")?;

        let machine = all
            .remove("SP_MACHINE_ID")
            .or_else(|| hostname())
            .unwrap_or_else(|| "unknown".to_string());
        let cwd = all.remove("SP_CWD");
        let user = all.remove("SP_USER");
        let timeout_secs = all.remove("SP_TIMEOUT").and_then(|v| v.parse().ok());
        let log_level = all.remove("SP_LOG_LEVEL");
        let log_dir = all.remove("SP_LOG_DIR");

        let passthrough_env =
            all.into_iter().filter(|(k, _)| !RESERVED_KEYS.contains(&k.as_str())).collect();

        Ok(Self {
            websocket_url,
            job_name,
            job_instance,
            command,
            machine,
            cwd,
            user,
            timeout_secs,
            log_level,
            log_dir,
            passthrough_env,
        })
    }
}

fn hostname() -> Option<String> {
    nix::unistd::gethostname().ok().and_then(|s| s.into_string().ok())
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
