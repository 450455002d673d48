// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Config-level data model: the shape of one YAML job entry, the
//! merged maintenance set, and the handful of runtime knobs the
//! scheduler reads at startup.
//!
//! These types are intentionally dumb — no locking, no mutable
//! run-state. `sp_core::model` is what a config *file* looks like;
//! the scheduler's in-memory run-state (`RunningInstance`,
//! `TargetResult`, ...) lives alongside it in `sp_core::state`, which
//! owns the locking story for it.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::cron::{CronError, CronSchedule};

fn default_star() -> String {
    "*".to_string()
}

/// The six raw cron fields as they appear in a YAML job entry, in spec
/// order (year, month, day-of-month, day-of-week, hour, minute, second).
/// Every field defaults to `*` when omitted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScheduleSpec {
    pub year: String,
    pub month: String,
    pub day_of_month: String,
    pub day_of_week: String,
    pub hour: String,
    pub minute: String,
    pub second: String,
}

impl Default for ScheduleSpec {
    fn default() -> Self {
        Self {
            year: default_star(),
            month: default_star(),
            day_of_month: default_star(),
            day_of_week: default_star(),
            hour: default_star(),
            minute: default_star(),
            second: "0".to_string(),
        }
    }
}

impl ScheduleSpec {
    /// Compile the raw string fields into a schedule that can compute
    /// firing times. Returns a `CronError` on any unparseable field —
    /// callers should surface this as a `ConfigError` and skip the file,
    /// per the config loader's "never fatal" contract.
    pub fn compile(&self) -> Result<CronSchedule, CronError> {
        CronSchedule::parse(
            &self.year,
            &self.month,
            &self.day_of_month,
            &self.day_of_week,
            &self.hour,
            &self.minute,
            Some(&self.second),
        )
    }
}

/// How `JobDefinition::targets` is interpreted by the bus when resolving
/// the eligible machine set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Glob,
    Pcre,
    List,
    Grain,
    GrainPcre,
    Pillar,
    PillarPcre,
    Nodegroup,
    Range,
    Compound,
    Ipcidr,
}

impl Default for TargetType {
    fn default() -> Self {
        TargetType::Glob
    }
}

fn default_timeout() -> u64 {
    3600
}

fn default_true() -> bool {
    true
}

/// An immutable snapshot of one YAML job entry. `name` is its identity
/// within a config snapshot; reload replaces the whole map atomically
/// (§4.5 of the design notes), so a `JobDefinition` a `RunningInstance`
/// was dispatched with never changes under it mid-flight.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobDefinition {
    pub name: String,
    #[serde(default)]
    pub schedule: ScheduleSpec,
    pub command: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub custom_env: BTreeMap<String, String>,
    pub targets: String,
    #[serde(default)]
    pub target_type: TargetType,
    /// `0` means "all resolved targets"; `N > 0` samples `N` uniformly.
    #[serde(default)]
    pub number_of_targets: u32,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_true")]
    pub use_agent: bool,
    #[serde(default)]
    pub agent_path: Option<String>,
    #[serde(default)]
    pub agent_log_level: Option<String>,
    #[serde(default)]
    pub agent_log_dir: Option<String>,
    /// Historical field name, accepted and ignored (Open Question in
    /// the design notes: `timeout` wins, `soft_timeout`/`hard_timeout`
    /// variants are dropped silently rather than guessed at).
    #[serde(default, rename = "soft_timeout")]
    pub soft_timeout_ignored: Option<u64>,
    #[serde(default, rename = "hard_timeout")]
    pub hard_timeout_ignored: Option<u64>,
}

impl JobDefinition {
    pub fn compiled_schedule(&self) -> Result<CronSchedule, CronError> {
        self.schedule.compile()
    }
}

/// `saltpeter_maintenance`, merged across every config file that
/// defines it. `global` suppresses all new dispatches; `machines` is
/// subtracted from every resolved target set before dispatch.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct MaintenanceConfig {
    #[serde(default)]
    pub global: bool,
    #[serde(default)]
    pub machines: BTreeSet<String>,
}

impl MaintenanceConfig {
    pub fn merge(&mut self, other: &MaintenanceConfig) {
        self.global = self.global || other.global;
        self.machines.extend(other.machines.iter().cloned());
    }
}

/// `saltpeter_config`: the runtime knobs the scheduler process reads at
/// startup. Per §4.1, only a documented subset of these apply live on
/// reload; the rest require a restart (the config loader does not try
/// to distinguish the two here — it is the daemon's bootstrap code
/// that decides what it re-reads per tick vs. only at startup).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct RuntimeConfig {
    pub channel_bind: String,
    pub channel_port: u16,
    pub ipc_socket: Option<String>,
    pub default_agent_path: String,
    pub log_dir: String,
    pub verbose: bool,
    pub external_index_endpoints: Vec<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            channel_bind: "127.0.0.1".to_string(),
            channel_port: 4505,
            ipc_socket: None,
            default_agent_path: "sp-agent".to_string(),
            log_dir: "/var/log/saltpeter".to_string(),
            verbose: false,
            external_index_endpoints: Vec::new(),
        }
    }
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;
