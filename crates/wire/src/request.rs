// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

/// The External API surface's write/read contract (§4.8): a read of the
/// current snapshot, or a write that enqueues a kill command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    ReadState,
    /// Enqueue `{kill, job_name}`. A job with no running instance is a
    /// harmless no-op — the channel server finds no matching
    /// connections and simply drops the entry.
    Kill { job_name: String },
    /// Operator convenience: trigger the config loader to re-scan its
    /// directory immediately instead of waiting for the next filesystem
    /// event (useful in tests and for a manual `sp reload`).
    ReloadConfig,
}
