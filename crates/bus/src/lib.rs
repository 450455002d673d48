// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `Bus` trait: the only point of contact between the scheduler and
//! the external remote-execution substrate (§1's "out of scope,
//! interface only" collaborator).
//!
//! Two implementations ship here: [`LocalBus`], which resolves targets
//! and launches agents as ordinary child processes on the local host
//! (the "single-box" deployment), and [`FakeBus`], an in-memory double
//! the scheduler crate's and the workspace's integration tests drive
//! directly to script every Phase 1 outcome in §4.4 — confirmed,
//! rejected, and "never heard back".

pub mod fake;
pub mod local;
pub mod types;

pub use fake::FakeBus;
pub use local::LocalBus;
pub use types::{BusError, BusJobRef, LaunchOutcome, LaunchRequest, SyncOutcome};

use async_trait::async_trait;
use sp_core::TargetType;

/// The remote-execution bus's contract with the scheduler (§4.3/§4.4).
///
/// Implementors are the only code in the workspace allowed to know how
/// a target expression is resolved to machine names or how an agent
/// actually gets onto a target; everything above this trait treats
/// both as opaque.
#[async_trait]
pub trait Bus: Send + Sync {
    /// Resolve a `(targets, target_type)` expression to the concrete,
    /// currently-eligible machine set (§4.3 step 1). Order is not
    /// significant; the dispatcher sorts/samples as needed.
    async fn resolve_targets(
        &self,
        targets_expr: &str,
        target_type: TargetType,
    ) -> Result<Vec<String>, BusError>;

    /// Submit an asynchronous agent launch across `request.targets`,
    /// returning a bus-assigned reference the caller polls for
    /// outcomes (§4.4 Phase 1). Must not block waiting for any target
    /// to confirm.
    async fn submit_launch(&self, request: LaunchRequest) -> Result<BusJobRef, BusError>;

    /// Poll for launch outcomes that have arrived since the last call.
    /// Returns only newly-resolved `(machine, outcome)` pairs; targets
    /// with no outcome yet are simply absent — the dispatcher's Phase 1
    /// loop is expected to call this repeatedly with no deadline of its
    /// own (§4.4: "Phase 1 never imposes its own deadline").
    async fn poll_launch_outcomes(
        &self,
        job_ref: &BusJobRef,
    ) -> Result<Vec<(String, LaunchOutcome)>, BusError>;

    /// Legacy (`use_agent=false`) path: run `command` synchronously on
    /// every target through the bus itself, honouring `timeout_secs`,
    /// with no agent channel involved (§4.3's "legacy mode").
    async fn run_sync(
        &self,
        targets: &[String],
        command: &str,
        timeout_secs: u64,
    ) -> Result<Vec<(String, SyncOutcome)>, BusError>;
}
