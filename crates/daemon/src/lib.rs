// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wiring for the `sp-daemon` binary: the external API surface (§4.8)
//! that exposes `sp-wire`'s `Request`/`Response` contract over a Unix
//! socket, plus the bootstrap that assembles every other crate's
//! pieces (config loader, dispatcher, monitor, channel server) into
//! one running process.
//!
//! Kept as a library so the binary's `main` is just argument parsing
//! and `tokio::main`, and so integration tests can drive `run` directly
//! instead of spawning a real process.

pub mod api;
pub mod bootstrap;

pub use api::ApiServer;
pub use bootstrap::{run, Daemon};
