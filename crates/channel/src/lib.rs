// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The agent channel (§4.6/§4.7): the persistent bidirectional protocol
//! between the scheduler and the agents it dispatches, and both ends of
//! the wire — `ChannelServer` (scheduler side) and `ChannelClient`
//! (agent side).

pub mod client;
pub mod protocol;
pub mod registry;
pub mod server;

pub use client::{ChannelClient, ClientError};
pub use protocol::{AgentMessage, OutputStream, ServerMessage};
pub use registry::{AgentConnection, ConnectionKey, ConnectionRegistry};
pub use server::{ChannelError, ChannelServer};
