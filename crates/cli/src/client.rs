// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A thin client for the daemon's external API surface (§4.8): connect
//! to its Unix socket, send one `sp_wire::Request`, read back the
//! `Response`.

use std::path::Path;

use sp_wire::{Request, Response};
use tokio::net::UnixStream;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("connecting to daemon socket {path}: {source}\n\nis sp-daemon running?")]
    Connect { path: String, source: std::io::Error },
    #[error("talking to daemon: {0}")]
    Framing(#[from] sp_wire::FramingError),
    #[error("daemon returned an error: {0}")]
    DaemonError(String),
}

pub struct DaemonClient {
    stream: UnixStream,
}

impl DaemonClient {
    pub async fn connect(socket_path: &Path) -> Result<Self, ClientError> {
        let stream = UnixStream::connect(socket_path)
            .await
            .map_err(|source| ClientError::Connect { path: socket_path.display().to_string(), source })?;
        Ok(Self { stream })
    }

    pub async fn send(&mut self, request: Request) -> Result<Response, ClientError> {
        sp_wire::write_frame(&mut self.stream, &request).await?;
        let response: Response = sp_wire::read_frame(&mut self.stream).await?;
        if let Response::Error { message } = &response {
            return Err(ClientError::DaemonError(message.clone()));
        }
        Ok(response)
    }
}
