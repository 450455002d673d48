// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Watches the job directory and keeps a `ConfigSnapshot` current
//! (§4.1). Readers call `ConfigLoader::current()` and get a consistent,
//! cheaply-cloned `Arc` without ever blocking the watcher.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::snapshot::{self, ConfigError, ConfigSnapshot};

/// How long to wait after the last filesystem event before reloading,
/// so a burst of saves (an editor's write-then-rename, a `git pull`
/// touching a dozen files) collapses into one reload instead of one
/// per event.
const DEBOUNCE: Duration = Duration::from_millis(300);

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("starting filesystem watch on {path}: {source}")]
    Watch { path: PathBuf, source: notify::Error },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Owns the current snapshot and, once `watch` is called, the
/// background reload task and the `notify` watcher keeping it fed.
pub struct ConfigLoader {
    dir: PathBuf,
    current: Arc<Mutex<Arc<ConfigSnapshot>>>,
}

impl ConfigLoader {
    /// Load `dir` once synchronously. Per-file/per-job parse errors are
    /// returned alongside the best-effort snapshot rather than failing
    /// the whole load (§4.10) — only a directory that cannot be read at
    /// all is fatal.
    pub fn load(dir: impl Into<PathBuf>) -> Result<(Self, Vec<ConfigError>), WatchError> {
        let dir = dir.into();
        let (snapshot, errors) = snapshot::load_dir(&dir)?;
        Ok((Self { dir, current: Arc::new(Mutex::new(Arc::new(snapshot))) }, errors))
    }

    pub fn current(&self) -> Arc<ConfigSnapshot> {
        self.current.lock().clone()
    }

    /// Force an immediate reload instead of waiting for the next
    /// filesystem event and debounce window — the operator-triggered
    /// `ReloadConfig` request on the external API surface (§4.8) goes
    /// through this rather than poking the `notify` watcher.
    pub fn reload_now(&self) -> Result<Vec<ConfigError>, WatchError> {
        let (snapshot, errors) = snapshot::load_dir(&self.dir)?;
        *self.current.lock() = Arc::new(snapshot);
        Ok(errors)
    }

    /// Start watching `self.dir` for changes, debouncing bursts of
    /// events into a single reload. Spawns a background task and
    /// returns a guard: drop it (or let it fall out of scope) to stop
    /// watching — the `notify::Watcher` is tied to its lifetime.
    pub fn watch(&self) -> Result<WatchHandle, WatchError> {
        let (tx, rx) = mpsc::channel::<()>(32);

        let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
            if res.is_ok() {
                let _ = tx.blocking_send(());
            }
        })
        .map_err(|source| WatchError::Watch { path: self.dir.clone(), source })?;

        watcher
            .watch(&self.dir, RecursiveMode::NonRecursive)
            .map_err(|source| WatchError::Watch { path: self.dir.clone(), source })?;

        let dir = self.dir.clone();
        let current = self.current.clone();
        let task = tokio::spawn(reload_loop(dir, current, rx));

        Ok(WatchHandle { _watcher: watcher, task })
    }
}

/// Debounce filesystem events and reload on each settled burst.
/// Runs until its channel closes (the `WatchHandle`, and with it the
/// `notify::Watcher`, is dropped).
async fn reload_loop(
    dir: PathBuf,
    current: Arc<Mutex<Arc<ConfigSnapshot>>>,
    mut events: mpsc::Receiver<()>,
) {
    while events.recv().await.is_some() {
        // Drain anything else that arrived while we were waiting, then
        // wait out the debounce window before reloading.
        while events.try_recv().is_ok() {}
        tokio::time::sleep(DEBOUNCE).await;
        while events.try_recv().is_ok() {}

        match snapshot::load_dir(&dir) {
            Ok((snapshot, errors)) => {
                for e in &errors {
                    tracing::warn!(error = %e, "config reload: skipping invalid entry");
                }
                tracing::info!(jobs = snapshot.jobs.len(), "config reloaded");
                *current.lock() = Arc::new(snapshot);
            }
            Err(e) => {
                tracing::error!(error = %e, "config reload: directory unreadable, keeping last good snapshot");
            }
        }
    }
}

/// Keeps the `notify::Watcher` and reload task alive. Dropping this
/// stops both.
pub struct WatchHandle {
    _watcher: RecommendedWatcher,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
#[path = "watcher_tests.rs"]
mod tests;
