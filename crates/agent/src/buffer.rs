// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The agent's output buffer (§4.7/§9): a FIFO of captured stdout/
//! stderr lines, flushed into sequenced `output` messages and retained
//! until the server acks them. This is the agent-side half of the
//! "miniature reliable-stream protocol" the design notes call the most
//! delicate piece of the system — the server side lives in
//! `sp_channel::server`.

use std::collections::VecDeque;

use sp_channel::OutputStream;

/// Flush every ~4 KiB of accumulated line data...
pub const DEFAULT_FLUSH_BYTES: usize = 4096;
/// ...or every 250ms, whichever comes first (§9 Open Questions: the
/// spec leaves the exact threshold unpinned and suggests these as
/// defaults).
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 250;

/// One line captured from the child's stdout/stderr, not yet flushed
/// into an `output` message.
#[derive(Debug, Clone)]
struct PendingLine {
    stream: OutputStream,
    text: String,
}

/// One `output` message already sent to the server, retained until its
/// `seq` is acked so it can be replayed verbatim after a gap or
/// reconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedMessage {
    pub seq: u64,
    pub stream: OutputStream,
    pub data: String,
}

/// FIFO buffer of unflushed lines plus the retained, unacked tail of
/// already-sent messages (§4.7).
#[derive(Debug)]
pub struct OutputBuffer {
    pending: VecDeque<PendingLine>,
    pending_bytes: usize,
    unacked: VecDeque<BufferedMessage>,
    next_seq: u64,
    last_flush_epoch_ms: u64,
}

impl OutputBuffer {
    pub fn new(now_epoch_ms: u64) -> Self {
        Self {
            pending: VecDeque::new(),
            pending_bytes: 0,
            unacked: VecDeque::new(),
            next_seq: 1,
            last_flush_epoch_ms: now_epoch_ms,
        }
    }

    pub fn push_line(&mut self, stream: OutputStream, mut line: String) {
        if !line.ends_with('\n') {
            line.push('\n');
        }
        self.pending_bytes += line.len();
        self.pending.push_back(PendingLine { stream, text: line });
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Whether a flush is due: bytes past the threshold, or enough time
    /// has elapsed since the last flush (§4.7/§9).
    pub fn flush_due(&self, now_epoch_ms: u64) -> bool {
        if self.pending.is_empty() {
            return false;
        }
        self.pending_bytes >= DEFAULT_FLUSH_BYTES
            || now_epoch_ms.saturating_sub(self.last_flush_epoch_ms) >= DEFAULT_FLUSH_INTERVAL_MS
    }

    /// Drain every pending line into exactly one new `output` message,
    /// in emission order, and retain it as unacked. Returns `None` if
    /// there was nothing to flush.
    ///
    /// Lines are combined regardless of which stream they came from:
    /// the server appends `data` to one aggregated `TargetResult::output`
    /// string with no per-stream splitting, so grouping by stream here
    /// would reorder interleaved stdout/stderr relative to each other.
    /// The `stream` tag on the outgoing message is carried for
    /// diagnostics only, taken from the first line in the batch.
    pub fn flush(&mut self, now_epoch_ms: u64) -> Option<BufferedMessage> {
        if self.pending.is_empty() {
            return None;
        }
        let stream = self.pending.front().map(|l| l.stream).unwrap_or(OutputStream::Stdout);
        let mut data = String::with_capacity(self.pending_bytes);
        for line in self.pending.drain(..) {
            data.push_str(&line.text);
        }
        self.pending_bytes = 0;
        self.last_flush_epoch_ms = now_epoch_ms;

        let seq = self.next_seq;
        self.next_seq += 1;
        let msg = BufferedMessage { seq, stream, data };
        self.unacked.push_back(msg.clone());
        Some(msg)
    }

    /// The seq this buffer last assigned (0 if nothing has been sent
    /// yet), used to detect whether a `sync_response` asks for replay.
    pub fn last_sent_seq(&self) -> u64 {
        self.next_seq - 1
    }

    /// Apply a server `ack { seq }`: acks are cumulative (seqs are
    /// accepted server-side only in strictly increasing order, so
    /// acking N implies everything before it already landed) — drop
    /// every retained message with `seq <= seq`. Duplicate or
    /// out-of-order acks are harmless no-ops.
    pub fn ack(&mut self, seq: u64) {
        while matches!(self.unacked.front(), Some(m) if m.seq <= seq) {
            self.unacked.pop_front();
        }
    }

    /// Every currently-unacked message, oldest first — what to replay
    /// after a `sync_response` or a fresh reconnect (§4.7/§4.6).
    pub fn unacked(&self) -> impl Iterator<Item = &BufferedMessage> {
        self.unacked.iter()
    }

    pub fn has_unacked(&self) -> bool {
        !self.unacked.is_empty()
    }
}

#[cfg(test)]
#[path = "buffer_tests.rs"]
mod tests;
