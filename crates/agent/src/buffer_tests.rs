// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use sp_channel::OutputStream;

#[test]
fn flush_assigns_contiguous_seq_starting_at_one() {
    let mut buf = OutputBuffer::new(0);
    buf.push_line(OutputStream::Stdout, "one".to_string());
    let m1 = buf.flush(0).unwrap();
    assert_eq!(m1.seq, 1);

    buf.push_line(OutputStream::Stdout, "two".to_string());
    let m2 = buf.flush(0).unwrap();
    assert_eq!(m2.seq, 2);
}

#[test]
fn flush_on_empty_buffer_returns_none() {
    let mut buf = OutputBuffer::new(0);
    assert!(buf.flush(0).is_none());
}

#[test]
fn flush_combines_lines_in_emission_order_across_streams() {
    let mut buf = OutputBuffer::new(0);
    buf.push_line(OutputStream::Stdout, "out1".to_string());
    buf.push_line(OutputStream::Stderr, "err1".to_string());
    buf.push_line(OutputStream::Stdout, "out2".to_string());
    let msg = buf.flush(0).unwrap();
    assert_eq!(msg.data, "out1\nerr1\nout2\n");
}

#[test]
fn ack_drops_cumulatively_and_is_idempotent() {
    let mut buf = OutputBuffer::new(0);
    buf.push_line(OutputStream::Stdout, "a".to_string());
    buf.flush(0).unwrap();
    buf.push_line(OutputStream::Stdout, "b".to_string());
    buf.flush(0).unwrap();
    buf.push_line(OutputStream::Stdout, "c".to_string());
    buf.flush(0).unwrap();

    assert_eq!(buf.unacked().count(), 3);
    buf.ack(2);
    assert_eq!(buf.unacked().count(), 1);
    assert_eq!(buf.unacked().next().unwrap().seq, 3);

    // Duplicate/old ack is a harmless no-op.
    buf.ack(1);
    assert_eq!(buf.unacked().count(), 1);
}

#[test]
fn unacked_survives_until_acked_for_resync_replay() {
    let mut buf = OutputBuffer::new(0);
    buf.push_line(OutputStream::Stdout, "a".to_string());
    buf.flush(0).unwrap();
    buf.push_line(OutputStream::Stdout, "b".to_string());
    buf.flush(0).unwrap();

    assert!(buf.has_unacked());
    let replay: Vec<u64> = buf.unacked().map(|m| m.seq).collect();
    assert_eq!(replay, vec![1, 2]);
    assert_eq!(buf.last_sent_seq(), 2);
}

#[test]
fn flush_due_on_byte_threshold() {
    let mut buf = OutputBuffer::new(0);
    buf.push_line(OutputStream::Stdout, "x".repeat(DEFAULT_FLUSH_BYTES));
    assert!(buf.flush_due(0));
}

#[test]
fn flush_due_on_elapsed_time() {
    let mut buf = OutputBuffer::new(0);
    buf.push_line(OutputStream::Stdout, "short".to_string());
    assert!(!buf.flush_due(DEFAULT_FLUSH_INTERVAL_MS / 2));
    assert!(buf.flush_due(DEFAULT_FLUSH_INTERVAL_MS));
}
