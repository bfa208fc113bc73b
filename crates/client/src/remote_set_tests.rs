// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Tests for the remote query set.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use super::*;
use serde_json::json;

fn version(query_set: u32, ts: u64) -> StateVersion {
    StateVersion { query_set, identity: 0, ts: Timestamp(ts) }
}

fn updated(id: u32, value: serde_json::Value) -> StateModification {
    StateModification::QueryUpdated {
        query_id: QueryId(id),
        value,
        log_lines: Vec::new(),
        journal: None,
    }
}

#[test]
fn transitions_advance_the_version() {
    let mut set = RemoteQuerySet::new();
    assert_eq!(set.timestamp(), Timestamp(0));

    let t1 = ServerMessage::transition(version(0, 0), version(1, 10), vec![
        updated(0, json!([{"id": "a"}])),
    ]);
    set.apply(&t1).unwrap();
    assert_eq!(set.timestamp(), Timestamp(10));
    assert_eq!(
        set.results().get(&QueryId(0)),
        Some(&FunctionResult::Success(json!([{"id": "a"}])))
    );

    let t2 = ServerMessage::transition(version(1, 10), version(1, 20), vec![
        updated(0, json!([{"id": "a"}, {"id": "b"}])),
    ]);
    set.apply(&t2).unwrap();
    assert_eq!(set.timestamp(), Timestamp(20));
}

#[test]
fn mismatched_start_version_is_a_protocol_violation() {
    let mut set = RemoteQuerySet::new();
    let bad = ServerMessage::transition(version(0, 5), version(1, 10), Vec::new());

    match set.apply(&bad) {
        Err(ClientError::Protocol(msg)) => {
            assert!(msg.contains("transition starts at"), "got: {}", msg);
        }
        other => panic!("expected protocol error, got {:?}", other),
    }
    // The set is unchanged.
    assert_eq!(set.timestamp(), Timestamp(0));
}

#[test]
fn failed_queries_are_stored_as_failures() {
    let mut set = RemoteQuerySet::new();
    let t = ServerMessage::transition(version(0, 0), version(1, 10), vec![
        StateModification::QueryFailed {
            query_id: QueryId(0),
            error_message: "missing index".to_string(),
            log_lines: Vec::new(),
        },
    ]);
    set.apply(&t).unwrap();
    assert_eq!(
        set.results().get(&QueryId(0)),
        Some(&FunctionResult::Failure("missing index".to_string()))
    );
}

#[test]
fn removed_queries_leave_the_set() {
    let mut set = RemoteQuerySet::new();
    set.apply(&ServerMessage::transition(version(0, 0), version(1, 10), vec![
        updated(0, json!(1)),
    ]))
    .unwrap();

    set.apply(&ServerMessage::transition(version(1, 10), version(2, 11), vec![
        StateModification::QueryRemoved { query_id: QueryId(0) },
    ]))
    .unwrap();

    assert!(set.results().is_empty());
    assert_eq!(set.timestamp(), Timestamp(11));
}

#[test]
fn non_transition_frames_are_rejected() {
    let mut set = RemoteQuerySet::new();
    assert!(set.apply(&ServerMessage::Ping).is_err());
}

#[test]
fn timestamps_are_monotonic_across_a_stream() {
    let mut set = RemoteQuerySet::new();
    let mut last = set.timestamp();
    for (i, ts) in [3u64, 7, 7, 12, 40].iter().enumerate() {
        let i = i as u32;
        let t = ServerMessage::transition(
            set.version(),
            version(i + 1, *ts),
            vec![updated(0, json!(i))],
        );
        set.apply(&t).unwrap();
        assert!(set.timestamp() >= last);
        last = set.timestamp();
    }
    assert_eq!(last, Timestamp(40));
}
