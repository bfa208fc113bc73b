// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Tests for the client handle and driver.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::collections::BTreeSet;

use ripple_core::{ClientMessage, QuerySetModification, ServerMessage, Timestamp};
use serde_json::json;

use super::{ClientOptions, ConnectionState, SyncClient, SocketState};
use crate::error::ClientError;
use crate::test_helpers::{query_updated, transition, version, TestClient};

fn no_op_callback() -> super::TransitionCallback {
    Box::new(|_changed: &BTreeSet<ripple_core::QueryToken>| {})
}

#[test]
fn rejects_bad_addresses() {
    let result = SyncClient::new("ftp://nope", no_op_callback(), ClientOptions::default());
    assert!(matches!(result, Err(ClientError::InvalidUrl(_))));
}

#[test]
fn rejects_unsaved_changes_warning() {
    let options = ClientOptions { unsaved_changes_warning: Some(true), ..Default::default() };
    let result = SyncClient::new("http://localhost:8187", no_op_callback(), options);
    assert!(matches!(result, Err(ClientError::Misuse(_))));
}

#[tokio::test(start_paused = true)]
async fn connect_frame_is_sent_first() {
    let t = TestClient::start().connected().await;

    let sent = t.socket.sent();
    match &sent[0] {
        ClientMessage::Connect { connection_count, last_close_reason, .. } => {
            assert_eq!(*connection_count, 1);
            assert_eq!(last_close_reason, "InitialConnect");
        }
        other => panic!("expected Connect first, got {:?}", other),
    }
    // The (empty) query set is replayed right after.
    assert!(matches!(sent[1], ClientMessage::ModifyQuerySet { base_version: 0, .. }));
}

#[tokio::test(start_paused = true)]
async fn subscribe_sends_an_add_frame() {
    let t = TestClient::start().connected().await;

    let sub = t.client.subscribe("posts:list", json!({}), None).await.unwrap();
    t.socket
        .wait_until("query add frame", |sent| {
            sent.iter().any(|f| {
                matches!(
                    f,
                    ClientMessage::ModifyQuerySet { modifications, .. }
                        if matches!(modifications.as_slice(), [QuerySetModification::Add { .. }])
                )
            })
        })
        .await;
    drop(sub);
}

#[tokio::test(start_paused = true)]
async fn invalid_udf_path_is_misuse() {
    let t = TestClient::start();
    let result = t.client.subscribe("bad::path", json!({}), None).await;
    assert!(matches!(result, Err(ClientError::Misuse(_))));
}

#[tokio::test(start_paused = true)]
async fn connection_state_reports_health() {
    let t = TestClient::start().connected().await;

    let state: ConnectionState = t.client.connection_state().await.unwrap();
    assert!(state.is_websocket_connected);
    assert_eq!(state.socket_state, SocketState::Ready);
    assert_eq!(state.connection_count, 1);
    assert!(!state.has_inflight_requests);
    assert!(state.fatal_error.is_none());
    assert!(state.time_of_oldest_inflight_request.is_none());
}

#[tokio::test(start_paused = true)]
async fn inflight_requests_show_up_in_connection_state() {
    let t = TestClient::start().connected().await;

    let client = t.client.clone();
    let pending = tokio::spawn(async move { client.mutation("posts:add", json!({}), None).await });
    t.socket
        .wait_until("mutation frame", |sent| {
            sent.iter().any(|f| matches!(f, ClientMessage::Mutation { .. }))
        })
        .await;

    let state = t.client.connection_state().await.unwrap();
    assert!(state.has_inflight_requests);
    assert!(state.has_incomplete_requests);
    assert!(state.time_of_oldest_inflight_request.is_some());

    pending.abort();
}

#[tokio::test(start_paused = true)]
async fn close_fails_pending_requests() {
    let t = TestClient::start().connected().await;

    let client = t.client.clone();
    let pending = tokio::spawn(async move { client.mutation("posts:add", json!({}), None).await });
    t.socket
        .wait_until("mutation frame", |sent| {
            sent.iter().any(|f| matches!(f, ClientMessage::Mutation { .. }))
        })
        .await;

    t.client.close().await.unwrap();
    assert_eq!(pending.await.unwrap(), Err(ClientError::Closed));

    // The client is gone; further calls fail fast.
    assert_eq!(
        t.client.mutation("posts:add", json!({}), None).await,
        Err(ClientError::Closed)
    );
    assert!(!t.socket.is_connected());
}

#[tokio::test(start_paused = true)]
async fn local_query_result_reflects_the_view() {
    let mut t = TestClient::start().connected().await;
    let _sub = t.client.subscribe("posts:list", json!({}), None).await.unwrap();

    assert_eq!(t.client.local_query_result("posts:list", json!({})).await, Ok(None));

    t.socket.push_message(transition(
        version(0, 0),
        version(1, 10),
        vec![query_updated(0, json!([{"id": "a"}]))],
    ));
    let _ = t.next_transition().await;

    assert_eq!(
        t.client.local_query_result("posts:list", json!({})).await,
        Ok(Some(json!([{"id": "a"}])))
    );
}

#[tokio::test(start_paused = true)]
async fn failed_query_surfaces_as_application_error() {
    let mut t = TestClient::start().connected().await;
    let _sub = t.client.subscribe("posts:list", json!({}), None).await.unwrap();

    t.socket.push_message(ServerMessage::Transition {
        start_version: version(0, 0),
        end_version: version(1, 10),
        modifications: vec![ripple_core::StateModification::QueryFailed {
            query_id: ripple_core::QueryId(0),
            error_message: "index missing".to_string(),
            log_lines: Vec::new(),
        }],
    });
    let _ = t.next_transition().await;

    assert_eq!(
        t.client.local_query_result("posts:list", json!({})).await,
        Err(ClientError::Application { message: "index missing".to_string() })
    );
}

#[tokio::test(start_paused = true)]
async fn query_journal_is_readable_after_a_transition() {
    let mut t = TestClient::start().connected().await;
    let _sub = t.client.subscribe("posts:list", json!({}), None).await.unwrap();

    assert_eq!(t.client.query_journal("posts:list", json!({})).await.unwrap(), None);

    t.socket.push_message(ServerMessage::Transition {
        start_version: version(0, 0),
        end_version: version(1, 10),
        modifications: vec![ripple_core::StateModification::QueryUpdated {
            query_id: ripple_core::QueryId(0),
            value: json!([]),
            log_lines: Vec::new(),
            journal: Some("j-1".to_string()),
        }],
    });
    let _ = t.next_transition().await;

    assert_eq!(
        t.client.query_journal("posts:list", json!({})).await.unwrap(),
        Some("j-1".to_string())
    );
}

#[tokio::test(start_paused = true)]
async fn mutation_result_arrives_after_view_update() {
    let mut t = TestClient::start().connected().await;
    let _sub = t.client.subscribe("posts:list", json!({}), None).await.unwrap();

    t.socket.push_message(transition(
        version(0, 0),
        version(1, 10),
        vec![query_updated(0, json!([]))],
    ));
    let _ = t.next_transition().await;

    let client = t.client.clone();
    let pending =
        tokio::spawn(async move { client.mutation("posts:add", json!({"id": "a"}), None).await });
    t.socket
        .wait_until("mutation frame", |sent| {
            sent.iter().any(|f| matches!(f, ClientMessage::Mutation { .. }))
        })
        .await;

    // Response lands at ts=20, ahead of the view (ts=10): held.
    t.socket.push_message(ServerMessage::mutation_success(
        ripple_core::RequestId(0),
        json!("id-a"),
        Timestamp(20),
    ));
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(!pending.is_finished(), "mutation must wait for the view");

    // The view catches up; the change callback fires, then the caller.
    t.socket.push_message(transition(
        version(1, 10),
        version(1, 20),
        vec![query_updated(0, json!([{"id": "a"}]))],
    ));
    let _ = t.next_transition().await;

    assert_eq!(pending.await.unwrap(), Ok(json!("id-a")));
}

#[tokio::test(start_paused = true)]
async fn application_failure_rejects_the_mutation() {
    let t = TestClient::start().connected().await;

    let client = t.client.clone();
    let pending = tokio::spawn(async move { client.mutation("posts:add", json!({}), None).await });
    t.socket
        .wait_until("mutation frame", |sent| {
            sent.iter().any(|f| matches!(f, ClientMessage::Mutation { .. }))
        })
        .await;

    t.socket
        .push_message(ServerMessage::mutation_failure(ripple_core::RequestId(0), "rejected"));

    assert_eq!(
        pending.await.unwrap(),
        Err(ClientError::Application { message: "rejected".to_string() })
    );
}

#[tokio::test(start_paused = true)]
async fn actions_resolve_independently_of_the_view() {
    let t = TestClient::start().connected().await;

    let client = t.client.clone();
    let pending =
        tokio::spawn(async move { client.action("emails:send", json!({"to": "x"})).await });
    t.socket
        .wait_until("action frame", |sent| {
            sent.iter().any(|f| matches!(f, ClientMessage::Action { .. }))
        })
        .await;

    t.socket
        .push_message(ServerMessage::action_success(ripple_core::RequestId(0), json!("sent")));
    assert_eq!(pending.await.unwrap(), Ok(json!("sent")));
}
