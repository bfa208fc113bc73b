// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for client and scenario tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::collections::BTreeSet;
use std::time::Duration;

use ripple_core::{
    QueryId, QueryToken, ServerMessage, StateModification, StateVersion, Timestamp, UdfPath, Value,
};
use tokio::sync::mpsc;

use crate::client::{ClientOptions, SyncClient, TransitionCallback};
use crate::socket::tests::{MockSocket, MockSocketHandle};

/// A client wired to a mock socket, with its change events captured.
pub struct TestClient {
    pub client: SyncClient,
    pub socket: MockSocketHandle,
    pub transitions: mpsc::UnboundedReceiver<BTreeSet<QueryToken>>,
}

impl TestClient {
    pub fn start() -> Self {
        Self::with_options(ClientOptions::default())
    }

    pub fn with_options(options: ClientOptions) -> Self {
        let (socket, handle) = MockSocket::create();
        let (tx, rx) = mpsc::unbounded_channel();
        let on_transition: TransitionCallback = Box::new(move |changed: &BTreeSet<QueryToken>| {
            let _ = tx.send(changed.clone());
        });
        let client =
            SyncClient::with_socket("http://localhost:8187", socket, on_transition, options)
                .expect("client construction");
        TestClient { client, socket: handle, transitions: rx }
    }

    /// Wait for the initial connection to be established.
    pub async fn connected(self) -> Self {
        self.socket
            .wait_until("initial Connect frame", |sent| {
                sent.iter().any(|f| matches!(f, ripple_core::ClientMessage::Connect { .. }))
            })
            .await;
        self
    }

    /// Next change-callback emission, or panic after a grace period.
    pub async fn next_transition(&mut self) -> BTreeSet<QueryToken> {
        tokio::time::timeout(Duration::from_secs(5), self.transitions.recv())
            .await
            .expect("timed out waiting for a change emission")
            .expect("transition channel closed")
    }

    /// Assert that no change emission is pending after the driver settles.
    pub async fn expect_no_transition(&mut self) {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if let Ok(changed) = self.transitions.try_recv() {
            panic!("unexpected change emission: {:?}", changed);
        }
    }
}

pub fn token(name: &str, args: &Value) -> QueryToken {
    QueryToken::new(&UdfPath::parse(name).unwrap(), args)
}

pub fn version(query_set: u32, ts: u64) -> StateVersion {
    StateVersion { query_set, identity: 0, ts: Timestamp(ts) }
}

pub fn query_updated(id: u32, value: Value) -> StateModification {
    StateModification::QueryUpdated {
        query_id: QueryId(id),
        value,
        log_lines: Vec::new(),
        journal: None,
    }
}

pub fn transition(
    start: StateVersion,
    end: StateVersion,
    modifications: Vec<StateModification>,
) -> ServerMessage {
    ServerMessage::transition(start, end, modifications)
}
