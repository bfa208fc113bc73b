// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket protocol frames for client-server communication.
//!
//! One connection multiplexes three concerns:
//! - the query subscription set, updated via `ModifyQuerySet` and answered
//!   with `Transition` snapshots,
//! - mutations and actions, answered with per-request responses,
//! - authentication, carried by `Authenticate` and `AuthError`.
//!
//! Frames are JSON objects tagged by a `type` field.

use serde::{Deserialize, Serialize};

use crate::timestamp::{StateVersion, Timestamp};
use crate::udf::UdfPath;
use crate::value::{QueryId, RequestId, Value};

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// First frame on every (re)connection.
    Connect {
        /// Session identifier, invariant for the client's lifetime.
        session_id: String,
        /// How many times this session has connected (1 on first connect).
        connection_count: u32,
        /// Close reason of the previous connection, or "InitialConnect".
        last_close_reason: String,
        /// Highest snapshot timestamp this session has observed, if any.
        ///
        /// Lets the server skip snapshots the client has already seen.
        #[serde(skip_serializing_if = "Option::is_none", default)]
        max_observed_timestamp: Option<Timestamp>,
    },

    /// Change the set of subscribed queries.
    ModifyQuerySet {
        /// Query-set version the change applies on top of.
        base_version: u32,
        /// Query-set version after the change.
        new_version: u32,
        /// Additions and removals, applied in order.
        modifications: Vec<QuerySetModification>,
    },

    /// Run a state-changing function.
    Mutation {
        request_id: RequestId,
        udf_path: UdfPath,
        args: Value,
    },

    /// Run a side-effecting function whose result is independent of the
    /// query view.
    Action {
        request_id: RequestId,
        udf_path: UdfPath,
        args: Value,
    },

    /// Present (or clear) credentials for this connection.
    Authenticate {
        /// Identity version the change applies on top of.
        base_version: u32,
        #[serde(flatten)]
        token: AuthToken,
    },

    /// Best-effort client telemetry.
    Event {
        session_id: String,
        event_type: String,
        event: Value,
    },
}

/// A single change to the query subscription set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum QuerySetModification {
    /// Subscribe to a query.
    Add {
        query_id: QueryId,
        udf_path: UdfPath,
        args: Value,
        /// Journal from a previous subscription to resume from.
        #[serde(skip_serializing_if = "Option::is_none", default)]
        journal: Option<String>,
    },
    /// Unsubscribe from a query.
    Remove { query_id: QueryId },
}

/// Credentials presented with an `Authenticate` frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "tokenType")]
pub enum AuthToken {
    /// No credentials; the connection is anonymous.
    None,
    /// An end-user token.
    User { value: String },
    /// A deployment-admin token, optionally impersonating a user identity.
    Admin {
        value: String,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        impersonating: Option<Value>,
    },
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Authoritative delta moving the query view between two versions.
    Transition {
        start_version: StateVersion,
        end_version: StateVersion,
        modifications: Vec<StateModification>,
    },

    /// Outcome of a mutation.
    ///
    /// On success, `ts` is the snapshot timestamp at which the mutation's
    /// effects are visible; the client holds the caller until the query
    /// view reaches it.
    MutationResponse {
        request_id: RequestId,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        result: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        error_message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        ts: Option<Timestamp>,
        #[serde(default)]
        log_lines: Vec<String>,
    },

    /// Outcome of an action.
    ActionResponse {
        request_id: RequestId,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        result: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        error_message: Option<String>,
        #[serde(default)]
        log_lines: Vec<String>,
    },

    /// The server rejected the connection's credentials.
    AuthError {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        base_version: Option<u32>,
        /// True if the error was raised while processing an `Authenticate`
        /// frame (as opposed to expiry of previously accepted credentials).
        #[serde(default)]
        auth_update_attempted: bool,
    },

    /// Unrecoverable server-side failure; the client must stop.
    FatalError { error: String },

    /// Connection liveness probe; carries no state.
    Ping,
}

/// A single change within a `Transition` frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum StateModification {
    /// The query has a new result.
    QueryUpdated {
        query_id: QueryId,
        value: Value,
        #[serde(default)]
        log_lines: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        journal: Option<String>,
    },
    /// The query failed to evaluate.
    QueryFailed {
        query_id: QueryId,
        error_message: String,
        #[serde(default)]
        log_lines: Vec<String>,
    },
    /// The query left the subscription set.
    QueryRemoved { query_id: QueryId },
}

impl ClientMessage {
    /// Creates a Connect frame.
    pub fn connect(
        session_id: impl Into<String>,
        connection_count: u32,
        last_close_reason: impl Into<String>,
        max_observed_timestamp: Option<Timestamp>,
    ) -> Self {
        ClientMessage::Connect {
            session_id: session_id.into(),
            connection_count,
            last_close_reason: last_close_reason.into(),
            max_observed_timestamp,
        }
    }

    /// Creates a Mutation frame.
    pub fn mutation(request_id: RequestId, udf_path: UdfPath, args: Value) -> Self {
        ClientMessage::Mutation { request_id, udf_path, args }
    }

    /// Creates an Action frame.
    pub fn action(request_id: RequestId, udf_path: UdfPath, args: Value) -> Self {
        ClientMessage::Action { request_id, udf_path, args }
    }

    /// Creates an Authenticate frame.
    pub fn authenticate(base_version: u32, token: AuthToken) -> Self {
        ClientMessage::Authenticate { base_version, token }
    }

    /// Serializes the message to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes the message from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Creates a Transition frame.
    pub fn transition(
        start_version: StateVersion,
        end_version: StateVersion,
        modifications: Vec<StateModification>,
    ) -> Self {
        ServerMessage::Transition { start_version, end_version, modifications }
    }

    /// Creates a successful MutationResponse.
    pub fn mutation_success(request_id: RequestId, result: Value, ts: Timestamp) -> Self {
        ServerMessage::MutationResponse {
            request_id,
            success: true,
            result: Some(result),
            error_message: None,
            ts: Some(ts),
            log_lines: Vec::new(),
        }
    }

    /// Creates a failed MutationResponse.
    pub fn mutation_failure(request_id: RequestId, error_message: impl Into<String>) -> Self {
        ServerMessage::MutationResponse {
            request_id,
            success: false,
            result: None,
            error_message: Some(error_message.into()),
            ts: None,
            log_lines: Vec::new(),
        }
    }

    /// Creates a successful ActionResponse.
    pub fn action_success(request_id: RequestId, result: Value) -> Self {
        ServerMessage::ActionResponse {
            request_id,
            success: true,
            result: Some(result),
            error_message: None,
            log_lines: Vec::new(),
        }
    }

    /// Creates a failed ActionResponse.
    pub fn action_failure(request_id: RequestId, error_message: impl Into<String>) -> Self {
        ServerMessage::ActionResponse {
            request_id,
            success: false,
            result: None,
            error_message: Some(error_message.into()),
            log_lines: Vec::new(),
        }
    }

    /// Serializes the message to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes the message from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
