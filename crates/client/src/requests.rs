// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! In-flight request tracking.
//!
//! Every mutation and action gets a request record keyed by a monotonically
//! increasing id. Actions resolve as soon as their response arrives.
//! Successful mutations are held until the remote query set has observed
//! the mutation's timestamp, so a caller never sees its mutation resolve
//! before the query view reflects it.
//!
//! After a reconnect, unresolved mutations are replayed (the server
//! deduplicates by request id and session id); actions that may have been
//! sent are failed with a transient error instead, since replaying a
//! non-idempotent action could run its side effects twice.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ripple_core::{ClientMessage, RequestId, ServerMessage, Timestamp, UdfPath, Value};
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::ClientError;

/// What kind of function a request invokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Mutation,
    Action,
}

/// Channel half used to resolve a caller's pending request.
pub type RequestSender = oneshot::Sender<Result<Value, ClientError>>;

/// A request that is ready to resolve.
///
/// The orchestrator fires the change callback for the relevant transition
/// before sending these, so callers observe their mutation's effects first.
pub struct CompletedRequest {
    pub request_id: RequestId,
    pub kind: RequestKind,
    pub sender: RequestSender,
    pub result: Result<Value, ClientError>,
}

struct RequestRecord {
    kind: RequestKind,
    udf_path: UdfPath,
    args: Value,
    submitted_at: DateTime<Utc>,
    /// False only if the send call refused because the socket was not open.
    might_be_sent: bool,
    sender: RequestSender,
    /// For successful mutations: the timestamp to hold for, and the result
    /// to release once the query view reaches it.
    held: Option<(Timestamp, Value)>,
}

/// Tracks every request between submission and completion.
pub struct RequestManager {
    next_request_id: RequestId,
    inflight: BTreeMap<RequestId, RequestRecord>,
}

impl RequestManager {
    pub fn new() -> Self {
        RequestManager { next_request_id: RequestId(0), inflight: BTreeMap::new() }
    }

    /// Allocate the next request id.
    pub fn allocate_id(&mut self) -> RequestId {
        let id = self.next_request_id;
        self.next_request_id = id.next();
        id
    }

    /// Register a submitted request.
    pub fn register(
        &mut self,
        request_id: RequestId,
        kind: RequestKind,
        udf_path: UdfPath,
        args: Value,
        might_be_sent: bool,
        sender: RequestSender,
    ) {
        let record = RequestRecord {
            kind,
            udf_path,
            args,
            submitted_at: Utc::now(),
            might_be_sent,
            sender,
            held: None,
        };
        self.inflight.insert(request_id, record);
    }

    /// Process a mutation or action response.
    ///
    /// Returns the request ready to resolve, or `None` when the response
    /// put a successful mutation on hold (or referenced an unknown id).
    /// `current_ts` is the query view's current timestamp: a mutation whose
    /// effects are already visible resolves immediately.
    pub fn on_response(
        &mut self,
        msg: &ServerMessage,
        current_ts: Timestamp,
    ) -> Option<CompletedRequest> {
        match msg {
            ServerMessage::MutationResponse {
                request_id,
                success,
                result,
                error_message,
                ts,
                ..
            } => {
                if !self.inflight.contains_key(request_id) {
                    debug!(request_id = %request_id, "response for unknown request, ignoring");
                    return None;
                }
                if !*success {
                    let record = self.remove(*request_id)?;
                    let message = error_message.clone().unwrap_or_else(|| "mutation failed".into());
                    return Some(CompletedRequest {
                        request_id: *request_id,
                        kind: record.kind,
                        sender: record.sender,
                        result: Err(ClientError::Application { message }),
                    });
                }

                let value = result.clone().unwrap_or(Value::Null);
                let ts = ts.unwrap_or(Timestamp::MIN);
                if ts <= current_ts {
                    let record = self.remove(*request_id)?;
                    return Some(CompletedRequest {
                        request_id: *request_id,
                        kind: record.kind,
                        sender: record.sender,
                        result: Ok(value),
                    });
                }

                // Hold until the query view catches up to ts.
                if let Some(record) = self.inflight.get_mut(request_id) {
                    record.held = Some((ts, value));
                }
                None
            }
            ServerMessage::ActionResponse { request_id, success, result, error_message, .. } => {
                if !self.inflight.contains_key(request_id) {
                    debug!(request_id = %request_id, "response for unknown request, ignoring");
                    return None;
                }
                let record = self.remove(*request_id)?;
                let result = if *success {
                    Ok(result.clone().unwrap_or(Value::Null))
                } else {
                    let message = error_message.clone().unwrap_or_else(|| "action failed".into());
                    Err(ClientError::Application { message })
                };
                Some(CompletedRequest {
                    request_id: *request_id,
                    kind: record.kind,
                    sender: record.sender,
                    result,
                })
            }
            _ => None,
        }
    }

    /// Drain held mutations whose response timestamp has been observed.
    pub fn remove_completed(&mut self, current_ts: Timestamp) -> Vec<CompletedRequest> {
        let ready: Vec<RequestId> = self
            .inflight
            .iter()
            .filter(|(_, record)| {
                record.held.as_ref().is_some_and(|held| held.0 <= current_ts)
            })
            .map(|(id, _)| *id)
            .collect();

        ready
            .into_iter()
            .filter_map(|request_id| {
                let record = self.remove(request_id)?;
                let (_, value) = record.held.unwrap_or((Timestamp::MIN, Value::Null));
                Some(CompletedRequest {
                    request_id,
                    kind: record.kind,
                    sender: record.sender,
                    result: Ok(value),
                })
            })
            .collect()
    }

    /// Prepare for a fresh connection.
    ///
    /// Returns the frames to replay (unresolved mutations, plus actions the
    /// server can never have seen) and the requests to fail because their
    /// outcome is unknowable (actions that may have been sent).
    pub fn restart(&mut self) -> (Vec<ClientMessage>, Vec<CompletedRequest>) {
        let mut replay = Vec::new();
        let mut dropped = Vec::new();

        let ids: Vec<RequestId> = self.inflight.keys().copied().collect();
        for request_id in ids {
            let record = match self.inflight.get_mut(&request_id) {
                Some(r) => r,
                None => continue,
            };
            match record.kind {
                RequestKind::Mutation => {
                    // Held mutations keep waiting for their timestamp; the
                    // rest are resent under the same request id.
                    if record.held.is_none() {
                        record.might_be_sent = true;
                        replay.push(ClientMessage::mutation(
                            request_id,
                            record.udf_path.clone(),
                            record.args.clone(),
                        ));
                    }
                }
                RequestKind::Action => {
                    if record.might_be_sent {
                        if let Some(record) = self.remove(request_id) {
                            dropped.push(CompletedRequest {
                                request_id,
                                kind: RequestKind::Action,
                                sender: record.sender,
                                result: Err(ClientError::ConnectionLost),
                            });
                        }
                    } else {
                        record.might_be_sent = true;
                        replay.push(ClientMessage::action(
                            request_id,
                            record.udf_path.clone(),
                            record.args.clone(),
                        ));
                    }
                }
            }
        }

        (replay, dropped)
    }

    /// Fail every outstanding request with the given error.
    pub fn fail_all(&mut self, error: ClientError) -> Vec<CompletedRequest> {
        let ids: Vec<RequestId> = self.inflight.keys().copied().collect();
        ids.into_iter()
            .filter_map(|request_id| {
                let record = self.remove(request_id)?;
                Some(CompletedRequest {
                    request_id,
                    kind: record.kind,
                    sender: record.sender,
                    result: Err(error.clone()),
                })
            })
            .collect()
    }

    /// True if any request is outstanding, including held mutations.
    pub fn has_inflight_requests(&self) -> bool {
        !self.inflight.is_empty()
    }

    /// True if any request has not yet received a response.
    pub fn has_incomplete_requests(&self) -> bool {
        self.inflight.values().any(|record| record.held.is_none())
    }

    /// Submission time of the oldest outstanding request.
    pub fn time_of_oldest_inflight_request(&self) -> Option<DateTime<Utc>> {
        self.inflight.values().map(|record| record.submitted_at).min()
    }

    fn remove(&mut self, request_id: RequestId) -> Option<RequestRecord> {
        self.inflight.remove(&request_id)
    }
}

impl Default for RequestManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "requests_tests.rs"]
mod tests;
