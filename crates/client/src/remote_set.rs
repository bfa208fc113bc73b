// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Authoritative query results, as dictated by server transitions.
//!
//! One instance lives per logical connection: the version starts at zero on
//! connect and only ever advances. A transition whose start version does
//! not match what we hold means the server and client disagree about
//! history, which is unrecoverable for the connection.

use std::collections::BTreeMap;

use ripple_core::{
    FunctionResult, QueryId, ServerMessage, StateModification, StateVersion, Timestamp,
};
use tracing::debug;

use crate::error::{ClientError, Result};

/// Map from query id to latest result, at a logical timestamp.
pub struct RemoteQuerySet {
    version: StateVersion,
    results: BTreeMap<QueryId, FunctionResult>,
}

impl RemoteQuerySet {
    pub fn new() -> Self {
        RemoteQuerySet { version: StateVersion::initial(), results: BTreeMap::new() }
    }

    /// Current version; `version().ts` is the set timestamp.
    pub fn version(&self) -> StateVersion {
        self.version
    }

    /// Timestamp of the snapshot currently held.
    pub fn timestamp(&self) -> Timestamp {
        self.version.ts
    }

    /// Latest results by query id, including entries for queries that have
    /// already been released locally; the overlay filters those out.
    pub fn results(&self) -> &BTreeMap<QueryId, FunctionResult> {
        &self.results
    }

    /// Apply a transition.
    ///
    /// Errors with a protocol violation if the transition does not start at
    /// the version we hold.
    pub fn apply(&mut self, msg: &ServerMessage) -> Result<()> {
        let ServerMessage::Transition { start_version, end_version, modifications } = msg else {
            return Err(ClientError::Protocol(format!(
                "expected a transition frame, got {:?}",
                msg
            )));
        };

        if *start_version != self.version {
            return Err(ClientError::Protocol(format!(
                "transition starts at {} but client holds {}",
                start_version, self.version
            )));
        }

        for modification in modifications {
            match modification {
                StateModification::QueryUpdated { query_id, value, .. } => {
                    self.results.insert(*query_id, FunctionResult::Success(value.clone()));
                }
                StateModification::QueryFailed { query_id, error_message, .. } => {
                    self.results
                        .insert(*query_id, FunctionResult::Failure(error_message.clone()));
                }
                StateModification::QueryRemoved { query_id } => {
                    self.results.remove(query_id);
                }
            }
        }

        debug!(from = %self.version, to = %end_version, "applied transition");
        self.version = *end_version;
        Ok(())
    }
}

impl Default for RemoteQuerySet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "remote_set_tests.rs"]
mod tests;
