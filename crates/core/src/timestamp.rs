// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Logical timestamps and state versions.
//!
//! The server stamps every consistent snapshot with a logical timestamp.
//! Timestamps are opaque to the client apart from their total order: the
//! client only ever compares them and echoes them back.
//!
//! A [`StateVersion`] is the compound version a `Transition` frame moves
//! between. It pairs the timestamp with two client-driven counters:
//! `query_set` (bumped on every `ModifyQuerySet`) and `identity` (bumped on
//! every `Authenticate`).

use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque logical timestamp with a total order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// The earliest possible timestamp.
    pub const MIN: Timestamp = Timestamp(0);

    /// Returns the later of two timestamps.
    pub fn max(self, other: Timestamp) -> Timestamp {
        if other > self {
            other
        } else {
            self
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The compound version a transition moves the query view between.
///
/// Two state versions on one connection are comparable by their `ts` field;
/// the counters only participate in the exact-match gate when a transition
/// is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateVersion {
    /// Number of `ModifyQuerySet` frames the server has folded in.
    pub query_set: u32,
    /// Number of `Authenticate` frames the server has folded in.
    pub identity: u32,
    /// Logical timestamp of the snapshot.
    pub ts: Timestamp,
}

impl StateVersion {
    /// The version a fresh connection starts from.
    pub fn initial() -> Self {
        StateVersion { query_set: 0, identity: 0, ts: Timestamp::MIN }
    }
}

impl fmt::Display for StateVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.query_set, self.identity, self.ts)
    }
}

#[cfg(test)]
#[path = "timestamp_tests.rs"]
mod tests;
