// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Function results and protocol identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// JSON value type used for udf arguments and results.
pub type Value = serde_json::Value;

/// Numeric handle assigned to an active query subscription.
///
/// Query ids are injective for the lifetime of a session: once a
/// subscription is fully released its id is retired, and a resubscribe to
/// the same query allocates a fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryId(pub u32);

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonically increasing identifier for each mutation or action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u32);

impl RequestId {
    /// Returns the next request id in sequence.
    pub fn next(self) -> RequestId {
        RequestId(self.0 + 1)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The outcome of a server-evaluated function.
///
/// Stored per query in the authoritative view and returned from mutations
/// and actions. Structural equality on the success value is what drives
/// change detection in the optimistic overlay.
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionResult {
    /// The function returned a value.
    Success(Value),
    /// The function failed with an error message.
    Failure(String),
}

impl FunctionResult {
    /// Returns the success value, if any.
    pub fn value(&self) -> Option<&Value> {
        match self {
            FunctionResult::Success(v) => Some(v),
            FunctionResult::Failure(_) => None,
        }
    }

    /// Returns the error message, if any.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            FunctionResult::Success(_) => None,
            FunctionResult::Failure(msg) => Some(msg),
        }
    }

    /// Returns true if this is a success result.
    pub fn is_success(&self) -> bool {
        matches!(self, FunctionResult::Success(_))
    }
}

#[cfg(test)]
#[path = "value_tests.rs"]
mod tests;
