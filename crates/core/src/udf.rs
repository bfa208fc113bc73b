// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Udf paths and canonical query tokens.
//!
//! A udf path names a server function as `module:function`, where the
//! module part may contain `/` separators (`dir/module:function`). The
//! `:default` export is canonically elided, so `posts:default` and `posts`
//! name the same function and produce the same query token.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};
use crate::value::Value;

/// A validated path to a server function.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UdfPath(String);

impl UdfPath {
    /// Parses and canonicalizes a udf path.
    ///
    /// Accepts `module`, `module:function`, and `dir/module:function`.
    /// Rejects empty components and more than one `:` separator.
    pub fn parse(raw: &str) -> Result<Self> {
        let (module, function) = match raw.split_once(':') {
            Some((m, f)) => (m, f),
            None => (raw, "default"),
        };

        if module.is_empty() || function.is_empty() || function.contains(':') {
            return Err(Error::InvalidUdfPath(raw.to_string()));
        }
        if module.split('/').any(|part| part.is_empty()) {
            return Err(Error::InvalidUdfPath(raw.to_string()));
        }

        let canonical = if function == "default" {
            module.to_string()
        } else {
            format!("{}:{}", module, function)
        };
        Ok(UdfPath(canonical))
    }

    /// Returns the canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UdfPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Canonical string identity of a (udf path, args) pair.
///
/// Stable across subscribes: two subscriptions to the same function with
/// structurally equal arguments intern to the same token. Serialization of
/// the args goes through `serde_json`, which orders object keys, so the
/// token is canonical without extra normalization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryToken(String);

impl QueryToken {
    /// Builds the token for a path and argument value.
    pub fn new(path: &UdfPath, args: &Value) -> Self {
        // serde_json serialization of a Value cannot fail.
        let args_json = serde_json::to_string(args).unwrap_or_default();
        QueryToken(format!("{}|{}", path.as_str(), args_json))
    }

    /// Returns the token's string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
#[path = "udf_tests.rs"]
mod tests;
