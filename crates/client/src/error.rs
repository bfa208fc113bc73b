// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the sync client.
//!
//! Recovery policy: transport and auth errors are handled inside the client
//! and only show up through `connection_state()`. Everything below surfaces
//! to callers through an operation's result or the auth change callback.

use thiserror::Error;

/// All possible errors a sync client operation can return.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ClientError {
    /// The deployment address could not be turned into a sync endpoint.
    #[error("invalid deployment address: {0}\n  hint: expected http(s)://host[:port]")]
    InvalidUrl(String),

    /// The client was constructed or called incorrectly.
    #[error("client misuse: {0}")]
    Misuse(String),

    /// The server sent a malformed or out-of-order frame. Fatal: the
    /// connection is torn down and every subsequent call fails.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server reported an unrecoverable failure.
    #[error("fatal server error: {0}")]
    FatalServer(String),

    /// Credentials were rejected and a refresh did not help.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The mutation or action ran and returned an error.
    #[error("{message}")]
    Application { message: String },

    /// The connection dropped with this request outstanding and the request
    /// is not safe to replay. The operation may or may not have run.
    #[error("connection lost while request was in flight")]
    ConnectionLost,

    /// The client was closed while the request was pending.
    #[error("client closed")]
    Closed,
}

/// A specialized Result type for sync client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
