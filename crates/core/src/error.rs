// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for ripple-core operations.

use thiserror::Error;

/// All possible errors that can occur when working with protocol data.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid udf path: '{0}'\n  hint: expected 'module:function' or 'dir/module:function'")]
    InvalidUdfPath(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for ripple-core operations.
pub type Result<T> = std::result::Result<T, Error>;
