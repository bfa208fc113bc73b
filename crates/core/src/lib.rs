// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! ripple-core: Shared protocol types for the ripple reactive sync client
//!
//! This crate provides the wire protocol frames, logical timestamps, and
//! function identity types used by the sync client. It is intentionally
//! transport-agnostic: everything here is plain data plus serde.

pub mod error;
pub mod protocol;
pub mod timestamp;
pub mod udf;
pub mod value;

pub use error::{Error, Result};
pub use protocol::{
    AuthToken, ClientMessage, QuerySetModification, ServerMessage, StateModification,
};
pub use timestamp::{StateVersion, Timestamp};
pub use udf::{QueryToken, UdfPath};
pub use value::{FunctionResult, QueryId, RequestId, Value};
