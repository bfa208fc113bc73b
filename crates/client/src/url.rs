// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Deployment address to sync endpoint derivation.
//!
//! The caller hands us an absolute `http://` or `https://` address; the
//! WebSocket endpoint is the same host with the scheme swapped to `ws`/`wss`
//! and `/api/<version>/sync` appended to whatever base path the address
//! carries, so deployments mounted behind a path-prefixing proxy keep
//! working.

use crate::error::{ClientError, Result};

/// Protocol version baked into the sync path.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Derives the WebSocket sync URL from a deployment address.
pub fn sync_url(address: &str) -> Result<String> {
    let (scheme, rest) = address
        .split_once("://")
        .ok_or_else(|| ClientError::InvalidUrl(address.to_string()))?;

    let ws_scheme = match scheme {
        "http" => "ws",
        "https" => "wss",
        _ => return Err(ClientError::InvalidUrl(address.to_string())),
    };

    let rest = rest.trim_end_matches('/');
    if rest.is_empty() {
        return Err(ClientError::InvalidUrl(address.to_string()));
    }
    let host = rest.split('/').next().unwrap_or_default();
    if host.is_empty() || !host_is_plausible(host) {
        return Err(ClientError::InvalidUrl(address.to_string()));
    }

    Ok(format!("{}://{}/api/{}/sync", ws_scheme, rest, PROTOCOL_VERSION))
}

/// Rejects hosts that cannot possibly resolve (empty label or port).
fn host_is_plausible(host: &str) -> bool {
    let (name, port) = match host.rsplit_once(':') {
        Some((n, p)) => (n, Some(p)),
        None => (host, None),
    };
    if name.is_empty() {
        return false;
    }
    match port {
        Some(p) => p.parse::<u16>().is_ok(),
        None => true,
    }
}

#[cfg(test)]
#[path = "url_tests.rs"]
mod tests;
