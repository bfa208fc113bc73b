// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Tests for sync endpoint derivation.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use super::*;
use yare::parameterized;

#[parameterized(
    plain_http = { "http://localhost", "ws://localhost/api/1.0/sync" },
    http_with_port = { "http://localhost:8080", "ws://localhost:8080/api/1.0/sync" },
    https = { "https://happy-otter-123.ripple.cloud", "wss://happy-otter-123.ripple.cloud/api/1.0/sync" },
    trailing_slash = { "https://example.com/", "wss://example.com/api/1.0/sync" },
    proxy_base_path = { "https://example.com/backend", "wss://example.com/backend/api/1.0/sync" },
    proxy_base_path_slash = { "https://example.com/backend/", "wss://example.com/backend/api/1.0/sync" },
)]
fn derives_ws_endpoint(address: &str, expected: &str) {
    assert_eq!(sync_url(address).unwrap(), expected);
}

#[parameterized(
    no_scheme = { "localhost:8080" },
    ws_scheme = { "ws://localhost" },
    ftp_scheme = { "ftp://example.com" },
    empty_host = { "http://" },
    only_slash = { "http:///" },
    bad_port = { "http://localhost:port" },
)]
fn rejects_invalid_addresses(address: &str) {
    match sync_url(address) {
        Err(ClientError::InvalidUrl(raw)) => assert_eq!(raw, address),
        other => panic!("expected InvalidUrl, got {:?}", other),
    }
}
