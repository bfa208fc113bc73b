// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Tests for the auth token lifecycle.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use super::*;

/// Fetcher returning tokens from a fixed script, counting calls.
fn scripted_fetcher(
    tokens: Vec<Option<&str>>,
) -> (Box<dyn AuthTokenFetcher>, Arc<AtomicU32>) {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let tokens: Vec<Option<String>> =
        tokens.into_iter().map(|t| t.map(|s| s.to_string())).collect();
    let fetcher = move |_force: bool| {
        let call = counter.fetch_add(1, Ordering::SeqCst) as usize;
        tokens
            .get(call.min(tokens.len().saturating_sub(1)))
            .cloned()
            .flatten()
            .map(FetchedToken::new)
    };
    (Box::new(fetcher), calls)
}

fn change_log() -> (AuthChangeCallback, Arc<std::sync::Mutex<Vec<bool>>>) {
    let log = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    (Box::new(move |authed| sink.lock().unwrap().push(authed)), log)
}

#[tokio::test]
async fn initial_fetch_rotates_to_the_token() {
    let mut auth = AuthManager::new();
    let (fetcher, _) = scripted_fetcher(vec![Some("t1")]);
    let (on_change, log) = change_log();

    let directive = auth.set_fetcher(fetcher, on_change).await;
    assert_eq!(directive, AuthDirective::Rotate(FetchedToken::new("t1")));
    assert!(!auth.is_authenticated(), "unconfirmed until a transition");
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn transition_confirms_pending_token() {
    let mut auth = AuthManager::new();
    let (fetcher, _) = scripted_fetcher(vec![Some("t1")]);
    let (on_change, log) = change_log();
    let _ = auth.set_fetcher(fetcher, on_change).await;

    auth.on_transition();
    assert!(auth.is_authenticated());
    assert_eq!(*log.lock().unwrap(), vec![true]);

    // Further transitions do not re-notify.
    auth.on_transition();
    assert_eq!(*log.lock().unwrap(), vec![true]);
}

#[tokio::test]
async fn fetcher_without_token_reports_unauthenticated() {
    let mut auth = AuthManager::new();
    let (fetcher, _) = scripted_fetcher(vec![None]);
    let (on_change, log) = change_log();

    let directive = auth.set_fetcher(fetcher, on_change).await;
    assert_eq!(directive, AuthDirective::Clear);
    assert_eq!(*log.lock().unwrap(), vec![false]);
}

#[tokio::test]
async fn auth_error_triggers_one_forced_refetch() {
    let mut auth = AuthManager::new();
    let (fetcher, calls) = scripted_fetcher(vec![Some("t1"), Some("t2")]);
    let (on_change, log) = change_log();
    let _ = auth.set_fetcher(fetcher, on_change).await;
    auth.on_transition();

    let directive = auth.on_auth_error("expired").await;
    assert_eq!(directive, AuthDirective::Rotate(FetchedToken::new("t2")));
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // The fresh token confirms like any other.
    auth.on_transition();
    assert_eq!(*log.lock().unwrap(), vec![true, true]);
}

#[tokio::test]
async fn second_auth_error_without_new_token_is_permanent() {
    let mut auth = AuthManager::new();
    // The fetcher keeps returning the same token.
    let (fetcher, _) = scripted_fetcher(vec![Some("t1"), Some("t1")]);
    let (on_change, log) = change_log();
    let _ = auth.set_fetcher(fetcher, on_change).await;
    auth.on_transition();

    let directive = auth.on_auth_error("expired").await;
    assert_eq!(directive, AuthDirective::Clear);
    assert_eq!(*log.lock().unwrap(), vec![true, false]);
    assert!(!auth.is_authenticated());
}

#[tokio::test]
async fn repeated_auth_errors_exhaust_the_ladder() {
    let mut auth = AuthManager::new();
    let (fetcher, _) = scripted_fetcher(vec![Some("t1"), Some("t2"), Some("t3")]);
    let (on_change, log) = change_log();
    let _ = auth.set_fetcher(fetcher, on_change).await;
    auth.on_transition();

    // First error: refetch helps.
    assert!(matches!(
        auth.on_auth_error("bad").await,
        AuthDirective::Rotate(_)
    ));
    // Second error before any confirming transition: permanent.
    assert_eq!(auth.on_auth_error("bad again").await, AuthDirective::Clear);
    assert_eq!(*log.lock().unwrap(), vec![true, false]);
}

#[tokio::test]
async fn confirmation_resets_the_retry_ladder() {
    let mut auth = AuthManager::new();
    let (fetcher, _) = scripted_fetcher(vec![Some("t1"), Some("t2"), Some("t3")]);
    let (on_change, log) = change_log();
    let _ = auth.set_fetcher(fetcher, on_change).await;
    auth.on_transition();

    assert!(matches!(auth.on_auth_error("a").await, AuthDirective::Rotate(_)));
    auth.on_transition();

    // The ladder reset, so another error gets another refetch.
    assert!(matches!(auth.on_auth_error("b").await, AuthDirective::Rotate(_)));
    assert_eq!(*log.lock().unwrap(), vec![true, true]);
}

#[tokio::test]
async fn refresh_schedule_leads_expiry() {
    let mut auth = AuthManager::new();
    assert!(auth.next_refresh_at().is_none());

    let expires_at = Utc::now() + ChronoDuration::seconds(3600);
    let expiring = FetchedToken::expiring("t1", expires_at);
    let token = expiring.clone();
    let fetcher = move |_force: bool| Some(token.clone());
    let (on_change, _) = change_log();
    let _ = auth.set_fetcher(Box::new(fetcher), on_change).await;

    let refresh_at = auth.next_refresh_at().unwrap();
    assert!(refresh_at < expires_at);
    assert_eq!(expires_at - refresh_at, ChronoDuration::seconds(10));
}

#[tokio::test]
async fn reconnect_restarts_confirmation() {
    let mut auth = AuthManager::new();
    let (fetcher, _) = scripted_fetcher(vec![Some("t1")]);
    let (on_change, log) = change_log();
    let _ = auth.set_fetcher(fetcher, on_change).await;
    auth.on_transition();
    assert!(auth.is_authenticated());

    auth.on_reconnect();
    assert!(!auth.is_authenticated());
    auth.on_transition();
    assert_eq!(*log.lock().unwrap(), vec![true, true]);
}
