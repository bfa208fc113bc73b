// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Authentication token lifecycle.
//!
//! The fetcher is the caller's capability for producing tokens; this module
//! decides *when* to fetch and what to make of the server's answers. Token
//! rotation itself (pause the transport, splice in the `Authenticate`
//! frame, resume) is driven by the orchestrator, which asks this state
//! machine what to do next.
//!
//! Ladder on a server `AuthError`: refetch once with `force_refresh`; if
//! the fetcher returns the same token (or nothing), the failure is
//! permanent, the observer hears `on_change(false)`, and auth is cleared.

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tracing::{debug, warn};

/// How far ahead of a known expiry the proactive refresh runs.
const REFRESH_LEAD_SECS: i64 = 10;

/// A token produced by the caller's fetcher.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedToken {
    pub token: String,
    /// When the token stops being valid, if the issuer says.
    pub expires_at: Option<DateTime<Utc>>,
}

impl FetchedToken {
    pub fn new(token: impl Into<String>) -> Self {
        FetchedToken { token: token.into(), expires_at: None }
    }

    pub fn expiring(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        FetchedToken { token: token.into(), expires_at: Some(expires_at) }
    }
}

/// Capability for fetching a fresh auth token.
///
/// `force_refresh` asks the issuer to mint a new token even if a cached one
/// has not expired. Returning `None` means no credentials are available.
pub trait AuthTokenFetcher: Send {
    fn fetch(
        &mut self,
        force_refresh: bool,
    ) -> Pin<Box<dyn Future<Output = Option<FetchedToken>> + Send + '_>>;
}

impl<F> AuthTokenFetcher for F
where
    F: FnMut(bool) -> Option<FetchedToken> + Send,
{
    fn fetch(
        &mut self,
        force_refresh: bool,
    ) -> Pin<Box<dyn Future<Output = Option<FetchedToken>> + Send + '_>> {
        let token = self(force_refresh);
        Box::pin(async move { token })
    }
}

/// Observer for authenticated/unauthenticated transitions.
pub type AuthChangeCallback = Box<dyn FnMut(bool) + Send>;

/// What the orchestrator should do after feeding an event in.
#[derive(Debug, PartialEq)]
pub enum AuthDirective {
    /// Nothing to send.
    None,
    /// Rotate to this token: pause, authenticate, resume.
    Rotate(FetchedToken),
    /// Credentials are unusable; clear auth on the connection.
    Clear,
}

/// Tracks the token, its confirmation status, and the retry ladder.
pub struct AuthManager {
    fetcher: Option<Box<dyn AuthTokenFetcher>>,
    on_change: Option<AuthChangeCallback>,
    /// Token most recently handed to the connection.
    current_token: Option<String>,
    token_expiry: Option<DateTime<Utc>>,
    /// A token was presented and no transition has confirmed it yet.
    pending_confirmation: bool,
    /// An `AuthError` already triggered one forced refetch.
    retried: bool,
}

impl AuthManager {
    pub fn new() -> Self {
        AuthManager {
            fetcher: None,
            on_change: None,
            current_token: None,
            token_expiry: None,
            pending_confirmation: false,
            retried: false,
        }
    }

    /// Install the fetcher and observer, then fetch the initial token.
    pub async fn set_fetcher(
        &mut self,
        fetcher: Box<dyn AuthTokenFetcher>,
        on_change: AuthChangeCallback,
    ) -> AuthDirective {
        self.fetcher = Some(fetcher);
        self.on_change = Some(on_change);
        self.retried = false;

        match self.fetch(false).await {
            Some(fetched) => self.accept(fetched),
            None => {
                self.notify(false);
                AuthDirective::Clear
            }
        }
    }

    /// Drop credentials entirely (caller asked, or permanent failure).
    pub fn clear(&mut self) {
        self.fetcher = None;
        self.on_change = None;
        self.current_token = None;
        self.token_expiry = None;
        self.pending_confirmation = false;
        self.retried = false;
    }

    /// The server rejected our credentials.
    pub async fn on_auth_error(&mut self, error: &str) -> AuthDirective {
        if self.fetcher.is_none() {
            return AuthDirective::None;
        }
        warn!(error, "server rejected credentials");

        if self.retried {
            return self.permanent_failure();
        }
        self.retried = true;

        match self.fetch(true).await {
            Some(fetched) if Some(&fetched.token) != self.current_token.as_ref() => {
                self.accept(fetched)
            }
            // Same token again (or nothing): refreshing cannot help.
            _ => self.permanent_failure(),
        }
    }

    /// A transition arrived; any pending token is now confirmed.
    pub fn on_transition(&mut self) {
        if self.pending_confirmation {
            self.pending_confirmation = false;
            self.retried = false;
            debug!("credentials confirmed by transition");
            self.notify(true);
        }
    }

    /// A reconnect re-presents the current token; confirmation starts over.
    pub fn on_reconnect(&mut self) {
        if self.current_token.is_some() {
            self.pending_confirmation = true;
        }
    }

    /// When the proactive refresh should run, if an expiry is known.
    pub fn next_refresh_at(&self) -> Option<DateTime<Utc>> {
        let expiry = self.token_expiry?;
        Some(expiry - ChronoDuration::seconds(REFRESH_LEAD_SECS))
    }

    /// Proactive refresh ahead of expiry.
    pub async fn refresh(&mut self) -> AuthDirective {
        if self.fetcher.is_none() {
            return AuthDirective::None;
        }
        match self.fetch(true).await {
            Some(fetched) => self.accept(fetched),
            None => {
                self.notify(false);
                self.clear();
                AuthDirective::Clear
            }
        }
    }

    /// True if a token has been presented and confirmed.
    pub fn is_authenticated(&self) -> bool {
        self.current_token.is_some() && !self.pending_confirmation
    }

    fn accept(&mut self, fetched: FetchedToken) -> AuthDirective {
        self.current_token = Some(fetched.token.clone());
        self.token_expiry = fetched.expires_at;
        self.pending_confirmation = true;
        AuthDirective::Rotate(fetched)
    }

    fn permanent_failure(&mut self) -> AuthDirective {
        self.notify(false);
        self.clear();
        AuthDirective::Clear
    }

    async fn fetch(&mut self, force_refresh: bool) -> Option<FetchedToken> {
        let fetcher = self.fetcher.as_mut()?;
        fetcher.fetch(force_refresh).await
    }

    fn notify(&mut self, authenticated: bool) {
        if let Some(on_change) = self.on_change.as_mut() {
            on_change(authenticated);
        }
    }
}

impl Default for AuthManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
