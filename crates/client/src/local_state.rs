// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Local subscription state.
//!
//! Tracks which queries this client is subscribed to, their reference
//! counts, assigned query ids, and remembered journals, plus the current
//! auth record. This is the client's source of truth for what the server
//! should be evaluating; after a reconnect `restart()` replays all of it.

use std::collections::{BTreeMap, HashMap};

use ripple_core::{
    AuthToken, ClientMessage, QueryId, QueryToken, QuerySetModification, ServerMessage,
    StateModification, UdfPath, Value,
};
use tracing::debug;

/// One subscribed query.
#[derive(Debug, Clone)]
struct LocalQuery {
    id: QueryId,
    udf_path: UdfPath,
    args: Value,
    /// Active subscribers sharing this token.
    num_subscribers: u32,
    /// Server-issued continuation, passed back on resubscribe.
    journal: Option<String>,
}

/// The subscription table plus the auth record.
pub struct LocalSyncState {
    next_query_id: u32,
    query_set_version: u32,
    query_set: BTreeMap<QueryToken, LocalQuery>,
    query_id_to_token: HashMap<QueryId, QueryToken>,
    auth: Option<AuthToken>,
    identity_version: u32,
}

impl LocalSyncState {
    pub fn new() -> Self {
        LocalSyncState {
            next_query_id: 0,
            query_set_version: 0,
            query_set: BTreeMap::new(),
            query_id_to_token: HashMap::new(),
            auth: None,
            identity_version: 0,
        }
    }

    /// Subscribe to a query.
    ///
    /// Returns the interned token and, if this subscription changed the
    /// membership of the query set, the frame describing the addition.
    /// Query ids are never reused: a fully released token that is
    /// resubscribed gets a fresh id.
    pub fn subscribe(
        &mut self,
        udf_path: UdfPath,
        args: Value,
        journal: Option<String>,
    ) -> (QueryToken, Option<ClientMessage>) {
        let token = QueryToken::new(&udf_path, &args);

        if let Some(existing) = self.query_set.get_mut(&token) {
            existing.num_subscribers += 1;
            return (token, None);
        }

        let id = QueryId(self.next_query_id);
        self.next_query_id += 1;

        let query = LocalQuery {
            id,
            udf_path: udf_path.clone(),
            args: args.clone(),
            num_subscribers: 1,
            journal: journal.clone(),
        };
        self.query_set.insert(token.clone(), query);
        self.query_id_to_token.insert(id, token.clone());

        let base_version = self.query_set_version;
        self.query_set_version += 1;
        let frame = ClientMessage::ModifyQuerySet {
            base_version,
            new_version: self.query_set_version,
            modifications: vec![QuerySetModification::Add {
                query_id: id,
                udf_path,
                args,
                journal,
            }],
        };
        (token, Some(frame))
    }

    /// Release one subscriber of a token.
    ///
    /// Returns a removal frame iff the reference count reached zero.
    pub fn unsubscribe(&mut self, token: &QueryToken) -> Option<ClientMessage> {
        let query = self.query_set.get_mut(token)?;
        query.num_subscribers -= 1;
        if query.num_subscribers > 0 {
            return None;
        }

        let id = query.id;
        self.query_set.remove(token);
        self.query_id_to_token.remove(&id);

        let base_version = self.query_set_version;
        self.query_set_version += 1;
        Some(ClientMessage::ModifyQuerySet {
            base_version,
            new_version: self.query_set_version,
            modifications: vec![QuerySetModification::Remove { query_id: id }],
        })
    }

    /// Record server-supplied journals from a transition for future
    /// resubscribes.
    pub fn save_query_journals(&mut self, msg: &ServerMessage) {
        let ServerMessage::Transition { modifications, .. } = msg else {
            return;
        };
        for modification in modifications {
            if let StateModification::QueryUpdated { query_id, journal: Some(journal), .. } =
                modification
            {
                let Some(token) = self.query_id_to_token.get(query_id) else {
                    debug!(query_id = %query_id, "journal for unknown query, ignoring");
                    continue;
                };
                if let Some(query) = self.query_set.get_mut(token) {
                    query.journal = Some(journal.clone());
                }
            }
        }
    }

    /// Frames that rebuild the full subscription set and re-present auth on
    /// a fresh connection. Resets the version counters the server tracks
    /// per connection.
    pub fn restart(&mut self) -> Vec<ClientMessage> {
        self.query_set_version = 1;

        let modifications = self
            .query_set
            .values()
            .map(|query| QuerySetModification::Add {
                query_id: query.id,
                udf_path: query.udf_path.clone(),
                args: query.args.clone(),
                journal: query.journal.clone(),
            })
            .collect();

        let mut frames = vec![ClientMessage::ModifyQuerySet {
            base_version: 0,
            new_version: 1,
            modifications,
        }];

        if let Some(token) = &self.auth {
            self.identity_version = 1;
            frames.push(ClientMessage::authenticate(0, token.clone()));
        } else {
            self.identity_version = 0;
        }

        frames
    }

    /// Path of a subscribed query, by id.
    pub fn query_path(&self, id: QueryId) -> Option<&UdfPath> {
        self.query(id).map(|q| &q.udf_path)
    }

    /// Arguments of a subscribed query, by id.
    pub fn query_args(&self, id: QueryId) -> Option<&Value> {
        self.query(id).map(|q| &q.args)
    }

    /// Token of a subscribed query, by id. Returns `None` for ids that have
    /// been fully released, which is how stale server results get filtered.
    pub fn query_token(&self, id: QueryId) -> Option<&QueryToken> {
        self.query_id_to_token.get(&id)
    }

    /// Last known journal for a token. Outer `None` means not subscribed.
    pub fn query_journal(&self, token: &QueryToken) -> Option<Option<String>> {
        self.query_set.get(token).map(|q| q.journal.clone())
    }

    /// Present a user token. Returns the frame to send.
    pub fn set_auth(&mut self, value: String) -> ClientMessage {
        self.set_auth_token(AuthToken::User { value })
    }

    /// Present an admin token, optionally impersonating a user identity.
    pub fn set_admin_auth(&mut self, value: String, impersonating: Option<Value>) -> ClientMessage {
        self.set_auth_token(AuthToken::Admin { value, impersonating })
    }

    /// Drop credentials. Returns the frame to send.
    pub fn clear_auth(&mut self) -> ClientMessage {
        self.auth = None;
        let base_version = self.identity_version;
        self.identity_version += 1;
        ClientMessage::authenticate(base_version, AuthToken::None)
    }

    /// Current token value, if an auth record is set.
    pub fn auth_token_value(&self) -> Option<&str> {
        match self.auth.as_ref()? {
            AuthToken::None => None,
            AuthToken::User { value } => Some(value),
            AuthToken::Admin { value, .. } => Some(value),
        }
    }

    pub fn has_auth(&self) -> bool {
        self.auth.is_some()
    }

    fn set_auth_token(&mut self, token: AuthToken) -> ClientMessage {
        self.auth = Some(token.clone());
        let base_version = self.identity_version;
        self.identity_version += 1;
        ClientMessage::authenticate(base_version, token)
    }

    fn query(&self, id: QueryId) -> Option<&LocalQuery> {
        let token = self.query_id_to_token.get(&id)?;
        self.query_set.get(token)
    }
}

impl Default for LocalSyncState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "local_state_tests.rs"]
mod tests;
