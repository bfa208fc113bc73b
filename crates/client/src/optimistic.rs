// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Optimistic overlay over the authoritative query view.
//!
//! Callers attach an optimistic update to a mutation so the UI reflects the
//! write immediately. Updates are closures over a local store; they live
//! until their mutation is reported complete (or failed), and every
//! recomputation replays the survivors in submission order on top of the
//! latest server view, so later updates observe earlier ones' writes.
//!
//! The emitted artifact of every change is the set of query tokens whose
//! visible value differs from the previously emitted view.

use std::collections::{BTreeMap, BTreeSet};

use ripple_core::{FunctionResult, QueryToken, RequestId, UdfPath, Value};
use tracing::debug;

/// A caller-supplied optimistic write, run against the local store.
pub type OptimisticUpdateFn = Box<dyn FnMut(&mut OptimisticLocalStore<'_>) + Send>;

struct OptimisticUpdate {
    request_id: RequestId,
    update: OptimisticUpdateFn,
}

/// Mutable view of subscribed query results handed to optimistic updates.
///
/// Writes only affect queries that are currently in the view; setting a
/// query nobody subscribes to is a no-op.
pub struct OptimisticLocalStore<'a> {
    view: &'a mut BTreeMap<QueryToken, FunctionResult>,
}

impl OptimisticLocalStore<'_> {
    /// Current value of a subscribed query, if it has a successful result.
    pub fn get_query(&self, name: &str, args: &Value) -> Option<&Value> {
        let token = self.token(name, args)?;
        match self.view.get(&token) {
            Some(FunctionResult::Success(value)) => Some(value),
            _ => None,
        }
    }

    /// Overwrite the visible value of a subscribed query.
    pub fn set_query(&mut self, name: &str, args: &Value, value: Value) {
        let Some(token) = self.token(name, args) else {
            return;
        };
        if self.view.contains_key(&token) {
            self.view.insert(token, FunctionResult::Success(value));
        }
    }

    /// Remove a query from the visible view until the server speaks again.
    pub fn delete_query(&mut self, name: &str, args: &Value) {
        let Some(token) = self.token(name, args) else {
            return;
        };
        self.view.remove(&token);
    }

    fn token(&self, name: &str, args: &Value) -> Option<QueryToken> {
        match UdfPath::parse(name) {
            Ok(path) => Some(QueryToken::new(&path, args)),
            Err(e) => {
                debug!(error = %e, "optimistic update referenced an invalid udf path");
                None
            }
        }
    }
}

/// The authoritative map plus the ordered optimistic updates layered on it.
pub struct OptimisticQueryResults {
    authoritative: BTreeMap<QueryToken, FunctionResult>,
    /// The view last emitted to the change callback.
    applied: BTreeMap<QueryToken, FunctionResult>,
    updates: Vec<OptimisticUpdate>,
}

impl OptimisticQueryResults {
    pub fn new() -> Self {
        OptimisticQueryResults {
            authoritative: BTreeMap::new(),
            applied: BTreeMap::new(),
            updates: Vec::new(),
        }
    }

    /// Replace the authoritative view with fresh server results, discard
    /// updates for the completed request ids, and recompute.
    ///
    /// Returns the tokens whose visible value changed.
    pub fn apply_server_update(
        &mut self,
        authoritative: BTreeMap<QueryToken, FunctionResult>,
        completed: &BTreeSet<RequestId>,
    ) -> BTreeSet<QueryToken> {
        self.authoritative = authoritative;
        self.updates.retain(|u| !completed.contains(&u.request_id));
        self.recompute()
    }

    /// Layer a new optimistic update on the view and recompute.
    pub fn add_update(
        &mut self,
        request_id: RequestId,
        update: OptimisticUpdateFn,
    ) -> BTreeSet<QueryToken> {
        self.updates.push(OptimisticUpdate { request_id, update });
        self.recompute()
    }

    /// Discard the update for a failed mutation and recompute.
    pub fn drop_update(&mut self, request_id: RequestId) -> BTreeSet<QueryToken> {
        let before = self.updates.len();
        self.updates.retain(|u| u.request_id != request_id);
        if self.updates.len() == before {
            return BTreeSet::new();
        }
        self.recompute()
    }

    /// The currently visible result for a token, optimistic writes included.
    pub fn query_result(&self, token: &QueryToken) -> Option<&FunctionResult> {
        self.applied.get(token)
    }

    /// Rebuild the visible view and diff it against the last emitted one.
    fn recompute(&mut self) -> BTreeSet<QueryToken> {
        let mut view = self.authoritative.clone();
        for update in self.updates.iter_mut() {
            let mut store = OptimisticLocalStore { view: &mut view };
            (update.update)(&mut store);
        }

        let mut changed = BTreeSet::new();
        for (token, result) in &view {
            if self.applied.get(token) != Some(result) {
                changed.insert(token.clone());
            }
        }
        for token in self.applied.keys() {
            if !view.contains_key(token) {
                changed.insert(token.clone());
            }
        }

        self.applied = view;
        changed
    }
}

impl Default for OptimisticQueryResults {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "optimistic_tests.rs"]
mod tests;
