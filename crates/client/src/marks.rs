// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Client-side performance marks.
//!
//! An explicitly-constructed collector, keyed by session id, with a
//! record/drain lifecycle. The orchestrator owns one instance when debug
//! reporting is enabled and flushes it into a best-effort `Event` frame
//! after notable reconnects. No module-level state.

use chrono::{DateTime, Utc};
use ripple_core::{ClientMessage, Value};

/// A single named mark.
#[derive(Debug, Clone)]
pub struct Mark {
    pub name: &'static str,
    pub at: DateTime<Utc>,
}

/// Collects performance marks for one session.
pub struct MarkCollector {
    session_id: String,
    marks: Vec<Mark>,
}

impl MarkCollector {
    pub fn new(session_id: impl Into<String>) -> Self {
        MarkCollector { session_id: session_id.into(), marks: Vec::new() }
    }

    /// Record a mark at the current time.
    pub fn record(&mut self, name: &'static str) {
        self.marks.push(Mark { name, at: Utc::now() });
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    /// Take all recorded marks, leaving the collector empty.
    pub fn drain(&mut self) -> Vec<Mark> {
        std::mem::take(&mut self.marks)
    }

    /// Drain into a telemetry frame describing a reconnect.
    pub fn reconnect_event(&mut self, disconnect_secs: u64) -> ClientMessage {
        let marks: Vec<Value> = self
            .drain()
            .into_iter()
            .map(|mark| {
                serde_json::json!({
                    "name": mark.name,
                    "at": mark.at.to_rfc3339(),
                })
            })
            .collect();

        ClientMessage::Event {
            session_id: self.session_id.clone(),
            event_type: "ClientReconnected".to_string(),
            event: serde_json::json!({
                "disconnectSecs": disconnect_secs,
                "marks": marks,
            }),
        }
    }
}

#[cfg(test)]
#[path = "marks_tests.rs"]
mod tests;
