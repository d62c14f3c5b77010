//! Conversation history for multi-turn generations.
//!
//! Sessions are keyed by `(stage, filename)` so a continuation sequence never
//! sees turns from another stage or another file. Callers clear the session at
//! the start and at the end of every sequence.

use std::collections::HashMap;

use tracing::debug;

use crate::io::model::Turn;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub stage: String,
    pub filename: String,
}

impl SessionKey {
    pub fn new(stage: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            filename: filename.into(),
        }
    }
}

/// In-memory session store.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<SessionKey, Vec<Turn>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self, key: &SessionKey) -> &[Turn] {
        self.sessions.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn append(&mut self, key: &SessionKey, turn: Turn) {
        self.sessions.entry(key.clone()).or_default().push(turn);
    }

    pub fn clear(&mut self, key: &SessionKey) {
        if let Some(turns) = self.sessions.remove(key) {
            debug!(stage = %key.stage, file = %key.filename, turns = turns.len(), "cleared session");
        }
    }

    /// True when no session holds any turn.
    pub fn is_empty(&self) -> bool {
        self.sessions.values().all(Vec::is_empty)
    }
}
