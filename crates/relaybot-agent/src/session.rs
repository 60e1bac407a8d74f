//! Per-turn sessions and the store that hands them out.
//!
//! A [`Session`] lives for exactly one inbound message: it is opened with
//! [`SessionStore::begin`], driven by the orchestrator, and closed with
//! [`SessionStore::finish`], which invalidates its id. Sessions are owned
//! values, so two concurrent messages can never share one.
//!
//! The store also keeps a bounded in-memory conversation history per
//! conversation key. Nothing is persisted.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use relaybot_core::types::Message;

use crate::capability::CapabilitySet;

// ─────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────

#[derive(Debug)]
pub struct Session {
    id: String,
    key: String,
    created_at: DateTime<Utc>,
    /// Tools offered to the model during this turn.
    pub active_tools: CapabilitySet,
    /// Conversation sent to the model, grown by each round.
    pub messages: Vec<Message>,
    /// Name of the last tool whose result was appended.
    pub last_tool_used: Option<String>,
}

impl Session {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Conversation key (e.g. `cli:direct`).
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

// ─────────────────────────────────────────────
// SessionStore
// ─────────────────────────────────────────────

/// Issues sessions and keeps short conversation histories.
pub struct SessionStore {
    max_history: usize,
    /// Open session id → conversation key.
    active: RwLock<HashMap<String, String>>,
    history: RwLock<HashMap<String, Vec<Message>>>,
}

impl SessionStore {
    /// `max_history` bounds the stored non-system messages per conversation.
    pub fn new(max_history: usize) -> Self {
        Self {
            max_history,
            active: RwLock::new(HashMap::new()),
            history: RwLock::new(HashMap::new()),
        }
    }

    /// Open a session for one turn of conversation `key`.
    pub fn begin(&self, key: &str, active_tools: CapabilitySet, messages: Vec<Message>) -> Session {
        let session = Session {
            id: Uuid::new_v4().to_string(),
            key: key.to_string(),
            created_at: Utc::now(),
            active_tools,
            messages,
            last_tool_used: None,
        };
        self.active
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(session.id.clone(), key.to_string());
        debug!(session = %session.id, key = %key, "session opened");
        session
    }

    /// Close a session. Its id is no longer active afterwards. When the turn
    /// produced a reply, the user message and reply join the history.
    pub fn finish(&self, session: Session, exchange: Option<(Message, Message)>) {
        self.active
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&session.id);

        if let Some((user, reply)) = exchange {
            self.append_history(&session.key, [user, reply]);
        }
        debug!(session = %session.id, key = %session.key, "session closed");
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.active
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(id)
    }

    pub fn active_count(&self) -> usize {
        self.active.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Stored history of a conversation, oldest first.
    pub fn history(&self, key: &str) -> Vec<Message> {
        self.history
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    pub fn append_history(&self, key: &str, messages: impl IntoIterator<Item = Message>) {
        let mut history = self.history.write().unwrap_or_else(|e| e.into_inner());
        let entry = history.entry(key.to_string()).or_default();
        entry.extend(messages);
        if entry.len() > self.max_history {
            let excess = entry.len() - self.max_history;
            entry.drain(..excess);
        }
    }

    /// Forget a conversation's history.
    pub fn clear(&self, key: &str) {
        self.history
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_ids_are_unique_and_invalidated() {
        let store = SessionStore::default();
        let a = store.begin("cli:direct", CapabilitySet::default(), vec![]);
        let b = store.begin("cli:direct", CapabilitySet::default(), vec![]);

        assert_ne!(a.id(), b.id());
        assert_eq!(store.active_count(), 2);

        let id = a.id().to_string();
        store.finish(a, None);
        assert!(!store.is_active(&id));
        assert!(store.is_active(b.id()));
        assert!(store.history("cli:direct").is_empty());
    }

    #[test]
    fn test_finish_records_exchange() {
        let store = SessionStore::default();
        let session = store.begin("http:42", CapabilitySet::default(), vec![]);
        store.finish(session, Some((Message::user("hi"), Message::assistant("hello"))));

        assert_eq!(
            store.history("http:42"),
            vec![Message::user("hi"), Message::assistant("hello")]
        );
        store.clear("http:42");
        assert!(store.history("http:42").is_empty());
    }

    #[test]
    fn test_history_is_bounded() {
        let store = SessionStore::new(3);
        store.append_history("k", (0..5).map(|i| Message::user(format!("m{i}"))));

        let history = store.history("k");
        assert_eq!(history.len(), 3);
        assert_eq!(history[0], Message::user("m2"));
    }
}
