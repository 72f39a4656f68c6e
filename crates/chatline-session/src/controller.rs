//! Session controller for listing and switching conversations.

use std::cmp::Reverse;

use chatline_completion::format_structured_content;
use chatline_core::{
    Message, SessionId, SessionSummary,
    types::session_title,
};

use crate::store::{SessionStore, StoreError};

/// Greeting shown in a session that has no messages yet. Never persisted.
pub const WELCOME_MESSAGE: &str = "Hello! Welcome back. How can I help you today?";

/// High-level session operations.
///
/// Every mutating call notifies subscribers exactly once.
#[derive(Debug, Clone)]
pub struct SessionController {
    store: SessionStore,
}

impl SessionController {
    /// Create a controller over `store`.
    #[must_use]
    pub const fn new(store: SessionStore) -> Self {
        Self { store }
    }

    #[must_use]
    pub const fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Started sessions, newest first.
    ///
    /// A session counts as started once it holds a user message. Ties on
    /// the embedded timestamp fall back to id order, so repeated calls
    /// over the same state return the same order.
    #[must_use]
    pub fn list_sessions(&self) -> Vec<SessionSummary> {
        let snapshot = self.store.load();

        let mut sessions: Vec<SessionSummary> = snapshot
            .sessions
            .iter()
            .filter_map(|(id, messages)| {
                session_title(messages).map(|title| SessionSummary {
                    id: id.clone(),
                    title,
                    active: snapshot.current.as_ref() == Some(id),
                })
            })
            .collect();

        sessions.sort_by_key(|s| Reverse((s.id.created_at_millis().unwrap_or(0), s.id.clone())));
        sessions
    }

    /// Start a fresh session and make it current.
    ///
    /// Nothing is written to the mapping until the first message arrives.
    ///
    /// # Errors
    /// Returns error if the pointer cannot be written.
    pub fn new_session(&self) -> Result<SessionId, StoreError> {
        let id = SessionId::mint();
        self.store.set_current_pointer(&id)?;
        tracing::info!(session = %id, "started new session");
        Ok(id)
    }

    /// Make `id` current. Unknown ids are accepted as not-yet-started.
    ///
    /// # Errors
    /// Returns error if the pointer cannot be written.
    pub fn select_session(&self, id: &SessionId) -> Result<(), StoreError> {
        self.store.set_current_pointer(id)?;
        tracing::info!(session = %id, "selected session");
        Ok(())
    }

    /// Delete `id`.
    ///
    /// When `id` was current a fresh session replaces it and is returned.
    ///
    /// # Errors
    /// Returns error if a storage write fails.
    pub fn delete_session(&self, id: &SessionId) -> Result<Option<SessionId>, StoreError> {
        let mut sessions = self.store.load_sessions();
        let existed = sessions.remove(id).is_some();
        self.store.write_sessions(&sessions)?;

        let replacement = if self.store.current_pointer().as_ref() == Some(id) {
            let fresh = SessionId::mint();
            self.store.write_pointer(Some(&fresh))?;
            Some(fresh)
        } else {
            None
        };

        self.store.notify();
        tracing::info!(session = %id, existed, replacement = ?replacement, "deleted session");
        Ok(replacement)
    }

    /// Current session, starting one when none is set.
    ///
    /// # Errors
    /// Returns error if a new pointer cannot be written.
    pub fn ensure_current(&self) -> Result<SessionId, StoreError> {
        match self.store.current_pointer() {
            Some(id) => Ok(id),
            None => self.new_session(),
        }
    }

    #[must_use]
    pub fn current_session(&self) -> Option<SessionId> {
        self.store.current_pointer()
    }

    /// Persisted messages of `id`.
    #[must_use]
    pub fn messages(&self, id: &SessionId) -> Vec<Message> {
        self.store.lookup(id).into_messages()
    }

    /// Messages to display for `id`: the persisted ones with list replies
    /// rendered, or a greeting when there are none.
    #[must_use]
    pub fn transcript(&self, id: &SessionId) -> Vec<Message> {
        let mut messages = self.messages(id);
        if messages.is_empty() {
            return vec![Message::assistant(WELCOME_MESSAGE)];
        }
        for message in messages.iter_mut().filter(|m| !m.is_user()) {
            message.content = format_structured_content(&message.content);
        }
        messages
    }
}
